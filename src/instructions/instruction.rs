use crate::data::OperandType;
use crate::data::Value;
use std::sync::Arc;

/// a pure numeric operation over typed operands.
///
/// an instruction declares the shapes it consumes and computes a double
/// from matching values. dynamic disagreement between declared and
/// provided operands yields 0.0 rather than a fault: by the time a
/// program executes, encoding-level validity has already been
/// established, and the remaining mismatches are the fault of the
/// caller.
#[derive(Clone)]
pub struct Instruction {
    name: String,
    operands: Vec<OperandType>,
    operation: Arc<dyn Fn(&[Value]) -> f64 + Send + Sync>,
}

impl std::fmt::Debug for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruction")
            .field("name", &self.name)
            .field("operands", &self.operands)
            .finish()
    }
}

impl Instruction {
    pub fn new<F>(name: &str, operands: Vec<OperandType>, operation: F) -> Self
    where
        F: Fn(&[Value]) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            operands,
            operation: Arc::new(operation),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operand_types(&self) -> &[OperandType] {
        &self.operands
    }

    pub fn nb_operands(&self) -> usize {
        self.operands.len()
    }

    /// apply the operation, or 0.0 on operand disagreement.
    pub fn execute(&self, operands: &[Value]) -> f64 {
        let agrees = operands.len() == self.operands.len()
            && operands
                .iter()
                .zip(self.operands.iter())
                .all(|(value, shape)| value.matches(*shape));
        debug_assert!(
            agrees,
            "instruction {} applied to mismatched operands",
            self.name
        );
        match agrees {
            true => (self.operation)(operands),
            false => 0.0,
        }
    }

    fn binary<F>(name: &str, f: F) -> Self
    where
        F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
    {
        Self::new(
            name,
            vec![OperandType::Scalar, OperandType::Scalar],
            move |args| f(args[0].scalar().unwrap(), args[1].scalar().unwrap()),
        )
    }

    fn unary<F>(name: &str, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::new(name, vec![OperandType::Scalar], move |args| {
            f(args[0].scalar().unwrap())
        })
    }

    pub fn add() -> Self {
        Self::binary("add", |a, b| a + b)
    }

    pub fn sub() -> Self {
        Self::binary("sub", |a, b| a - b)
    }

    pub fn mult() -> Self {
        Self::binary("mult", |a, b| a * b)
    }

    pub fn div() -> Self {
        Self::binary("div", |a, b| a / b)
    }

    pub fn max() -> Self {
        Self::binary("max", f64::max)
    }

    pub fn min() -> Self {
        Self::binary("min", f64::min)
    }

    pub fn exp() -> Self {
        Self::unary("exp", f64::exp)
    }

    pub fn ln() -> Self {
        Self::unary("ln", f64::ln)
    }

    pub fn cos() -> Self {
        Self::unary("cos", f64::cos)
    }

    pub fn sin() -> Self {
        Self::unary("sin", f64::sin)
    }

    /// scalar scaled by a program constant.
    pub fn mult_by_const() -> Self {
        Self::new(
            "mult_by_const",
            vec![OperandType::Scalar, OperandType::Constant],
            |args| args[0].scalar().unwrap() * args[1].scalar().unwrap(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_is_what_it_says() {
        let operands = vec![Value::Scalar(6.0), Value::Scalar(4.0)];
        assert_eq!(Instruction::add().execute(&operands), 10.0);
        assert_eq!(Instruction::sub().execute(&operands), 2.0);
        assert_eq!(Instruction::mult().execute(&operands), 24.0);
        assert_eq!(Instruction::div().execute(&operands), 1.5);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn arity_disagreement_yields_zero() {
        let operands = vec![Value::Scalar(6.0)];
        assert_eq!(Instruction::add().execute(&operands), 0.0);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn shape_disagreement_yields_zero() {
        let operands = vec![Value::Scalar(6.0), Value::Window(vec![1.0])];
        assert_eq!(Instruction::add().execute(&operands), 0.0);
    }

    #[test]
    fn constants_scale_scalars() {
        let operands = vec![Value::Scalar(2.5), Value::Constant(-2)];
        assert_eq!(Instruction::mult_by_const().execute(&operands), -5.0);
    }

    #[test]
    fn windowed_lambdas_are_expressible() {
        let dot = Instruction::new(
            "sum",
            vec![OperandType::Window(3)],
            |args| args[0].cells().unwrap().iter().sum(),
        );
        let operands = vec![Value::Window(vec![1.0, 2.0, 3.0])];
        assert_eq!(dot.execute(&operands), 6.0);
    }
}

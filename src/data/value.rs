use super::constant::Constant;

/// the closed set of operand shapes a data handler can serve.
///
/// instructions declare one of these per operand slot; handlers answer
/// address-space queries per shape. windows are parameterized by their
/// extent so that e.g. a 2x2 view over a matrix is a distinct type from
/// a 3x3 one, with a distinct address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// a single double-precision cell.
    Scalar,
    /// a single signed 32-bit constant.
    Constant,
    /// a 1-D window of n consecutive cells.
    Window(usize),
    /// a 2-D window of h rows by w columns.
    Window2D(usize, usize),
}

impl std::fmt::Display for OperandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperandType::Scalar => write!(f, "scalar"),
            OperandType::Constant => write!(f, "constant"),
            OperandType::Window(n) => write!(f, "window[{}]", n),
            OperandType::Window2D(h, w) => write!(f, "window[{}x{}]", h, w),
        }
    }
}

/// a fetched operand, matching one of the shapes of OperandType.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Constant(Constant),
    Window(Vec<f64>),
    Window2D {
        rows: usize,
        cols: usize,
        cells: Vec<f64>,
    },
}

impl Value {
    /// whether this value has the given shape.
    pub fn matches(&self, shape: OperandType) -> bool {
        match (self, shape) {
            (Value::Scalar(_), OperandType::Scalar) => true,
            (Value::Constant(_), OperandType::Constant) => true,
            (Value::Window(cells), OperandType::Window(n)) => cells.len() == n,
            (Value::Window2D { rows, cols, .. }, OperandType::Window2D(h, w)) => {
                *rows == h && *cols == w
            }
            _ => false,
        }
    }

    /// widen to the floating-point domain, when the shape allows it.
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            Value::Constant(c) => Some(f64::from(*c)),
            _ => None,
        }
    }

    /// the cells of a windowed value, in row-major order.
    pub fn cells(&self) -> Option<&[f64]> {
        match self {
            Value::Window(cells) => Some(cells),
            Value::Window2D { cells, .. } => Some(cells),
            _ => None,
        }
    }
}

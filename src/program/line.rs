use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;

/// one register-machine statement: an instruction index, a destination
/// register, and a (source, address) pair per operand slot.
///
/// fields are stored decoded but validated against the environment's
/// encoding widths, so a line always round-trips through the packed
/// representation. the unchecked write path exists for tests that
/// need to provoke out-of-encoding faults deliberately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Line {
    instruction: u64,
    destination: u64,
    operands: Vec<(u64, u64)>,
}

fn capacity(bits: usize) -> u64 {
    1u64 << bits
}

impl Line {
    /// a zeroed line shaped for the environment.
    pub fn new(environment: &Environment) -> Self {
        Self {
            instruction: 0,
            destination: 0,
            operands: vec![(0, 0); environment.max_nb_operands()],
        }
    }

    pub fn instruction(&self) -> u64 {
        self.instruction
    }

    pub fn destination(&self) -> u64 {
        self.destination
    }

    pub fn nb_operands(&self) -> usize {
        self.operands.len()
    }

    pub fn operand(&self, slot: usize) -> (u64, u64) {
        self.operands[slot]
    }

    pub fn set_instruction(
        &mut self,
        environment: &Environment,
        index: u64,
        checked: bool,
    ) -> Result<()> {
        if checked && index >= capacity(environment.nb_instruction_bits()) {
            return Err(Error::InvalidEncoding(format!(
                "instruction index {} exceeds {} bits",
                index,
                environment.nb_instruction_bits()
            )));
        }
        self.instruction = index;
        Ok(())
    }

    pub fn set_destination(
        &mut self,
        environment: &Environment,
        register: u64,
        checked: bool,
    ) -> Result<()> {
        if checked && register >= capacity(environment.nb_destination_bits()) {
            return Err(Error::InvalidEncoding(format!(
                "destination register {} exceeds {} bits",
                register,
                environment.nb_destination_bits()
            )));
        }
        self.destination = register;
        Ok(())
    }

    pub fn set_operand(
        &mut self,
        environment: &Environment,
        slot: usize,
        source: u64,
        address: u64,
        checked: bool,
    ) -> Result<()> {
        if slot >= self.operands.len() {
            return Err(Error::InvalidEncoding(format!(
                "operand slot {} of a {}-operand line",
                slot,
                self.operands.len()
            )));
        }
        if checked && source >= capacity(environment.nb_source_bits()) {
            return Err(Error::InvalidEncoding(format!(
                "operand source {} exceeds {} bits",
                source,
                environment.nb_source_bits()
            )));
        }
        if checked && address >= capacity(environment.nb_address_bits()) {
            return Err(Error::InvalidEncoding(format!(
                "operand address {} exceeds {} bits",
                address,
                environment.nb_address_bits()
            )));
        }
        self.operands[slot] = (source, address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PrimitiveArray;
    use crate::instructions::Instruction;
    use crate::instructions::Set;

    fn environment() -> Environment {
        let source = PrimitiveArray::new(32);
        let mut set = Set::new();
        set.add(Instruction::add()).add(Instruction::sub());
        Environment::new(set, &[&source], 8, 1).unwrap()
    }

    #[test]
    fn checked_writes_respect_field_widths() {
        let env = environment();
        let mut line = Line::new(&env);
        assert!(line.set_instruction(&env, 1, true).is_ok());
        assert!(line.set_instruction(&env, 2, true).is_err());
        assert!(line.set_destination(&env, 7, true).is_ok());
        assert!(line.set_destination(&env, 8, true).is_err());
        assert!(line.set_operand(&env, 0, 2, 31, true).is_ok());
        assert!(line.set_operand(&env, 0, 4, 0, true).is_err());
        assert!(line.set_operand(&env, 0, 0, 32, true).is_err());
    }

    #[test]
    fn unchecked_writes_bypass_validation() {
        let env = environment();
        let mut line = Line::new(&env);
        assert!(line.set_instruction(&env, 99, false).is_ok());
        assert_eq!(line.instruction(), 99);
    }

    #[test]
    fn slots_beyond_the_shape_always_fail() {
        let env = environment();
        let mut line = Line::new(&env);
        assert!(line.set_operand(&env, 2, 0, 0, false).is_err());
    }
}

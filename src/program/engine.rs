use super::line::Line;
use super::program::Program;
use super::program::SRC_CONSTANTS;
use super::program::SRC_REGISTERS;
use crate::data::DataHandler;
use crate::data::PrimitiveArray;
use crate::data::Value;
use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use std::sync::Arc;

/// executes programs against a register bank and a set of external
/// data sources.
///
/// the engine is long-lived: the execution loops swap programs in and
/// out with `set_program` and pass the current sources per execution,
/// which is also how the mutator replays a candidate program on the
/// archive's historical snapshots. substituted sources must carry the
/// identities the environment was declared with.
pub struct ProgramEngine {
    environment: Arc<Environment>,
    program: Option<Arc<Program>>,
    registers: PrimitiveArray,
    operands: Vec<Value>,
}

/// a fault that lenient execution may skip: the line simply does not
/// write its destination.
fn skippable(error: &Error) -> bool {
    matches!(error, Error::OutOfRange { .. } | Error::TypeMismatch(_))
}

impl ProgramEngine {
    pub fn new(environment: Arc<Environment>) -> Self {
        let registers = PrimitiveArray::new(environment.nb_registers());
        Self {
            environment,
            program: None,
            registers,
            operands: Vec::new(),
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// bind a program and clear the register bank.
    pub fn set_program(&mut self, program: Arc<Program>) -> Result<()> {
        if !Arc::ptr_eq(program.environment(), &self.environment) {
            return Err(Error::InvalidConfiguration(
                "program bound to a foreign environment".to_string(),
            ));
        }
        self.program = Some(program);
        self.registers.reset();
        Ok(())
    }

    /// run every live line in order and return register 0.
    ///
    /// with `ignore_faults`, a line whose operand fetch or dispatch
    /// faults is skipped and execution continues; without it, the
    /// fault propagates.
    pub fn execute(
        &mut self,
        sources: &[&dyn DataHandler],
        ignore_faults: bool,
    ) -> Result<f64> {
        let program = self
            .program
            .clone()
            .ok_or_else(|| Error::InvalidConfiguration("no program bound".to_string()))?;
        self.environment.check_sources(sources)?;
        self.registers.reset();
        for (index, line) in program.lines().iter().enumerate() {
            if program.is_intron(index) {
                continue;
            }
            match self.execute_line(&program, line, sources) {
                Ok(()) => {}
                Err(fault) if ignore_faults && skippable(&fault) => {
                    log::trace!("skipping faulty line {}: {}", index, fault);
                }
                Err(fault) => return Err(fault),
            }
        }
        Ok(self.registers.cell(0))
    }

    fn execute_line(
        &mut self,
        program: &Program,
        line: &Line,
        sources: &[&dyn DataHandler],
    ) -> Result<()> {
        let environment = &self.environment;
        let instruction = environment
            .instructions()
            .instruction(line.instruction())
            .ok_or(Error::OutOfRange {
                address: line.instruction(),
                space: environment.nb_instructions(),
            })?;
        let constants = environment.nb_constants() > 0;
        let external = 1 + usize::from(constants);
        self.operands.clear();
        for (slot, shape) in instruction.operand_types().iter().enumerate() {
            let (source, address) = line.operand(slot);
            let handler: &dyn DataHandler = match source {
                SRC_REGISTERS => &self.registers,
                SRC_CONSTANTS if constants => program.constants(),
                _ => *sources
                    .get(source as usize - external)
                    .ok_or(Error::OutOfRange {
                        address: source,
                        space: environment.nb_sources(),
                    })?,
            };
            let scaled = handler.scale(address, *shape);
            self.operands.push(handler.get(*shape, scaled)?);
        }
        let result = instruction.execute(&self.operands);
        self.registers.try_set(line.destination(), result)
    }
}

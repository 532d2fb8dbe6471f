use crate::data::ConstantHandler;
use crate::data::DataHandler;
use crate::data::PrimitiveArray;
use crate::error::Error;
use crate::error::Result;
use crate::instructions::Set;

/// ceil(log2(n)) for field widths; 0 when a single value needs no bits.
fn ceil_log2(n: usize) -> usize {
    match n {
        0 | 1 => 0,
        n => (usize::BITS - (n - 1).leading_zeros()) as usize,
    }
}

/// the fixed contract under which programs are encoded and executed.
///
/// built once from an instruction set, the ordered external data
/// sources, and the register and constant counts; immutable thereafter.
/// instructions whose operand shapes no declared source (nor the
/// register or constant banks) can provide are silently dropped at
/// construction, so that random line initialization never draws an
/// unusable instruction.
///
/// the environment keeps zeroed mirrors of the external sources: same
/// identities, same shapes, no contents. code that needs the shape of
/// the data without the data itself (liveness analysis, line
/// validation, the importer) works against the mirrors.
pub struct Environment {
    instructions: Set,
    fakes: Vec<Box<dyn DataHandler>>,
    nb_registers: usize,
    nb_constants: usize,
    largest_address_space: usize,
    max_nb_operands: usize,
    nb_instruction_bits: usize,
    nb_destination_bits: usize,
    nb_source_bits: usize,
    nb_address_bits: usize,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("instructions", &self.instructions)
            .field("fakes", &self.fakes.iter().map(|h| h.id()).collect::<Vec<_>>())
            .field("nb_registers", &self.nb_registers)
            .field("nb_constants", &self.nb_constants)
            .field("largest_address_space", &self.largest_address_space)
            .field("max_nb_operands", &self.max_nb_operands)
            .field("nb_instruction_bits", &self.nb_instruction_bits)
            .field("nb_destination_bits", &self.nb_destination_bits)
            .field("nb_source_bits", &self.nb_source_bits)
            .field("nb_address_bits", &self.nb_address_bits)
            .finish()
    }
}

impl Environment {
    pub fn new(
        instructions: Set,
        sources: &[&dyn DataHandler],
        nb_registers: usize,
        nb_constants: usize,
    ) -> Result<Self> {
        if nb_registers == 0 {
            return Err(Error::InvalidConfiguration(
                "a program needs at least one register".to_string(),
            ));
        }
        if sources.is_empty() {
            return Err(Error::InvalidConfiguration(
                "an environment needs at least one data source".to_string(),
            ));
        }
        if let Some(empty) = sources.iter().find(|s| s.largest_address_space() == 0) {
            return Err(Error::InvalidConfiguration(format!(
                "data source {} has an empty address space",
                empty.id()
            )));
        }
        let registers = PrimitiveArray::new(nb_registers);
        let constants = ConstantHandler::new(nb_constants);
        let mut filtered = Set::new();
        for instruction in instructions.instructions() {
            let providable = instruction.operand_types().iter().all(|shape| {
                registers.provides(*shape)
                    || (nb_constants > 0 && constants.provides(*shape))
                    || sources.iter().any(|s| s.provides(*shape))
            });
            match providable {
                true => {
                    filtered.add(instruction.clone());
                }
                false => log::debug!(
                    "dropping instruction {}: operand shapes not providable",
                    instruction.name()
                ),
            }
        }
        if filtered.is_empty() {
            return Err(Error::InvalidConfiguration(
                "no instruction of the set is executable with the declared sources"
                    .to_string(),
            ));
        }
        let largest_address_space = sources
            .iter()
            .map(|s| s.largest_address_space())
            .chain([nb_registers, nb_constants])
            .max()
            .expect("sources are non-empty");
        let max_nb_operands = filtered.max_nb_operands();
        let nb_sources = 1 + usize::from(nb_constants > 0) + sources.len();
        let fakes = sources
            .iter()
            .map(|s| {
                let mut fake = s.clone_handler();
                fake.reset();
                fake
            })
            .collect();
        Ok(Self {
            nb_instruction_bits: ceil_log2(filtered.len()),
            nb_destination_bits: ceil_log2(nb_registers),
            nb_source_bits: ceil_log2(nb_sources),
            nb_address_bits: ceil_log2(largest_address_space),
            instructions: filtered,
            fakes,
            nb_registers,
            nb_constants,
            largest_address_space,
            max_nb_operands,
        })
    }

    pub fn instructions(&self) -> &Set {
        &self.instructions
    }

    pub fn nb_instructions(&self) -> usize {
        self.instructions.len()
    }

    pub fn nb_registers(&self) -> usize {
        self.nb_registers
    }

    pub fn nb_constants(&self) -> usize {
        self.nb_constants
    }

    /// external sources plus the register bank plus the constant bank
    /// when there is one; this is the range of a line's source index.
    pub fn nb_sources(&self) -> usize {
        1 + usize::from(self.nb_constants > 0) + self.fakes.len()
    }

    pub fn nb_external_sources(&self) -> usize {
        self.fakes.len()
    }

    pub fn largest_address_space(&self) -> usize {
        self.largest_address_space
    }

    pub fn max_nb_operands(&self) -> usize {
        self.max_nb_operands
    }

    /// zeroed mirrors of the external sources, in declaration order.
    pub fn fake_sources(&self) -> &[Box<dyn DataHandler>] {
        &self.fakes
    }

    /// identity check for substituted sources.
    pub fn check_sources(&self, sources: &[&dyn DataHandler]) -> Result<()> {
        if sources.len() != self.fakes.len() {
            return Err(Error::IncompatibleDataSources(format!(
                "expected {} sources, got {}",
                self.fakes.len(),
                sources.len()
            )));
        }
        for (fake, source) in self.fakes.iter().zip(sources.iter()) {
            if fake.id() != source.id() {
                return Err(Error::IncompatibleDataSources(format!(
                    "source {} substituted for {}",
                    source.id(),
                    fake.id()
                )));
            }
        }
        Ok(())
    }

    pub fn nb_instruction_bits(&self) -> usize {
        self.nb_instruction_bits
    }

    pub fn nb_destination_bits(&self) -> usize {
        self.nb_destination_bits
    }

    pub fn nb_source_bits(&self) -> usize {
        self.nb_source_bits
    }

    pub fn nb_address_bits(&self) -> usize {
        self.nb_address_bits
    }

    /// width in bits of one encoded program line.
    pub fn line_size(&self) -> usize {
        self.nb_instruction_bits
            + self.nb_destination_bits
            + self.max_nb_operands * (self.nb_source_bits + self.nb_address_bits)
    }
}

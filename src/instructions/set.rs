use super::instruction::Instruction;

/// an ordered, append-only catalog of instructions.
///
/// order matters: program lines refer to instructions by index, so the
/// set never reorders or deduplicates. duplicates are legitimate, they
/// just bias mutation toward the duplicated operation.
#[derive(Debug, Clone, Default)]
pub struct Set {
    instructions: Vec<Instruction>,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instruction(&self, index: u64) -> Option<&Instruction> {
        self.instructions.get(index as usize)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// largest operand count over the whole set.
    pub fn max_nb_operands(&self) -> usize {
        self.instructions
            .iter()
            .map(Instruction::nb_operands)
            .max()
            .unwrap_or(0)
    }

    /// the default arithmetic catalog.
    pub fn arithmetic() -> Self {
        let mut set = Self::new();
        set.add(Instruction::add())
            .add(Instruction::sub())
            .add(Instruction::mult())
            .add(Instruction::div())
            .add(Instruction::max())
            .add(Instruction::min());
        set
    }
}

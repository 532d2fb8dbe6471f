use super::line::Line;
use crate::data::ConstantHandler;
use crate::data::OperandType;
use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

/// register source index within a line's operand pair.
pub(crate) const SRC_REGISTERS: u64 = 0;
/// constant source index, meaningful only when the environment
/// declares a non-empty constant bank.
pub(crate) const SRC_CONSTANTS: u64 = 1;

/// an ordered sequence of lines plus a private constant bank, bound to
/// the environment that fixed its encoding.
///
/// programs are shared by reference between graph edges; mutation
/// clones before writing. the intron flags cache the result of the
/// last liveness pass, so engines can skip dead lines without
/// re-deriving them per execution.
#[derive(Debug, Clone)]
pub struct Program {
    environment: Arc<Environment>,
    lines: Vec<Line>,
    introns: Vec<bool>,
    constants: ConstantHandler,
}

impl Program {
    pub fn new(environment: Arc<Environment>) -> Self {
        let constants = ConstantHandler::new(environment.nb_constants());
        Self {
            environment,
            lines: Vec::new(),
            introns: Vec::new(),
            constants,
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn nb_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn line_mut(&mut self, index: usize) -> Option<&mut Line> {
        self.lines.get_mut(index)
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn constants(&self) -> &ConstantHandler {
        &self.constants
    }

    pub fn constants_mut(&mut self) -> &mut ConstantHandler {
        &mut self.constants
    }

    /// append a zeroed line.
    pub fn add_line(&mut self) -> &mut Line {
        self.lines.push(Line::new(&self.environment));
        self.introns.push(false);
        self.lines.last_mut().expect("just pushed")
    }

    /// insert a zeroed line before the given position.
    pub fn insert_line(&mut self, index: usize) -> Result<&mut Line> {
        if index > self.lines.len() {
            return Err(Error::OutOfRange {
                address: index as u64,
                space: self.lines.len() + 1,
            });
        }
        self.lines.insert(index, Line::new(&self.environment));
        self.introns.insert(index, false);
        Ok(&mut self.lines[index])
    }

    pub fn remove_line(&mut self, index: usize) -> Result<()> {
        if index >= self.lines.len() {
            return Err(Error::OutOfRange {
                address: index as u64,
                space: self.lines.len(),
            });
        }
        self.lines.remove(index);
        self.introns.remove(index);
        Ok(())
    }

    pub fn swap_lines(&mut self, a: usize, b: usize) -> Result<()> {
        if a >= self.lines.len() || b >= self.lines.len() {
            return Err(Error::OutOfRange {
                address: a.max(b) as u64,
                space: self.lines.len(),
            });
        }
        self.lines.swap(a, b);
        self.introns.swap(a, b);
        Ok(())
    }

    pub fn is_intron(&self, index: usize) -> bool {
        self.introns.get(index).copied().unwrap_or(false)
    }

    /// backward liveness from register 0 at the last line.
    ///
    /// a line is live iff its destination register is needed at that
    /// point; a live line consumes its destination from the live set
    /// and contributes every register its operands read. the register
    /// addresses contributing to the live set are scaled exactly the
    /// way execution scales them, otherwise a skipped line could alias
    /// a read that execution actually performs.
    fn liveness(&self) -> Vec<bool> {
        let nb_registers = self.environment.nb_registers();
        let mut live: BTreeSet<u64> = BTreeSet::from([0]);
        let mut flags = vec![true; self.lines.len()];
        for (index, line) in self.lines.iter().enumerate().rev() {
            if !live.contains(&line.destination()) {
                flags[index] = false;
                continue;
            }
            live.remove(&line.destination());
            let arity = self
                .environment
                .instructions()
                .instruction(line.instruction())
                .map(|i| i.nb_operands())
                .unwrap_or(0);
            for slot in 0..arity {
                let (source, address) = line.operand(slot);
                if source != SRC_REGISTERS {
                    continue;
                }
                let shape = self
                    .environment
                    .instructions()
                    .instruction(line.instruction())
                    .expect("arity came from this instruction")
                    .operand_types()[slot];
                match shape {
                    OperandType::Scalar => {
                        live.insert(address % nb_registers as u64);
                    }
                    OperandType::Window(n) if n <= nb_registers => {
                        let space = (nb_registers - n + 1) as u64;
                        let start = address % space;
                        live.extend(start..start + n as u64);
                    }
                    _ => {}
                }
            }
        }
        flags
    }

    /// flag dead lines and return how many were found.
    pub fn identify_introns(&mut self) -> usize {
        let flags = self.liveness();
        self.introns = flags.iter().map(|live| !live).collect();
        self.introns.iter().filter(|intron| **intron).count()
    }

    /// drop dead lines outright; what remains is all live.
    pub fn clear_introns(&mut self) {
        let flags = self.liveness();
        let mut keep = flags.iter();
        self.lines.retain(|_| *keep.next().expect("one flag per line"));
        self.introns = vec![false; self.lines.len()];
    }

    /// the live subsequence of lines, freshly derived.
    fn live_lines(&self) -> Vec<&Line> {
        self.liveness()
            .into_iter()
            .zip(self.lines.iter())
            .filter(|(live, _)| *live)
            .map(|(_, line)| line)
            .collect()
    }

    /// two programs behave identically iff their live line sequences
    /// are equal field-for-field and the constants read by live lines
    /// hold equal values.
    pub fn has_identical_behavior(&self, other: &Self) -> bool {
        let ours = self.live_lines();
        let theirs = other.live_lines();
        if ours.len() != theirs.len() {
            return false;
        }
        if ours.iter().zip(theirs.iter()).any(|(a, b)| a != b) {
            return false;
        }
        let nb_constants = self.environment.nb_constants();
        if nb_constants == 0 {
            return true;
        }
        for line in ours {
            let arity = self
                .environment
                .instructions()
                .instruction(line.instruction())
                .map(|i| i.nb_operands())
                .unwrap_or(0);
            for slot in 0..arity {
                let (source, address) = line.operand(slot);
                if source != SRC_CONSTANTS {
                    continue;
                }
                let address = (address % nb_constants as u64) as usize;
                if self.constants.constant(address) != other.constants.constant(address) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PrimitiveArray;
    use crate::instructions::Instruction;
    use crate::instructions::Set;

    fn environment() -> Arc<Environment> {
        let source = PrimitiveArray::new(8);
        let mut set = Set::new();
        set.add(Instruction::add()).add(Instruction::mult_by_const());
        Arc::new(Environment::new(set, &[&source], 8, 2).unwrap())
    }

    /// build `add r[dest] = r[a] + r[b]` at the end of the program.
    fn add_line(program: &mut Program, dest: u64, a: u64, b: u64) {
        let env = program.environment().clone();
        let line = program.add_line();
        line.set_instruction(&env, 0, true).unwrap();
        line.set_destination(&env, dest, true).unwrap();
        line.set_operand(&env, 0, SRC_REGISTERS, a, true).unwrap();
        line.set_operand(&env, 1, SRC_REGISTERS, b, true).unwrap();
    }

    #[test]
    fn overwritten_writes_are_introns() {
        // destinations [5, 1, 0, 0]: the write to r0 on line 2 is
        // overwritten by line 3 without ever being read.
        let mut program = Program::new(environment());
        add_line(&mut program, 5, 2, 3);
        add_line(&mut program, 1, 2, 3);
        add_line(&mut program, 0, 0, 1);
        add_line(&mut program, 0, 1, 5);
        assert_eq!(program.identify_introns(), 1);
        assert!(!program.is_intron(0));
        assert!(!program.is_intron(1));
        assert!(program.is_intron(2));
        assert!(!program.is_intron(3));
    }

    #[test]
    fn dead_tail_write_is_an_intron() {
        let mut program = Program::new(environment());
        add_line(&mut program, 0, 1, 2);
        add_line(&mut program, 3, 0, 0);
        assert_eq!(program.identify_introns(), 1);
        assert!(program.is_intron(1));
    }

    #[test]
    fn clear_introns_drops_dead_lines() {
        let mut program = Program::new(environment());
        add_line(&mut program, 5, 2, 3);
        add_line(&mut program, 0, 1, 2);
        program.clear_introns();
        assert_eq!(program.nb_lines(), 1);
        assert_eq!(program.line(0).unwrap().destination(), 0);
    }

    #[test]
    fn behavior_ignores_introns() {
        let mut a = Program::new(environment());
        add_line(&mut a, 5, 2, 3);
        add_line(&mut a, 0, 1, 2);
        let mut b = Program::new(environment());
        add_line(&mut b, 0, 1, 2);
        assert!(a.has_identical_behavior(&b));
        assert!(b.has_identical_behavior(&a));
    }

    #[test]
    fn behavior_sees_live_line_differences() {
        let mut a = Program::new(environment());
        add_line(&mut a, 0, 1, 2);
        let mut b = Program::new(environment());
        add_line(&mut b, 0, 1, 3);
        assert!(!a.has_identical_behavior(&b));
    }

    #[test]
    fn behavior_sees_constants_read_by_live_lines() {
        let env = environment();
        let build = |value| {
            let mut program = Program::new(env.clone());
            let line = program.add_line();
            line.set_instruction(&env, 1, true).unwrap(); // mult_by_const
            line.set_destination(&env, 0, true).unwrap();
            line.set_operand(&env, 0, SRC_REGISTERS, 0, true).unwrap();
            line.set_operand(&env, 1, SRC_CONSTANTS, 0, true).unwrap();
            program.constants_mut().set(0, value);
            program
        };
        let a = build(3);
        let b = build(3);
        let c = build(4);
        assert!(a.has_identical_behavior(&b));
        assert!(!a.has_identical_behavior(&c));
    }

    #[test]
    fn unread_constants_do_not_matter() {
        let env = environment();
        let mut a = Program::new(env.clone());
        add_line(&mut a, 0, 1, 2);
        let mut b = a.clone();
        b.constants_mut().set(1, 99);
        assert!(a.has_identical_behavior(&b));
    }
}

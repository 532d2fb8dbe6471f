use super::params::MutationParameters;
use super::rng::Rng;
use crate::archive::Archive;
use crate::error::Result;
use crate::program::Program;
use crate::program::ProgramEngine;
use std::sync::Arc;

/// fill every field of a line with a uniform draw over its real range:
/// actual instruction and register counts rather than the wider
/// encoding capacities, so freshly drawn lines are always executable.
fn randomize_line(program: &mut Program, index: usize, rng: &mut Rng) {
    let environment = program.environment().clone();
    let instruction = rng.below(environment.nb_instructions()) as u64;
    let destination = rng.below(environment.nb_registers()) as u64;
    let operands: Vec<(u64, u64)> = (0..environment.max_nb_operands())
        .map(|_| {
            (
                rng.below(environment.nb_sources()) as u64,
                rng.below(environment.largest_address_space()) as u64,
            )
        })
        .collect();
    let line = program.line_mut(index).expect("index is in range");
    line.set_instruction(&environment, instruction, true)
        .expect("count fits the encoding");
    line.set_destination(&environment, destination, true)
        .expect("count fits the encoding");
    for (slot, (source, address)) in operands.into_iter().enumerate() {
        line.set_operand(&environment, slot, source, address, true)
            .expect("count fits the encoding");
    }
}

/// wipe a program and rebuild it from uniform draws: 1 to
/// `max_program_size` random lines plus a redraw of every constant.
pub fn init_random_program(
    program: &mut Program,
    params: &MutationParameters,
    rng: &mut Rng,
) {
    while program.nb_lines() > 0 {
        program.remove_line(0).expect("line 0 exists");
    }
    let nb_lines = 1 + rng.below(params.max_program_size);
    for index in 0..nb_lines {
        program.add_line();
        randomize_line(program, index, rng);
    }
    for index in 0..program.constants().len() {
        let value = rng.range_i32(params.min_const_value, params.max_const_value);
        program.constants_mut().set(index, value);
    }
    program.identify_introns();
}

/// insert a random line at a random position.
pub fn add_random_line(program: &mut Program, rng: &mut Rng) -> bool {
    let position = rng.below(program.nb_lines() + 1);
    program.insert_line(position).expect("position is in range");
    randomize_line(program, position, rng);
    true
}

/// delete a random line, unless the program is already empty.
pub fn delete_random_line(program: &mut Program, rng: &mut Rng) -> bool {
    match program.nb_lines() {
        0 => false,
        n => {
            let position = rng.below(n);
            program.remove_line(position).expect("position is in range");
            true
        }
    }
}

/// redraw one component of a random line: its instruction, its
/// destination, or one operand pair.
pub fn alter_random_line(program: &mut Program, rng: &mut Rng) -> bool {
    if program.nb_lines() == 0 {
        return false;
    }
    let environment = program.environment().clone();
    let index = rng.below(program.nb_lines());
    let component = rng.below(2 + environment.max_nb_operands());
    match component {
        0 => {
            let instruction = rng.below(environment.nb_instructions()) as u64;
            program
                .line_mut(index)
                .expect("index is in range")
                .set_instruction(&environment, instruction, true)
                .expect("count fits the encoding");
        }
        1 => {
            let destination = rng.below(environment.nb_registers()) as u64;
            program
                .line_mut(index)
                .expect("index is in range")
                .set_destination(&environment, destination, true)
                .expect("count fits the encoding");
        }
        slot => {
            let source = rng.below(environment.nb_sources()) as u64;
            let address = rng.below(environment.largest_address_space()) as u64;
            program
                .line_mut(index)
                .expect("index is in range")
                .set_operand(&environment, slot - 2, source, address, true)
                .expect("count fits the encoding");
        }
    }
    true
}

/// swap two random distinct lines.
pub fn swap_random_lines(program: &mut Program, rng: &mut Rng) -> bool {
    if program.nb_lines() < 2 {
        return false;
    }
    let a = rng.below(program.nb_lines());
    let b = {
        // draw within the remaining indices so a != b
        let draw = rng.below(program.nb_lines() - 1);
        match draw >= a {
            true => draw + 1,
            false => draw,
        }
    };
    program.swap_lines(a, b).expect("indices are in range");
    true
}

/// redraw one random constant within the configured range.
pub fn mutate_random_constant(
    program: &mut Program,
    params: &MutationParameters,
    rng: &mut Rng,
) -> bool {
    match program.constants().len() {
        0 => false,
        n => {
            let index = rng.below(n);
            let value = rng.range_i32(params.min_const_value, params.max_const_value);
            program.constants_mut().set(index, value);
            true
        }
    }
}

/// apply the mutation operators, each under its own probability,
/// retrying until at least one of them lands, then refresh the intron
/// flags.
pub fn mutate_program(
    program: &mut Program,
    params: &MutationParameters,
    rng: &mut Rng,
) -> bool {
    let mut mutated = false;
    while !mutated {
        if rng.flip(params.p_delete) {
            mutated |= delete_random_line(program, rng);
        }
        if program.nb_lines() < params.max_program_size && rng.flip(params.p_add) {
            mutated |= add_random_line(program, rng);
        }
        if rng.flip(params.p_mutate) {
            mutated |= alter_random_line(program, rng);
        }
        if rng.flip(params.p_swap) {
            mutated |= swap_random_lines(program, rng);
        }
        if rng.flip(params.p_constant_mutation) {
            mutated |= mutate_random_constant(program, params, rng);
        }
    }
    program.identify_introns();
    true
}

/// mutate a program until its observable behavior is new.
///
/// "new" means (a) some line or constant actually changed, (b) when
/// the parameters demand it, the live-line signature differs from the
/// pre-mutation snapshot, and (c) replaying the program on every
/// archived data snapshot separates it from every archived program by
/// more than the uniqueness tolerance.
pub fn mutate_program_behavior_against_archive(
    program: &mut Program,
    params: &MutationParameters,
    archive: &Archive,
    rng: &mut Rng,
) -> Result<()> {
    let snapshot = params
        .force_program_behavior_change_on_mutation
        .then(|| program.clone());
    let mut engine = ProgramEngine::new(program.environment().clone());
    loop {
        if rng.flip(params.p_new_program) {
            init_random_program(program, params, rng);
        } else {
            loop {
                let before_lines = program.lines().to_vec();
                let before_constants = program.constants().clone();
                mutate_program(program, params, rng);
                let changed = program.lines() != before_lines.as_slice()
                    || *program.constants() != before_constants;
                let fresh = match snapshot.as_ref() {
                    Some(snapshot) => !program.has_identical_behavior(snapshot),
                    None => true,
                };
                if changed && fresh {
                    break;
                }
            }
        }
        let results = archive.replay(&mut engine, &Arc::new(program.clone()))?;
        if archive.are_program_results_unique(&results, crate::UNIQUENESS_TAU) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PrimitiveArray;
    use crate::environment::Environment;
    use crate::instructions::Instruction;
    use crate::instructions::Set;

    fn environment() -> Arc<Environment> {
        let source = PrimitiveArray::new(8);
        let mut set = Set::new();
        set.add(Instruction::add()).add(Instruction::mult_by_const());
        Arc::new(Environment::new(set, &[&source], 4, 2).unwrap())
    }

    #[test]
    fn init_builds_a_nonempty_bounded_program() {
        let params = MutationParameters::default();
        let mut rng = Rng::from_seed(3);
        let mut program = Program::new(environment());
        init_random_program(&mut program, &params, &mut rng);
        assert!(program.nb_lines() >= 1);
        assert!(program.nb_lines() <= params.max_program_size);
    }

    #[test]
    fn init_is_deterministic_under_seed() {
        let params = MutationParameters::default();
        let env = environment();
        let build = |seed| {
            let mut rng = Rng::from_seed(seed);
            let mut program = Program::new(env.clone());
            init_random_program(&mut program, &params, &mut rng);
            program
        };
        let a = build(5);
        let b = build(5);
        assert_eq!(a.lines(), b.lines());
        assert_eq!(a.constants(), b.constants());
    }

    #[test]
    fn mutation_always_lands_something() {
        let params = MutationParameters::default();
        let mut rng = Rng::from_seed(9);
        let mut program = Program::new(environment());
        init_random_program(&mut program, &params, &mut rng);
        for _ in 0..32 {
            assert!(mutate_program(&mut program, &params, &mut rng));
            assert!(program.nb_lines() <= params.max_program_size);
        }
    }

    #[test]
    fn swap_needs_two_lines() {
        let mut rng = Rng::from_seed(1);
        let mut program = Program::new(environment());
        assert!(!swap_random_lines(&mut program, &mut rng));
        program.add_line();
        assert!(!swap_random_lines(&mut program, &mut rng));
        program.add_line();
        assert!(swap_random_lines(&mut program, &mut rng));
    }

    #[test]
    fn behavior_mutation_escapes_an_archived_collision() {
        let mut source = PrimitiveArray::new(8);
        for i in 0..8 {
            source.set(i, (i * i) as f64 + 1.0);
        }
        let mut set = Set::new();
        set.add(Instruction::add()).add(Instruction::mult_by_const());
        let env = Arc::new(Environment::new(set, &[&source], 4, 2).unwrap());
        let params = MutationParameters::default();
        let mut rng = Rng::from_seed(17);
        let mut program = Program::new(env.clone());
        init_random_program(&mut program, &params, &mut rng);
        // archive the program against a live snapshot; its clone must
        // then mutate into something distinguishable on that snapshot.
        let mut engine = ProgramEngine::new(env.clone());
        let arc = Arc::new(program.clone());
        engine.set_program(arc.clone()).unwrap();
        let result = engine.execute(&[&source], true).unwrap();
        let mut archive = Archive::new(8, 1.0, 0);
        archive.add_recording(&arc, &[&source], result, true);
        let mut mutant = program.clone();
        mutate_program_behavior_against_archive(&mut mutant, &params, &archive, &mut rng)
            .unwrap();
        let results = archive
            .replay(&mut engine, &Arc::new(mutant.clone()))
            .unwrap();
        assert!(archive.are_program_results_unique(&results, crate::UNIQUENESS_TAU));
    }
}

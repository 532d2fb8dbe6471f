use super::params::MutationParameters;
use super::program::init_random_program;
use super::program::mutate_program_behavior_against_archive;
use super::rng::Rng;
use crate::archive::Archive;
use crate::error::Error;
use crate::error::Result;
use crate::program::Program;
use crate::tpg::EdgeId;
use crate::tpg::TpgGraph;
use crate::tpg::VertexId;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use std::sync::Arc;

/// build the initial random population: one action vertex per
/// (class, id) pair, `init_nb_roots` teams, and two fresh programs per
/// team wired deterministically onto the actions, plus a few extra
/// edges per team that duplicate existing programs with a bias toward
/// the least-shared ones.
pub fn init_random_tpg(
    graph: &mut TpgGraph,
    params: &MutationParameters,
    rng: &mut Rng,
    action_counts: &[u64],
) -> Result<()> {
    let nb_actions: u64 = action_counts.iter().sum();
    if nb_actions < 2 {
        return Err(Error::InvalidConfiguration(
            "a policy graph over a single action is vacuous".to_string(),
        ));
    }
    if (params.init_nb_roots as u64) < nb_actions {
        return Err(Error::InvalidConfiguration(format!(
            "{} initial roots cannot cover {} actions",
            params.init_nb_roots, nb_actions
        )));
    }
    if params.max_init_outgoing_edges as u64 > nb_actions {
        return Err(Error::InvalidConfiguration(format!(
            "{} initial outgoing edges exceed the {} actions",
            params.max_init_outgoing_edges, nb_actions
        )));
    }
    graph.clear();
    let mut actions = Vec::with_capacity(nb_actions as usize);
    for (class, count) in action_counts.iter().enumerate() {
        for id in 0..*count {
            actions.push(graph.add_new_action(id, class));
        }
    }
    let teams: Vec<VertexId> = (0..params.init_nb_roots)
        .map(|_| graph.add_new_team())
        .collect();
    let mut programs: Vec<Arc<Program>> = Vec::with_capacity(2 * params.init_nb_roots);
    for _ in 0..2 * params.init_nb_roots {
        let mut program = Program::new(graph.environment().clone());
        init_random_program(&mut program, params, rng);
        programs.push(Arc::new(program));
    }
    // the program at index p deterministically targets action p mod n,
    // so team i reaches actions 2i and 2i+1 (mod n): two distinct
    // actions per team, and all n actions covered by the first n teams.
    let n = nb_actions as usize;
    let target_of = |p: usize| p % n;
    for (p, program) in programs.iter().enumerate().take(2 * n) {
        graph.add_new_edge(teams[p / 2], actions[target_of(p)], program.clone())?;
    }
    for (p, program) in programs.iter().enumerate().skip(2 * n) {
        graph.add_new_edge(teams[p / 2], actions[rng.below(n)], program.clone())?;
    }
    // optional extra edges per team, duplicating existing programs
    for team in teams.iter() {
        let nb_additional =
            rng.below(params.max_init_outgoing_edges.saturating_sub(2) + 1);
        for _ in 0..nb_additional {
            let used: Vec<usize> = graph
                .vertex(*team)
                .expect("team was just created")
                .outgoing()
                .iter()
                .map(|e| {
                    Arc::as_ptr(graph.edge(*e).expect("adjacency is consistent").program())
                        as usize
                })
                .collect();
            let mut available: Vec<usize> = (0..programs.len())
                .filter(|p| !used.contains(&(Arc::as_ptr(&programs[*p]) as usize)))
                .collect();
            if available.is_empty() {
                break;
            }
            // draw two candidates and keep the least-referenced one,
            // to spread sharing instead of compounding it
            let first = available.remove(rng.below(available.len()));
            let selected = match available.is_empty() {
                true => first,
                false => {
                    let second = available[rng.below(available.len())];
                    match Arc::strong_count(&programs[second])
                        < Arc::strong_count(&programs[first])
                    {
                        true => second,
                        false => first,
                    }
                }
            };
            graph.add_new_edge(
                *team,
                actions[target_of(selected)],
                programs[selected].clone(),
            )?;
        }
    }
    log::debug!(
        "initialized graph: {} vertices, {} edges, {} roots",
        graph.nb_vertices(),
        graph.nb_edges(),
        graph.nb_root_vertices()
    );
    Ok(())
}

/// remove one random outgoing edge of the team.
fn remove_random_edge(graph: &mut TpgGraph, team: VertexId, rng: &mut Rng) {
    let outgoing = graph
        .vertex(team)
        .expect("team is in the graph")
        .outgoing()
        .to_vec();
    if let Some(edge) = outgoing.get(rng.below(outgoing.len())) {
        graph.remove_edge(*edge);
    }
}

/// duplicate a random pre-existing edge (not touching the team) and
/// re-source the duplicate onto the team.
fn add_random_edge(
    graph: &mut TpgGraph,
    team: VertexId,
    pre_existing_edges: &[EdgeId],
    rng: &mut Rng,
) -> Result<bool> {
    let pickable: Vec<EdgeId> = pre_existing_edges
        .iter()
        .copied()
        .filter(|e| {
            graph
                .edge(*e)
                .is_some_and(|edge| edge.source() != team && edge.target() != team)
        })
        .collect();
    if pickable.is_empty() {
        return Ok(false);
    }
    let picked = pickable[rng.below(pickable.len())];
    let duplicate = graph.clone_edge(picked)?;
    graph.set_edge_source(duplicate, team)?;
    Ok(true)
}

/// retarget an edge onto a random pre-existing vertex, action or team
/// according to the configured bias.
fn mutate_edge_destination(
    graph: &mut TpgGraph,
    edge: EdgeId,
    pre_existing_teams: &[VertexId],
    pre_existing_actions: &[VertexId],
    params: &MutationParameters,
    rng: &mut Rng,
) {
    let target = match rng.flip(params.p_edge_destination_is_action) {
        true => pre_existing_actions[rng.below(pre_existing_actions.len())],
        false => pre_existing_teams[rng.below(pre_existing_teams.len())],
    };
    graph.set_edge_destination(edge, target);
}

/// queue a copy of the edge's program for behavioral mutation and
/// possibly retarget the edge.
///
/// the copy is not bound to the edge yet: behavioral mutation runs
/// over all new programs at the end of populate, possibly in parallel,
/// and only then are the copies wrapped and bound.
fn mutate_outgoing_edge(
    graph: &mut TpgGraph,
    edge: EdgeId,
    pre_existing_teams: &[VertexId],
    pre_existing_actions: &[VertexId],
    new_programs: &mut Vec<(EdgeId, Program)>,
    params: &MutationParameters,
    rng: &mut Rng,
) {
    let program = graph
        .edge(edge)
        .expect("edge is in the graph")
        .program()
        .clone();
    new_programs.push((edge, (*program).clone()));
    if rng.flip(params.p_edge_destination_change) {
        mutate_edge_destination(
            graph,
            edge,
            pre_existing_teams,
            pre_existing_actions,
            params,
            rng,
        );
    }
}

/// structurally mutate one team: geometric remove and add loops over
/// its outgoing edges, then per-edge program mutation repeated until
/// at least one edge actually mutated.
pub fn mutate_tpg_team(
    graph: &mut TpgGraph,
    team: VertexId,
    pre_existing_teams: &[VertexId],
    pre_existing_actions: &[VertexId],
    pre_existing_edges: &[EdgeId],
    new_programs: &mut Vec<(EdgeId, Program)>,
    params: &MutationParameters,
    rng: &mut Rng,
) -> Result<()> {
    // remove: keep at least two edges
    let mut proba = 1.0;
    while graph.vertex(team).expect("team is in the graph").outgoing().len() > 2
        && rng.uniform() < proba
    {
        remove_random_edge(graph, team, rng);
        proba *= params.p_edge_deletion;
    }
    // add: duplicate pre-existing edges up to the cap
    let mut proba = 1.0;
    while graph.vertex(team).expect("team is in the graph").outgoing().len()
        < params.max_outgoing_edges
        && rng.uniform() < proba
    {
        if !add_random_edge(graph, team, pre_existing_edges, rng)? {
            break;
        }
        proba *= params.p_edge_addition;
    }
    // mutate: loop until the team is structurally different
    let mut mutated = false;
    while !mutated {
        let outgoing = graph
            .vertex(team)
            .expect("team is in the graph")
            .outgoing()
            .to_vec();
        for edge in outgoing {
            if rng.flip(params.p_program_mutation) {
                mutate_outgoing_edge(
                    graph,
                    edge,
                    pre_existing_teams,
                    pre_existing_actions,
                    new_programs,
                    params,
                    rng,
                );
                mutated = true;
            }
        }
    }
    Ok(())
}

/// run the behavioral-uniqueness mutation over every queued program
/// and bind the results to their edges.
///
/// seeds are dealt from the caller's stream up front, in queue order;
/// each job then derives everything from its own seed, so the outcome
/// is independent of worker count. the archive is only read.
pub fn mutate_new_program_behaviors(
    graph: &mut TpgGraph,
    new_programs: Vec<(EdgeId, Program)>,
    rng: &mut Rng,
    params: &MutationParameters,
    archive: &Archive,
    pool: Option<&rayon::ThreadPool>,
) -> Result<()> {
    let jobs: Vec<(EdgeId, Program, u64)> = new_programs
        .into_iter()
        .map(|(edge, program)| (edge, program, rng.next_seed()))
        .collect();
    let mutate = |(edge, mut program, seed): (EdgeId, Program, u64)| -> Result<(EdgeId, Program)> {
        let mut private = Rng::from_seed(seed);
        mutate_program_behavior_against_archive(&mut program, params, archive, &mut private)?;
        Ok((edge, program))
    };
    let mutated: Vec<(EdgeId, Program)> = match pool {
        Some(pool) => pool.install(|| {
            jobs.into_par_iter()
                .map(mutate)
                .collect::<Result<Vec<_>>>()
        })?,
        None => jobs
            .into_iter()
            .map(mutate)
            .collect::<Result<Vec<_>>>()?,
    };
    for (edge, program) in mutated {
        graph.set_edge_program(edge, Arc::new(program));
    }
    Ok(())
}

/// refill the root population to `nb_roots` by cloning random root
/// teams and mutating the clones, then renew every queued program
/// behavior against the archive.
pub fn populate_tpg(
    graph: &mut TpgGraph,
    archive: &Archive,
    params: &MutationParameters,
    rng: &mut Rng,
    action_counts: &[u64],
    pool: Option<&rayon::ThreadPool>,
) -> Result<()> {
    if graph.root_teams().is_empty() {
        log::warn!("no root teams to populate from, reinitializing the graph");
        init_random_tpg(graph, params, rng, action_counts)?;
    }
    let root_teams = graph.root_teams();
    let pre_existing_teams: Vec<VertexId> = graph
        .vertices()
        .filter(|(_, v)| v.is_team())
        .map(|(id, _)| id)
        .collect();
    let pre_existing_actions: Vec<VertexId> = graph
        .vertices()
        .filter(|(_, v)| v.is_action())
        .map(|(id, _)| id)
        .collect();
    let pre_existing_edges: Vec<EdgeId> = graph.edges().map(|(id, _)| id).collect();
    let mut new_programs: Vec<(EdgeId, Program)> = Vec::new();
    let mut current = graph.nb_root_vertices();
    while params.nb_roots > current {
        let cloned = root_teams[rng.below(root_teams.len())];
        let clone = graph.clone_vertex(cloned)?;
        mutate_tpg_team(
            graph,
            clone,
            &pre_existing_teams,
            &pre_existing_actions,
            &pre_existing_edges,
            &mut new_programs,
            params,
            rng,
        )?;
        // mutation can subsume pre-existing roots, so re-count
        current = graph.nb_root_vertices();
    }
    log::debug!("populated to {} roots, {} new programs", current, new_programs.len());
    mutate_new_program_behaviors(graph, new_programs, rng, params, archive, pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PrimitiveArray;
    use crate::environment::Environment;
    use crate::instructions::Instruction;
    use crate::instructions::Set;
    use crate::tpg::Vertex;

    fn graph() -> TpgGraph {
        let mut source = PrimitiveArray::new(8);
        for i in 0..8 {
            source.set(i, i as f64 + 1.0);
        }
        let mut set = Set::new();
        set.add(Instruction::add()).add(Instruction::sub());
        let environment = Arc::new(Environment::new(set, &[&source], 4, 1).unwrap());
        TpgGraph::new(environment)
    }

    fn small_params() -> MutationParameters {
        MutationParameters {
            nb_roots: 8,
            init_nb_roots: 5,
            max_init_outgoing_edges: 3,
            max_outgoing_edges: 5,
            max_program_size: 8,
            ..MutationParameters::default()
        }
    }

    #[test]
    fn init_rejects_degenerate_action_sets() {
        let mut g = graph();
        let params = small_params();
        let mut rng = Rng::from_seed(0);
        assert!(init_random_tpg(&mut g, &params, &mut rng, &[1]).is_err());
        assert!(init_random_tpg(&mut g, &params, &mut rng, &[9]).is_err());
        let wide = MutationParameters {
            max_init_outgoing_edges: 9,
            ..small_params()
        };
        assert!(init_random_tpg(&mut g, &wide, &mut rng, &[3]).is_err());
    }

    #[test]
    fn init_wires_every_team_onto_two_distinct_actions() {
        let mut g = graph();
        let params = small_params();
        let mut rng = Rng::from_seed(4);
        init_random_tpg(&mut g, &params, &mut rng, &[3]).unwrap();
        // every team is a root; every action is covered
        assert_eq!(g.nb_root_vertices(), 5);
        let teams: Vec<VertexId> = g
            .vertices()
            .filter(|(_, v)| v.is_team())
            .map(|(id, _)| id)
            .collect();
        for (index, team) in teams.iter().enumerate() {
            let outgoing = g.vertex(*team).unwrap().outgoing();
            assert!(outgoing.len() >= 2, "team {} has {} edges", team, outgoing.len());
            assert!(outgoing.len() <= params.max_init_outgoing_edges);
            // the deterministically wired teams get two distinct actions
            if index < 3 {
                assert_ne!(
                    g.edge(outgoing[0]).unwrap().target(),
                    g.edge(outgoing[1]).unwrap().target(),
                    "the two seed edges of {} share a target",
                    team
                );
            }
        }
    }

    #[test]
    fn init_covers_every_class_and_id() {
        let mut g = graph();
        let params = small_params();
        let mut rng = Rng::from_seed(4);
        init_random_tpg(&mut g, &params, &mut rng, &[2, 2]).unwrap();
        let mut seen = Vec::new();
        for (_, vertex) in g.vertices() {
            if let Some(decision) = vertex.decision() {
                seen.push(decision);
            }
        }
        seen.sort();
        assert_eq!(seen, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn team_mutation_always_changes_structure() {
        let mut g = graph();
        let params = small_params();
        let mut rng = Rng::from_seed(21);
        init_random_tpg(&mut g, &params, &mut rng, &[4]).unwrap();
        let pre_teams: Vec<VertexId> =
            g.vertices().filter(|(_, v)| v.is_team()).map(|(i, _)| i).collect();
        let pre_actions: Vec<VertexId> =
            g.vertices().filter(|(_, v)| v.is_action()).map(|(i, _)| i).collect();
        let pre_edges: Vec<EdgeId> = g.edges().map(|(i, _)| i).collect();
        for _ in 0..8 {
            let team = g.clone_vertex(pre_teams[0]).unwrap();
            let before: Vec<(EdgeId, usize)> = g
                .vertex(team)
                .unwrap()
                .outgoing()
                .iter()
                .map(|e| (*e, Arc::as_ptr(g.edge(*e).unwrap().program()) as usize))
                .collect();
            let mut new_programs = Vec::new();
            mutate_tpg_team(
                &mut g,
                team,
                &pre_teams,
                &pre_actions,
                &pre_edges,
                &mut new_programs,
                &params,
                &mut rng,
            )
            .unwrap();
            let after: Vec<(EdgeId, usize)> = g
                .vertex(team)
                .unwrap()
                .outgoing()
                .iter()
                .map(|e| (*e, Arc::as_ptr(g.edge(*e).unwrap().program()) as usize))
                .collect();
            // either the edge set changed or some program will change
            // (a queued copy means the edge rebinds after behavioral
            // mutation)
            assert!(before != after || !new_programs.is_empty());
        }
    }

    #[test]
    fn populate_refills_to_the_target_root_count() {
        let mut g = graph();
        let params = small_params();
        let mut rng = Rng::from_seed(33);
        init_random_tpg(&mut g, &params, &mut rng, &[3]).unwrap();
        let archive = Archive::new(8, 1.0, 0);
        populate_tpg(&mut g, &archive, &params, &mut rng, &[3], None).unwrap();
        assert!(g.nb_root_vertices() >= params.nb_roots);
        for (_, vertex) in g.vertices() {
            if let Vertex::Team { outgoing, .. } = vertex {
                assert!(outgoing.len() >= 2);
            }
        }
    }

    #[test]
    fn populate_is_deterministic_under_seed_and_threads() {
        let shape = |g: &TpgGraph| {
            (
                g.nb_vertices(),
                g.nb_edges(),
                g.nb_root_vertices(),
                g.edges()
                    .map(|(_, e)| (e.source().0, e.target().0, e.program().nb_lines()))
                    .collect::<Vec<_>>(),
            )
        };
        let run = |pool: Option<&rayon::ThreadPool>| {
            let mut g = graph();
            let params = small_params();
            let mut rng = Rng::from_seed(77);
            init_random_tpg(&mut g, &params, &mut rng, &[3]).unwrap();
            let archive = Archive::new(8, 1.0, 0);
            populate_tpg(&mut g, &archive, &params, &mut rng, &[3], pool).unwrap();
            shape(&g)
        };
        let sequential = run(None);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let parallel = run(Some(&pool));
        assert_eq!(sequential.0, parallel.0);
        assert_eq!(sequential.1, parallel.1);
        assert_eq!(sequential.2, parallel.2);
        assert_eq!(sequential.3, parallel.3);
    }
}

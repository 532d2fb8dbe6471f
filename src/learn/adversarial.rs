use super::agent::LearningAgent;
use super::environment::LearningEnvironment;
use super::environment::LearningMode;
use super::eval_seed;
use super::job::Job;
use super::parallel;
use super::params::LearningParameters;
use super::result::AdversarialEvaluationResult;
use super::result::EvaluationResult;
use crate::error::Error;
use crate::error::Result;
use crate::instructions::Set;
use crate::mutator::team::populate_tpg;
use crate::tpg::TpgEngine;
use crate::tpg::TpgGraph;
use crate::tpg::VertexId;
use crate::Score;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// a learning environment where several policies sit at one table.
///
/// `do_actions` applies the current seat's decision and rotates
/// perspective internally; `scores` settles one score per seat once
/// the episode ends.
pub trait AdversarialLearningEnvironment: LearningEnvironment {
    /// per-seat scores of the current episode, in seating order.
    fn scores(&self) -> Vec<Score>;
}

/// the generation loop against self-play opposition.
///
/// every root is evaluated seated among champions of the previous
/// generation, once per possible seat, so scores stay comparable even
/// when the table is asymmetric. champions are re-elected after each
/// evaluation sweep from the surviving top of the population.
pub struct AdversarialLearningAgent<E: AdversarialLearningEnvironment> {
    agent: LearningAgent<E>,
    agents_per_evaluation: usize,
    champions: Vec<VertexId>,
}

impl<E: AdversarialLearningEnvironment> AdversarialLearningAgent<E> {
    pub fn new(
        env: E,
        instructions: Set,
        params: LearningParameters,
        agents_per_evaluation: usize,
    ) -> Result<Self> {
        if agents_per_evaluation < 2 {
            return Err(Error::InvalidConfiguration(
                "an adversarial table seats at least two agents".to_string(),
            ));
        }
        Ok(Self {
            agent: LearningAgent::new(env, instructions, params)?,
            agents_per_evaluation,
            champions: Vec::new(),
        })
    }

    pub fn base(&self) -> &LearningAgent<E> {
        &self.agent
    }

    pub fn base_mut(&mut self) -> &mut LearningAgent<E> {
        &mut self.agent
    }

    pub fn champions(&self) -> &[VertexId] {
        &self.champions
    }

    pub fn init(&mut self, seed: u64) -> Result<()> {
        self.champions.clear();
        self.agent.init(seed)
    }

    /// one job per (root, champions team, seat): the root under study
    /// takes every seat of every sampled opposition in turn.
    pub fn make_jobs(&mut self) -> Vec<Job> {
        let roots = self.agent.graph.root_vertices();
        if self.champions.is_empty() {
            // first sweep: champion the leading roots
            let bound = (roots.len() as f64
                * (1.0 - self.agent.params.ratio_deleted_roots))
                .floor() as usize;
            self.champions = roots.iter().copied().take(bound + 1).collect();
        }
        let params = &self.agent.params;
        let nb_champion_teams = (params.nb_iterations_per_policy_evaluation as f64
            / (self.agents_per_evaluation as u64 * params.nb_iterations_per_job) as f64)
            .ceil() as usize;
        let opponents_per_team = self.agents_per_evaluation - 1;
        let mut teams: Vec<Vec<VertexId>> = Vec::with_capacity(nb_champion_teams);
        for _ in 0..nb_champion_teams {
            teams.push(
                (0..opponents_per_team)
                    .map(|_| self.champions[self.agent.rng.below(self.champions.len())])
                    .collect(),
            );
        }
        let mut jobs = Vec::new();
        let mut idx = 0u64;
        for root in roots {
            for team in teams.iter() {
                for seat in 0..self.agents_per_evaluation {
                    let mut seated = Vec::with_capacity(self.agents_per_evaluation);
                    seated.extend_from_slice(&team[..seat.min(team.len())]);
                    seated.push(root);
                    seated.extend_from_slice(&team[seat.min(team.len())..]);
                    let job = Job::adversarial(
                        seated,
                        self.agent.rng.next_seed(),
                        idx,
                        Some(seat),
                    );
                    jobs.push(job);
                    idx += 1;
                }
            }
        }
        jobs
    }

    /// play the seated roots against each other for the job's
    /// iteration budget, accumulating per-seat scores.
    fn evaluate_job(
        engine: &mut TpgEngine,
        graph: &TpgGraph,
        job: &Job,
        generation: u64,
        mode: LearningMode,
        env: &mut E,
        params: &LearningParameters,
        agents_per_evaluation: usize,
    ) -> Result<AdversarialEvaluationResult> {
        let mut results = AdversarialEvaluationResult::zeroed(agents_per_evaluation);
        let init_actions = env.init_actions();
        for iteration in 0..params.nb_iterations_per_job {
            env.reset(eval_seed(generation, iteration), mode, iteration, generation);
            let mut turns = 0u64;
            'episode: while !env.is_terminal() && turns < params.max_nb_actions_per_eval {
                for root in job.roots() {
                    if env.is_terminal() {
                        break 'episode;
                    }
                    let (_, actions) = engine.execute_from_root(
                        graph,
                        *root,
                        &env.data_sources(),
                        &init_actions,
                        params.nb_edges_activable,
                    )?;
                    env.do_actions(&actions);
                }
                turns += 1;
            }
            results.combine(&AdversarialEvaluationResult::from_scores(env.scores(), 1));
        }
        Ok(results)
    }

    /// evaluate every root across its seats and compile one score per
    /// root, weighted by how many iterations backed each seat. refills
    /// the champions list from the top of the compiled standings.
    pub fn evaluate_all_roots(
        &mut self,
        generation: u64,
        mode: LearningMode,
    ) -> Result<Vec<(EvaluationResult, VertexId)>> {
        if self.agent.pool.is_some() && !self.agent.env.is_copyable() {
            return Err(Error::ConcurrencyViolation(
                "adversarial evaluation over several threads needs a copyable environment"
                    .to_string(),
            ));
        }
        let jobs = self.make_jobs();
        let agents_per_evaluation = self.agents_per_evaluation;
        let LearningAgent { env, graph, params, pool, archive, .. } = &mut self.agent;
        let graph: &TpgGraph = graph;
        let params: &LearningParameters = params;
        let outcomes = parallel::evaluate_jobs(
            graph,
            env,
            pool.as_ref(),
            jobs,
            generation,
            mode,
            params,
            |engine, graph, job, generation, mode, env| {
                Self::evaluate_job(
                    engine,
                    graph,
                    job,
                    generation,
                    mode,
                    env,
                    params,
                    agents_per_evaluation,
                )
            },
        )?;
        // compile per-root scores across jobs and seats
        let mut per_root: BTreeMap<VertexId, EvaluationResult> = BTreeMap::new();
        let mut archives = Vec::new();
        for (_, outcome) in outcomes {
            if let Some(job_archive) = outcome.archive {
                archives.push(job_archive);
            }
            let job = &outcome.job;
            let start = job.focus().unwrap_or(0);
            for seat in start..job.size() {
                let root = job.roots()[seat];
                let seat_result = EvaluationResult::new(
                    outcome.result.score_of(seat),
                    outcome.result.nb_evaluation(),
                );
                per_root
                    .entry(root)
                    .and_modify(|r| r.combine(&seat_result))
                    .or_insert(seat_result);
                if job.focus().is_some() {
                    break;
                }
            }
        }
        if mode == LearningMode::Training {
            archive.merge(archives);
        }
        // standings in root order, then by ascending score
        let mut results: Vec<(EvaluationResult, VertexId)> = self
            .agent
            .graph
            .root_vertices()
            .into_iter()
            .filter_map(|root| per_root.get(&root).map(|r| (r.clone(), root)))
            .collect();
        results.sort_by(|(a, _), (b, _)| a.result().total_cmp(&b.result()));
        let nb_champions = ((1.0 - self.agent.params.ratio_deleted_roots)
            * results.len() as f64)
            .floor() as usize;
        self.champions = results
            .iter()
            .rev()
            .take(nb_champions)
            .map(|(_, root)| *root)
            .collect();
        Ok(results)
    }

    pub fn train_one_generation(&mut self, generation: u64) -> Result<()> {
        let mut results = self.evaluate_all_roots(generation, LearningMode::Training)?;
        self.agent.update_evaluation_records(&results);
        self.agent.decimate_worst_roots(&mut results);
        self.champions.retain(|root| self.agent.graph.vertex(*root).is_some());
        let actions = self.agent.env.nb_actions();
        populate_tpg(
            &mut self.agent.graph,
            &self.agent.archive,
            &self.agent.params.mutation,
            &mut self.agent.rng,
            &actions,
            self.agent.pool.as_ref(),
        )?;
        self.agent.generation += 1;
        log::info!(
            "generation {:<4} roots {:<4} best {:>8.4}",
            generation,
            self.agent.graph.nb_root_vertices(),
            self.agent.best.as_ref().map(|(_, r)| r.result()).unwrap_or(f64::NAN),
        );
        Ok(())
    }

    pub fn train(&mut self, stop: &AtomicBool, print_progress: bool) -> Result<u64> {
        let progress =
            print_progress.then(|| crate::progress(self.agent.params.nb_generations));
        let mut done = 0;
        for generation in 0..self.agent.params.nb_generations {
            if stop.load(Ordering::Relaxed) {
                log::warn!("training stopped at generation {}", generation);
                break;
            }
            self.train_one_generation(generation)?;
            done += 1;
            if let Some(progress) = &progress {
                progress.inc(1);
            }
        }
        if let Some(progress) = progress {
            progress.finish();
        }
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::fixtures::StickGame;
    use crate::mutator::MutationParameters;

    fn params(nb_threads: usize) -> LearningParameters {
        LearningParameters {
            nb_threads,
            archive_size: 16,
            archiving_probability: 0.1,
            nb_iterations_per_policy_evaluation: 4,
            nb_iterations_per_job: 2,
            max_nb_actions_per_eval: 30,
            nb_generations: 20,
            mutation: MutationParameters {
                nb_roots: 10,
                init_nb_roots: 5,
                max_init_outgoing_edges: 3,
                max_outgoing_edges: 4,
                max_program_size: 8,
                ..MutationParameters::default()
            },
            ..LearningParameters::default()
        }
    }

    fn agent(nb_threads: usize) -> AdversarialLearningAgent<StickGame> {
        AdversarialLearningAgent::new(
            StickGame::new(2),
            Set::arithmetic(),
            params(nb_threads),
            2,
        )
        .unwrap()
    }

    #[test]
    fn tables_need_at_least_two_seats() {
        assert!(AdversarialLearningAgent::new(
            StickGame::new(1),
            Set::arithmetic(),
            params(1),
            1,
        )
        .is_err());
    }

    #[test]
    fn jobs_seat_every_root_at_every_position() {
        // nb_iterations_per_policy_evaluation = 20, agents = 5,
        // nb_iterations_per_job = 2: ceil(20 / 10) = 2 champion
        // tables, 5 seats each: 10 jobs per root.
        let mut custom = params(1);
        custom.nb_iterations_per_policy_evaluation = 20;
        custom.nb_iterations_per_job = 2;
        let mut agent = AdversarialLearningAgent::new(
            StickGame::new(5),
            Set::arithmetic(),
            custom,
            5,
        )
        .unwrap();
        agent.init(3).unwrap();
        let nb_roots = agent.base().tpg().nb_root_vertices();
        let jobs = agent.make_jobs();
        assert_eq!(jobs.len(), nb_roots * 5 * 2);
        // every root totals at least 20 iterations across its jobs
        for root in agent.base().tpg().root_vertices() {
            let appearances = jobs
                .iter()
                .filter(|job| job.roots()[job.focus().unwrap()] == root)
                .count() as u64;
            assert!(appearances * 2 >= 20);
        }
        // seating: each job places the studied root at its seat
        for job in jobs.iter() {
            assert_eq!(job.size(), 5);
            assert!(job.focus().unwrap() < 5);
        }
    }

    #[test]
    fn every_root_gets_a_compiled_score() {
        let mut agent = agent(1);
        agent.init(11).unwrap();
        let results = agent
            .evaluate_all_roots(0, LearningMode::Training)
            .unwrap();
        assert_eq!(results.len(), agent.base().tpg().nb_root_vertices());
        for pair in results.windows(2) {
            assert!(pair[0].0.result() <= pair[1].0.result());
        }
        assert!(!agent.champions().is_empty());
    }

    #[test]
    fn a_generation_runs_end_to_end() {
        let mut agent = agent(1);
        agent.init(11).unwrap();
        agent.train_one_generation(0).unwrap();
        assert!(agent.base().tpg().nb_root_vertices() >= 10);
    }

    #[test]
    fn stick_game_training_is_identical_across_thread_counts() {
        let fingerprint = |threads: usize| {
            let mut agent = agent(threads);
            agent.init(2024).unwrap();
            let stop = AtomicBool::new(false);
            agent.train(&stop, false).unwrap();
            (
                agent.base().tpg().nb_vertices(),
                agent.base().tpg().nb_root_vertices(),
                agent.base().tpg().nb_edges(),
                agent.base().archive().nb_recordings(),
                agent.base_mut().next_rng_output(),
            )
        };
        assert_eq!(fingerprint(1), fingerprint(4));
    }
}

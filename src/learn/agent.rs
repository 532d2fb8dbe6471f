use super::environment::LearningEnvironment;
use super::environment::LearningMode;
use super::eval_seed;
use super::job::Job;
use super::parallel;
use super::params::LearningParameters;
use super::result::EvaluationResult;
use crate::archive::Archive;
use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::instructions::Set;
use crate::mutator::team::init_random_tpg;
use crate::mutator::team::populate_tpg;
use crate::mutator::Rng;
use crate::tpg::TpgEngine;
use crate::tpg::TpgGraph;
use crate::tpg::VertexId;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// the generation loop: evaluate every root, decimate the worst,
/// refill by mutation, repeat.
///
/// the agent owns everything the loop touches, the graph, the
/// archive, the RNG, the worker pool, and mutates all of it only on
/// the calling thread; workers see the graph read-only and their own
/// environment clones. scores are cached per root so a root that has
/// exhausted its evaluation budget keeps its recorded score instead
/// of burning iterations again.
pub struct LearningAgent<E: LearningEnvironment> {
    pub(crate) env: E,
    pub(crate) environment: Arc<Environment>,
    pub(crate) graph: TpgGraph,
    pub(crate) archive: Archive,
    pub(crate) params: LearningParameters,
    pub(crate) rng: Rng,
    pub(crate) pool: Option<rayon::ThreadPool>,
    pub(crate) results_per_root: BTreeMap<VertexId, EvaluationResult>,
    pub(crate) best: Option<(VertexId, EvaluationResult)>,
    pub(crate) generation: u64,
}

impl<E: LearningEnvironment> LearningAgent<E> {
    pub fn new(env: E, instructions: Set, params: LearningParameters) -> Result<Self> {
        params.validate()?;
        let environment = {
            let sources = env.data_sources();
            Arc::new(Environment::new(
                instructions,
                &sources,
                params.nb_registers,
                params.nb_constants,
            )?)
        };
        let graph = TpgGraph::new(environment.clone());
        let archive = Archive::new(params.archive_size, params.archiving_probability, 0);
        let pool = match params.nb_threads > 1 {
            false => None,
            true => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(params.nb_threads)
                    .build()
                    .map_err(|e| {
                        Error::InvalidConfiguration(format!("cannot build worker pool: {}", e))
                    })?,
            ),
        };
        Ok(Self {
            env,
            environment,
            graph,
            archive,
            params,
            rng: Rng::default(),
            pool,
            results_per_root: BTreeMap::new(),
            best: None,
            generation: 0,
        })
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn tpg(&self) -> &TpgGraph {
        &self.graph
    }

    pub fn tpg_mut(&mut self) -> &mut TpgGraph {
        &mut self.graph
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn params(&self) -> &LearningParameters {
        &self.params
    }

    pub fn learning_environment(&self) -> &E {
        &self.env
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// a peek at the RNG state: the next seed it would deal. consumes
    /// one draw, so only meaningful for determinism checks.
    pub fn next_rng_output(&mut self) -> u64 {
        self.rng.next_seed()
    }

    /// seed the RNG and build the initial random population.
    pub fn init(&mut self, seed: u64) -> Result<()> {
        self.rng.set_seed(seed);
        self.archive.clear();
        self.results_per_root.clear();
        self.best = None;
        self.generation = 0;
        let actions = self.env.nb_actions();
        init_random_tpg(&mut self.graph, &self.params.mutation, &mut self.rng, &actions)
    }

    /// one evaluation job per root, in root order, each with its own
    /// archive seed dealt from the agent RNG.
    pub fn make_jobs(&mut self) -> Vec<Job> {
        let roots = self.graph.root_vertices();
        roots
            .into_iter()
            .enumerate()
            .map(|(idx, root)| Job::new(root, self.rng.next_seed(), idx as u64))
            .collect()
    }

    /// evaluate one root for a full policy-evaluation budget.
    ///
    /// in training mode a root whose cumulative evaluations already
    /// meet the cap returns its cached score untouched; otherwise the
    /// fresh score folds into the cached one as a weighted mean.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn evaluate_job(
        engine: &mut TpgEngine,
        graph: &TpgGraph,
        job: &Job,
        generation: u64,
        mode: LearningMode,
        env: &mut E,
        cache: &BTreeMap<VertexId, EvaluationResult>,
        params: &LearningParameters,
    ) -> Result<EvaluationResult> {
        let root = job.root();
        let previous = match mode {
            LearningMode::Training => cache.get(&root),
            _ => None,
        };
        if let Some(previous) = previous {
            if previous.nb_evaluation() >= params.max_nb_evaluation_per_policy {
                return Ok(previous.clone());
            }
        }
        let init_actions = env.init_actions();
        let mut total = 0.0;
        for iteration in 0..params.nb_iterations_per_policy_evaluation {
            env.reset(eval_seed(generation, iteration), mode, iteration, generation);
            let mut steps = 0u64;
            while !env.is_terminal() && steps < params.max_nb_actions_per_eval {
                let (_, actions) = engine.execute_from_root(
                    graph,
                    root,
                    &env.data_sources(),
                    &init_actions,
                    params.nb_edges_activable,
                )?;
                env.do_actions(&actions);
                steps += 1;
            }
            total += env.score();
        }
        let mut result = EvaluationResult::new(
            total / params.nb_iterations_per_policy_evaluation as f64,
            params.nb_iterations_per_policy_evaluation,
        );
        if let Some(previous) = previous {
            result.combine(previous);
        }
        Ok(result)
    }

    /// evaluate every root and return (result, root) pairs in
    /// ascending score order. in training mode the per-job archives
    /// merge into the agent archive.
    pub fn evaluate_all_roots(
        &mut self,
        generation: u64,
        mode: LearningMode,
    ) -> Result<Vec<(EvaluationResult, VertexId)>> {
        let jobs = self.make_jobs();
        let degraded = self.pool.is_some() && !self.env.is_copyable();
        if degraded {
            log::warn!("environment is not copyable, evaluating sequentially");
        }
        let Self { env, graph, params, results_per_root, pool, archive, .. } = self;
        let graph: &TpgGraph = graph;
        let params: &LearningParameters = params;
        let cache: &BTreeMap<VertexId, EvaluationResult> = results_per_root;
        let pool = match degraded {
            true => None,
            false => pool.as_ref(),
        };
        let outcomes = parallel::evaluate_jobs(
            graph,
            env,
            pool,
            jobs,
            generation,
            mode,
            params,
            |engine, graph, job, generation, mode, env| {
                Self::evaluate_job(engine, graph, job, generation, mode, env, cache, params)
            },
        )?;
        let mut archives = Vec::new();
        let mut results = Vec::with_capacity(outcomes.len());
        for (_, outcome) in outcomes {
            if let Some(job_archive) = outcome.archive {
                archives.push(job_archive);
            }
            results.push((outcome.result, outcome.job.root()));
        }
        if mode == LearningMode::Training {
            archive.merge(archives);
        }
        results.sort_by(|(a, _), (b, _)| a.result().total_cmp(&b.result()));
        Ok(results)
    }

    /// evaluate a single root outside the generation loop.
    pub fn evaluate_one_root(
        &mut self,
        root: VertexId,
        mode: LearningMode,
    ) -> Result<EvaluationResult> {
        let generation = self.generation;
        let job = Job::new(root, 0, 0);
        let mut engine = TpgEngine::new(self.environment.clone(), None);
        let Self { env, graph, params, results_per_root, .. } = self;
        Self::evaluate_job(
            &mut engine,
            graph,
            &job,
            generation,
            mode,
            env,
            results_per_root,
            params,
        )
    }

    /// refresh the per-root score cache and the best-root record.
    pub fn update_evaluation_records(&mut self, results: &[(EvaluationResult, VertexId)]) {
        for (result, root) in results {
            self.results_per_root.insert(*root, result.clone());
            let dethroned = match &self.best {
                None => true,
                Some((incumbent, _)) if self.graph.vertex(*incumbent).is_none() => true,
                Some((_, record)) => result.result() > record.result(),
            };
            if dethroned {
                self.best = Some((*root, result.clone()));
            }
        }
    }

    /// remove the worst-scoring root teams, leaving action roots in
    /// place, until the configured ratio of roots is gone.
    pub fn decimate_worst_roots(&mut self, results: &mut Vec<(EvaluationResult, VertexId)>) {
        let total = self.graph.nb_root_vertices();
        let nb_deletion = (self.params.ratio_deleted_roots * total as f64).floor() as usize;
        let mut deleted = 0;
        let mut index = 0;
        while deleted < nb_deletion && index < results.len() {
            let root = results[index].1;
            let is_team = self
                .graph
                .vertex(root)
                .map(|v| v.is_team())
                .unwrap_or(false);
            match is_team {
                true => {
                    self.graph.remove_vertex(root);
                    self.results_per_root.remove(&root);
                    results.remove(index);
                    deleted += 1;
                }
                false => index += 1,
            }
        }
        log::debug!("decimated {} of {} roots", deleted, total);
    }

    /// one full generation: evaluate, record, decimate, repopulate.
    pub fn train_one_generation(&mut self, generation: u64) -> Result<()> {
        let mut results = self.evaluate_all_roots(generation, LearningMode::Training)?;
        self.update_evaluation_records(&results);
        self.decimate_worst_roots(&mut results);
        let actions = self.env.nb_actions();
        populate_tpg(
            &mut self.graph,
            &self.archive,
            &self.params.mutation,
            &mut self.rng,
            &actions,
            self.pool.as_ref(),
        )?;
        self.generation += 1;
        log::info!(
            "generation {:<4} roots {:<4} best {:>8.4}",
            generation,
            self.graph.nb_root_vertices(),
            self.best.as_ref().map(|(_, r)| r.result()).unwrap_or(f64::NAN),
        );
        Ok(())
    }

    /// run generations until the budget is spent or the caller's stop
    /// flag goes up. returns how many generations ran.
    pub fn train(&mut self, stop: &AtomicBool, print_progress: bool) -> Result<u64> {
        let progress = print_progress.then(|| crate::progress(self.params.nb_generations));
        let mut done = 0;
        for generation in 0..self.params.nb_generations {
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

    pub fn best_root(&self) -> Option<(VertexId, &EvaluationResult)> {
        self.best.as_ref().map(|(root, result)| (*root, result))
    }

    /// prune the graph down to the best root and what it reaches.
    pub fn keep_best_policy(&mut self) -> Result<()> {
        let Some(best) = self.best.as_ref().map(|(root, _)| *root) else {
            return Err(Error::InvalidConfiguration(
                "no best root recorded yet".to_string(),
            ));
        };
        loop {
            let removable: Vec<VertexId> = self
                .graph
                .root_teams()
                .into_iter()
                .filter(|root| *root != best)
                .collect();
            if removable.is_empty() {
                break;
            }
            for root in removable {
                self.graph.remove_vertex(root);
            }
        }
        Ok(())
    }
}

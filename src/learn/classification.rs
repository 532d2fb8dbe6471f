use super::agent::LearningAgent;
use super::environment::LearningEnvironment;
use super::environment::LearningMode;
use super::eval_seed;
use super::job::Job;
use super::parallel;
use super::params::LearningParameters;
use super::result::ClassificationEvaluationResult;
use super::result::EvaluationResult;
use crate::error::Result;
use crate::instructions::Set;
use crate::mutator::team::populate_tpg;
use crate::tpg::TpgEngine;
use crate::tpg::TpgGraph;
use crate::tpg::VertexId;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// a learning environment that grades decisions against labeled data.
///
/// the environment accumulates a confusion matrix per episode: row =
/// true class of the sample shown, column = class the policy chose.
pub trait ClassificationLearningEnvironment: LearningEnvironment {
    /// the confusion matrix accumulated since the last reset.
    fn classification_table(&self) -> &Vec<Vec<u64>>;

    /// the class of the sample currently shown.
    fn current_class(&self) -> usize;
}

/// per-class (F1, sample count) pairs from a confusion matrix.
pub fn per_class_f1(table: &[Vec<u64>]) -> Vec<(f64, u64)> {
    (0..table.len())
        .map(|class| {
            let true_positive = table[class][class];
            let false_negative: u64 = table[class].iter().sum::<u64>() - true_positive;
            let false_positive: u64 =
                table.iter().map(|row| row[class]).sum::<u64>() - true_positive;
            let f1 = match true_positive {
                0 => 0.0,
                tp => {
                    let recall = tp as f64 / (tp + false_negative) as f64;
                    let precision = tp as f64 / (tp + false_positive) as f64;
                    2.0 * precision * recall / (precision + recall)
                }
            };
            (f1, true_positive + false_negative)
        })
        .collect()
}

/// the generation loop specialized for classification: evaluation
/// produces per-class F1 scores, and decimation reserves survival
/// slots for the best root of every class before filling the rest by
/// general score. that keeps class specialists alive even when their
/// overall score is middling.
pub struct ClassificationLearningAgent<E: ClassificationLearningEnvironment> {
    agent: LearningAgent<E>,
    results_per_root: BTreeMap<VertexId, ClassificationEvaluationResult>,
}

impl<E: ClassificationLearningEnvironment> ClassificationLearningAgent<E> {
    pub fn new(env: E, instructions: Set, params: LearningParameters) -> Result<Self> {
        Ok(Self {
            agent: LearningAgent::new(env, instructions, params)?,
            results_per_root: BTreeMap::new(),
        })
    }

    pub fn base(&self) -> &LearningAgent<E> {
        &self.agent
    }

    pub fn base_mut(&mut self) -> &mut LearningAgent<E> {
        &mut self.agent
    }

    pub fn init(&mut self, seed: u64) -> Result<()> {
        self.results_per_root.clear();
        self.agent.init(seed)
    }

    /// one classification evaluation job: run the policy over the
    /// samples, then fold the confusion matrix into per-class F1 and
    /// per-class sample counts.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_job(
        engine: &mut TpgEngine,
        graph: &TpgGraph,
        job: &Job,
        generation: u64,
        mode: LearningMode,
        env: &mut E,
        cache: &BTreeMap<VertexId, ClassificationEvaluationResult>,
        params: &LearningParameters,
    ) -> Result<ClassificationEvaluationResult> {
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
        let nb_classes = env.nb_actions().first().copied().unwrap_or(0) as usize;
        let mut scores = vec![0.0; nb_classes];
        let mut samples = vec![0u64; nb_classes];
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
                env.do_action(actions[0]);
                steps += 1;
            }
            for (class, (f1, count)) in
                per_class_f1(env.classification_table()).into_iter().enumerate()
            {
                scores[class] += f1;
                samples[class] += count;
            }
        }
        for score in scores.iter_mut() {
            *score /= params.nb_iterations_per_policy_evaluation as f64;
        }
        let mut result = ClassificationEvaluationResult::new(scores, samples);
        if let Some(previous) = previous {
            result.combine(previous);
        }
        Ok(result)
    }

    /// evaluate every root; results ascend by general score.
    pub fn evaluate_all_roots(
        &mut self,
        generation: u64,
        mode: LearningMode,
    ) -> Result<Vec<(ClassificationEvaluationResult, VertexId)>> {
        let jobs = self.agent.make_jobs();
        let degraded = self.agent.pool.is_some() && !self.agent.env.is_copyable();
        if degraded {
            log::warn!("environment is not copyable, evaluating sequentially");
        }
        let cache = &self.results_per_root;
        let agent = &mut self.agent;
        let LearningAgent { env, graph, params, pool, archive, .. } = agent;
        let graph: &TpgGraph = graph;
        let params: &LearningParameters = params;
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

    /// refresh the per-root cache and the base best-root record.
    pub fn update_evaluation_records(
        &mut self,
        results: &[(ClassificationEvaluationResult, VertexId)],
    ) {
        let general: Vec<(EvaluationResult, VertexId)> = results
            .iter()
            .map(|(result, root)| {
                (EvaluationResult::new(result.result(), result.nb_evaluation()), *root)
            })
            .collect();
        self.agent.update_evaluation_records(&general);
        for (result, root) in results {
            self.results_per_root.insert(*root, result.clone());
        }
    }

    /// classification decimation: reserve half the survival budget
    /// for per-class champions, fill the rest by general score, and
    /// remove every other team root.
    ///
    /// per-class reservation never backfills: a slot whose candidate
    /// is already marked is simply spent, which keeps the preserved
    /// count stable across classes even under score ties.
    pub fn decimate_worst_roots(
        &mut self,
        results: &mut Vec<(ClassificationEvaluationResult, VertexId)>,
    ) {
        let total = self.agent.graph.nb_root_vertices();
        let nb_deletion =
            (self.agent.params.ratio_deleted_roots * total as f64).floor() as usize;
        let nb_keep = total - nb_deletion;
        let nb_classes = results
            .first()
            .map(|(result, _)| result.score_per_class().len())
            .unwrap_or(0);
        let mut keep: Vec<VertexId> = Vec::with_capacity(nb_keep);
        if nb_classes > 0 {
            let kept_per_class = (nb_keep / nb_classes) / 2;
            for class in 0..nb_classes {
                let mut sorted: Vec<(f64, VertexId)> = results
                    .iter()
                    .map(|(result, root)| (result.score_per_class()[class], *root))
                    .collect();
                sorted.sort_by(|(a, _), (b, _)| a.total_cmp(b));
                for (_, root) in sorted.iter().rev().take(kept_per_class) {
                    if !keep.contains(root) {
                        keep.push(*root);
                    }
                }
            }
        }
        for (_, root) in results.iter().rev() {
            if keep.len() >= nb_keep {
                break;
            }
            if !keep.contains(root) {
                keep.push(*root);
            }
        }
        let roots = self.agent.graph.root_vertices();
        for root in roots {
            let is_team = self
                .agent
                .graph
                .vertex(root)
                .map(|v| v.is_team())
                .unwrap_or(false);
            if is_team && !keep.contains(&root) {
                self.agent.graph.remove_vertex(root);
                self.agent.results_per_root.remove(&root);
                self.results_per_root.remove(&root);
            }
        }
        results.retain(|(_, root)| self.agent.graph.vertex(*root).is_some());
        log::debug!("kept {} of {} roots", self.agent.graph.nb_root_vertices(), total);
    }

    pub fn train_one_generation(&mut self, generation: u64) -> Result<()> {
        let mut results = self.evaluate_all_roots(generation, LearningMode::Training)?;
        self.update_evaluation_records(&results);
        self.decimate_worst_roots(&mut results);
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
    use crate::learn::fixtures::FakeClassification;
    use crate::mutator::MutationParameters;

    fn params() -> LearningParameters {
        LearningParameters {
            nb_threads: 1,
            archive_size: 16,
            archiving_probability: 0.1,
            nb_iterations_per_policy_evaluation: 2,
            max_nb_actions_per_eval: 30,
            nb_generations: 3,
            mutation: MutationParameters {
                nb_roots: 12,
                init_nb_roots: 6,
                max_init_outgoing_edges: 3,
                max_outgoing_edges: 4,
                max_program_size: 8,
                ..MutationParameters::default()
            },
            ..LearningParameters::default()
        }
    }

    fn agent() -> ClassificationLearningAgent<FakeClassification> {
        ClassificationLearningAgent::new(
            FakeClassification::new(3),
            Set::arithmetic(),
            params(),
        )
        .unwrap()
    }

    #[test]
    fn per_class_f1_reads_the_confusion_matrix() {
        // 2 classes: class 0 perfectly recognized, class 1 never
        let table = vec![vec![4, 0], vec![2, 0]];
        let scored = per_class_f1(&table);
        assert_eq!(scored.len(), 2);
        let (f1_first, samples_first) = scored[0];
        let (f1_second, samples_second) = scored[1];
        // class 0: recall 1.0, precision 4/6
        assert!((f1_first - 0.8).abs() < 1e-9);
        assert_eq!(samples_first, 4);
        assert_eq!(f1_second, 0.0);
        assert_eq!(samples_second, 2);
    }

    #[test]
    fn evaluation_scores_every_root_per_class() {
        let mut agent = agent();
        agent.init(7).unwrap();
        let results = agent
            .evaluate_all_roots(0, LearningMode::Training)
            .unwrap();
        assert_eq!(results.len(), 6);
        for (result, _) in results.iter() {
            assert_eq!(result.score_per_class().len(), 3);
            assert_eq!(result.nb_evaluation_per_class().len(), 3);
            assert!(result.nb_evaluation() > 0);
        }
    }

    #[test]
    fn decimation_preserves_class_champions() {
        let mut agent = agent();
        agent.base_mut().params.mutation.init_nb_roots = 12;
        agent.init(7).unwrap();
        let mut results = agent
            .evaluate_all_roots(0, LearningMode::Training)
            .unwrap();
        agent.update_evaluation_records(&results);
        // per-class champions before decimation
        let mut champions = Vec::new();
        for class in 0..3 {
            let best = results
                .iter()
                .max_by(|(a, _), (b, _)| {
                    a.score_per_class()[class].total_cmp(&b.score_per_class()[class])
                })
                .map(|(_, root)| *root)
                .unwrap();
            champions.push(best);
        }
        agent.decimate_worst_roots(&mut results);
        // 12 roots, keep 6: (6 / 3) / 2 = 1 reserved slot per class
        assert_eq!(agent.base().tpg().nb_root_vertices(), 6);
        for champion in champions {
            assert!(
                agent.base().tpg().vertex(champion).is_some(),
                "class champion {} was decimated",
                champion
            );
        }
    }

    #[test]
    fn a_generation_runs_end_to_end() {
        let mut agent = agent();
        agent.init(7).unwrap();
        let stop = AtomicBool::new(false);
        let done = agent.train(&stop, false).unwrap();
        assert_eq!(done, 3);
        assert!(agent.base().tpg().nb_root_vertices() >= 12);
        assert!(agent.base().best_root().is_some());
    }
}

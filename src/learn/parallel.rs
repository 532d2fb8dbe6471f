use super::environment::LearningEnvironment;
use super::environment::LearningMode;
use super::job::Job;
use super::params::LearningParameters;
use crate::archive::Archive;
use crate::error::Error;
use crate::error::Result;
use crate::tpg::TpgEngine;
use crate::tpg::TpgGraph;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use std::collections::BTreeMap;

/// what one evaluated job leaves behind: its result, the job itself,
/// and the per-job archive when the mode records one.
pub struct JobOutcome<R> {
    pub result: R,
    pub job: Job,
    pub archive: Option<Archive>,
}

/// run every job and collect outcomes keyed by job index.
///
/// with a pool, each job clones the environment, builds a private
/// engine over the clone, and runs independently; without one, the
/// same pipeline runs inline against the caller's environment. either
/// way each training-mode job records into its own archive seeded from
/// the job, so outcomes are byte-identical across worker counts, and
/// the returned map hands them back in ascending job order for the
/// merge.
pub fn evaluate_jobs<E, R, F>(
    graph: &TpgGraph,
    env: &mut E,
    pool: Option<&rayon::ThreadPool>,
    jobs: Vec<Job>,
    generation: u64,
    mode: LearningMode,
    params: &LearningParameters,
    eval: F,
) -> Result<BTreeMap<u64, JobOutcome<R>>>
where
    E: LearningEnvironment,
    R: Send,
    F: Fn(&mut TpgEngine, &TpgGraph, &Job, u64, LearningMode, &mut E) -> Result<R> + Sync,
{
    let fresh_archive = |job: &Job| {
        (mode == LearningMode::Training).then(|| {
            Archive::new(
                params.archive_size,
                params.archiving_probability,
                job.archive_seed(),
            )
        })
    };
    match pool {
        None => {
            let mut engine = TpgEngine::new(graph.environment().clone(), None);
            let mut outcomes = BTreeMap::new();
            for job in jobs {
                engine.set_archive(fresh_archive(&job));
                let result = eval(&mut engine, graph, &job, generation, mode, env)?;
                let archive = engine.take_archive();
                outcomes.insert(job.idx(), JobOutcome { result, job, archive });
            }
            Ok(outcomes)
        }
        Some(pool) => {
            if !env.is_copyable() {
                return Err(Error::ConcurrencyViolation(
                    "parallel evaluation needs a copyable environment".to_string(),
                ));
            }
            let env = &*env;
            pool.install(|| {
                jobs.into_par_iter()
                    .map(|job| {
                        let mut private = env.copied().ok_or_else(|| {
                            Error::ConcurrencyViolation(
                                "environment refused to copy".to_string(),
                            )
                        })?;
                        let mut engine =
                            TpgEngine::new(graph.environment().clone(), fresh_archive(&job));
                        let result =
                            eval(&mut engine, graph, &job, generation, mode, &mut private)?;
                        let archive = engine.take_archive();
                        Ok((job.idx(), JobOutcome { result, job, archive }))
                    })
                    .collect::<Result<BTreeMap<_, _>>>()
            })
        }
    }
}

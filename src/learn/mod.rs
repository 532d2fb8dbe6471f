pub mod adversarial;
pub mod agent;
pub mod classification;
pub mod environment;
pub mod job;
pub mod parallel;
pub mod params;
pub mod result;

#[cfg(test)]
pub mod fixtures;

pub use adversarial::AdversarialLearningAgent;
pub use adversarial::AdversarialLearningEnvironment;
pub use agent::LearningAgent;
pub use classification::ClassificationLearningAgent;
pub use classification::ClassificationLearningEnvironment;
pub use environment::LearningEnvironment;
pub use environment::LearningMode;
pub use job::Job;
pub use params::LearningParameters;
pub use result::AdversarialEvaluationResult;
pub use result::ClassificationEvaluationResult;
pub use result::EvaluationResult;

use std::hash::Hash;
use std::hash::Hasher;

/// deterministic per-iteration environment seed: the same
/// (generation, iteration) pair re-derives the same episode everywhere,
/// which is what lets sequential and parallel evaluation agree.
pub(crate) fn eval_seed(generation: u64, iteration: u64) -> u64 {
    let hash = |n: u64| {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        n.hash(&mut hasher);
        hasher.finish()
    };
    hash(generation) ^ hash(iteration)
}

use crate::error::Error;
use crate::error::Result;
use crate::mutator::MutationParameters;
use serde::Deserialize;
use serde::Serialize;

fn default_nb_threads() -> usize {
    num_cpus::get()
}

/// everything the learning agent is configured by, loadable from one
/// JSON document. unspecified fields fall back to defaults, including
/// the nested mutation block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningParameters {
    /// recording capacity of the behavioral archive.
    pub archive_size: usize,
    /// probability that an edge evaluation is offered to the archive.
    pub archiving_probability: f64,
    /// worker count for evaluation and program-behavior mutation.
    #[serde(default = "default_nb_threads")]
    pub nb_threads: usize,
    /// generations a full training run spans.
    pub nb_generations: u64,
    /// hard cap on environment steps per evaluation iteration.
    pub max_nb_actions_per_eval: u64,
    /// evaluation iterations per policy per generation.
    pub nb_iterations_per_policy_evaluation: u64,
    /// iterations bundled into one adversarial job.
    pub nb_iterations_per_job: u64,
    /// cumulative evaluation budget after which a root's score is
    /// frozen and reused instead of re-evaluated.
    pub max_nb_evaluation_per_policy: u64,
    /// fraction of roots decimated each generation.
    pub ratio_deleted_roots: f64,
    /// edge activations allowed per team during inference.
    pub nb_edges_activable: u64,
    /// register-bank size of every program.
    pub nb_registers: usize,
    /// constant-bank size of every program.
    pub nb_constants: usize,
    /// the mutation block.
    pub mutation: MutationParameters,
}

impl Default for LearningParameters {
    fn default() -> Self {
        Self {
            archive_size: 50,
            archiving_probability: 0.05,
            nb_threads: default_nb_threads(),
            nb_generations: 500,
            max_nb_actions_per_eval: 1000,
            nb_iterations_per_policy_evaluation: 5,
            nb_iterations_per_job: 1,
            max_nb_evaluation_per_policy: 1000,
            ratio_deleted_roots: 0.5,
            nb_edges_activable: 1,
            nb_registers: 8,
            nb_constants: 0,
            mutation: MutationParameters::default(),
        }
    }
}

impl LearningParameters {
    /// load from a JSON file; missing fields take defaults.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let params: Self = serde_json::from_str(&text).map_err(|e| {
            Error::InvalidConfiguration(format!("cannot parse {}: {}", path.display(), e))
        })?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, p: f64| match (0.0..=1.0).contains(&p) {
            true => Ok(()),
            false => Err(Error::InvalidConfiguration(format!(
                "{} = {} is not a probability",
                name, p
            ))),
        };
        unit("archiving_probability", self.archiving_probability)?;
        unit("ratio_deleted_roots", self.ratio_deleted_roots)?;
        unit("mutation.p_edge_deletion", self.mutation.p_edge_deletion)?;
        unit("mutation.p_edge_addition", self.mutation.p_edge_addition)?;
        unit("mutation.p_program_mutation", self.mutation.p_program_mutation)?;
        unit(
            "mutation.p_edge_destination_change",
            self.mutation.p_edge_destination_change,
        )?;
        unit(
            "mutation.p_edge_destination_is_action",
            self.mutation.p_edge_destination_is_action,
        )?;
        unit("mutation.p_new_program", self.mutation.p_new_program)?;
        unit("mutation.p_add", self.mutation.p_add)?;
        unit("mutation.p_delete", self.mutation.p_delete)?;
        unit("mutation.p_mutate", self.mutation.p_mutate)?;
        unit("mutation.p_swap", self.mutation.p_swap)?;
        unit("mutation.p_constant_mutation", self.mutation.p_constant_mutation)?;
        if self.nb_threads == 0 {
            return Err(Error::InvalidConfiguration(
                "nb_threads must be at least 1".to_string(),
            ));
        }
        if self.nb_edges_activable == 0 {
            return Err(Error::InvalidConfiguration(
                "nb_edges_activable must be at least 1".to_string(),
            ));
        }
        if self.nb_registers == 0 {
            return Err(Error::InvalidConfiguration(
                "nb_registers must be at least 1".to_string(),
            ));
        }
        if self.mutation.max_program_size == 0 {
            return Err(Error::InvalidConfiguration(
                "mutation.max_program_size must be at least 1".to_string(),
            ));
        }
        if self.mutation.min_const_value > self.mutation.max_const_value {
            return Err(Error::InvalidConfiguration(
                "mutation constant range is inverted".to_string(),
            ));
        }
        Ok(())
    }
}

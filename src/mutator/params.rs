use serde::Deserialize;
use serde::Serialize;

/// knobs of the generation-to-generation mutation process.
///
/// the geometric probabilities drive how many structural edits a team
/// takes per mutation; the program-level block drives how its edge
/// programs drift. loaded from the same JSON document as the learning
/// parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationParameters {
    /// root-team count the population is refilled to each generation.
    pub nb_roots: usize,
    /// root-team count of the initial random graph.
    pub init_nb_roots: usize,
    /// outgoing-edge cap per team at initialization.
    pub max_init_outgoing_edges: usize,
    /// outgoing-edge cap per team under mutation.
    pub max_outgoing_edges: usize,
    /// geometric continuation of the per-team edge-removal loop.
    pub p_edge_deletion: f64,
    /// geometric continuation of the per-team edge-addition loop.
    pub p_edge_addition: f64,
    /// per-edge probability of cloning and mutating its program.
    pub p_program_mutation: f64,
    /// probability that a mutated edge is also retargeted.
    pub p_edge_destination_change: f64,
    /// bias of retargeting toward actions rather than teams.
    pub p_edge_destination_is_action: f64,
    /// require the live-line signature to change under mutation.
    pub force_program_behavior_change_on_mutation: bool,
    /// probability that program mutation restarts from scratch.
    pub p_new_program: f64,
    /// line-count cap per program.
    pub max_program_size: usize,
    /// per-invocation probability of inserting a random line.
    pub p_add: f64,
    /// per-invocation probability of deleting a random line.
    pub p_delete: f64,
    /// per-invocation probability of altering a random line in place.
    pub p_mutate: f64,
    /// per-invocation probability of swapping two random lines.
    pub p_swap: f64,
    /// per-invocation probability of redrawing a random constant.
    pub p_constant_mutation: f64,
    /// inclusive range constants are drawn from.
    pub min_const_value: i32,
    pub max_const_value: i32,
}

impl Default for MutationParameters {
    fn default() -> Self {
        Self {
            nb_roots: 100,
            init_nb_roots: 100,
            max_init_outgoing_edges: 3,
            max_outgoing_edges: 5,
            p_edge_deletion: 0.7,
            p_edge_addition: 0.7,
            p_program_mutation: 0.2,
            p_edge_destination_change: 0.1,
            p_edge_destination_is_action: 0.5,
            force_program_behavior_change_on_mutation: false,
            p_new_program: 0.05,
            max_program_size: 96,
            p_add: 0.82,
            p_delete: 0.88,
            p_mutate: 1.0,
            p_swap: 1.0,
            p_constant_mutation: 0.5,
            min_const_value: -10,
            max_const_value: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_from_defaults() {
        let parsed: MutationParameters =
            serde_json::from_str(r#"{ "nb_roots": 12, "p_add": 0.5 }"#).unwrap();
        assert_eq!(parsed.nb_roots, 12);
        assert_eq!(parsed.p_add, 0.5);
        assert_eq!(parsed.max_program_size, MutationParameters::default().max_program_size);
    }
}

use super::LINE_SEPARATOR;
use crate::error::Error;
use crate::error::Result;
use crate::program::Program;
use crate::tpg::TpgGraph;
use crate::tpg::Vertex;
use crate::tpg::VertexId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// serialize one program body for a dot label: one statement per
/// line as `inst|dest&src|addr#src|addr#`, lines joined by the label
/// separator, constants in a `$`-prefixed trailer.
fn program_label(program: &Program) -> String {
    let mut pieces: Vec<String> = program
        .lines()
        .iter()
        .map(|line| {
            let mut piece = format!("{}|{}&", line.instruction(), line.destination());
            for slot in 0..line.nb_operands() {
                let (source, address) = line.operand(slot);
                piece.push_str(&format!("{}|{}#", source, address));
            }
            piece
        })
        .collect();
    if !program.constants().is_empty() {
        let constants: Vec<String> = program
            .constants()
            .constants()
            .iter()
            .map(|c| c.to_string())
            .collect();
        pieces.push(format!("${}", constants.join("|")));
    }
    pieces.join(LINE_SEPARATOR)
}

/// render the graph in the dot interchange format.
///
/// teams are `T<n>` in declaration order, actions are `A<id>` labeled
/// with their class, programs are `P<n>`/`I<n>` pairs declared on
/// first use. an edge whose program was already declared reuses the
/// short `T -> P` form: shared programs always route to the
/// destination recorded at their first edge.
pub fn export_to_string(graph: &TpgGraph) -> String {
    let mut out = String::new();
    out.push_str("graph TPG {\n");
    out.push_str("\tnode [shape=circle style=filled]\n");
    let mut names: BTreeMap<VertexId, String> = BTreeMap::new();
    let mut nb_teams = 0u64;
    for (id, vertex) in graph.vertices() {
        match vertex {
            Vertex::Team { .. } => {
                let name = format!("T{}", nb_teams);
                nb_teams += 1;
                out.push_str(&format!("\t{} [fillcolor=\"#1199bb\"]\n", name));
                names.insert(id, name);
            }
            Vertex::Action { class, id: action, .. } => {
                let name = format!("A{}", action);
                out.push_str(&format!(
                    "\t{} [fillcolor=\"#ff3366\" shape=box label=\"{}\"]\n",
                    name, class
                ));
                names.insert(id, name);
            }
        }
    }
    let mut programs: Vec<(usize, String)> = Vec::new();
    let mut nb_programs = 0u64;
    for (team_id, vertex) in graph.vertices() {
        if !vertex.is_team() {
            continue;
        }
        let team_name = names.get(&team_id).expect("every vertex is named").clone();
        for edge_id in vertex.outgoing() {
            let edge = graph.edge(*edge_id).expect("adjacency is consistent");
            let pointer = Arc::as_ptr(edge.program()) as usize;
            let target_name = names.get(&edge.target()).expect("every vertex is named");
            match programs.iter().find(|(p, _)| *p == pointer) {
                None => {
                    let program_name = format!("P{}", nb_programs);
                    let body_name = format!("I{}", nb_programs);
                    nb_programs += 1;
                    out.push_str(&format!(
                        "\t{} [fillcolor=\"#cccccc\" shape=point]\n",
                        program_name
                    ));
                    out.push_str(&format!(
                        "\t{} [shape=box style=invis label=\"{}\"]\n",
                        body_name,
                        program_label(edge.program())
                    ));
                    out.push_str(&format!(
                        "\t{} -> {} [style=invis]\n",
                        program_name, body_name
                    ));
                    out.push_str(&format!(
                        "\t{} -> {} -> {}\n",
                        team_name, program_name, target_name
                    ));
                    programs.push((pointer, program_name));
                }
                Some((_, program_name)) => {
                    out.push_str(&format!("\t{} -> {}\n", team_name, program_name));
                }
            }
        }
    }
    out.push_str("}\n");
    out
}

/// write the graph to a dot file.
pub fn export(graph: &TpgGraph, path: &std::path::Path) -> Result<()> {
    std::fs::write(path, export_to_string(graph))
        .map_err(|e| Error::Import(format!("cannot write {}: {}", path.display(), e)))
}

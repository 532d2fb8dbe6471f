use super::edge::EdgeId;
use super::graph::TpgGraph;
use super::vertex::Vertex;
use super::vertex::VertexId;
use crate::archive::Archive;
use crate::data::DataHandler;
use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::program::ProgramEngine;
use crate::ActionId;
use crate::Bid;
use std::sync::Arc;

/// routes one inference from a root to a set of actions, one decision
/// per action class.
///
/// at each team, every outgoing edge bids once; edges are walked in
/// descending bid order with equal bids resolved in favor of the
/// later-inserted edge. along the walk, at most one team edge is
/// recursed into and action edges claim their class on a first-come
/// basis, until `nb_edges_activable` edges have fired or every class
/// is decided. cycles cannot trap the walk: a team is never entered
/// twice within one inference.
///
/// the engine optionally owns a per-job archive; when present, every
/// edge evaluation is offered to it.
pub struct TpgEngine {
    engine: ProgramEngine,
    archive: Option<Archive>,
}

/// undecided marker within the per-class decision vector.
const UNDECIDED: i64 = -1;

impl TpgEngine {
    pub fn new(environment: Arc<Environment>, archive: Option<Archive>) -> Self {
        Self {
            engine: ProgramEngine::new(environment),
            archive,
        }
    }

    pub fn set_archive(&mut self, archive: Option<Archive>) {
        self.archive = archive;
    }

    pub fn take_archive(&mut self) -> Option<Archive> {
        self.archive.take()
    }

    pub fn archive(&self) -> Option<&Archive> {
        self.archive.as_ref()
    }

    /// run the edge's program on the current sources. NaN bids are
    /// mapped to -inf so they lose every arbitration.
    fn evaluate_edge(
        &mut self,
        graph: &TpgGraph,
        edge: EdgeId,
        sources: &[&dyn DataHandler],
    ) -> Result<Bid> {
        let program = graph
            .edge(edge)
            .ok_or_else(|| {
                Error::GraphConstraint(format!("edge {} is not in the graph", edge))
            })?
            .program()
            .clone();
        self.engine.set_program(program.clone())?;
        let raw = self.engine.execute(sources, true)?;
        let bid = match raw.is_nan() {
            true => f64::NEG_INFINITY,
            false => raw,
        };
        if let Some(archive) = self.archive.as_mut() {
            archive.add_recording(&program, sources, bid, false);
        }
        Ok(bid)
    }

    fn execute_team(
        &mut self,
        graph: &TpgGraph,
        team: VertexId,
        sources: &[&dyn DataHandler],
        visited: &mut Vec<VertexId>,
        actions: &mut [i64],
        nb_edges_activable: u64,
        trace: &mut Vec<EdgeId>,
    ) -> Result<()> {
        if actions.iter().all(|a| *a != UNDECIDED) {
            return Ok(());
        }
        visited.push(team);
        let outgoing: Vec<EdgeId> = graph
            .vertex(team)
            .map(|v| v.outgoing().to_vec())
            .unwrap_or_default();
        let mut bids: Vec<(usize, EdgeId, Bid)> = Vec::with_capacity(outgoing.len());
        for (insertion, edge) in outgoing.into_iter().enumerate() {
            let bid = self.evaluate_edge(graph, edge, sources)?;
            bids.push((insertion, edge, bid));
        }
        // descending bid; equal bids fall to the later-inserted edge
        bids.sort_by(|(ia, _, ba), (ib, _, bb)| {
            bb.total_cmp(ba).then_with(|| ib.cmp(ia))
        });
        let mut teams_activated = 0u64;
        let mut edges_activated = 0u64;
        for (_, edge, _) in bids {
            if edges_activated == nb_edges_activable {
                break;
            }
            if actions.iter().all(|a| *a != UNDECIDED) {
                return Ok(());
            }
            let target = graph.edge(edge).expect("bid on a graph edge").target();
            match graph.vertex(target).expect("edges point into the graph") {
                Vertex::Action { class, id, .. } => {
                    if actions[*class] == UNDECIDED {
                        actions[*class] = *id as i64;
                    }
                    visited.push(target);
                    trace.push(edge);
                    edges_activated += 1;
                }
                Vertex::Team { .. } if teams_activated < 1 => {
                    teams_activated += 1;
                    if !visited.contains(&target) {
                        trace.push(edge);
                        self.execute_team(
                            graph,
                            target,
                            sources,
                            visited,
                            actions,
                            nb_edges_activable,
                            trace,
                        )?;
                    }
                    edges_activated += 1;
                }
                Vertex::Team { .. } => {}
            }
        }
        Ok(())
    }

    /// walk from the root and return the visited vertices and the
    /// decision per action class, defaulting undecided classes to the
    /// caller's `init_actions`.
    pub fn execute_from_root(
        &mut self,
        graph: &TpgGraph,
        root: VertexId,
        sources: &[&dyn DataHandler],
        init_actions: &[ActionId],
        nb_edges_activable: u64,
    ) -> Result<(Vec<VertexId>, Vec<ActionId>)> {
        let mut visited = Vec::new();
        let mut trace = Vec::new();
        let mut actions = vec![UNDECIDED; init_actions.len()];
        match graph.vertex(root) {
            None => {
                return Err(Error::GraphConstraint(format!(
                    "root {} is not in the graph",
                    root
                )))
            }
            Some(Vertex::Action { class, id, .. }) => {
                actions[*class] = *id as i64;
                visited.push(root);
            }
            Some(Vertex::Team { .. }) => {
                self.execute_team(
                    graph,
                    root,
                    sources,
                    &mut visited,
                    &mut actions,
                    nb_edges_activable,
                    &mut trace,
                )?;
            }
        }
        let actions = actions
            .iter()
            .enumerate()
            .map(|(class, action)| match *action {
                UNDECIDED => init_actions[class],
                decided => decided as ActionId,
            })
            .collect();
        Ok((visited, actions))
    }
}

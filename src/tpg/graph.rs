use super::edge::Edge;
use super::edge::EdgeId;
use super::vertex::Vertex;
use super::vertex::VertexId;
use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::program::Program;
use crate::ActionClass;
use crate::ActionId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// the policy graph: an id-keyed arena of vertices and edges plus the
/// environment its programs are encoded against.
///
/// ids are monotonic and never recycled, so iterating either map in
/// key order walks insertion order, which is what makes root
/// enumeration, and everything downstream of it, reproducible.
/// adjacency is redundant with the edge endpoints by construction:
/// every mutation below maintains both sides or neither.
pub struct TpgGraph {
    environment: Arc<Environment>,
    vertices: BTreeMap<VertexId, Vertex>,
    edges: BTreeMap<EdgeId, Edge>,
    next_vertex: u64,
    next_edge: u64,
}

impl TpgGraph {
    pub fn new(environment: Arc<Environment>) -> Self {
        Self {
            environment,
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            next_vertex: 0,
            next_edge: 0,
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    fn fresh_vertex(&mut self, vertex: Vertex) -> VertexId {
        let id = VertexId(self.next_vertex);
        self.next_vertex += 1;
        self.vertices.insert(id, vertex);
        id
    }

    pub fn add_new_team(&mut self) -> VertexId {
        self.fresh_vertex(Vertex::team())
    }

    pub fn add_new_action(&mut self, id: ActionId, class: ActionClass) -> VertexId {
        self.fresh_vertex(Vertex::action(id, class))
    }

    /// connect a team to any vertex through a program.
    pub fn add_new_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
        program: Arc<Program>,
    ) -> Result<EdgeId> {
        match self.vertices.get(&source) {
            None => {
                return Err(Error::GraphConstraint(format!(
                    "edge source {} is not in the graph",
                    source
                )))
            }
            Some(vertex) if !vertex.is_team() => {
                return Err(Error::GraphConstraint(format!(
                    "edge source {} is an action",
                    source
                )))
            }
            Some(_) => {}
        }
        if !self.vertices.contains_key(&target) {
            return Err(Error::GraphConstraint(format!(
                "edge target {} is not in the graph",
                target
            )));
        }
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(id, Edge { source, target, program });
        self.vertices
            .get_mut(&source)
            .expect("source checked above")
            .outgoing_mut()
            .expect("source is a team")
            .push(id);
        self.vertices
            .get_mut(&target)
            .expect("target checked above")
            .incoming_mut()
            .push(id);
        Ok(id)
    }

    /// remove a vertex and every edge touching it.
    pub fn remove_vertex(&mut self, vertex: VertexId) {
        let Some(removed) = self.vertices.remove(&vertex) else {
            return;
        };
        let mut adjacent: Vec<EdgeId> = removed.incoming().to_vec();
        adjacent.extend_from_slice(removed.outgoing());
        for edge in adjacent {
            self.remove_edge(edge);
        }
    }

    /// remove an edge, updating both endpoints. false when the edge is
    /// not in the graph.
    pub fn remove_edge(&mut self, edge: EdgeId) -> bool {
        let Some(removed) = self.edges.remove(&edge) else {
            return false;
        };
        if let Some(source) = self.vertices.get_mut(&removed.source) {
            if let Some(outgoing) = source.outgoing_mut() {
                outgoing.retain(|e| *e != edge);
            }
        }
        if let Some(target) = self.vertices.get_mut(&removed.target) {
            target.incoming_mut().retain(|e| *e != edge);
        }
        true
    }

    /// clone a vertex; for teams, outgoing edges are cloned too,
    /// sharing their programs with the originals.
    pub fn clone_vertex(&mut self, vertex: VertexId) -> Result<VertexId> {
        match self.vertices.get(&vertex) {
            None => Err(Error::GraphConstraint(format!(
                "vertex {} is not in the graph",
                vertex
            ))),
            Some(Vertex::Action { class, id, .. }) => {
                let (class, id) = (*class, *id);
                Ok(self.add_new_action(id, class))
            }
            Some(Vertex::Team { outgoing, .. }) => {
                let outgoing = outgoing.clone();
                let clone = self.add_new_team();
                for edge in outgoing {
                    let (target, program) = {
                        let edge = self.edges.get(&edge).expect("adjacency is consistent");
                        (edge.target, edge.program.clone())
                    };
                    self.add_new_edge(clone, target, program)?;
                }
                Ok(clone)
            }
        }
    }

    /// duplicate an edge, sharing its program.
    pub fn clone_edge(&mut self, edge: EdgeId) -> Result<EdgeId> {
        let Some(edge) = self.edges.get(&edge) else {
            return Err(Error::GraphConstraint(format!(
                "edge {} is not in the graph",
                edge
            )));
        };
        let (source, target, program) = (edge.source, edge.target, edge.program.clone());
        self.add_new_edge(source, target, program)
    }

    /// retarget an edge. false when the edge or target is missing.
    pub fn set_edge_destination(&mut self, edge: EdgeId, target: VertexId) -> bool {
        if !self.vertices.contains_key(&target) {
            return false;
        }
        let Some(current) = self.edges.get_mut(&edge) else {
            return false;
        };
        let old = current.target;
        current.target = target;
        self.vertices
            .get_mut(&old)
            .expect("adjacency is consistent")
            .incoming_mut()
            .retain(|e| *e != edge);
        self.vertices
            .get_mut(&target)
            .expect("target checked above")
            .incoming_mut()
            .push(edge);
        true
    }

    /// re-source an edge onto another team. false when the edge is
    /// missing; an error when the new source is not a team.
    pub fn set_edge_source(&mut self, edge: EdgeId, source: VertexId) -> Result<bool> {
        match self.vertices.get(&source) {
            None => {
                return Err(Error::GraphConstraint(format!(
                    "vertex {} is not in the graph",
                    source
                )))
            }
            Some(vertex) if !vertex.is_team() => {
                return Err(Error::GraphConstraint(format!(
                    "edge source {} must be a team",
                    source
                )))
            }
            Some(_) => {}
        }
        let Some(current) = self.edges.get_mut(&edge) else {
            return Ok(false);
        };
        let old = current.source;
        current.source = source;
        self.vertices
            .get_mut(&old)
            .expect("adjacency is consistent")
            .outgoing_mut()
            .expect("old source was a team")
            .retain(|e| *e != edge);
        self.vertices
            .get_mut(&source)
            .expect("source checked above")
            .outgoing_mut()
            .expect("source is a team")
            .push(edge);
        Ok(true)
    }

    /// swap the program carried by an edge. false when the edge is
    /// missing.
    pub fn set_edge_program(&mut self, edge: EdgeId, program: Arc<Program>) -> bool {
        match self.edges.get_mut(&edge) {
            Some(edge) => {
                edge.program = program;
                true
            }
            None => false,
        }
    }

    /// strip dead lines from every program owned by some edge.
    pub fn clear_program_introns(&mut self) {
        let mut seen: Vec<usize> = Vec::new();
        let ids: Vec<EdgeId> = self.edges.keys().copied().collect();
        for id in ids {
            let program = self.edges.get(&id).expect("just listed").program.clone();
            let key = Arc::as_ptr(&program) as usize;
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            let mut cleaned = (*program).clone();
            cleaned.clear_introns();
            let cleaned = Arc::new(cleaned);
            for edge in self.edges.values_mut() {
                if Arc::ptr_eq(&edge.program, &program) {
                    edge.program = cleaned.clone();
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.edges.clear();
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.vertices.iter().map(|(id, v)| (*id, v))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter().map(|(id, e)| (*id, e))
    }

    pub fn nb_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn nb_edges(&self) -> usize {
        self.edges.len()
    }

    /// vertices with no incoming edge, in insertion order.
    pub fn root_vertices(&self) -> Vec<VertexId> {
        self.vertices
            .iter()
            .filter(|(_, v)| v.is_root())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn nb_root_vertices(&self) -> usize {
        self.vertices.values().filter(|v| v.is_root()).count()
    }

    /// root teams only, in insertion order.
    pub fn root_teams(&self) -> Vec<VertexId> {
        self.vertices
            .iter()
            .filter(|(_, v)| v.is_root() && v.is_team())
            .map(|(id, _)| *id)
            .collect()
    }
}

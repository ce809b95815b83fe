// src/graph/export.rs

//! Structural checks and Graphviz rendering of a batch graph.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{GridError, Result};
use crate::graph::LocalId;
use crate::graph::node::Batch;

/// Collect the dependency edges of `batch`: ordering prerequisites plus
/// producer links of input files.
fn edges(batch: &Batch) -> Vec<(LocalId, LocalId)> {
    let mut edges = Vec::new();
    for node in &batch.nodes {
        if let Some(prereq) = node.prereq {
            edges.push((prereq, node.local_id));
        }
        for idx in node.files() {
            if let Some(desc) = batch.registry.get(idx) {
                if !desc.kind.is_output() {
                    if let Some(parent) = desc.parent {
                        edges.push((parent, node.local_id));
                    }
                }
            }
        }
    }
    edges
}

/// Fail when the dependency edges contain a cycle or reference an unknown
/// node.
pub fn validate_acyclic(batch: &Batch) -> Result<()> {
    let mut graph: DiGraphMap<LocalId, ()> = DiGraphMap::new();
    for node in &batch.nodes {
        graph.add_node(node.local_id);
    }
    for (from, to) in edges(batch) {
        if batch.node(from).is_none() {
            return Err(GridError::NullReference(format!(
                "node {to} depends on unknown node {from}"
            )));
        }
        graph.add_edge(from, to, ());
    }
    toposort(&graph, None).map_err(|cycle| {
        GridError::InvalidInputParameter(format!(
            "job graph contains a dependency cycle through node {}",
            cycle.node_id()
        ))
    })?;
    Ok(())
}

/// Graphviz rendering of the batch, prerequisite and file edges alike.
pub fn render_dot(batch: &Batch) -> String {
    let mut graph: DiGraph<String, &str> = DiGraph::new();
    let mut indices = HashMap::new();
    for node in &batch.nodes {
        let label = format!("{} {}", node.local_id, node.app.name());
        indices.insert(node.local_id, graph.add_node(label));
    }
    for node in &batch.nodes {
        let Some(&to) = indices.get(&node.local_id) else {
            continue;
        };
        if let Some(&from) = node.prereq.and_then(|p| indices.get(&p)) {
            graph.add_edge(from, to, "order");
        }
        for idx in node.files() {
            if let Some(desc) = batch.registry.get(idx) {
                if !desc.kind.is_output() {
                    if let Some(&from) = desc.parent.and_then(|p| indices.get(&p)) {
                        graph.add_edge(from, to, "file");
                    }
                }
            }
        }
    }
    format!("{:?}", petgraph::dot::Dot::new(&graph))
}

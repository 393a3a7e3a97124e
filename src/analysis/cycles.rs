//! Circular requirement detection over registry metadata.
//!
//! Nodes are the resolved dependencies; an edge `a -> b` means `a`'s registry
//! metadata declares a requirement on `b`. Requirements pointing outside the
//! resolved set are dropped, and unresolved packages have no outgoing edges.
//!
//! Strongly connected components come from `petgraph`'s Tarjan; inside
//! each component, elementary cycles are enumerated from their smallest node
//! so every cycle is reported once, in canonical rotation.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::model::PackageMetadata;

/// Enumeration stops after this many cycles.
pub const MAX_CYCLES: usize = 1000;

/// Directed requirement graph over package names.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_indices: BTreeMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Builds the graph from `(name, metadata)` pairs. `None` metadata means
    /// the package was not resolved.
    pub fn build<'a, I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a PackageMetadata>)>,
    {
        let nodes: Vec<_> = nodes.into_iter().collect();
        let mut graph = Self::default();
        for (name, _) in &nodes {
            graph.node(name);
        }

        for (name, meta) in nodes {
            let Some(meta) = meta else { continue };
            for req in &meta.requires {
                if graph.node_indices.contains_key(req) {
                    graph.add_edge(name, req);
                }
            }
        }
        graph
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_indices.get(name) {
            return index;
        }
        let index = self.graph.add_node(name.to_string());
        self.node_indices.insert(name.to_string(), index);
        index
    }

    /// Adds a single edge, creating both nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from = self.node(from);
        let to = self.node(to);
        self.graph.update_edge(from, to, ());
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn name(&self, index: NodeIndex) -> &str {
        &self.graph[index]
    }

    /// Successors ordered by name.
    fn successors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut next: Vec<_> = self.graph.neighbors(index).collect();
        next.sort_by(|a, b| self.name(*a).cmp(self.name(*b)));
        next.dedup();
        next
    }

    /// Strongly connected components, each sorted by name.
    pub fn strongly_connected_components(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|component| {
                let mut names: Vec<String> =
                    component.into_iter().map(|i| self.graph[i].clone()).collect();
                names.sort();
                names
            })
            .collect()
    }

    /// Every elementary cycle, each starting at its smallest node, sorted.
    ///
    /// A package requiring itself is a cycle of length one.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut truncated = false;

        'components: for mut component in tarjan_scc(&self.graph) {
            let is_cyclic = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| self.graph.contains_edge(n, n));
            if !is_cyclic {
                continue;
            }
            component.sort_by(|a, b| self.name(*a).cmp(self.name(*b)));

            let members: BTreeSet<NodeIndex> = component.iter().copied().collect();
            for &start in &component {
                let mut path = vec![start];
                let mut on_path = BTreeSet::from([start]);
                self.walk(start, start, &members, &mut path, &mut on_path, &mut cycles);
                if cycles.len() >= MAX_CYCLES {
                    truncated = true;
                    break 'components;
                }
            }
        }

        if truncated {
            warn!(limit = MAX_CYCLES, "Cycle enumeration truncated");
            cycles.truncate(MAX_CYCLES);
        }
        cycles.sort();
        cycles
    }

    /// Depth-first search for paths back to `start` through nodes whose names
    /// sort after `start`, so each cycle is only found from its smallest node.
    fn walk(
        &self,
        start: NodeIndex,
        node: NodeIndex,
        members: &BTreeSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
        on_path: &mut BTreeSet<NodeIndex>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        for next in self.successors(node) {
            if cycles.len() >= MAX_CYCLES {
                return;
            }
            if next == start {
                cycles.push(path.iter().map(|&n| self.graph[n].clone()).collect());
            } else if self.name(next) > self.name(start)
                && members.contains(&next)
                && !on_path.contains(&next)
            {
                path.push(next);
                on_path.insert(next);
                self.walk(start, next, members, path, on_path, cycles);
                on_path.remove(&next);
                path.pop();
            }
        }
    }
}

/// Convenience wrapper: builds the graph and returns its cycles.
pub fn detect_cycles<'a, I>(nodes: I) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = (&'a str, Option<&'a PackageMetadata>)>,
{
    DependencyGraph::build(nodes).find_cycles()
}

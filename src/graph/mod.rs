//! Mobility contact graph.
//!
//! An undirected graph over node identifiers where each edge carries the
//! disjoint time intervals during which the two endpoints were in range.
//! Built once per mobility dataset and read-only afterwards: group
//! formation consumes a disposable [`WorkingGraph`] copy, and the
//! simulator only runs reachability queries against it.

use std::collections::BTreeMap;
use std::fmt;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::stable_graph::StableUnGraph;
use petgraph::visit::EdgeRef;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

pub mod cliques;

/// Opaque node identifier, dense and stable for one mobility dataset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Create a node id from its dense index.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw index.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One proximity window between two nodes.
///
/// Reachability uses strict containment: a broadcast at exactly `start`
/// or `end` does not reach the other endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    start: u64,
    end: u64,
}

impl Interval {
    /// Create an interval, rejecting `start >= end`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start >= end {
            return Err(SimError::Config(format!(
                "empty contact interval: start={start} end={end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Interval start time.
    pub fn start(self) -> u64 {
        self.start
    }

    /// Interval end time.
    pub fn end(self) -> u64 {
        self.end
    }

    /// Whether `t` falls strictly inside the window.
    pub fn contains(self, t: u64) -> bool {
        self.start < t && t < self.end
    }
}

/// Undirected contact graph with per-edge proximity intervals.
#[derive(Debug, Clone, Default)]
pub struct ContactGraph {
    graph: UnGraph<NodeId, Vec<Interval>>,
    index: BTreeMap<NodeId, NodeIndex>,
    contact_count: usize,
}

impl ContactGraph {
    /// Create an empty contact graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its graph index. Idempotent.
    pub fn add_node(&mut self, node: NodeId) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node);
        self.index.insert(node, idx);
        idx
    }

    /// Record one proximity window between two distinct nodes.
    ///
    /// Endpoints are created on first sight. Multiple contacts for the
    /// same pair accumulate on one edge (non-contiguous meetings).
    pub fn add_contact(&mut self, a: NodeId, b: NodeId, interval: Interval) -> Result<()> {
        if a == b {
            return Err(SimError::InvalidContact {
                node_a: a,
                node_b: b,
                reason: "self-contact".to_string(),
            });
        }
        let ia = self.add_node(a);
        let ib = self.add_node(b);
        match self.graph.find_edge(ia, ib) {
            Some(edge) => self.graph[edge].push(interval),
            None => {
                self.graph.add_edge(ia, ib, vec![interval]);
            }
        }
        self.contact_count += 1;
        Ok(())
    }

    /// Whether the node is known to this graph.
    pub fn contains(&self, node: NodeId) -> bool {
        self.index.contains_key(&node)
    }

    /// All node ids, in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.index.keys().copied()
    }

    /// Number of distinct nodes.
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    /// Number of recorded contacts (intervals, not edges).
    pub fn contact_count(&self) -> usize {
        self.contact_count
    }

    /// All nodes in range of `sender` at time `t`, ascending.
    ///
    /// A contact counts only if one of its intervals strictly contains
    /// `t`; a window touching `t` at either boundary does not.
    pub fn recipients_in_range(&self, sender: NodeId, t: u64) -> Vec<NodeId> {
        let Some(&idx) = self.index.get(&sender) else {
            return Vec::new();
        };
        let mut recipients: Vec<NodeId> = self
            .graph
            .edges(idx)
            .filter(|edge| edge.weight().iter().any(|iv| iv.contains(t)))
            .map(|edge| {
                let other = if edge.source() == idx {
                    edge.target()
                } else {
                    edge.source()
                };
                self.graph[other]
            })
            .collect();
        recipients.sort_unstable();
        recipients
    }

    /// Topology-only disposable copy for group formation.
    pub fn working_copy(&self) -> WorkingGraph {
        let mut graph = StableUnGraph::default();
        let mut index = BTreeMap::new();
        for (&node, _) in &self.index {
            let idx = graph.add_node(node);
            index.insert(node, idx);
        }
        for edge in self.graph.edge_indices() {
            let (a, b) = self
                .graph
                .edge_endpoints(edge)
                .expect("edge index from the same graph");
            graph.add_edge(index[&self.graph[a]], index[&self.graph[b]], ());
        }
        WorkingGraph { graph, index }
    }
}

/// Mutable topology copy consumed by group formation.
///
/// Shrinks strictly as nodes are evicted (satiated or uncliquable), which
/// is what guarantees the packing loop terminates.
#[derive(Debug, Clone)]
pub struct WorkingGraph {
    graph: StableUnGraph<NodeId, ()>,
    index: BTreeMap<NodeId, NodeIndex>,
}

impl WorkingGraph {
    /// Number of remaining nodes.
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    /// Whether the node is still present.
    pub fn contains(&self, node: NodeId) -> bool {
        self.index.contains_key(&node)
    }

    /// Pick a remaining node uniformly at random.
    ///
    /// Iteration feeding the RNG runs over the sorted index, so the same
    /// seed always picks the same sequence of anchors.
    pub fn choose_node<R: Rng>(&self, rng: &mut R) -> Option<NodeId> {
        let nodes: Vec<NodeId> = self.index.keys().copied().collect();
        nodes.choose(rng).copied()
    }

    /// Remaining neighbors of `node`, ascending.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let Some(&idx) = self.index.get(&node) else {
            return Vec::new();
        };
        let mut out: Vec<NodeId> = self.graph.neighbors(idx).map(|n| self.graph[n]).collect();
        out.sort_unstable();
        out
    }

    /// Evict a node and all its incident edges.
    pub fn remove_node(&mut self, node: NodeId) {
        if let Some(idx) = self.index.remove(&node) {
            self.graph.remove_node(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u32) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn interval_rejects_empty_window() {
        assert!(Interval::new(5, 5).is_err());
        assert!(Interval::new(10, 5).is_err());
        assert!(Interval::new(5, 6).is_ok());
    }

    #[test]
    fn contact_rejects_self_loop() {
        let mut g = ContactGraph::new();
        let iv = Interval::new(0, 10).unwrap();
        assert!(g.add_contact(n(1), n(1), iv).is_err());
    }

    #[test]
    fn reachability_is_strictly_inside_the_window() {
        let mut g = ContactGraph::new();
        g.add_contact(n(0), n(1), Interval::new(5, 10).unwrap())
            .unwrap();

        assert_eq!(g.recipients_in_range(n(0), 7), vec![n(1)]);
        assert!(g.recipients_in_range(n(0), 5).is_empty());
        assert!(g.recipients_in_range(n(0), 10).is_empty());
    }

    #[test]
    fn multiple_intervals_accumulate_on_one_pair() {
        let mut g = ContactGraph::new();
        g.add_contact(n(0), n(1), Interval::new(0, 3).unwrap())
            .unwrap();
        g.add_contact(n(0), n(1), Interval::new(20, 30).unwrap())
            .unwrap();

        assert_eq!(g.node_count(), 2);
        assert_eq!(g.contact_count(), 2);
        assert_eq!(g.recipients_in_range(n(1), 25), vec![n(0)]);
        assert!(g.recipients_in_range(n(1), 10).is_empty());
    }

    #[test]
    fn recipients_are_sorted() {
        let mut g = ContactGraph::new();
        let iv = Interval::new(0, 100).unwrap();
        g.add_contact(n(5), n(9), iv).unwrap();
        g.add_contact(n(5), n(2), iv).unwrap();
        g.add_contact(n(5), n(7), iv).unwrap();

        assert_eq!(g.recipients_in_range(n(5), 50), vec![n(2), n(7), n(9)]);
    }

    #[test]
    fn working_copy_shrinks_independently() {
        let mut g = ContactGraph::new();
        let iv = Interval::new(0, 10).unwrap();
        g.add_contact(n(0), n(1), iv).unwrap();
        g.add_contact(n(1), n(2), iv).unwrap();

        let mut w = g.working_copy();
        assert_eq!(w.node_count(), 3);
        assert_eq!(w.neighbors(n(1)), vec![n(0), n(2)]);

        w.remove_node(n(1));
        assert_eq!(w.node_count(), 2);
        assert!(w.neighbors(n(0)).is_empty());
        // source graph untouched
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.recipients_in_range(n(1), 5), vec![n(0), n(2)]);
    }
}

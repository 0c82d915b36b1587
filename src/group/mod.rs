//! Group formation engine.
//!
//! Partitions contact-graph nodes into overlapping key-sharing groups by
//! randomized greedy clique packing, under two capacity limits:
//! `group_limit` (max groups per node) and `group_size_limit` (max members
//! per group). The engine consumes a disposable [`WorkingGraph`] copy;
//! the contact graph itself stays read-only.
//!
//! [`WorkingGraph`]: crate::graph::WorkingGraph

use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, trace};

use crate::graph::cliques::maximal_cliques_containing;
use crate::graph::{ContactGraph, NodeId};

/// Group identifier, sequential within one [`GroupSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(u64);

impl GroupId {
    /// The raw index.
    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One key-sharing group, parameterized by the limits it was formed under.
#[derive(Debug, Clone)]
pub struct Group {
    /// Group identifier.
    pub id: GroupId,
    /// Max groups per node at formation time.
    pub group_limit: u32,
    /// Max members this group may hold.
    pub group_size_limit: u32,
    /// Member nodes, ascending.
    pub members: Vec<NodeId>,
}

/// Groups plus the node → groups membership index for one
/// (`group_limit`, `group_size_limit`) pair.
#[derive(Debug, Clone, Default)]
pub struct GroupSet {
    groups: Vec<Group>,
    memberships: BTreeMap<NodeId, Vec<GroupId>>,
}

impl GroupSet {
    /// All groups, in creation order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Look up one group by id.
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id.0 as usize)
    }

    /// The groups `node` belongs to, in join order. Empty for ungrouped nodes.
    pub fn groups_of(&self, node: NodeId) -> &[GroupId] {
        self.memberships
            .get(&node)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// How many groups `node` belongs to.
    pub fn membership_count(&self, node: NodeId) -> usize {
        self.groups_of(node).len()
    }

    /// Nodes with at least one membership, ascending.
    pub fn grouped_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.memberships.keys().copied()
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no groups were formed.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Add a group with the given members, updating the membership index.
    ///
    /// [`form_groups`] and [`baseline_groups`] are the normal producers;
    /// this is public so simulations can run against hand-built
    /// assignments. Members are stored sorted; capacity invariants are
    /// the caller's responsibility here.
    pub fn add_group(
        &mut self,
        group_limit: u32,
        group_size_limit: u32,
        mut members: Vec<NodeId>,
    ) -> GroupId {
        let id = GroupId(self.groups.len() as u64);
        members.sort_unstable();
        for &member in &members {
            self.memberships.entry(member).or_default().push(id);
        }
        self.groups.push(Group {
            id,
            group_limit,
            group_size_limit,
            members,
        });
        id
    }
}

/// Form key-sharing groups by randomized greedy clique packing.
///
/// Repeatedly picks a random anchor from the working graph, enumerates
/// the maximal cliques containing it, and tries them largest-first:
/// each candidate is truncated to `group_size_limit` members (the anchor
/// plus a random sample of the rest) and accepted only if every member
/// still sits strictly below `group_limit` memberships. Members that
/// reach `group_limit` are evicted from the working graph on the spot;
/// anchors with no clique of size ≥ 2 are evicted without a group.
///
/// Deterministic for a fixed graph and seed. Never creates singleton
/// groups, and a node may end with zero memberships.
pub fn form_groups<R: Rng>(
    graph: &ContactGraph,
    group_limit: u32,
    group_size_limit: u32,
    rng: &mut R,
) -> GroupSet {
    debug_assert!(group_limit >= 1 && group_size_limit >= 2);
    let mut working = graph.working_copy();
    let mut set = GroupSet::default();
    let mut counts: BTreeMap<NodeId, u32> = BTreeMap::new();

    while working.node_count() > 1 {
        let anchor = working.choose_node(rng).expect("working graph is non-empty");

        let mut candidates: Vec<Vec<NodeId>> = maximal_cliques_containing(&working, anchor)
            .into_iter()
            .filter(|clique| clique.len() > 1)
            .collect();
        if candidates.is_empty() {
            // No live neighbor forms a clique with this node; it can
            // never be grouped again.
            trace!(node = %anchor, "anchor has no multi-node clique, evicting");
            working.remove_node(anchor);
            continue;
        }
        // Largest cliques first; stable sort keeps discovery order on ties.
        candidates.sort_by(|a, b| b.len().cmp(&a.len()));

        let mut anchor_satiated = false;
        for clique in candidates {
            let members = truncate_clique(&clique, anchor, group_size_limit as usize, rng);

            // Candidates enumerated before earlier acceptances in this
            // round may reference members that have since been satiated.
            let feasible = members
                .iter()
                .all(|m| counts.get(m).copied().unwrap_or(0) < group_limit);
            if !feasible {
                continue;
            }

            let id = set.add_group(group_limit, group_size_limit, members.clone());
            trace!(group = %id, size = members.len(), "group formed");
            for member in members {
                let count = counts.entry(member).or_insert(0);
                *count += 1;
                if *count == group_limit {
                    working.remove_node(member);
                    if member == anchor {
                        anchor_satiated = true;
                    }
                }
            }
            if anchor_satiated {
                break;
            }
        }
    }

    debug!(
        groups = set.len(),
        group_limit, group_size_limit, "group formation finished"
    );
    set
}

/// Single shared key for the whole population: one group containing every
/// node, `group_limit = 1`, `group_size_limit = node_count`. Used as the
/// control case; bypasses the packing algorithm entirely.
pub fn baseline_groups(graph: &ContactGraph) -> GroupSet {
    let mut set = GroupSet::default();
    let members: Vec<NodeId> = graph.nodes().collect();
    let node_count = members.len() as u32;
    set.add_group(1, node_count, members);
    set
}

/// Truncate a candidate clique to the size limit: the anchor plus a
/// uniform sample (without replacement) of `min(len, limit) - 1` others.
fn truncate_clique<R: Rng>(
    clique: &[NodeId],
    anchor: NodeId,
    group_size_limit: usize,
    rng: &mut R,
) -> Vec<NodeId> {
    let take = clique.len().min(group_size_limit) - 1;
    let others: Vec<NodeId> = clique.iter().copied().filter(|&m| m != anchor).collect();
    let mut members: Vec<NodeId> = others.choose_multiple(rng, take).copied().collect();
    members.push(anchor);
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Interval;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn n(id: u32) -> NodeId {
        NodeId::new(id)
    }

    fn ring_graph(size: u32) -> ContactGraph {
        let mut g = ContactGraph::new();
        let iv = Interval::new(0, 100).unwrap();
        for i in 0..size {
            g.add_contact(n(i), n((i + 1) % size), iv).unwrap();
        }
        g
    }

    fn dense_graph(size: u32) -> ContactGraph {
        let mut g = ContactGraph::new();
        let iv = Interval::new(0, 100).unwrap();
        for i in 0..size {
            for j in (i + 1)..size {
                g.add_contact(n(i), n(j), iv).unwrap();
            }
        }
        g
    }

    fn assert_capacity_invariant(set: &GroupSet, group_limit: u32, group_size_limit: u32) {
        for group in set.groups() {
            assert!(group.members.len() >= 2, "singleton group {:?}", group);
            assert!(
                group.members.len() <= group_size_limit as usize,
                "oversized group {:?}",
                group
            );
        }
        for node in set.grouped_nodes() {
            assert!(
                set.membership_count(node) <= group_limit as usize,
                "node {node} exceeds group_limit"
            );
        }
    }

    #[test]
    fn respects_both_capacity_limits() {
        let graph = dense_graph(12);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let set = form_groups(&graph, 3, 4, &mut rng);

        assert!(!set.is_empty());
        assert_capacity_invariant(&set, 3, 4);
    }

    #[test]
    fn never_creates_singleton_groups() {
        // A ring only has 2-cliques; every group must have exactly 2 members.
        let graph = ring_graph(9);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let set = form_groups(&graph, 2, 5, &mut rng);

        for group in set.groups() {
            assert_eq!(group.members.len(), 2);
        }
        assert_capacity_invariant(&set, 2, 5);
    }

    #[test]
    fn isolated_nodes_end_up_ungrouped() {
        let mut graph = ring_graph(4);
        graph.add_node(n(99));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let set = form_groups(&graph, 2, 3, &mut rng);

        assert_eq!(set.membership_count(n(99)), 0);
        assert!(set.groups_of(n(99)).is_empty());
    }

    #[test]
    fn deterministic_for_a_fixed_seed() {
        let graph = dense_graph(10);
        let run = |seed: u64| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let set = form_groups(&graph, 2, 4, &mut rng);
            set.groups()
                .iter()
                .map(|g| g.members.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(run(42), run(42));
    }

    #[test]
    fn membership_index_matches_group_members() {
        let graph = dense_graph(8);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let set = form_groups(&graph, 2, 3, &mut rng);

        for group in set.groups() {
            for &member in &group.members {
                assert!(set.groups_of(member).contains(&group.id));
            }
        }
        for node in set.grouped_nodes() {
            for &gid in set.groups_of(node) {
                assert!(set.group(gid).unwrap().members.contains(&node));
            }
        }
    }

    #[test]
    fn baseline_is_one_group_of_everyone() {
        let graph = ring_graph(6);
        let set = baseline_groups(&graph);

        assert_eq!(set.len(), 1);
        let group = &set.groups()[0];
        assert_eq!(group.group_limit, 1);
        assert_eq!(group.group_size_limit, 6);
        assert_eq!(group.members.len(), 6);
        for node in graph.nodes() {
            assert_eq!(set.groups_of(node), &[GroupId(0)]);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn capacity_invariant_holds_on_random_graphs(
                seed in any::<u64>(),
                edges in proptest::collection::vec((0u32..16, 0u32..16), 1..60),
                group_limit in 1u32..4,
                group_size_limit in 2u32..6,
            ) {
                let mut graph = ContactGraph::new();
                let iv = Interval::new(0, 10).unwrap();
                for (a, b) in edges {
                    if a != b {
                        graph.add_contact(n(a), n(b), iv).unwrap();
                    }
                }
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let set = form_groups(&graph, group_limit, group_size_limit, &mut rng);
                assert_capacity_invariant(&set, group_limit, group_size_limit);
            }
        }
    }
}

//! Maximal-clique enumeration anchored at one node.
//!
//! Group formation only ever needs the maximal cliques that contain the
//! anchor it just picked, not the whole graph's clique set, so the
//! Bron–Kerbosch recursion starts with `R = {anchor}`, `P = N(anchor)`.

use super::{NodeId, WorkingGraph};

/// All maximal cliques of `graph` that contain `anchor`.
///
/// Returns an empty list for a node not in the graph, and the singleton
/// `[anchor]` for an isolated node (callers filter on size). Enumeration
/// order is deterministic: candidate sets are sorted node-id vectors.
pub fn maximal_cliques_containing(graph: &WorkingGraph, anchor: NodeId) -> Vec<Vec<NodeId>> {
    if !graph.contains(anchor) {
        return Vec::new();
    }
    let mut cliques = Vec::new();
    let mut r = vec![anchor];
    bron_kerbosch(graph, &mut r, graph.neighbors(anchor), Vec::new(), &mut cliques);
    cliques
}

/// Bron–Kerbosch with pivoting over sorted `Vec` sets.
///
/// `p` stays sorted (it is only ever filtered), which keeps the
/// `binary_search` membership tests valid.
fn bron_kerbosch(
    graph: &WorkingGraph,
    r: &mut Vec<NodeId>,
    mut p: Vec<NodeId>,
    mut x: Vec<NodeId>,
    out: &mut Vec<Vec<NodeId>>,
) {
    if p.is_empty() && x.is_empty() {
        out.push(r.clone());
        return;
    }

    // Pivot on the vertex of P ∪ X with the most neighbors in P, so only
    // non-neighbors of the pivot are expanded.
    let pivot = p
        .iter()
        .chain(x.iter())
        .copied()
        .max_by_key(|&u| {
            let nu = graph.neighbors(u);
            p.iter().filter(|v| nu.binary_search(v).is_ok()).count()
        })
        .expect("P union X is non-empty");
    let pivot_neighbors = graph.neighbors(pivot);

    let candidates: Vec<NodeId> = p
        .iter()
        .copied()
        .filter(|v| pivot_neighbors.binary_search(v).is_err())
        .collect();

    for v in candidates {
        let nv = graph.neighbors(v);
        r.push(v);
        let p_next = p
            .iter()
            .copied()
            .filter(|u| nv.binary_search(u).is_ok())
            .collect();
        let x_next = x
            .iter()
            .copied()
            .filter(|u| nv.binary_search(u).is_ok())
            .collect();
        bron_kerbosch(graph, r, p_next, x_next, out);
        r.pop();

        p.retain(|&u| u != v);
        x.push(v);
    }
}

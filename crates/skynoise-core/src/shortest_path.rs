//! Binary-heap Dijkstra over the navigation graph's materialised weights.

use crate::nav_graph::{NavGraph, NodeId, NO_NODE};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OpenNode {
    cost: FloatOrd,
    node: NodeId,
}

/// Shortest-path tree rooted at `source`, as a predecessor array.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortestPathTree {
    pub source: NodeId,
    /// `predecessors[v]` is the node before `v` on its shortest path;
    /// `NO_NODE` for the source and for unreachable nodes.
    pub predecessors: Vec<NodeId>,
}

impl ShortestPathTree {
    pub fn reaches(&self, target: NodeId) -> bool {
        target == self.source
            || self
                .predecessors
                .get(target as usize)
                .is_some_and(|pred| *pred != NO_NODE)
    }

    /// Node sequence from the source to `target`, inclusive.
    pub fn path_to(&self, target: NodeId) -> Option<Vec<NodeId>> {
        if !self.reaches(target) {
            return None;
        }
        let mut path = vec![target];
        let mut current = target;
        while current != self.source {
            current = self.predecessors[current as usize];
            path.push(current);
            if path.len() > self.predecessors.len() {
                // A cycle would mean a corrupted tree.
                return None;
            }
        }
        path.reverse();
        Some(path)
    }
}

/// Full single-source tree.
pub fn dijkstra_tree(graph: &NavGraph, source: NodeId) -> ShortestPathTree {
    let (predecessors, _) = run(graph, source, None);
    ShortestPathTree {
        source,
        predecessors,
    }
}

/// Single-pair query; stops as soon as `target` is settled.
pub fn shortest_path(graph: &NavGraph, source: NodeId, target: NodeId) -> Option<Vec<NodeId>> {
    if source as usize >= graph.node_count() || target as usize >= graph.node_count() {
        return None;
    }
    let (predecessors, _) = run(graph, source, Some(target));
    ShortestPathTree {
        source,
        predecessors,
    }
    .path_to(target)
}

/// Total materialised weight along `path`.
pub fn path_cost(graph: &NavGraph, path: &[NodeId]) -> f64 {
    path.windows(2)
        .filter_map(|pair| graph.find_edge(pair[0], pair[1]))
        .map(|edge| graph.edge_weight(edge))
        .sum()
}

fn run(graph: &NavGraph, source: NodeId, target: Option<NodeId>) -> (Vec<NodeId>, Vec<f64>) {
    let n = graph.node_count();
    let mut dist = vec![f64::INFINITY; n];
    let mut predecessors = vec![NO_NODE; n];
    let mut settled = vec![false; n];
    if source as usize >= n {
        return (predecessors, dist);
    }

    let mut open_set: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();
    dist[source as usize] = 0.0;
    open_set.push(Reverse(OpenNode {
        cost: FloatOrd(0.0),
        node: source,
    }));

    while let Some(Reverse(current)) = open_set.pop() {
        let u = current.node as usize;
        if settled[u] {
            continue;
        }
        settled[u] = true;
        if Some(current.node) == target {
            break;
        }

        let base = dist[u];
        for edge in graph.edge_range(current.node) {
            let v = graph.edge_target(edge);
            if settled[v as usize] {
                continue;
            }
            let tentative = base + graph.edge_weight(edge);
            if tentative < dist[v as usize] {
                dist[v as usize] = tentative;
                predecessors[v as usize] = current.node;
                open_set.push(Reverse(OpenNode {
                    cost: FloatOrd(tentative),
                    node: v,
                }));
            }
        }
    }

    (predecessors, dist)
}

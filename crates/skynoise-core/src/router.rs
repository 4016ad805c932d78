//! Warehouse-anchored shortest-path router.
//!
//! Almost every route starts or ends at a warehouse, so the router keeps one
//! full shortest-path tree per warehouse anchor node. Trees are persisted to
//! `{base}__src_{source}{ext}` files tagged by the weight identity and built
//! one at a time. Only one tree is held in memory; asking for another source
//! evicts it. Pairs that touch no anchor fall back to a single-pair search.

use crate::error::{PlanningError, Result};
use crate::models::Coordinate;
use crate::nav_graph::{NavGraph, NodeId};
use crate::persist;
use crate::shortest_path::{dijkstra_tree, shortest_path, ShortestPathTree};
use crate::weights::WeightFn;
use bitcode::{Decode, Encode};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CACHE_EXT: &str = ".bin";
const CACHE_PREFIX: &str = "warehouse_paths";

/// On-disk tree. The fingerprint and weight id guard against stale files.
#[derive(Debug, Encode, Decode)]
struct CachedTree {
    graph_fingerprint: u64,
    weight_id: String,
    source: NodeId,
    predecessors: Vec<NodeId>,
}

/// Counters for how routes were resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub forward_hits: u64,
    pub reverse_hits: u64,
    pub fallbacks: u64,
    pub trees_loaded: u64,
    pub trees_computed: u64,
}

#[derive(Debug, Clone)]
struct PathCache {
    dir: PathBuf,
    weight_id: String,
}

impl PathCache {
    fn base_name(&self) -> String {
        format!("{}_{}", CACHE_PREFIX, safe_id(&self.weight_id))
    }

    fn file_for(&self, graph: &NavGraph, source: NodeId) -> PathBuf {
        let (row, col) = graph.node_cell(source);
        self.dir.join(format!(
            "{}__src_{}{}",
            self.base_name(),
            safe_id(&format!("r{row}_c{col}")),
            CACHE_EXT
        ))
    }
}

pub struct WarehouseRouter {
    graph: Arc<NavGraph>,
    anchors: BTreeSet<NodeId>,
    cache: Option<PathCache>,
    current: Option<ShortestPathTree>,
    stats: RouterStats,
}

impl WarehouseRouter {
    /// Prepare a router for `weight` over `graph`, anchoring a tree at the
    /// node nearest each warehouse. With a `cache_dir`, missing or stale
    /// per-source files are computed now, sequentially.
    pub fn new(
        graph: Arc<NavGraph>,
        weight: &WeightFn,
        warehouses: &[Coordinate],
        cache_dir: Option<&Path>,
    ) -> Result<Self> {
        let weight_id = weight.weight_id();
        let graph = if weight_id.is_some() && graph.weight_id() == weight_id.as_deref() {
            graph
        } else {
            Arc::new(graph.with_weight(weight))
        };

        let anchors: BTreeSet<NodeId> = warehouses
            .iter()
            .filter_map(|warehouse| graph.nearest_node(warehouse))
            .collect();

        let cache = match (cache_dir, weight_id) {
            (Some(dir), Some(weight_id)) => Some(PathCache {
                dir: dir.to_path_buf(),
                weight_id,
            }),
            (Some(dir), None) => {
                tracing::warn!(
                    dir = %dir.display(),
                    "custom weight has no weight id; warehouse path cache disabled"
                );
                None
            }
            (None, _) => None,
        };

        let mut router = Self {
            graph,
            anchors,
            cache,
            current: None,
            stats: RouterStats::default(),
        };
        router.warm_cache()?;
        Ok(router)
    }

    fn warm_cache(&mut self) -> Result<()> {
        let Some(cache) = self.cache.clone() else {
            return Ok(());
        };
        let anchors: Vec<NodeId> = self.anchors.iter().copied().collect();
        for source in anchors {
            let path = cache.file_for(&self.graph, source);
            if self.read_fresh(&cache, &path, source).is_some() {
                continue;
            }
            let tree = dijkstra_tree(&self.graph, source);
            self.stats.trees_computed += 1;
            self.write_tree(&cache, &path, &tree)?;
            tracing::info!(source, path = %path.display(), "cached warehouse shortest-path tree");
        }
        Ok(())
    }

    pub fn graph(&self) -> &Arc<NavGraph> {
        &self.graph
    }

    pub fn anchors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.anchors.iter().copied()
    }

    pub fn is_anchor(&self, node: NodeId) -> bool {
        self.anchors.contains(&node)
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Source of the tree currently held in memory.
    pub fn resident_source(&self) -> Option<NodeId> {
        self.current.as_ref().map(|tree| tree.source)
    }

    /// Node path from `source` to `target`.
    pub fn get_route(
        &mut self,
        source: NodeId,
        target: NodeId,
    ) -> std::result::Result<Vec<NodeId>, PlanningError> {
        if self.graph.node_count() == 0 {
            return Err(PlanningError::EmptyGraph);
        }

        if self.is_anchor(source) {
            if let Some(path) = self.tree_for(source).path_to(target) {
                self.stats.forward_hits += 1;
                return Ok(path);
            }
        } else if self.is_anchor(target) {
            if let Some(mut path) = self.tree_for(target).path_to(source) {
                path.reverse();
                self.stats.reverse_hits += 1;
                return Ok(path);
            }
        }

        self.stats.fallbacks += 1;
        shortest_path(&self.graph, source, target).ok_or(PlanningError::NoPath {
            from: source,
            to: target,
        })
    }

    /// Node-centroid polyline between the nodes nearest `start` and `end`.
    pub fn route_polyline(
        &mut self,
        start: &Coordinate,
        end: &Coordinate,
    ) -> std::result::Result<Vec<Coordinate>, PlanningError> {
        let source = self.graph.nearest_node(start).ok_or(PlanningError::EmptyGraph)?;
        let target = self.graph.nearest_node(end).ok_or(PlanningError::EmptyGraph)?;
        let nodes = self.get_route(source, target)?;
        Ok(nodes.iter().map(|node| self.graph.position(*node)).collect())
    }

    fn tree_for(&mut self, source: NodeId) -> &ShortestPathTree {
        let tree = match self.current.take() {
            Some(tree) if tree.source == source => tree,
            _ => self.load_or_compute(source),
        };
        &*self.current.insert(tree)
    }

    fn load_or_compute(&mut self, source: NodeId) -> ShortestPathTree {
        let Some(cache) = self.cache.clone() else {
            self.stats.trees_computed += 1;
            return dijkstra_tree(&self.graph, source);
        };
        let path = cache.file_for(&self.graph, source);
        if let Some(predecessors) = self.read_fresh(&cache, &path, source) {
            self.stats.trees_loaded += 1;
            return ShortestPathTree {
                source,
                predecessors,
            };
        }
        let tree = dijkstra_tree(&self.graph, source);
        self.stats.trees_computed += 1;
        if let Err(err) = self.write_tree(&cache, &path, &tree) {
            tracing::warn!(source, error = %err, "failed to persist shortest-path tree");
        }
        tree
    }

    /// Predecessors stored at `path`, if the file matches this graph and weight.
    fn read_fresh(&self, cache: &PathCache, path: &Path, source: NodeId) -> Option<Vec<NodeId>> {
        if !path.exists() {
            return None;
        }
        let cached: CachedTree = match persist::read_binary(path) {
            Ok(cached) => cached,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unreadable path cache file");
                return None;
            }
        };
        let fresh = cached.graph_fingerprint == self.graph.fingerprint()
            && cached.weight_id == cache.weight_id
            && cached.source == source
            && cached.predecessors.len() == self.graph.node_count();
        if !fresh {
            tracing::debug!(path = %path.display(), "stale path cache file");
            return None;
        }
        Some(cached.predecessors)
    }

    fn write_tree(&self, cache: &PathCache, path: &Path, tree: &ShortestPathTree) -> Result<()> {
        let cached = CachedTree {
            graph_fingerprint: self.graph.fingerprint(),
            weight_id: cache.weight_id.clone(),
            source: tree.source,
            predecessors: tree.predecessors.clone(),
        };
        persist::write_binary(path, &cached)
    }
}

/// File-name-safe rendering of an identifier.
pub fn safe_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav_graph::lattice_nodes;
    use crate::persist::test_dir;
    use crate::weights::{CustomWeight, MixedWeight};

    fn graph() -> Arc<NavGraph> {
        let nodes = lattice_nodes(6, 6, 100.0, Coordinate::new(0.0, 0.0), |r, c| {
            40.0 + ((r * 7 + c * 3) % 5) as f64 * 6.0
        });
        Arc::new(NavGraph::from_nodes(&nodes, 100.0).unwrap())
    }

    fn warehouses() -> Vec<Coordinate> {
        vec![Coordinate::new(50.0, 50.0), Coordinate::new(550.0, 550.0)]
    }

    #[test]
    fn test_safe_id() {
        assert_eq!(safe_id("mixed a/0.25"), "mixed_a_0.25");
    }

    #[test]
    fn test_forward_and_reverse_lookups() {
        let graph = graph();
        let mut router = WarehouseRouter::new(graph.clone(), &WeightFn::NoiseFavoured, &warehouses(), None).unwrap();
        let anchor = graph.node_at(0, 0).unwrap();
        let other = graph.node_at(3, 4).unwrap();
        assert!(router.is_anchor(anchor));

        let forward = router.get_route(anchor, other).unwrap();
        assert_eq!(forward.first(), Some(&anchor));
        assert_eq!(forward.last(), Some(&other));

        let backward = router.get_route(other, anchor).unwrap();
        assert_eq!(backward.first(), Some(&other));
        assert_eq!(backward.last(), Some(&anchor));

        let stats = router.stats();
        assert_eq!(stats.forward_hits, 1);
        assert_eq!(stats.reverse_hits, 1);
        assert_eq!(stats.fallbacks, 0);
    }

    #[test]
    fn test_fallback_for_non_anchor_pairs() {
        let graph = graph();
        let mut router = WarehouseRouter::new(graph.clone(), &WeightFn::Distance, &warehouses(), None).unwrap();
        let a = graph.node_at(2, 1).unwrap();
        let b = graph.node_at(4, 3).unwrap();
        let path = router.get_route(a, b).unwrap();
        assert_eq!(path.first(), Some(&a));
        assert_eq!(path.last(), Some(&b));
        assert_eq!(router.stats().fallbacks, 1);
    }

    #[test]
    fn test_single_resident_tree() {
        let graph = graph();
        let mut router = WarehouseRouter::new(graph.clone(), &WeightFn::NoiseFavoured, &warehouses(), None).unwrap();
        let first = graph.node_at(0, 0).unwrap();
        let second = graph.node_at(5, 5).unwrap();
        let mid = graph.node_at(2, 2).unwrap();
        router.get_route(first, mid).unwrap();
        assert_eq!(router.resident_source(), Some(first));
        router.get_route(second, mid).unwrap();
        assert_eq!(router.resident_source(), Some(second));
    }

    #[test]
    fn test_cache_files_are_written_and_reused() {
        let dir = test_dir("router_cache");
        let graph = graph();
        let weight = WeightFn::Mixed(MixedWeight::new(0.5, false, 100.0, graph.noise_stats()));

        let mut cold = WarehouseRouter::new(graph.clone(), &weight, &warehouses(), Some(&dir)).unwrap();
        assert_eq!(cold.stats().trees_computed, 2);
        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 2);
        let expected = dir.join("warehouse_paths_mixed_a050_hi__src_r0_c0.bin");
        assert!(expected.exists(), "missing {}", expected.display());

        let mut warm = WarehouseRouter::new(graph.clone(), &weight, &warehouses(), Some(&dir)).unwrap();
        assert_eq!(warm.stats().trees_computed, 0);

        let source = graph.node_at(0, 0).unwrap();
        let target = graph.node_at(4, 2).unwrap();
        let a = cold.get_route(source, target).unwrap();
        let b = warm.get_route(source, target).unwrap();
        let c = warm.get_route(source, target).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(warm.stats().trees_loaded, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_custom_weight_without_id_disables_cache() {
        let dir = test_dir("router_custom");
        let weight = WeightFn::Custom(CustomWeight {
            id: None,
            func: Arc::new(|edge| edge.distance * 2.0),
        });
        let router = WarehouseRouter::new(graph(), &weight, &warehouses(), Some(&dir)).unwrap();
        assert!(!router.cache_enabled());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! 8-connected navigation lattice stored in compressed sparse row form.
//!
//! Nodes are addressed by a dense `u32` id. Outgoing edges of node `n` live in
//! `offsets[n]..offsets[n + 1]` of the parallel `targets`, `distances`,
//! `edge_noise` and `weights` arrays.

use crate::baseline::BaselineCell;
use crate::error::{Result, SimError};
use crate::models::Coordinate;
use crate::persist;
use crate::spatial::KdTree;
use crate::weights::{EdgeAttrs, NoiseStats, WeightFn};
use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use xxhash_rust::xxh64::Xxh64;

pub type NodeId = u32;

/// Sentinel for "no node".
pub const NO_NODE: NodeId = u32::MAX;

const NEIGHBOUR_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Persisted form of a node. Positions are optional in the file so a missing
/// one is reported instead of silently defaulting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct NavNode {
    pub row: u32,
    pub col: u32,
    #[serde(default)]
    pub easting: Option<f64>,
    #[serde(default)]
    pub northing: Option<f64>,
    /// Baseline level, dB
    pub noise: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct NavEdge {
    pub u: u32,
    pub v: u32,
    pub distance: f64,
    pub noise: f64,
}

/// Node and edge lists as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct GraphFile {
    pub cell_size_m: f64,
    pub nodes: Vec<NavNode>,
    pub edges: Vec<NavEdge>,
}

#[derive(Debug, Clone)]
pub struct NavGraph {
    cell_size_m: f64,
    rows: u32,
    cols: u32,
    /// Grid slot -> node id, `NO_NODE` where the lattice has a hole.
    slots: Vec<NodeId>,
    cells: Vec<(u32, u32)>,
    positions: Vec<Coordinate>,
    noise: Vec<f64>,
    offsets: Vec<u32>,
    targets: Vec<NodeId>,
    distances: Vec<f64>,
    edge_noise: Vec<f64>,
    weights: Vec<f64>,
    weight_id: Option<String>,
    fingerprint: u64,
    index: KdTree,
}

impl NavGraph {
    /// Build the lattice from nodes, linking each to its in-grid neighbours.
    pub fn from_nodes(nodes: &[NavNode], cell_size_m: f64) -> Result<Self> {
        if !(cell_size_m > 0.0) {
            return Err(SimError::invalid_config(format!(
                "navigation cell size must be positive, got {cell_size_m}"
            )));
        }
        let lookup = node_lookup(nodes)?;
        let diagonal = cell_size_m * std::f64::consts::SQRT_2;

        let mut edges = Vec::with_capacity(nodes.len() * 8);
        for (u, node) in nodes.iter().enumerate() {
            for (dr, dc) in NEIGHBOUR_OFFSETS {
                let row = node.row as i64 + dr;
                let col = node.col as i64 + dc;
                if row < 0 || col < 0 {
                    continue;
                }
                let Some(&v) = lookup.get(&(row as u32, col as u32)) else {
                    continue;
                };
                let distance = if dr != 0 && dc != 0 { diagonal } else { cell_size_m };
                edges.push(NavEdge {
                    u: u as u32,
                    v,
                    distance,
                    noise: (node.noise + nodes[v as usize].noise) / 2.0,
                });
            }
        }

        Self::assemble(GraphFile {
            cell_size_m,
            nodes: nodes.to_vec(),
            edges,
        })
    }

    /// Build from baseline cells at navigation resolution.
    pub fn from_baseline(cells: &[BaselineCell], cell_size_m: f64) -> Result<Self> {
        let nodes: Vec<NavNode> = cells
            .iter()
            .map(|cell| NavNode {
                row: cell.row,
                col: cell.col,
                easting: cell.centroid.map(|c| c.easting),
                northing: cell.centroid.map(|c| c.northing),
                noise: cell.noise_level,
            })
            .collect();
        Self::from_nodes(&nodes, cell_size_m)
    }

    fn assemble(file: GraphFile) -> Result<Self> {
        let GraphFile {
            cell_size_m,
            nodes,
            edges,
        } = file;
        let node_count = nodes.len();

        let mut positions = Vec::with_capacity(node_count);
        let mut cells = Vec::with_capacity(node_count);
        let mut noise = Vec::with_capacity(node_count);
        let mut rows = 0u32;
        let mut cols = 0u32;
        for node in &nodes {
            let (Some(easting), Some(northing)) = (node.easting, node.northing) else {
                return Err(SimError::MissingCoordinate {
                    row: node.row,
                    col: node.col,
                });
            };
            positions.push(Coordinate::new(northing, easting));
            cells.push((node.row, node.col));
            noise.push(node.noise);
            rows = rows.max(node.row + 1);
            cols = cols.max(node.col + 1);
        }

        let mut slots = vec![NO_NODE; rows as usize * cols as usize];
        for (id, (row, col)) in cells.iter().enumerate() {
            let slot = *row as usize * cols as usize + *col as usize;
            if slots[slot] != NO_NODE {
                return Err(SimError::invalid_config(format!(
                    "duplicate navigation node at ({row}, {col})"
                )));
            }
            slots[slot] = id as NodeId;
        }

        // Counting sort of edges by source node.
        let mut offsets = vec![0u32; node_count + 1];
        for edge in &edges {
            if edge.u as usize >= node_count || edge.v as usize >= node_count {
                return Err(SimError::invalid_config(format!(
                    "edge ({}, {}) references a missing node",
                    edge.u, edge.v
                )));
            }
            offsets[edge.u as usize + 1] += 1;
        }
        for i in 0..node_count {
            offsets[i + 1] += offsets[i];
        }
        let mut cursor = offsets.clone();
        let mut targets = vec![NO_NODE; edges.len()];
        let mut distances = vec![0.0; edges.len()];
        let mut edge_noise = vec![0.0; edges.len()];
        for edge in &edges {
            let at = cursor[edge.u as usize] as usize;
            cursor[edge.u as usize] += 1;
            targets[at] = edge.v;
            distances[at] = edge.distance.max(0.0);
            edge_noise[at] = edge.noise;
        }

        let fingerprint = fingerprint(cell_size_m, &cells, &offsets, &targets, &distances, &edge_noise);
        let index = KdTree::new(positions.clone());

        let mut graph = Self {
            cell_size_m,
            rows,
            cols,
            slots,
            cells,
            positions,
            noise,
            offsets,
            targets,
            distances,
            edge_noise,
            weights: Vec::new(),
            weight_id: None,
            fingerprint,
            index,
        };
        graph.materialise(&WeightFn::NoiseFavoured);
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            rows,
            cols,
            "assembled navigation graph"
        );
        Ok(graph)
    }

    /// Evaluate `weight` once per edge and store it as the edge weight.
    pub fn materialise(&mut self, weight: &WeightFn) {
        self.weights = (0..self.targets.len())
            .map(|edge| weight.weight(self.edge(edge)))
            .collect();
        self.weight_id = weight.weight_id();
    }

    /// Copy of this graph with `weight` materialised.
    pub fn with_weight(&self, weight: &WeightFn) -> Self {
        let mut graph = self.clone();
        graph.materialise(weight);
        graph
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of directed edge entries (twice the undirected count).
    pub fn edge_count(&self) -> usize {
        self.targets.len()
    }

    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    pub fn dims(&self) -> (u32, u32) {
        (self.rows, self.cols)
    }

    pub fn position(&self, node: NodeId) -> Coordinate {
        self.positions[node as usize]
    }

    pub fn node_noise(&self, node: NodeId) -> f64 {
        self.noise[node as usize]
    }

    pub fn node_cell(&self, node: NodeId) -> (u32, u32) {
        self.cells[node as usize]
    }

    /// Node at lattice address `(row, col)`, if present.
    pub fn node_at(&self, row: u32, col: u32) -> Option<NodeId> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let node = self.slots[row as usize * self.cols as usize + col as usize];
        (node != NO_NODE).then_some(node)
    }

    /// Node closest to `point`.
    pub fn nearest_node(&self, point: &Coordinate) -> Option<NodeId> {
        self.index.nearest(point).map(|idx| idx as NodeId)
    }

    /// Edge index range of `node`'s outgoing edges.
    #[inline(always)]
    pub fn edge_range(&self, node: NodeId) -> std::ops::Range<usize> {
        self.offsets[node as usize] as usize..self.offsets[node as usize + 1] as usize
    }

    #[inline(always)]
    pub fn edge_target(&self, edge: usize) -> NodeId {
        self.targets[edge]
    }

    #[inline(always)]
    pub fn edge_weight(&self, edge: usize) -> f64 {
        self.weights[edge]
    }

    pub fn edge(&self, edge: usize) -> EdgeAttrs {
        EdgeAttrs {
            distance: self.distances[edge],
            noise: self.edge_noise[edge],
        }
    }

    /// Edge from `u` to `v`, if they are neighbours.
    pub fn find_edge(&self, u: NodeId, v: NodeId) -> Option<usize> {
        self.edge_range(u).find(|&edge| self.targets[edge] == v)
    }

    /// Identity of the currently materialised weight.
    pub fn weight_id(&self) -> Option<&str> {
        self.weight_id.as_deref()
    }

    /// Hash of the lattice geometry and edge attributes.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn noise_stats(&self) -> NoiseStats {
        NoiseStats::from_levels(&self.noise)
    }

    /// Sum of edge lengths along a node path.
    pub fn path_length(&self, path: &[NodeId]) -> f64 {
        path.windows(2)
            .map(|pair| {
                self.find_edge(pair[0], pair[1])
                    .map(|edge| self.distances[edge])
                    .unwrap_or_else(|| self.position(pair[0]).distance(&self.position(pair[1])))
            })
            .sum()
    }

    pub fn to_file(&self) -> GraphFile {
        let nodes = (0..self.node_count())
            .map(|id| {
                let (row, col) = self.cells[id];
                let position = self.positions[id];
                NavNode {
                    row,
                    col,
                    easting: Some(position.easting),
                    northing: Some(position.northing),
                    noise: self.noise[id],
                }
            })
            .collect();
        let mut edges = Vec::with_capacity(self.edge_count());
        for u in 0..self.node_count() as NodeId {
            for edge in self.edge_range(u) {
                edges.push(NavEdge {
                    u,
                    v: self.targets[edge],
                    distance: self.distances[edge],
                    noise: self.edge_noise[edge],
                });
            }
        }
        GraphFile {
            cell_size_m: self.cell_size_m,
            nodes,
            edges,
        }
    }

    /// Write the readable JSON and the binary form.
    pub fn save(&self, json_path: &Path, binary_path: &Path) -> Result<()> {
        let file = self.to_file();
        persist::write_json(json_path, &file)?;
        persist::write_binary(binary_path, &file)?;
        tracing::info!(
            json = %json_path.display(),
            binary = %binary_path.display(),
            "saved navigation graph"
        );
        Ok(())
    }

    /// Load the graph, preferring the binary file. When only the JSON exists
    /// the binary is written from it for next time.
    pub fn load(json_path: &Path, binary_path: &Path) -> Result<Self> {
        if binary_path.exists() {
            match persist::read_binary::<GraphFile>(binary_path) {
                Ok(file) => return Self::assemble(file),
                Err(err) => tracing::warn!(
                    path = %binary_path.display(),
                    error = %err,
                    "binary navigation graph unreadable, falling back to JSON"
                ),
            }
        }
        let file: GraphFile = persist::read_json(json_path)
            .map_err(|err| err.with_context(format!("reading {}", json_path.display())))?;
        if let Err(err) = persist::write_binary(binary_path, &file) {
            tracing::warn!(error = %err, "could not write binary navigation graph");
        }
        Self::assemble(file)
    }
}

fn node_lookup(nodes: &[NavNode]) -> Result<HashMap<(u32, u32), NodeId>> {
    let mut lookup = HashMap::with_capacity(nodes.len());
    for (id, node) in nodes.iter().enumerate() {
        if lookup.insert((node.row, node.col), id as NodeId).is_some() {
            return Err(SimError::invalid_config(format!(
                "duplicate navigation node at ({}, {})",
                node.row, node.col
            )));
        }
    }
    Ok(lookup)
}

fn fingerprint(
    cell_size_m: f64,
    cells: &[(u32, u32)],
    offsets: &[u32],
    targets: &[NodeId],
    distances: &[f64],
    edge_noise: &[f64],
) -> u64 {
    let mut hasher = Xxh64::new(0);
    hasher.update(&cell_size_m.to_bits().to_le_bytes());
    for (row, col) in cells {
        hasher.update(&row.to_le_bytes());
        hasher.update(&col.to_le_bytes());
    }
    for offset in offsets {
        hasher.update(&offset.to_le_bytes());
    }
    for ((target, distance), noise) in targets.iter().zip(distances).zip(edge_noise) {
        hasher.update(&target.to_le_bytes());
        hasher.update(&distance.to_bits().to_le_bytes());
        hasher.update(&noise.to_bits().to_le_bytes());
    }
    hasher.digest()
}

/// Nodes of a `rows x cols` lattice with `cell_size_m` spacing whose noise is
/// given by `noise(row, col)`. Used by tests and demo scenarios.
pub fn lattice_nodes(
    rows: u32,
    cols: u32,
    cell_size_m: f64,
    origin: Coordinate,
    noise: impl Fn(u32, u32) -> f64,
) -> Vec<NavNode> {
    let mut nodes = Vec::with_capacity(rows as usize * cols as usize);
    for row in 0..rows {
        for col in 0..cols {
            nodes.push(NavNode {
                row,
                col,
                easting: Some(origin.easting + (col as f64 + 0.5) * cell_size_m),
                northing: Some(origin.northing + (row as f64 + 0.5) * cell_size_m),
                noise: noise(row, col),
            });
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::test_dir;

    fn three_by_three() -> NavGraph {
        let nodes = lattice_nodes(3, 3, 100.0, Coordinate::new(0.0, 0.0), |r, c| {
            if r == 1 && c == 1 {
                80.0
            } else {
                40.0
            }
        });
        NavGraph::from_nodes(&nodes, 100.0).unwrap()
    }

    #[test]
    fn test_lattice_edge_counts() {
        let graph = three_by_three();
        assert_eq!(graph.node_count(), 9);
        // 12 rook + 8 diagonal undirected edges, stored both ways.
        assert_eq!(graph.edge_count(), 40);
        let centre = graph.node_at(1, 1).unwrap();
        assert_eq!(graph.edge_range(centre).len(), 8);
        let corner = graph.node_at(0, 0).unwrap();
        assert_eq!(graph.edge_range(corner).len(), 3);
    }

    #[test]
    fn test_edge_attributes() {
        let graph = three_by_three();
        let corner = graph.node_at(0, 0).unwrap();
        let centre = graph.node_at(1, 1).unwrap();
        let right = graph.node_at(0, 1).unwrap();

        let diagonal = graph.edge(graph.find_edge(corner, centre).unwrap());
        assert!((diagonal.distance - 100.0 * std::f64::consts::SQRT_2).abs() < 1e-9);
        assert_eq!(diagonal.noise, 60.0);

        let rook = graph.edge(graph.find_edge(corner, right).unwrap());
        assert_eq!(rook.distance, 100.0);
        assert_eq!(rook.noise, 40.0);

        // Symmetric.
        let back = graph.edge(graph.find_edge(centre, corner).unwrap());
        assert_eq!(back, diagonal);
    }

    #[test]
    fn test_default_weight_is_noise_favoured() {
        let graph = three_by_three();
        assert_eq!(graph.weight_id(), Some("weight"));
        let corner = graph.node_at(0, 0).unwrap();
        let right = graph.node_at(0, 1).unwrap();
        let edge = graph.find_edge(corner, right).unwrap();
        assert_eq!(graph.edge_weight(edge), 100.0 / 40.0);
    }

    #[test]
    fn test_missing_coordinate_is_fatal() {
        let nodes = vec![NavNode { row: 0, col: 0, easting: None, northing: Some(1.0), noise: 50.0 }];
        let err = NavGraph::from_nodes(&nodes, 100.0).unwrap_err();
        assert!(matches!(err, SimError::MissingCoordinate { row: 0, col: 0 }));
    }

    #[test]
    fn test_nearest_node() {
        let graph = three_by_three();
        let node = graph.nearest_node(&Coordinate::new(260.0, 40.0)).unwrap();
        assert_eq!(graph.node_cell(node), (2, 0));
    }

    #[test]
    fn test_load_prefers_binary_and_creates_it_lazily() {
        let dir = test_dir("nav_graph_load");
        let json = dir.join("graph.json");
        let binary = dir.join("graph.bin");
        let graph = three_by_three();
        persist::write_json(&json, &graph.to_file()).unwrap();
        assert!(!binary.exists());

        let loaded = NavGraph::load(&json, &binary).unwrap();
        assert!(binary.exists());
        assert_eq!(loaded.fingerprint(), graph.fingerprint());

        // JSON gone: the binary alone is enough.
        std::fs::remove_file(&json).unwrap();
        let again = NavGraph::load(&json, &binary).unwrap();
        assert_eq!(again.fingerprint(), graph.fingerprint());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Edge to triangle adjacency of an indexed triangle mesh.

use std::collections::BTreeMap;

/// Undirected edge, smaller vertex first
pub type Edge = (u32, u32);

pub fn edge(a: u32, b: u32) -> Edge {
    (a.min(b), a.max(b))
}

/// Triangles sharing every undirected edge of a mesh
#[derive(Debug, Clone, Default)]
pub struct EdgeAdjacency {
    edges: BTreeMap<Edge, Vec<usize>>,
}

impl EdgeAdjacency {
    /// Build the adjacency. Triangles are listed in ascending order per edge.
    pub fn new(indices: &[[u32; 3]]) -> Self {
        let mut edges: BTreeMap<Edge, Vec<usize>> = BTreeMap::new();
        for (triangle, tri) in indices.iter().enumerate() {
            for corner in 0..3 {
                let (a, b) = (tri[corner], tri[(corner + 1) % 3]);
                if a == b {
                    continue;
                }
                let triangles = edges.entry(edge(a, b)).or_default();
                if triangles.last() != Some(&triangle) {
                    triangles.push(triangle);
                }
            }
        }
        Self { edges }
    }

    /// Triangles other than `triangle` that share edge `(a, b)`
    pub fn neighbors(&self, a: u32, b: u32, triangle: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .get(&edge(a, b))
            .into_iter()
            .flatten()
            .copied()
            .filter(move |&other| other != triangle)
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_edge_lists_both_triangles() {
        let adjacency = EdgeAdjacency::new(&[[0, 1, 2], [2, 1, 3]]);
        assert_eq!(adjacency.num_edges(), 5);
        assert_eq!(adjacency.neighbors(1, 2, 0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(adjacency.neighbors(2, 1, 1).collect::<Vec<_>>(), vec![0]);
        assert_eq!(adjacency.neighbors(0, 1, 0).count(), 0);
    }

    #[test]
    fn test_degenerate_edges_are_ignored() {
        let adjacency = EdgeAdjacency::new(&[[0, 0, 1]]);
        assert_eq!(adjacency.num_edges(), 1);
    }
}

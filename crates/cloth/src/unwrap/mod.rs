//! Flatten a 3D triangle mesh into 2D islands.
//!
//! Triangles are flood-filled over shared edges. Every island starts from a
//! seed triangle laid on the X axis, and each neighbor's third corner is
//! placed by intersecting circles whose radii are its 3D edge lengths. The
//! result is a greedy local flattening, exact for developable meshes.

mod adjacency;
mod geometry;

use std::collections::VecDeque;

use glam::{IVec3, Vec2, Vec3};
use tracing::{debug, trace};

use crate::error::ClothError;
use crate::mesh::TriangleMesh;

use adjacency::EdgeAdjacency;
use geometry::{place_third_point, signed_area, PointHash};

/// One flattened connected piece of a mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnwrappedIsland {
    pub positions_2d: Vec<Vec2>,
    /// 3D position of every 2D point
    pub rest_positions_3d: Vec<Vec3>,
    /// Island-local triangles
    pub indices: Vec<IVec3>,
    /// Source mesh vertex of every 2D point
    pub source_vertices: Vec<u32>,
}

impl UnwrappedIsland {
    pub fn num_vertices(&self) -> usize {
        self.positions_2d.len()
    }
}

/// Island under construction
struct IslandBuilder<'a> {
    mesh: &'a TriangleMesh,
    tolerance: f32,
    island: UnwrappedIsland,
    hash: PointHash,
}

impl<'a> IslandBuilder<'a> {
    fn new(mesh: &'a TriangleMesh, tolerance: f32) -> Self {
        Self {
            mesh,
            tolerance,
            island: UnwrappedIsland::default(),
            hash: PointHash::new(tolerance),
        }
    }

    /// Index of the point at `position` for source vertex `source`, reusing
    /// an existing point that matches in 2D and 3D
    fn add_point(&mut self, position: Vec2, source: u32) -> u32 {
        let rest_position = self.mesh.positions[source as usize];
        if let Some(existing) = self.hash.find(
            position,
            rest_position,
            self.tolerance,
            &self.island.positions_2d,
            &self.island.rest_positions_3d,
        ) {
            return existing;
        }
        let index = self.island.positions_2d.len() as u32;
        self.island.positions_2d.push(position);
        self.island.rest_positions_3d.push(rest_position);
        self.island.source_vertices.push(source);
        self.hash.insert(position, index);
        index
    }

    fn point(&self, index: u32) -> Vec2 {
        self.island.positions_2d[index as usize]
    }

    fn distance_3d(&self, a: u32, b: u32) -> f32 {
        self.mesh.positions[a as usize].distance(self.mesh.positions[b as usize])
    }

    /// Lay the seed triangle out with its first edge on the X axis
    fn place_seed(&mut self, tri: [u32; 3]) -> [u32; 3] {
        let [a, b, c] = tri;
        let p0 = Vec2::ZERO;
        let p1 = Vec2::new(self.distance_3d(a, b), 0.0);
        let p2 = place_third_point(
            p0,
            self.distance_3d(a, c),
            p1,
            self.distance_3d(b, c),
            None,
            |candidate| signed_area(p0, p1, candidate),
        );
        [self.add_point(p0, a), self.add_point(p1, b), self.add_point(p2, c)]
    }

    /// Place triangle `tri`, two of whose corners are already laid out in the
    /// neighbor `placed`/`placed_points`
    fn place_neighbor(
        &mut self,
        tri: [u32; 3],
        placed: [u32; 3],
        placed_points: [u32; 3],
    ) -> Option<[u32; 3]> {
        let mut points = [None; 3];
        for (corner, &vertex) in tri.iter().enumerate() {
            points[corner] = placed
                .iter()
                .position(|&other| other == vertex)
                .map(|position| placed_points[position]);
        }
        let known: Vec<usize> = (0..3).filter(|&corner| points[corner].is_some()).collect();
        let &[first, second] = known.as_slice() else {
            return None;
        };
        let new_corner = 3 - first - second;

        let (i0, i1) = (points[first]?, points[second]?);
        let (p0, p1) = (self.point(i0), self.point(i1));
        let opposite = placed
            .iter()
            .position(|vertex| !tri.contains(vertex))
            .map(|position| self.point(placed_points[position]));
        let vertex = tri[new_corner];
        let orientation = |candidate: Vec2| {
            let mut corners = [Vec2::ZERO; 3];
            corners[first] = p0;
            corners[second] = p1;
            corners[new_corner] = candidate;
            signed_area(corners[0], corners[1], corners[2])
        };
        let position = place_third_point(
            p0,
            self.distance_3d(tri[first], vertex),
            p1,
            self.distance_3d(tri[second], vertex),
            opposite,
            orientation,
        );
        points[new_corner] = Some(self.add_point(position, vertex));
        Some([points[0]?, points[1]?, points[2]?])
    }

    fn push_triangle(&mut self, points: [u32; 3]) {
        let [a, b, c] = points;
        if a == b || b == c || c == a {
            trace!("unwrap: skipping degenerate triangle {points:?}");
            return;
        }
        self.island
            .indices
            .push(IVec3::new(a as i32, b as i32, c as i32));
    }
}

fn has_repeated_vertex(tri: &[u32; 3]) -> bool {
    tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0]
}

/// Flatten `mesh` into islands of edge-connected triangles.
///
/// Points of an island closer than `tolerance` in both 2D and 3D are shared.
/// Triangles with a repeated vertex, and triangles never reached from a seed
/// whose first edge is longer than `tolerance`, are left out. The result only
/// depends on the triangle order of `mesh`.
pub fn unwrap_mesh(mesh: &TriangleMesh, tolerance: f32) -> Result<Vec<UnwrappedIsland>, ClothError> {
    mesh.validate()?;
    let adjacency = EdgeAdjacency::new(&mesh.indices);
    let mut visited: Vec<bool> = mesh.indices.iter().map(has_repeated_vertex).collect();
    let mut islands = Vec::new();

    for seed in 0..mesh.indices.len() {
        let tri = mesh.indices[seed];
        if visited[seed] {
            continue;
        }
        let seed_length = mesh.positions[tri[0] as usize].distance(mesh.positions[tri[1] as usize]);
        if seed_length <= tolerance {
            continue;
        }

        let mut builder = IslandBuilder::new(mesh, tolerance);
        visited[seed] = true;
        let seed_points = builder.place_seed(tri);
        builder.push_triangle(seed_points);

        let mut queue = VecDeque::from([(seed, seed_points)]);
        while let Some((triangle, points)) = queue.pop_front() {
            let placed = mesh.indices[triangle];
            for corner in 0..3 {
                let (a, b) = (placed[corner], placed[(corner + 1) % 3]);
                let neighbors: Vec<usize> = adjacency.neighbors(a, b, triangle).collect();
                for neighbor in neighbors {
                    if visited[neighbor] {
                        continue;
                    }
                    visited[neighbor] = true;
                    let Some(neighbor_points) =
                        builder.place_neighbor(mesh.indices[neighbor], placed, points)
                    else {
                        continue;
                    };
                    builder.push_triangle(neighbor_points);
                    queue.push_back((neighbor, neighbor_points));
                }
            }
        }

        trace!(
            "unwrap: island {} from seed {seed}: {} points, {} triangles",
            islands.len(),
            builder.island.num_vertices(),
            builder.island.indices.len()
        );
        islands.push(builder.island);
    }

    let skipped = visited.iter().filter(|&&v| !v).count();
    debug!(
        "unwrap_mesh: {} triangles -> {} islands ({skipped} unreachable)",
        mesh.num_triangles(),
        islands.len()
    );
    Ok(islands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_mesh(positions: Vec<Vec3>, indices: Vec<[u32; 3]>) -> TriangleMesh {
        TriangleMesh {
            positions,
            indices,
            ..Default::default()
        }
    }

    /// Every triangle keeps its 3D edge lengths in 2D
    fn assert_isometric(mesh: &TriangleMesh, island: &UnwrappedIsland) {
        for tri in &island.indices {
            for (a, b) in [(tri.x, tri.y), (tri.y, tri.z), (tri.z, tri.x)] {
                let (a, b) = (a as usize, b as usize);
                let length_2d = island.positions_2d[a].distance(island.positions_2d[b]);
                let length_3d = mesh.positions[island.source_vertices[a] as usize]
                    .distance(mesh.positions[island.source_vertices[b] as usize]);
                assert!((length_2d - length_3d).abs() < 1e-4, "{length_2d} != {length_3d}");
            }
        }
    }

    #[test]
    fn test_single_triangle() {
        let mesh = create_mesh(
            vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 1.0)],
            vec![[0, 1, 2]],
        );
        let islands = unwrap_mesh(&mesh, 0.01).unwrap();
        assert_eq!(islands.len(), 1);
        let island = &islands[0];
        assert_eq!(island.positions_2d[0], Vec2::ZERO);
        assert_eq!(island.positions_2d[1], Vec2::new(2.0, 0.0));
        assert_eq!(island.source_vertices, vec![0, 1, 2]);
        assert_eq!(island.indices, vec![IVec3::new(0, 1, 2)]);
        assert!(island.positions_2d[2].y > 0.0);
        assert_isometric(&mesh, island);
    }

    #[test]
    fn test_folded_quad_is_one_flat_island() {
        // Two triangles hinged at a right angle along the edge 1-2
        let mesh = create_mesh(
            vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::Y,
                Vec3::new(1.0, 1.0, 1.0),
            ],
            vec![[0, 1, 2], [2, 1, 3]],
        );
        let islands = unwrap_mesh(&mesh, 0.01).unwrap();
        assert_eq!(islands.len(), 1);
        let island = &islands[0];
        assert_eq!(island.num_vertices(), 4);
        assert_eq!(island.indices.len(), 2);
        assert_isometric(&mesh, island);
        for tri in &island.indices {
            let [a, b, c] = tri.to_array().map(|i| island.positions_2d[i as usize]);
            assert!(signed_area(a, b, c) > 0.0);
        }
    }

    #[test]
    fn test_disconnected_triangles_make_two_islands() {
        let mesh = create_mesh(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE, Vec3::new(0.0, 2.0, 2.0)],
            vec![[0, 1, 2], [3, 4, 5]],
        );
        let islands = unwrap_mesh(&mesh, 0.01).unwrap();
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[1].source_vertices, vec![3, 4, 5]);
    }

    #[test]
    fn test_degenerate_input_is_skipped() {
        let mesh = create_mesh(
            vec![Vec3::ZERO, Vec3::ZERO, Vec3::Y, Vec3::X],
            vec![[0, 1, 2], [0, 0, 3]],
        );
        assert!(unwrap_mesh(&mesh, 0.01).unwrap().is_empty());
        assert!(unwrap_mesh(&TriangleMesh::default(), 0.01).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_mesh_is_rejected() {
        let mesh = create_mesh(vec![Vec3::ZERO], vec![[0, 1, 2]]);
        assert!(matches!(unwrap_mesh(&mesh, 0.01), Err(ClothError::InvalidMesh(_))));
    }

    #[test]
    fn test_closed_strip_duplicates_cut_vertices() {
        // A square tube without caps: unrolled, the first and last columns of
        // points come from the same source vertices
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        let mut indices = Vec::new();
        for side in 0..4u32 {
            let (a, b) = (side, (side + 1) % 4);
            indices.push([a, b, b + 4]);
            indices.push([a, b + 4, a + 4]);
        }
        let mesh = create_mesh(positions, indices);
        let islands = unwrap_mesh(&mesh, 0.01).unwrap();
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].indices.len(), 8);
        assert!(islands[0].num_vertices() > 8);
        assert_isometric(&mesh, &islands[0]);
    }

    #[test]
    fn test_unwrap_is_deterministic() {
        let mesh = create_mesh(
            vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::Y,
                Vec3::new(1.0, 1.0, 0.5),
                Vec3::new(2.0, 0.5, 0.0),
            ],
            vec![[0, 1, 2], [2, 1, 3], [1, 4, 3]],
        );
        let first = unwrap_mesh(&mesh, 0.01).unwrap();
        let second = unwrap_mesh(&mesh, 0.01).unwrap();
        assert_eq!(first, second);
    }
}

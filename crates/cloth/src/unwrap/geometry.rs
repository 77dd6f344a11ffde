//! Planar placement helpers for the unwrap.

use std::collections::HashMap;

use glam::{Vec2, Vec3};

/// Below this distance two circle centers are treated as coincident
const COINCIDENT_EPSILON: f32 = 1e-6;

/// Both intersections of the circles `(c0, r0)` and `(c1, r1)`, `None` when
/// the circles are disjoint, nested or concentric
pub fn circle_intersections(c0: Vec2, r0: f32, c1: Vec2, r1: f32) -> Option<(Vec2, Vec2)> {
    let delta = c1 - c0;
    let distance = delta.length();
    if distance <= COINCIDENT_EPSILON || distance > r0 + r1 || distance < (r0 - r1).abs() {
        return None;
    }
    let along = (r0 * r0 - r1 * r1 + distance * distance) / (2.0 * distance);
    let height = (r0 * r0 - along * along).max(0.0).sqrt();
    let direction = delta / distance;
    let middle = c0 + direction * along;
    let offset = direction.perp() * height;
    Some((middle + offset, middle - offset))
}

/// Point at distance `r0` from `c0` on the line through `c0` and `c1`.
///
/// Of the two candidates, the one farther from `opposite` wins. With
/// coincident centers the point is pushed directly away from `opposite`.
pub fn place_on_line(c0: Vec2, r0: f32, c1: Vec2, opposite: Option<Vec2>) -> Vec2 {
    let delta = c1 - c0;
    if delta.length() <= COINCIDENT_EPSILON {
        let away = opposite
            .map(|point| (c0 - point).normalize_or_zero())
            .filter(|direction| *direction != Vec2::ZERO)
            .unwrap_or(Vec2::X);
        return c0 + away * r0;
    }
    let direction = delta.normalize();
    let forward = c0 + direction * r0;
    let backward = c0 - direction * r0;
    match opposite {
        Some(point) if backward.distance_squared(point) > forward.distance_squared(point) => backward,
        _ => forward,
    }
}

/// Place the third corner of a triangle whose first two corners are known.
///
/// `r0` and `r1` are the 3D distances from the new corner to `p0` and `p1`.
/// Among the circle intersections the one maximizing `orientation` wins;
/// without intersection the corner falls back to [`place_on_line`].
pub fn place_third_point(
    p0: Vec2,
    r0: f32,
    p1: Vec2,
    r1: f32,
    opposite: Option<Vec2>,
    orientation: impl Fn(Vec2) -> f32,
) -> Vec2 {
    match circle_intersections(p0, r0, p1, r1) {
        Some((a, b)) => {
            if orientation(b) > orientation(a) {
                b
            } else {
                a
            }
        }
        None => place_on_line(p0, r0, p1, opposite),
    }
}

/// Twice the signed area of the 2D triangle `(a, b, c)`, positive when
/// counter-clockwise
pub fn signed_area(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

/// Points of one island bucketed by quantized 2D position, for reuse of
/// points that coincide in both 2D and 3D
#[derive(Debug, Default)]
pub struct PointHash {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<u32>>,
}

impl PointHash {
    pub fn new(tolerance: f32) -> Self {
        Self {
            cell_size: tolerance.max(f32::EPSILON),
            cells: HashMap::new(),
        }
    }

    fn cell(&self, position: Vec2) -> (i32, i32) {
        let cell = (position / self.cell_size).floor();
        (cell.x as i32, cell.y as i32)
    }

    pub fn insert(&mut self, position: Vec2, index: u32) {
        let cell = self.cell(position);
        self.cells.entry(cell).or_default().push(index);
    }

    /// First stored point within `tolerance` of `position` in 2D whose rest
    /// position is within `tolerance` of `rest_position`
    pub fn find(
        &self,
        position: Vec2,
        rest_position: Vec3,
        tolerance: f32,
        positions_2d: &[Vec2],
        rest_positions: &[Vec3],
    ) -> Option<u32> {
        let (x, y) = self.cell(position);
        (x - 1..=x + 1)
            .flat_map(|cx| (y - 1..=y + 1).map(move |cy| (cx, cy)))
            .filter_map(|cell| self.cells.get(&cell))
            .flatten()
            .copied()
            .filter(|&index| {
                positions_2d[index as usize].distance(position) <= tolerance
                    && rest_positions[index as usize].distance(rest_position) <= tolerance
            })
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_intersections_are_symmetric() {
        let (a, b) = circle_intersections(Vec2::ZERO, 1.0, Vec2::new(1.0, 0.0), 1.0).unwrap();
        let height = 0.75f32.sqrt();
        assert!((a - Vec2::new(0.5, height)).length() < 1e-6);
        assert!((b - Vec2::new(0.5, -height)).length() < 1e-6);
    }

    #[test]
    fn test_disjoint_circles_have_no_intersection() {
        assert!(circle_intersections(Vec2::ZERO, 1.0, Vec2::new(3.0, 0.0), 1.0).is_none());
        assert!(circle_intersections(Vec2::ZERO, 3.0, Vec2::new(1.0, 0.0), 1.0).is_none());
        assert!(circle_intersections(Vec2::ZERO, 1.0, Vec2::ZERO, 1.0).is_none());
    }

    #[test]
    fn test_place_third_point_follows_orientation() {
        let p0 = Vec2::ZERO;
        let p1 = Vec2::new(2.0, 0.0);
        let counter_clockwise =
            place_third_point(p0, 1.0, p1, 5.0f32.sqrt(), None, |c| signed_area(p0, p1, c));
        assert!((counter_clockwise - Vec2::new(0.0, 1.0)).length() < 1e-5);
        let clockwise =
            place_third_point(p0, 1.0, p1, 5.0f32.sqrt(), None, |c| signed_area(p1, p0, c));
        assert!((clockwise - Vec2::new(0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_place_on_line_moves_away_from_opposite() {
        let point = place_on_line(Vec2::ZERO, 1.0, Vec2::X, Some(Vec2::new(0.5, 0.0)));
        assert_eq!(point, Vec2::new(-1.0, 0.0));
        let point = place_on_line(Vec2::ZERO, 2.0, Vec2::ZERO, Some(Vec2::new(0.0, -1.0)));
        assert_eq!(point, Vec2::new(0.0, 2.0));
    }

    #[test]
    fn test_point_hash_requires_both_positions() {
        let positions_2d = [Vec2::ZERO, Vec2::new(0.005, 0.0)];
        let rest = [Vec3::ZERO, Vec3::X];
        let mut hash = PointHash::new(0.01);
        hash.insert(positions_2d[0], 0);
        hash.insert(positions_2d[1], 1);
        assert_eq!(hash.find(Vec2::new(0.001, 0.0), Vec3::X, 0.01, &positions_2d, &rest), Some(1));
        assert_eq!(hash.find(Vec2::new(0.001, 0.0), Vec3::ONE, 0.01, &positions_2d, &rest), None);
    }
}

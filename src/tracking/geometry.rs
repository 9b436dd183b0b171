//! 2-D geometry on the world X/Z plane

use crate::types::WorldPoint;

/// Z component of the cross product `(b - a) × (c - a)`.
///
/// Positive when `c` lies to the left of the directed line `a → b`, negative to
/// the right, zero when collinear.
pub fn cross(a: WorldPoint, b: WorldPoint, c: WorldPoint) -> f32 {
    let (ux, uz) = (b.x - a.x, b.z - a.z);
    let (vx, vz) = (c.x - a.x, c.z - a.z);
    ux * vz - uz * vx
}

/// Proper intersection of segments `ab` and `cd`.
///
/// True only when `c` and `d` lie strictly on opposite sides of line `ab` and
/// `a` and `b` lie strictly on opposite sides of line `cd`. Touching or
/// collinear segments do not count.
pub fn segments_intersect(a: WorldPoint, b: WorldPoint, c: WorldPoint, d: WorldPoint) -> bool {
    let d1 = cross(a, b, c);
    let d2 = cross(a, b, d);
    let d3 = cross(c, d, a);
    let d4 = cross(c, d, b);
    opposite_signs(d1, d2) && opposite_signs(d3, d4)
}

fn opposite_signs(a: f32, b: f32) -> bool {
    (a > 0.0 && b < 0.0) || (a < 0.0 && b > 0.0)
}

/// Point-in-polygon by ray casting. Points on an edge count as inside.
///
/// Polygons with fewer than three vertices contain nothing.
pub fn polygon_contains(polygon: &[WorldPoint], point: WorldPoint) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if on_segment(pi, pj, point) {
            return true;
        }
        if (pi.z > point.z) != (pj.z > point.z) {
            let x_at = (pj.x - pi.x) * (point.z - pi.z) / (pj.z - pi.z) + pi.x;
            if point.x < x_at {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: WorldPoint, b: WorldPoint, p: WorldPoint) -> bool {
    const EPSILON: f32 = 1e-3;
    let length = ((b.x - a.x).powi(2) + (b.z - a.z).powi(2)).sqrt();
    if cross(a, b, p).abs() > EPSILON * length.max(1.0) {
        return false;
    }
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.z >= a.z.min(b.z) - EPSILON
        && p.z <= a.z.max(b.z) + EPSILON
}

/// Unit perpendicular `(-dz, dx)` of segment `a → b`, or zero for a
/// zero-length segment.
fn unit_normal(a: WorldPoint, b: WorldPoint) -> (f32, f32) {
    let (dx, dz) = (b.x - a.x, b.z - a.z);
    let length = (dx * dx + dz * dz).sqrt();
    if length == 0.0 {
        return (0.0, 0.0);
    }
    (-dz / length, dx / length)
}

/// Offset a centre line by `±half_width` into a closed corridor polygon.
///
/// Each vertex moves along the average of its adjacent segments' unit
/// normals; endpoints use their single segment. The result is the forward
/// offsets followed by the backward offsets in reverse order. Fewer than two
/// centre line points yield an empty polygon.
pub fn corridor_polygon(center_line: &[WorldPoint], half_width: f32) -> Vec<WorldPoint> {
    let n = center_line.len();
    if n < 2 {
        return Vec::new();
    }

    let normals: Vec<(f32, f32)> = (0..n)
        .map(|i| {
            let before = (i > 0).then(|| unit_normal(center_line[i - 1], center_line[i]));
            let after = (i + 1 < n).then(|| unit_normal(center_line[i], center_line[i + 1]));
            match (before, after) {
                (Some(a), Some(b)) => ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0),
                (Some(single), None) | (None, Some(single)) => single,
                (None, None) => (0.0, 0.0),
            }
        })
        .collect();

    let offset = |i: usize, sign: f32| {
        let p = center_line[i];
        let (nx, nz) = normals[i];
        WorldPoint::new(p.x + sign * nx * half_width, p.z + sign * nz * half_width)
    };

    let mut polygon = Vec::with_capacity(n * 2);
    polygon.extend((0..n).map(|i| offset(i, 1.0)));
    polygon.extend((0..n).rev().map(|i| offset(i, -1.0)));
    polygon
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(x: f32, z: f32) -> WorldPoint {
        WorldPoint::new(x, z)
    }

    fn square() -> Vec<WorldPoint> {
        vec![p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(0.0, 10.0)]
    }

    #[test]
    fn cross_sign_gives_side() {
        assert!(cross(p(0.0, 0.0), p(1.0, 0.0), p(0.5, 1.0)) > 0.0);
        assert!(cross(p(0.0, 0.0), p(1.0, 0.0), p(0.5, -1.0)) < 0.0);
        assert_eq!(cross(p(0.0, 0.0), p(1.0, 0.0), p(2.0, 0.0)), 0.0);
    }

    #[test]
    fn crossing_through_trap_midpoint_intersects() {
        let (c, d) = (p(50.0, -10.0), p(50.0, 10.0));
        assert!(segments_intersect(p(45.0, 0.0), p(55.0, 0.0), c, d));
    }

    #[test]
    fn movement_on_one_side_does_not_intersect() {
        let (c, d) = (p(50.0, -10.0), p(50.0, 10.0));
        assert!(!segments_intersect(p(40.0, 0.0), p(49.0, 0.0), c, d));
        assert!(!segments_intersect(p(55.0, -5.0), p(60.0, 5.0), c, d));
        // Passing beyond the trap's end
        assert!(!segments_intersect(p(45.0, 20.0), p(55.0, 20.0), c, d));
    }

    #[test]
    fn touching_an_endpoint_is_not_a_crossing() {
        let (c, d) = (p(50.0, -10.0), p(50.0, 10.0));
        assert!(!segments_intersect(p(45.0, 0.0), p(50.0, 0.0), c, d));
    }

    #[test]
    fn square_contains_interior_and_boundary() {
        let poly = square();
        assert!(polygon_contains(&poly, p(5.0, 5.0)));
        assert!(polygon_contains(&poly, p(0.0, 5.0)));
        assert!(polygon_contains(&poly, p(10.0, 10.0)));
        assert!(!polygon_contains(&poly, p(10.5, 5.0)));
        assert!(!polygon_contains(&poly, p(-1.0, -1.0)));
    }

    #[test]
    fn degenerate_polygons_contain_nothing() {
        assert!(!polygon_contains(&[], p(0.0, 0.0)));
        assert!(!polygon_contains(&[p(0.0, 0.0), p(1.0, 1.0)], p(0.5, 0.5)));
    }

    #[test]
    fn straight_corridor_is_a_rectangle() {
        let poly = corridor_polygon(&[p(0.0, 0.0), p(100.0, 0.0)], 8.0);
        assert_eq!(poly, vec![p(0.0, 8.0), p(100.0, 8.0), p(100.0, -8.0), p(0.0, -8.0)]);
    }

    #[test]
    fn short_center_lines_give_empty_corridors() {
        assert!(corridor_polygon(&[], 8.0).is_empty());
        assert!(corridor_polygon(&[p(1.0, 1.0)], 8.0).is_empty());
    }

    #[test]
    fn repeated_points_do_not_produce_nan() {
        let poly = corridor_polygon(&[p(0.0, 0.0), p(0.0, 0.0), p(10.0, 0.0)], 4.0);
        assert!(poly.iter().all(|v| v.x.is_finite() && v.z.is_finite()));
        assert_eq!(poly.len(), 6);
    }

    #[test]
    fn bent_corridor_contains_its_center_line() {
        let center = vec![p(0.0, 0.0), p(50.0, 0.0), p(80.0, 30.0), p(80.0, 90.0)];
        let poly = corridor_polygon(&center, 6.0);
        for window in center.windows(2) {
            let mid = p((window[0].x + window[1].x) / 2.0, (window[0].z + window[1].z) / 2.0);
            assert!(polygon_contains(&poly, mid));
        }
        assert!(!polygon_contains(&poly, p(40.0, 40.0)));
    }

    prop_compose! {
        fn arb_polygon()(points in prop::collection::vec((-100.0f32..100.0, -100.0f32..100.0), 3..12)) -> Vec<WorldPoint> {
            points.into_iter().map(|(x, z)| p(x, z)).collect()
        }
    }

    proptest! {
        #[test]
        fn containment_ignores_vertex_order(poly in arb_polygon(), x in -120.0f32..120.0, z in -120.0f32..120.0) {
            let reversed: Vec<_> = poly.iter().rev().copied().collect();
            prop_assert_eq!(polygon_contains(&poly, p(x, z)), polygon_contains(&reversed, p(x, z)));
        }

        #[test]
        fn corridor_contains_center_line_points(
            start in (-500.0f32..500.0, -500.0f32..500.0),
            heading in 0.0f32..std::f32::consts::TAU,
            length in 10.0f32..300.0,
            half_width in 0.5f32..20.0,
            t in 0.0f32..=1.0,
        ) {
            let a = p(start.0, start.1);
            let b = p(start.0 + heading.cos() * length, start.1 + heading.sin() * length);
            let poly = corridor_polygon(&[a, b], half_width);
            let on_line = p(a.x + (b.x - a.x) * t, a.z + (b.z - a.z) * t);
            prop_assert!(polygon_contains(&poly, on_line));
        }
    }
}

//! Corner angles of 3D triangles.

use std::f64::consts::PI;

use nalgebra::Point3;

/// Largest corner angle kept as is; larger angles are redistributed.
const MAX_CORNER_ANGLE: f64 = PI * (179.0 / 180.0);

/// Smallest corner angle returned by [`triangle_angles`].
const MIN_CORNER_ANGLE: f64 = 0.001;

/// Angle at `b` between the rays towards `a` and `c`.
///
/// Uses the half-chord form, which stays accurate near 0 and pi.
pub fn corner_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let (Some(u), Some(v)) = ((a - b).try_normalize(0.0), (c - b).try_normalize(0.0)) else {
        return 0.0;
    };
    if u.dot(&v) >= 0.0 {
        2.0 * ((v - u).norm() / 2.0).min(1.0).asin()
    } else {
        PI - 2.0 * ((v + u).norm() / 2.0).min(1.0).asin()
    }
}

/// Reduce a near-straight corner angle, handing the excess to the two other
/// corners in proportion to the opposite distances.
fn fix_large_angle(
    v_fix: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
    fix: &mut f64,
    a1: &mut f64,
    a2: &mut f64,
) {
    let excess = *fix - MAX_CORNER_ANGLE;
    if excess < 0.0 {
        return;
    }

    let d1 = (v_fix - v1).norm();
    let d2 = (v_fix - v2).norm();
    let sum = d1 + d2;
    let weight = if sum > 1e-20 { d2 / sum } else { 0.5 };

    *fix -= excess;
    *a1 += excess * weight;
    *a2 += excess * (1.0 - weight);
}

/// The three corner angles of triangle `(v1, v2, v3)`, robust to degenerate input.
///
/// Angles above 179 degrees are reduced and every angle is at least 0.001 rad,
/// so downstream sines and cotangents stay finite.
pub fn triangle_angles(v1: &Point3<f64>, v2: &Point3<f64>, v3: &Point3<f64>) -> [f64; 3] {
    let mut a1 = corner_angle(v3, v1, v2);
    let mut a2 = corner_angle(v1, v2, v3);
    let mut a3 = corner_angle(v2, v3, v1);

    fix_large_angle(v1, v2, v3, &mut a1, &mut a2, &mut a3);
    fix_large_angle(v2, v3, v1, &mut a2, &mut a3, &mut a1);
    fix_large_angle(v3, v1, v2, &mut a3, &mut a1, &mut a2);

    [
        a1.max(MIN_CORNER_ANGLE),
        a2.max(MIN_CORNER_ANGLE),
        a3.max(MIN_CORNER_ANGLE),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_right_angle() {
        let a = corner_angle(
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::origin(),
            &Point3::new(0.0, 2.0, 0.0),
        );
        assert!((a - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_angles_sum_to_pi() {
        let [a1, a2, a3] = triangle_angles(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(2.0, 0.1, 0.0),
            &Point3::new(0.3, 1.0, 0.5),
        );
        assert!((a1 + a2 + a3 - PI).abs() < 1e-10);
    }

    #[test]
    fn test_flat_triangle_is_fixed() {
        // v2 lies on the segment v1-v3
        let [a1, a2, a3] = triangle_angles(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(3.0, 0.0, 0.0),
        );
        assert!(a2 <= MAX_CORNER_ANGLE + 1e-12);
        assert!(a1 >= MIN_CORNER_ANGLE && a3 >= MIN_CORNER_ANGLE);
        // v1 is nearer to the straight corner, so it receives the larger share
        assert!(a1 > a3);
        assert!((a1 + a2 + a3 - PI).abs() < 1e-6);
    }

    #[test]
    fn test_collapsed_triangle_clamped() {
        let p = Point3::new(1.0, 1.0, 1.0);
        let [a1, a2, a3] = triangle_angles(&p, &p, &p);
        assert_eq!([a1, a2, a3], [MIN_CORNER_ANGLE; 3]);
    }
}

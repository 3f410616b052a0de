//! Triangle areas.
//!
//! All functions return *doubled* areas, matching the parallelogram spanned by
//! two triangle edges.

use nalgebra::{Point2, Point3};
use rayon::prelude::*;

use super::FACE_GRAIN;

/// Doubled (unsigned) area of 3D triangles.
///
/// Sums the squared areas of the projections onto the three coordinate
/// planes and takes the square root, which stays accurate for thin triangles.
pub fn doublearea(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Vec<f64> {
    faces
        .par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|f| {
            let (a, b, c) = (&vertices[f[0]], &vertices[f[1]], &vertices[f[2]]);
            let proj = |x: usize, y: usize| {
                let r = a - c;
                let s = b - c;
                r[x] * s[y] - r[y] * s[x]
            };
            let xy = proj(0, 1);
            let yz = proj(1, 2);
            let zx = proj(2, 0);
            (xy * xy + yz * yz + zx * zx).sqrt()
        })
        .collect()
}

/// Signed doubled area of 2D triangles. Negative values are flipped triangles.
pub fn doublearea_signed(uvs: &[Point2<f64>], faces: &[[usize; 3]]) -> Vec<f64> {
    faces
        .par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|f| {
            let r = uvs[f[0]] - uvs[f[2]];
            let s = uvs[f[1]] - uvs[f[2]];
            r.x * s.y - r.y * s.x
        })
        .collect()
}

/// Doubled area from per-face edge lengths using Kahan's stable Heron formula.
pub fn doublearea_from_lengths(lengths: &[[f64; 3]]) -> Vec<f64> {
    lengths
        .par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|l| {
            let mut s = *l;
            s.sort_by(|a, b| b.total_cmp(a));
            let [a, b, c] = s;
            debug_assert!(c - (a - b) != 0.0, "degenerate triangle lengths {:?}", l);
            let dbl = 0.5 * ((a + (b + c)) * (c - (a - b)) * (c + (a - b)) * (a + (b - c))).sqrt();
            debug_assert!(!dbl.is_nan(), "doublearea produced NaN for {:?}", l);
            dbl
        })
        .collect()
}

/// Total (undoubled) area of a 3D triangle set.
pub fn surface_area(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> f64 {
    doublearea(vertices, faces).par_iter().sum::<f64>() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::kernels::edge_lengths;

    #[test]
    fn test_doublearea_3d() {
        let v = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, 3.0),
        ];
        let a = doublearea(&v, &[[0, 1, 2]]);
        assert!((a[0] - 4.0).abs() < 1e-12);
        assert!((surface_area(&v, &[[0, 1, 2]]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_signed_orientation() {
        let uv = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
        ];
        let a = doublearea_signed(&uv, &[[0, 1, 2], [0, 2, 1]]);
        assert!((a[0] - 1.0).abs() < 1e-12);
        assert!((a[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_heron_matches_cross_product() {
        let v = vec![
            Point3::new(0.1, 0.2, 0.3),
            Point3::new(1.7, -0.4, 0.9),
            Point3::new(0.5, 1.3, -0.2),
        ];
        let f = [[0, 1, 2]];
        let from_lengths = doublearea_from_lengths(&edge_lengths(&v, &f));
        let direct = doublearea(&v, &f);
        assert!((from_lengths[0] - direct[0]).abs() < 1e-10);
    }
}

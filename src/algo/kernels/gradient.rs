//! Discrete gradient operator and per-face tangent frames.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use super::FACE_GRAIN;
use crate::algo::sparse::CsrMatrix;

/// How the gradient of a face is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradMode {
    /// Use the face's actual geometry.
    #[default]
    Geometric,
    /// Replace every face by an equilateral triangle of the same area.
    Uniform,
}

/// Per-face gradients of the three piecewise-linear hat functions.
#[derive(Debug, Clone)]
pub struct GradientOperator {
    /// `rows[f][i]` is the gradient of the hat function of corner `i` on face `f`.
    pub rows: Vec<[Vector3<f64>; 3]>,
}

impl GradientOperator {
    /// Number of faces.
    pub fn num_faces(&self) -> usize {
        self.rows.len()
    }

    /// Assemble the `3|F| x |V|` sparse operator: rows `0..|F|` give the x
    /// components, then y, then z.
    pub fn to_csr(&self, faces: &[[usize; 3]], num_vertices: usize) -> CsrMatrix {
        let m = self.rows.len();
        let mut triplets = Vec::with_capacity(9 * m);
        for (fi, (g, f)) in self.rows.iter().zip(faces).enumerate() {
            for d in 0..3 {
                for corner in 0..3 {
                    triplets.push((d * m + fi, f[corner], g[corner][d]));
                }
            }
        }
        CsrMatrix::from_triplets(3 * m, num_vertices, triplets)
    }
}

/// Build the gradient operator using 90 degree rotated edges.
///
/// For corner `1` the gradient is the in-plane perpendicular of edge `v1 -> v3`
/// scaled by `1 / height`, likewise for corner `2`, and corner `0` takes minus
/// their sum.
pub fn grad(vertices: &[Point3<f64>], faces: &[[usize; 3]], mode: GradMode) -> GradientOperator {
    let rows = faces
        .par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|f| {
            let (mut v1, mut v2, mut v3) = (vertices[f[0]], vertices[f[1]], vertices[f[2]]);

            if mode == GradMode::Uniform {
                let dbl_area = (v2 - v1).cross(&(v3 - v1)).norm();
                let h = (dbl_area / (std::f64::consts::PI / 3.0).sin()).sqrt();
                v1 = Point3::origin();
                v2 = Point3::new(h, 0.0, 0.0);
                v3 = Point3::new(h / 2.0, (3.0f64.sqrt() / 2.0) * h, 0.0);
            }

            let v32 = v3 - v2;
            let v13 = v1 - v3;
            let v21 = v2 - v1;
            let n = v32.cross(&v13);
            let dbl_area = n.norm();
            if dbl_area <= 0.0 {
                return [Vector3::zeros(); 3];
            }
            let u = n / dbl_area;

            let perp = |e: &Vector3<f64>| -> Vector3<f64> {
                let p = u.cross(e);
                match p.try_normalize(0.0) {
                    Some(p) => p * (e.norm() / dbl_area),
                    None => Vector3::zeros(),
                }
            };
            let eperp21 = perp(&v21);
            let eperp13 = perp(&v13);

            [-eperp13 - eperp21, eperp13, eperp21]
        })
        .collect();

    GradientOperator { rows }
}

/// Orthonormal in-plane frame `(b1, b2)` of every face, with `b1` along the
/// first edge and `b2` its counter-clockwise perpendicular.
pub fn local_basis(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Vec<(Vector3<f64>, Vector3<f64>)> {
    faces
        .par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|f| {
            let e1 = vertices[f[1]] - vertices[f[0]];
            let t = vertices[f[2]] - vertices[f[0]];
            let b1 = e1.try_normalize(0.0).unwrap_or_else(Vector3::x);
            let b3 = b1.cross(&t).try_normalize(0.0).unwrap_or_else(Vector3::z);
            let b2 = b3.cross(&b1);
            (b1, b2)
        })
        .collect()
}

//! Convex-border parameterization.
//!
//! The boundary loop is pinned to a convex polygon and every interior vertex
//! is placed at a weighted average of its neighbours. With positive weights
//! the result is a valid embedding (Tutte's theorem), which makes this a safe
//! starting point for SLIM.
//!
//! # References
//!
//! - Tutte, W. T. (1963). "How to draw a graph." Proc. London Math. Society.
//! - Floater, M. S. (2003). "Mean value coordinates." CAGD.

use std::f64::consts::PI;

use nalgebra::{Point2, Point3};

use crate::algo::kernels::{corner_angle, cotmatrix};
use crate::algo::sparse::{CsrMatrix, Factorization};
use crate::error::{ParamError, Result};

/// Edge weights for [`convex_border_parameterization`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BorderMethod {
    /// Uniform weights: every neighbour counts the same.
    Tutte,
    /// Cotangent weights, `cot a1 + cot a2`. Can go negative on obtuse meshes.
    Harmonic,
    /// Mean value weights, `(tan(a1/2) + tan(a2/2)) / |e|`. Always positive.
    #[default]
    MeanValue,
}

/// Place `n` points evenly on the circle of radius 0.5 centred at (0.5, 0.5).
///
/// Point `i` sits at angle `2πi/n`, so boundary vertices keep their loop
/// order and orientation.
pub fn map_vertices_to_convex_border(n: usize) -> Vec<Point2<f64>> {
    (0..n)
        .map(|i| {
            let t = 2.0 * PI * i as f64 / n as f64;
            Point2::new(0.5 + 0.5 * t.cos(), 0.5 + 0.5 * t.sin())
        })
        .collect()
}

/// Directed edge weights `w[i][j]` as a sparse matrix.
fn edge_weights(vertices: &[Point3<f64>], faces: &[[usize; 3]], method: BorderMethod) -> CsrMatrix {
    let n = vertices.len();
    match method {
        BorderMethod::Tutte => {
            let triplets = faces
                .iter()
                .flat_map(|f| [(f[0], f[1]), (f[1], f[2]), (f[2], f[0])])
                .flat_map(|(a, b)| [(a, b, 1.0), (b, a, 1.0)])
                .collect();
            // Shared edges were counted twice; each edge weighs exactly one
            let summed = CsrMatrix::from_triplets(n, n, triplets);
            let unit = summed.iter().map(|(r, c, _)| (r, c, 1.0)).collect();
            CsrMatrix::from_triplets(n, n, unit)
        }
        BorderMethod::Harmonic => {
            let l = cotmatrix(vertices, faces);
            let triplets = l
                .iter()
                .filter(|&(r, c, _)| r != c)
                .map(|(r, c, v)| (r, c, 2.0 * v))
                .collect();
            CsrMatrix::from_triplets(n, n, triplets)
        }
        BorderMethod::MeanValue => {
            let mut triplets = Vec::with_capacity(faces.len() * 6);
            for f in faces {
                for k in 0..3 {
                    let a = f[k];
                    let b = f[(k + 1) % 3];
                    let c = f[(k + 2) % 3];
                    let half_tan = (corner_angle(&vertices[b], &vertices[a], &vertices[c]) / 2.0).tan();
                    for other in [b, c] {
                        let len = (vertices[other] - vertices[a]).norm();
                        if len > 0.0 {
                            triplets.push((a, other, half_tan / len));
                        }
                    }
                }
            }
            CsrMatrix::from_triplets(n, n, triplets)
        }
    }
}

/// Solve for interior positions with the boundary fixed.
///
/// `boundary[i]` is placed at `bnd_uv[i]`; every other vertex is solved for.
/// Returns one UV per vertex.
///
/// # Errors
///
/// - [`ParamError::InvalidParameter`] if `boundary` and `bnd_uv` differ in length
/// - [`ParamError::TooFewPoints`] if the boundary has fewer than 3 vertices
/// - [`ParamError::IsolatedVertex`] if an interior vertex has no weighted
///   neighbour (its row would be all zero)
/// - [`ParamError::Factorization`] if the interior system is singular
pub fn convex_border_parameterization(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
    boundary: &[usize],
    bnd_uv: &[Point2<f64>],
    method: BorderMethod,
) -> Result<Vec<Point2<f64>>> {
    if boundary.len() != bnd_uv.len() {
        return Err(ParamError::invalid_param(
            "bnd_uv",
            bnd_uv.len(),
            "must match the boundary length",
        ));
    }
    if boundary.len() < 3 {
        return Err(ParamError::TooFewPoints {
            required: 3,
            found: boundary.len(),
        });
    }

    let n = vertices.len();
    let mut uv = vec![Point2::origin(); n];
    let mut is_known = vec![false; n];
    for (&b, p) in boundary.iter().zip(bnd_uv) {
        uv[b] = *p;
        is_known[b] = true;
    }

    let mut unknown = vec![None; n];
    let mut order = Vec::new();
    for v in (0..n).filter(|&v| !is_known[v]) {
        unknown[v] = Some(order.len());
        order.push(v);
    }
    let m = order.len();
    if m == 0 {
        return Ok(uv);
    }

    let w = edge_weights(vertices, faces, method);
    let mut triplets = Vec::with_capacity(w.nnz() + m);
    let mut rhs_x = vec![0.0; m];
    let mut rhs_y = vec![0.0; m];

    for (row, &v) in order.iter().enumerate() {
        let diag: f64 = w.row(v).map(|(_, x)| x).sum();
        if diag == 0.0 {
            return Err(ParamError::IsolatedVertex { vertex: v });
        }
        triplets.push((row, row, 1.0));
        for (j, x) in w.row(v) {
            let x = x / diag;
            match unknown[j] {
                Some(col) => triplets.push((row, col, -x)),
                None => {
                    rhs_x[row] += x * uv[j].x;
                    rhs_y[row] += x * uv[j].y;
                }
            }
        }
    }

    let a = CsrMatrix::from_triplets(m, m, triplets);
    let factor = Factorization::lu(&a, "convex border")?;
    let x = factor.solve(&rhs_x, "convex border")?;
    let y = factor.solve(&rhs_y, "convex border")?;

    for (k, &v) in order.iter().enumerate() {
        uv[v] = Point2::new(x[k], y[k]);
    }
    Ok(uv)
}

//! Angle Based Flattening.
//!
//! ABF looks for planar corner angles `α` as close as possible to the 3D
//! angles `β` (in a `1/β²` weighted sense) subject to three constraint
//! families:
//!
//! - triangle: the angles of each face sum to π
//! - planarity: the angles around each interior vertex sum to 2π
//! - length: the sine products around each interior vertex agree, so that
//!   edge lengths can be reconstructed consistently
//!
//! The Lagrangian is minimized with Newton steps. The triangle and angle
//! blocks of the KKT matrix are diagonal per face and are eliminated in
//! closed form, leaving a `2 * ninterior` system for the vertex multipliers.
//!
//! # References
//!
//! - Sheffer, A., Lévy, B., Mogilnitsky, M., & Bogomyakov, A. (2005).
//!   "ABF++: Fast and robust angle based flattening." ACM TOG.

use std::f64::consts::PI;

use rayon::prelude::*;

use crate::algo::kernels::FACE_GRAIN;
use crate::algo::sparse::{CsrMatrix, Factorization};
use crate::error::{ParamError, Result};
use crate::mesh::{Chart, EdgeId, FaceId, VertFlags, VertId};

/// Maximum number of Newton iterations.
pub const ABF_MAX_ITER: usize = 20;

/// Target angles are clamped into `[MIN_ANGLE, PI - MIN_ANGLE]`.
const MIN_ANGLE: f64 = 7.5 * PI / 180.0;

/// Squared gradient norm below which a chart counts as converged.
///
/// Large charts use a looser bound.
pub fn abf_tolerance(num_faces: usize) -> f64 {
    if num_faces > 100 {
        1.0
    } else {
        0.001
    }
}

struct AbfSystem<'a> {
    chart: &'a Chart,
    /// Interior index of each vertex.
    interior: Vec<Option<usize>>,
    ninterior: usize,

    alpha: Vec<f64>,
    beta: Vec<f64>,
    sine: Vec<f64>,
    cosine: Vec<f64>,
    weight: Vec<f64>,

    b_alpha: Vec<f64>,
    b_triangle: Vec<f64>,
    b_interior: Vec<f64>,

    lambda_triangle: Vec<f64>,
    lambda_planar: Vec<f64>,
    lambda_length: Vec<f64>,

    j2dt: Vec<[f64; 3]>,
    bstar: Vec<f64>,
    dstar: Vec<f64>,
}

impl<'a> AbfSystem<'a> {
    fn new(chart: &'a Chart) -> Self {
        let mut ninterior = 0;
        let interior: Vec<Option<usize>> = chart
            .vert_ids()
            .map(|v| {
                chart.vert_interior(v).then(|| {
                    ninterior += 1;
                    ninterior - 1
                })
            })
            .collect();

        let nangles = chart.num_edges();
        let nfaces = chart.num_faces();
        let mut sys = Self {
            chart,
            interior,
            ninterior,
            alpha: vec![0.0; nangles],
            beta: vec![0.0; nangles],
            sine: vec![0.0; nangles],
            cosine: vec![0.0; nangles],
            weight: vec![0.0; nangles],
            b_alpha: vec![0.0; nangles],
            b_triangle: vec![0.0; nfaces],
            b_interior: vec![0.0; 2 * ninterior],
            lambda_triangle: vec![0.0; nfaces],
            lambda_planar: vec![0.0; ninterior],
            lambda_length: vec![1.0; ninterior],
            j2dt: vec![[0.0; 3]; nangles],
            bstar: vec![0.0; nfaces],
            dstar: vec![0.0; nfaces],
        };
        sys.init_angles();
        sys
    }

    fn init_angles(&mut self) {
        let chart = self.chart;
        for f in chart.face_ids() {
            let angles = chart.face_angles(f);
            for (e, a) in chart.face_edges(f).into_iter().zip(angles) {
                let a = a.clamp(MIN_ANGLE, PI - MIN_ANGLE);
                self.alpha[e.index()] = a;
                self.beta[e.index()] = a;
                self.weight[e.index()] = 2.0 / (a * a);
            }
        }

        for v in chart.vert_ids() {
            if self.interior[v.index()].is_none() {
                continue;
            }
            let sum: f64 = chart.vert_edges(v).map(|e| self.beta[e.index()]).sum();
            let scale = if sum == 0.0 { 0.0 } else { 2.0 * PI / sum };
            for e in chart.vert_edges(v) {
                self.beta[e.index()] *= scale;
                self.alpha[e.index()] = self.beta[e.index()];
            }
        }
    }

    fn compute_sines(&mut self) {
        for ((s, c), a) in self.sine.iter_mut().zip(&mut self.cosine).zip(&self.alpha) {
            *s = a.sin();
            *c = a.cos();
        }
    }

    /// Difference of the two sine products around `v`.
    ///
    /// With `aid` set this is the derivative with respect to that angle.
    fn sin_product(&self, v: VertId, aid: Option<EdgeId>) -> f64 {
        let chart = self.chart;
        let mut sin1 = 1.0;
        let mut sin2 = 1.0;

        for e in chart.vert_edges(v) {
            let e1 = chart.next(e);
            let e2 = chart.next(e1);

            if aid == Some(e1) {
                sin1 *= self.cosine[e1.index()];
                sin2 = 0.0;
            } else {
                sin1 *= self.sine[e1.index()];
            }

            if aid == Some(e2) {
                sin1 = 0.0;
                sin2 *= self.cosine[e2.index()];
            } else {
                sin2 *= self.sine[e2.index()];
            }
        }

        sin1 - sin2
    }

    fn grad_alpha(&self, f: FaceId, e: EdgeId) -> f64 {
        let chart = self.chart;
        let v = chart.edge_vert(e);
        let v1 = chart.edge_dest(e);
        let v2 = chart.edge_vert(chart.prev(e));

        let mut deriv = (self.alpha[e.index()] - self.beta[e.index()]) * self.weight[e.index()];
        deriv += self.lambda_triangle[f.index()];

        if let Some(id) = self.interior[v.index()] {
            deriv += self.lambda_planar[id];
        }
        if let Some(id) = self.interior[v1.index()] {
            deriv += self.lambda_length[id] * self.sin_product(v1, Some(e));
        }
        if let Some(id) = self.interior[v2.index()] {
            deriv += self.lambda_length[id] * self.sin_product(v2, Some(e));
        }
        deriv
    }

    /// Fill the right-hand sides and return the squared gradient norm.
    fn compute_gradient(&mut self) -> f64 {
        let chart = self.chart;
        let faces: Vec<FaceId> = chart.face_ids().collect();
        let sys = &*self;
        let per_face: Vec<([f64; 3], f64)> = faces
            .par_iter()
            .with_min_len(FACE_GRAIN)
            .map(|&f| {
                let edges = chart.face_edges(f);
                let g = edges.map(|e| sys.grad_alpha(f, e));
                let gtriangle = edges.iter().map(|e| sys.alpha[e.index()]).sum::<f64>() - PI;
                (g, gtriangle)
            })
            .collect();

        let mut norm = 0.0;
        for (&f, (g, gtriangle)) in faces.iter().zip(per_face) {
            for (e, ga) in chart.face_edges(f).into_iter().zip(g) {
                self.b_alpha[e.index()] = -ga;
                norm += ga * ga;
            }
            self.b_triangle[f.index()] = -gtriangle;
            norm += gtriangle * gtriangle;
        }

        for v in chart.vert_ids() {
            let Some(id) = self.interior[v.index()] else {
                continue;
            };
            let gplanar =
                chart.vert_edges(v).map(|e| self.alpha[e.index()]).sum::<f64>() - 2.0 * PI;
            self.b_interior[id] = -gplanar;
            norm += gplanar * gplanar;

            let glength = self.sin_product(v, None);
            self.b_interior[self.ninterior + id] = -glength;
            norm += glength * glength;
        }

        norm
    }

    fn adjust_alpha(&mut self, e: EdgeId, dlambda1: f64, pre: f64) {
        let i = e.index();
        let dalpha = self.b_alpha[i] - dlambda1;
        let alpha = self.alpha[i] + dalpha / self.weight[i] - pre;
        self.alpha[i] = alpha.clamp(0.0, PI);
    }

    /// One Newton step through the reduced vertex system.
    fn invert(&mut self) -> Result<()> {
        let chart = self.chart;
        let nint = self.ninterior;
        let nvar = 2 * nint;
        let mut rhs = self.b_interior.clone();
        let mut triplets = Vec::new();

        for f in chart.face_ids() {
            let es = chart.face_edges(f);
            let vs = chart.face_verts(f);
            let w = es.map(|e| self.weight[e.index()]);
            let wi = w.map(|x| 1.0 / x);

            // bstar = J1 * dInv * bAlpha - bTriangle
            let b = es.iter().zip(&wi).map(|(e, wi)| self.b_alpha[e.index()] * wi).sum::<f64>()
                - self.b_triangle[f.index()];
            // si = J1 * d * J1t
            let si = 1.0 / (wi[0] + wi[1] + wi[2]);
            let beta = es.map(|e| b * si - self.b_alpha[e.index()]);

            self.bstar[f.index()] = b;
            self.dstar[f.index()] = si;

            let mut wm = [[si; 3]; 3];
            for k in 0..3 {
                wm[k][k] = si - w[k];
            }

            let mut vid: [Option<usize>; 6] = [None; 6];
            let mut j2 = [[0.0; 3]; 3];
            let mut row1 = [0.0; 6];
            let mut row2 = [0.0; 6];
            let mut row3 = [0.0; 6];

            for k in 0..3 {
                let Some(id) = self.interior[vs[k].index()] else {
                    continue;
                };
                vid[k] = Some(id);
                vid[k + 3] = Some(nint + id);

                for m in 0..3 {
                    j2[m][k] = if m == k {
                        wi[m]
                    } else {
                        self.sin_product(vs[k], Some(es[m])) * wi[m]
                    };
                    self.j2dt[es[m].index()][k] = j2[m][k];
                }

                let (o1, o2) = ((k + 1) % 3, (k + 2) % 3);
                rhs[id] += j2[k][k] * beta[k];
                rhs[nint + id] += j2[o1][k] * beta[o1] + j2[o2][k] * beta[o2];

                let rows = [&mut row1, &mut row2, &mut row3];
                for (r, row) in rows.into_iter().enumerate() {
                    row[k] = j2[k][k] * wm[r][k];
                    row[k + 3] = j2[o1][k] * wm[r][o1] + j2[o2][k] * wm[r][o2];
                }
            }

            for i in 0..3 {
                let Some(r) = vid[i] else {
                    continue;
                };
                for j in 0..6 {
                    let Some(c) = vid[j] else {
                        continue;
                    };
                    for (m, row) in [&row1, &row2, &row3].into_iter().enumerate() {
                        let row_index = if i == m { r } else { r + nint };
                        triplets.push((row_index, c, j2[m][i] * row[j]));
                    }
                }
            }
        }

        let matrix = CsrMatrix::from_triplets(nvar, nvar, triplets);
        let factor = Factorization::lu(&matrix, "ABF")?;
        let x = factor.solve(&rhs, "ABF")?;

        for f in chart.face_ids() {
            let es = chart.face_edges(f);
            let vs = chart.face_verts(f);
            let mut pre = [0.0; 3];

            for k in 0..3 {
                let Some(id) = self.interior[vs[k].index()] else {
                    continue;
                };
                let (planar, length) = (x[id], x[nint + id]);
                for m in 0..3 {
                    let lambda = if m == k { planar } else { length };
                    pre[m] += self.j2dt[es[m].index()][k] * lambda;
                }
            }

            let fi = f.index();
            let dlambda1 = self.dstar[fi] * (self.bstar[fi] - (pre[0] + pre[1] + pre[2]));
            self.lambda_triangle[fi] += dlambda1;
            for m in 0..3 {
                self.adjust_alpha(es[m], dlambda1, pre[m]);
            }
        }

        for i in 0..nint {
            self.lambda_planar[i] += x[i];
            self.lambda_length[i] += x[nint + i];
        }
        Ok(())
    }
}

/// Optimize the planar corner angles of a chart.
///
/// Marks interior vertices with [`VertFlags::INTERIOR`] and returns one
/// angle per edge, indexed by [`EdgeId::index`]: the angle of the edge's face
/// at the edge's start vertex.
///
/// # Errors
///
/// - [`ParamError::AbfNotConverged`] if the iteration cap is reached
/// - [`ParamError::Factorization`] / [`ParamError::NonFinite`] if the reduced
///   system cannot be solved
///
/// In both cases callers are expected to fall back to the 3D angles.
pub fn abf_solve(chart: &mut Chart) -> Result<Vec<f64>> {
    for v in chart.vert_ids().collect::<Vec<_>>() {
        let interior = chart.vert_interior(v);
        chart.vert_mut(v).flag.set(VertFlags::INTERIOR, interior);
    }

    let limit = abf_tolerance(chart.num_faces());
    let mut sys = AbfSystem::new(chart);

    if sys.ninterior > 0 {
        sys.compute_sines();
        let mut converged = false;
        for iter in 0..ABF_MAX_ITER {
            let norm = sys.compute_gradient();
            log::debug!("ABF iteration {iter}: gradient norm {norm:.6e}");
            if norm < limit {
                converged = true;
                break;
            }
            sys.invert()?;
            sys.compute_sines();
        }
        if !converged {
            return Err(ParamError::AbfNotConverged {
                iterations: ABF_MAX_ITER,
            });
        }
    }

    Ok(sys.alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{ChartBuilder, FaceInput};
    use nalgebra::{Point2, Point3};

    /// A hexagonal fan around vertex 0, with the centre lifted to `height`.
    fn fan(height: f64) -> Chart {
        let mut co = vec![Point3::new(0.0, 0.0, height)];
        for i in 0..6 {
            let t = i as f64 * PI / 3.0;
            co.push(Point3::new(t.cos(), t.sin(), 0.0));
        }
        let uv = vec![Point2::origin(); 18];
        let mut builder = ChartBuilder::new();
        for i in 0..6u64 {
            let j = i % 6 + 1;
            let k = (i + 1) % 6 + 1;
            let keys = [0, j, k];
            let pos = keys.map(|key| co[key as usize]);
            let s = 3 * i as usize;
            builder
                .add_face(&FaceInput::new(i, &keys, &pos, &[s, s + 1, s + 2]), &uv)
                .unwrap();
        }
        builder.end(&uv, 1.0, false, false).charts.remove(0).mesh
    }

    fn centre(chart: &Chart) -> VertId {
        chart.vert_ids().find(|&v| chart.vert(v).key == 0).unwrap()
    }

    #[test]
    fn test_abf_flat_fan_keeps_angles() {
        let mut chart = fan(0.0);
        let alpha = abf_solve(&mut chart).unwrap();
        for f in chart.face_ids() {
            for e in chart.face_edges(f) {
                assert!((alpha[e.index()] - PI / 3.0).abs() < 1e-6);
            }
        }
        assert!(chart.vert(centre(&chart)).flag.contains(VertFlags::INTERIOR));
    }

    #[test]
    fn test_abf_cone_angle_sums() {
        let mut chart = fan(0.8);
        let alpha = abf_solve(&mut chart).unwrap();
        let limit = abf_tolerance(chart.num_faces()).sqrt();

        let c = centre(&chart);
        let sum: f64 = chart.vert_edges(c).map(|e| alpha[e.index()]).sum();
        assert!((sum - 2.0 * PI).abs() < limit, "vertex sum {sum}");

        for f in chart.face_ids() {
            let tri: f64 = chart.face_edges(f).iter().map(|e| alpha[e.index()]).sum();
            assert!((tri - PI).abs() < limit, "triangle sum {tri}");
        }
    }

    #[test]
    fn test_abf_no_interior_returns_clamped_angles() {
        // A single thin triangle: nothing to optimize, angles are clamped
        let uv = vec![Point2::origin(); 3];
        let co = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(5.0, 0.1, 0.0),
        ];
        let mut builder = ChartBuilder::new();
        builder
            .add_face(&FaceInput::new(0, &[0, 1, 2], &co, &[0, 1, 2]), &uv)
            .unwrap();
        let mut chart = builder.end(&uv, 1.0, false, false).charts.remove(0).mesh;

        let alpha = abf_solve(&mut chart).unwrap();
        assert_eq!(alpha.len(), 3);
        for a in alpha {
            assert!((MIN_ANGLE..=PI - MIN_ANGLE).contains(&a));
        }
    }
}

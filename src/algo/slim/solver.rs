//! The SLIM local-global iteration.
//!
//! Each iteration:
//!
//! 1. **Local step**: per face, polar-decompose the Jacobian and derive a
//!    weight matrix and a target map from the energy.
//! 2. **Global step**: solve the weighted ARAP normal equations, with a
//!    small proximal term and soft pin constraints, for a target UV layout.
//! 3. **Line search**: move towards the target without flipping any face.
//! 4. **Scale correction**: with pins, rescale the reference geometry so the
//!    remaining energy is not spent on a global scale mismatch.
//!
//! # References
//!
//! - Rabinovich, M., Poranne, R., Panozzo, D., & Sorkine-Hornung, O. (2017).
//!   "Scalable locally injective mappings." ACM TOG.

use nalgebra::{Matrix2, Point2, Point3, Vector2};
use rayon::prelude::*;

use crate::algo::kernels::{doublearea, grad, local_basis, GradMode, FACE_GRAIN};
use crate::algo::sparse::{CsrMatrix, Factorization};
use crate::error::{ParamError, Result};

use super::energy::{polar_svd, EnergyModel, SlimEnergy};
use super::line_search::flip_avoiding_line_search;

/// Sort pins by vertex, keeping the first target of a repeated vertex.
pub(crate) fn sorted_pins(b: Vec<usize>, bc: Vec<Point2<f64>>) -> (Vec<usize>, Vec<Point2<f64>>) {
    let mut pins: Vec<(usize, Point2<f64>)> = b.into_iter().zip(bc).collect();
    pins.sort_by_key(|&(i, _)| i);
    pins.dedup_by_key(|&mut (i, _)| i);
    pins.into_iter().unzip()
}

/// Penalty weight of pinned vertices; large enough to act as a hard constraint.
pub const SOFT_CONST_P: f64 = 1e100;

/// Weight of the proximal term that keeps the global step well posed.
pub const PROXIMAL_P: f64 = 1e-4;

/// State of one chart being optimized by SLIM.
///
/// Built by [`GeometryData::construct_slim_data`](super::GeometryData::construct_slim_data)
/// or directly with [`SlimData::new`] followed by [`slim_precompute`].
#[derive(Debug, Clone)]
pub struct SlimData {
    /// 3D positions.
    pub v: Vec<Point3<f64>>,
    /// Triangles.
    pub f: Vec<[usize; 3]>,
    /// Current UV layout.
    pub v_o: Vec<Point2<f64>>,
    /// UV layout before solving, used for blending.
    pub old_uvs: Vec<Point2<f64>>,
    /// Pinned vertices, sorted ascending.
    pub b: Vec<usize>,
    /// Pin targets, parallel to `b`.
    pub bc: Vec<Point2<f64>>,
    /// Per-face factor multiplied into the face areas.
    pub weight_per_face: Vec<f64>,
    /// Pin penalty.
    pub soft_const_p: f64,
    /// Proximal penalty.
    pub proximal_p: f64,
    /// Exponent scale of the exponential energies.
    pub exp_factor: f64,
    /// Energy being minimized.
    pub energy_kind: SlimEnergy,
    /// The layout in `v_o` was kept rather than initialized.
    pub skip_initialization: bool,
    /// Reflections of the initial layout may be kept.
    pub allow_reflection: bool,
    /// UV area the result should have, or zero when unconstrained.
    pub expected_surface_area: f64,
    /// Total (weighted) 3D area.
    pub mesh_area: f64,
    /// Energy per unit area at `v_o`.
    pub energy: f64,
    /// Chart is usable; cleared when a solve fails.
    pub valid: bool,

    m: Vec<f64>,
    dx: Vec<[f64; 3]>,
    dy: Vec<[f64; 3]>,
    has_pre_calc: bool,
}

impl SlimData {
    /// Wrap a chart with an initial layout and pins.
    ///
    /// `b` is sorted on the way in, `bc` reordered with it.
    pub fn new(v: Vec<Point3<f64>>, f: Vec<[usize; 3]>, v_o: Vec<Point2<f64>>, b: Vec<usize>, bc: Vec<Point2<f64>>) -> Self {
        let (b, bc) = sorted_pins(b, bc);

        let nf = f.len();
        Self {
            old_uvs: v_o.clone(),
            v,
            f,
            v_o,
            b,
            bc,
            weight_per_face: vec![1.0; nf],
            soft_const_p: SOFT_CONST_P,
            proximal_p: PROXIMAL_P,
            exp_factor: 1.0,
            energy_kind: SlimEnergy::default(),
            skip_initialization: false,
            allow_reflection: true,
            expected_surface_area: 0.0,
            mesh_area: 0.0,
            energy: 0.0,
            valid: true,
            m: Vec::new(),
            dx: Vec::new(),
            dy: Vec::new(),
            has_pre_calc: false,
        }
    }

    /// Number of vertices.
    pub fn num_verts(&self) -> usize {
        self.v.len()
    }

    /// Number of faces.
    pub fn num_faces(&self) -> usize {
        self.f.len()
    }

    /// Face areas after weighting, available after [`slim_precompute`].
    pub fn face_areas(&self) -> &[f64] {
        &self.m
    }

    /// Jacobian of face `i` for the layout `uv`.
    #[inline]
    fn jacobian(&self, i: usize, uv: &[Point2<f64>]) -> Matrix2<f64> {
        let f = &self.f[i];
        let (dx, dy) = (&self.dx[i], &self.dy[i]);
        let mut j = Matrix2::zeros();
        for c in 0..3 {
            let p = uv[f[c]];
            j[(0, 0)] += dx[c] * p.x;
            j[(0, 1)] += dy[c] * p.x;
            j[(1, 0)] += dx[c] * p.y;
            j[(1, 1)] += dy[c] * p.y;
        }
        j
    }

    /// Area-weighted distortion plus the pin penalty, not normalized.
    pub fn compute_energy(&self, uv: &[Point2<f64>]) -> f64 {
        let model = self.energy_kind.model(self.exp_factor);
        distortion_energy(self, &model, uv) + self.soft_const_energy(uv)
    }

    fn soft_const_energy(&self, uv: &[Point2<f64>]) -> f64 {
        self.b
            .iter()
            .zip(&self.bc)
            .map(|(&i, target)| self.soft_const_p * (target - uv[i]).norm_squared())
            .sum()
    }
}

fn distortion_energy(data: &SlimData, model: &EnergyModel, uv: &[Point2<f64>]) -> f64 {
    (0..data.num_faces())
        .into_par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|i| {
            let s = polar_svd(&data.jacobian(i, uv)).sing;
            data.m[i] * model.density(s[0], s[1])
        })
        .sum()
}

/// Precompute the reference geometry of a chart: face areas, the gradient
/// operator in each face's local frame, and the starting energy.
///
/// Calling it again on the same data is a no-op apart from refreshing the
/// energy.
pub fn slim_precompute(data: &mut SlimData, energy: SlimEnergy, soft_const_p: f64) {
    data.energy_kind = energy;
    data.soft_const_p = soft_const_p;

    if !data.has_pre_calc {
        let areas = doublearea(&data.v, &data.f);
        data.m = areas
            .iter()
            .zip(&data.weight_per_face)
            .map(|(a, w)| 0.5 * a * w)
            .collect();
        data.mesh_area = data.m.iter().sum();

        let g = grad(&data.v, &data.f, GradMode::Geometric);
        let basis = local_basis(&data.v, &data.f);
        data.dx = g
            .rows
            .iter()
            .zip(&basis)
            .map(|(g, (b1, _))| [g[0].dot(b1), g[1].dot(b1), g[2].dot(b1)])
            .collect();
        data.dy = g
            .rows
            .iter()
            .zip(&basis)
            .map(|(g, (_, b2))| [g[0].dot(b2), g[1].dot(b2), g[2].dot(b2)])
            .collect();
        data.has_pre_calc = true;
    }

    data.energy = normalized_energy(data, &data.v_o);
}

fn normalized_energy(data: &SlimData, uv: &[Point2<f64>]) -> f64 {
    if data.mesh_area > 0.0 {
        data.compute_energy(uv) / data.mesh_area
    } else {
        0.0
    }
}

/// Per-face weight matrix and target map of the local step.
fn local_step(data: &SlimData, model: &EnergyModel) -> Vec<(Matrix2<f64>, Matrix2<f64>)> {
    (0..data.num_faces())
        .into_par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|i| {
            let p = polar_svd(&data.jacobian(i, &data.v_o));
            let w = model.weights(p.sing[0], p.sing[1]);
            let weight = p.u * Matrix2::from_diagonal(&Vector2::from(w.sing)) * p.u.transpose();
            let target = match w.target {
                Some(t) => p.u * Matrix2::from_diagonal(&Vector2::from(t)) * p.v.transpose(),
                None => p.rotation,
            };
            (weight, target)
        })
        .collect()
}

/// Solve the weighted ARAP system for the next target layout.
///
/// Unknowns are all `u` values followed by all `v` values. Each face adds
/// four rows `W (J - R)` to the least-squares problem.
fn global_step(data: &SlimData, local: &[(Matrix2<f64>, Matrix2<f64>)]) -> Result<Vec<Point2<f64>>> {
    let n = data.num_verts();
    let mut triplets = Vec::with_capacity(data.num_faces() * 4 * 36 + 2 * n);
    let mut rhs = vec![0.0; 2 * n];

    for (i, (w, r)) in local.iter().enumerate() {
        let f = &data.f[i];
        let area = data.m[i];
        // (row of W, column of J and R)
        let rows = [(0, 0, &data.dx[i]), (0, 1, &data.dy[i]), (1, 0, &data.dx[i]), (1, 1, &data.dy[i])];
        for (wrow, col, d) in rows {
            let (wa, wb) = (w[(wrow, 0)], w[(wrow, 1)]);
            let b = wa * r[(0, col)] + wb * r[(1, col)];

            let mut row = [(0usize, 0.0f64); 6];
            for c in 0..3 {
                row[c] = (f[c], wa * d[c]);
                row[3 + c] = (n + f[c], wb * d[c]);
            }
            for &(ri, ci) in &row {
                rhs[ri] += area * ci * b;
                for &(rj, cj) in &row {
                    triplets.push((ri, rj, area * ci * cj));
                }
            }
        }
    }

    for (k, p) in data.v_o.iter().enumerate() {
        triplets.push((k, k, data.proximal_p));
        triplets.push((n + k, n + k, data.proximal_p));
        rhs[k] += data.proximal_p * p.x;
        rhs[n + k] += data.proximal_p * p.y;
    }

    for (&vi, target) in data.b.iter().zip(&data.bc) {
        triplets.push((vi, vi, data.soft_const_p));
        triplets.push((n + vi, n + vi, data.soft_const_p));
        rhs[vi] += data.soft_const_p * target.x;
        rhs[n + vi] += data.soft_const_p * target.y;
    }

    let l = CsrMatrix::from_triplets(2 * n, 2 * n, triplets);
    let x = Factorization::cholesky(&l, "SLIM global step")?.solve(&rhs, "SLIM global step")?;
    if x.iter().any(|c| !c.is_finite()) {
        return Err(ParamError::NonFinite {
            context: "SLIM global step",
        });
    }

    let mut uv: Vec<Point2<f64>> = (0..n).map(|k| Point2::new(x[k], x[n + k])).collect();
    for (&vi, target) in data.b.iter().zip(&data.bc) {
        uv[vi] = *target;
    }
    Ok(uv)
}

/// Closed-form global scale `x` minimizing `Σ a (x² s² + 1 / (x² s²))`.
fn global_scale_factor(data: &SlimData) -> f64 {
    let (num, den) = (0..data.num_faces())
        .into_par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|i| {
            let s = polar_svd(&data.jacobian(i, &data.v_o)).sing;
            let a = data.m[i];
            (
                a * (1.0 / (s[0] * s[0]) + 1.0 / (s[1] * s[1])),
                a * (s[0] * s[0] + s[1] * s[1]),
            )
        })
        .reduce(|| (0.0, 0.0), |x, y| (x.0 + y.0, x.1 + y.1));
    (num / den).powf(0.25)
}

/// Run `iterations` SLIM iterations on `data`, updating `data.v_o`.
///
/// # Errors
///
/// Returns [`ParamError::SlimFailed`] for a chart that was never set up,
/// and the factorization or [`ParamError::NonFinite`] error of a global step
/// that fails. `v_o` keeps the last accepted layout and
/// `valid` is cleared.
pub fn slim_solve(data: &mut SlimData, iterations: usize) -> Result<()> {
    if !data.valid {
        return Err(ParamError::SlimFailed {
            reason: "chart was not set up",
        });
    }
    if !data.has_pre_calc {
        slim_precompute(data, data.energy_kind, data.soft_const_p);
    }

    // Pins may have moved since the last solve
    data.energy = normalized_energy(data, &data.v_o);

    let model = data.energy_kind.model(data.exp_factor);
    for iter in 0..iterations {
        let local = local_step(data, &model);
        let target = match global_step(data, &local) {
            Ok(uv) => uv,
            Err(err) => {
                data.valid = false;
                return Err(err);
            }
        };

        let mut v_o = std::mem::take(&mut data.v_o);
        let cur_energy = data.energy * data.mesh_area;
        let snapshot = &*data;
        let energy = flip_avoiding_line_search(
            &snapshot.f,
            &mut v_o,
            &target,
            |uv| snapshot.compute_energy(uv),
            cur_energy,
        );
        data.v_o = v_o;
        data.energy = if data.mesh_area > 0.0 { energy / data.mesh_area } else { 0.0 };

        if !data.b.is_empty() {
            let scale = global_scale_factor(data);
            if scale.is_finite() && scale > 0.0 {
                for g in data.dx.iter_mut().chain(data.dy.iter_mut()) {
                    for c in g.iter_mut() {
                        *c *= scale;
                    }
                }
                data.energy = normalized_energy(data, &data.v_o);
            }
        }

        log::debug!("SLIM iteration {iter}: energy {:.6}", data.energy);
    }
    Ok(())
}

//! Distortion energies.
//!
//! Every energy is a function of the two singular values of a face's
//! Jacobian. SLIM needs two things from it: the energy density itself (for
//! the line search) and a per-face weight for the local step, derived from
//! the derivative of the density. The energy is chart-global, so it is
//! resolved once into an [`EnergyModel`] before the per-face loops.

use nalgebra::{Matrix2, Vector2};

/// The distortion measure minimized by SLIM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlimEnergy {
    /// As-rigid-as-possible: `(s1 - 1)² + (s2 - 1)²`.
    Arap,
    /// `s1² + 1/s1² + s2² + 1/s2²`. Infinite for degenerate faces, so
    /// minimizers never flip.
    #[default]
    SymmetricDirichlet,
    /// `log(s1)² + log(s2)²`.
    LogArap,
    /// `(s1² + s2²) / (2 s1 s2)`.
    Conformal,
    /// `exp(k · conformal)`.
    ExpConformal,
    /// `exp(k · symmetric Dirichlet)`.
    ExpSymmetricDirichlet,
}

impl SlimEnergy {
    /// Resolve the density and local-step weights for this energy.
    ///
    /// `exp_factor` is the exponent scale `k` of the exponential energies.
    pub fn model(self, exp_factor: f64) -> EnergyModel {
        let (density, weights): (DensityFn, WeightFn) = match self {
            SlimEnergy::Arap => (arap_density, arap_weights),
            SlimEnergy::SymmetricDirichlet => (sd_density, sd_weights),
            SlimEnergy::LogArap => (log_arap_density, log_arap_weights),
            SlimEnergy::Conformal => (conformal_density, conformal_weights),
            SlimEnergy::ExpConformal => (exp_conformal_density, exp_conformal_weights),
            SlimEnergy::ExpSymmetricDirichlet => (exp_sd_density, exp_sd_weights),
        };
        EnergyModel {
            exp_factor,
            density,
            weights,
        }
    }
}

type DensityFn = fn(f64, f64, f64) -> f64;
type WeightFn = fn(f64, f64, f64) -> LocalWeights;

/// Weights of the local step for one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalWeights {
    /// Weight per singular direction.
    pub sing: [f64; 2],
    /// Target singular values, when the closest map is not a rotation.
    pub target: Option<[f64; 2]>,
}

impl LocalWeights {
    fn rotation(w1: f64, w2: f64) -> Self {
        Self {
            sing: [w1, w2],
            target: None,
        }
    }
}

/// An energy resolved for one chart.
#[derive(Debug, Clone, Copy)]
pub struct EnergyModel {
    exp_factor: f64,
    density: DensityFn,
    weights: WeightFn,
}

impl EnergyModel {
    /// Energy density of a face with singular values `s1`, `s2`.
    #[inline]
    pub fn density(&self, s1: f64, s2: f64) -> f64 {
        (self.density)(s1, s2, self.exp_factor)
    }

    /// Local-step weights; singular values within `1e-8` of one get weight one.
    #[inline]
    pub fn weights(&self, s1: f64, s2: f64) -> LocalWeights {
        const EPS: f64 = 1e-8;
        let mut w = (self.weights)(s1, s2, self.exp_factor);
        if (s1 - 1.0).abs() < EPS || !w.sing[0].is_finite() {
            w.sing[0] = 1.0;
        }
        if (s2 - 1.0).abs() < EPS || !w.sing[1].is_finite() {
            w.sing[1] = 1.0;
        }
        w
    }
}

/// Weight for a singular value given the derivative of the density.
#[inline]
fn weight(grad: f64, s: f64, target: f64) -> f64 {
    (grad / (2.0 * (s - target))).sqrt()
}

fn sd_grad(s: f64) -> f64 {
    2.0 * (s - s.powi(-3))
}

fn sd_sum(s1: f64, s2: f64) -> f64 {
    s1 * s1 + s1.powi(-2) + s2 * s2 + s2.powi(-2)
}

fn conformal_ratio(s1: f64, s2: f64) -> f64 {
    (s1 * s1 + s2 * s2) / (2.0 * s1 * s2)
}

fn arap_density(s1: f64, s2: f64, _: f64) -> f64 {
    (s1 - 1.0).powi(2) + (s2 - 1.0).powi(2)
}

fn arap_weights(_: f64, _: f64, _: f64) -> LocalWeights {
    LocalWeights::rotation(1.0, 1.0)
}

fn sd_density(s1: f64, s2: f64, _: f64) -> f64 {
    sd_sum(s1, s2)
}

fn sd_weights(s1: f64, s2: f64, _: f64) -> LocalWeights {
    LocalWeights::rotation(weight(sd_grad(s1), s1, 1.0), weight(sd_grad(s2), s2, 1.0))
}

fn log_arap_density(s1: f64, s2: f64, _: f64) -> f64 {
    s1.ln().powi(2) + s2.ln().powi(2)
}

fn log_arap_weights(s1: f64, s2: f64, _: f64) -> LocalWeights {
    let g1 = 2.0 * (s1.ln() / s1);
    let g2 = 2.0 * (s2.ln() / s2);
    LocalWeights::rotation(weight(g1, s1, 1.0), weight(g2, s2, 1.0))
}

fn conformal_density(s1: f64, s2: f64, _: f64) -> f64 {
    conformal_ratio(s1, s2)
}

fn conformal_weights(s1: f64, s2: f64, _: f64) -> LocalWeights {
    let g1 = 1.0 / (2.0 * s2) - s2 / (2.0 * s1 * s1);
    let g2 = 1.0 / (2.0 * s1) - s1 / (2.0 * s2 * s2);
    // The closest conformal map scales both directions by the geometric mean
    let geo_avg = (s1 * s2).sqrt();
    LocalWeights {
        sing: [weight(g1, s1, geo_avg), weight(g2, s2, geo_avg)],
        target: Some([geo_avg, geo_avg]),
    }
}

fn exp_conformal_density(s1: f64, s2: f64, k: f64) -> f64 {
    (k * conformal_ratio(s1, s2)).exp()
}

fn exp_conformal_weights(s1: f64, s2: f64, k: f64) -> LocalWeights {
    let e = (k * conformal_ratio(s1, s2)).exp() * k;
    LocalWeights::rotation(
        weight(sd_grad(s1) * e, s1, 1.0),
        weight(sd_grad(s2) * e, s2, 1.0),
    )
}

fn exp_sd_density(s1: f64, s2: f64, k: f64) -> f64 {
    (k * sd_sum(s1, s2)).exp()
}

fn exp_sd_weights(s1: f64, s2: f64, k: f64) -> LocalWeights {
    let e = (k * sd_sum(s1, s2)).exp() * k;
    LocalWeights::rotation(
        weight(sd_grad(s1) * e, s1, 1.0),
        weight(sd_grad(s2) * e, s2, 1.0),
    )
}

/// Polar decomposition of a 2x2 Jacobian through its SVD `J = U S Vᵀ`.
#[derive(Debug, Clone, Copy)]
pub struct PolarSvd {
    /// Closest rotation to `J`.
    pub rotation: Matrix2<f64>,
    /// Left singular vectors.
    pub u: Matrix2<f64>,
    /// Singular values, descending.
    pub sing: Vector2<f64>,
    /// Right singular vectors.
    pub v: Matrix2<f64>,
}

/// Polar SVD of `j`. When `U Vᵀ` is a reflection, the last column of `V` is
/// negated so the returned rotation is proper.
pub fn polar_svd(j: &Matrix2<f64>) -> PolarSvd {
    let svd = j.svd(true, true);
    let (u, v) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t.transpose()),
        _ => (Matrix2::identity(), Matrix2::identity()),
    };

    let mut rotation = u * v.transpose();
    if rotation.determinant() < 0.0 {
        let mut w = v;
        w.column_mut(1).neg_mut();
        rotation = u * w.transpose();
    }

    PolarSvd {
        rotation,
        u,
        sing: svd.singular_values,
        v,
    }
}

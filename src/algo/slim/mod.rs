//! Scalable Locally Injective Mappings.
//!
//! SLIM minimizes a distortion energy over a chart's UV layout while never
//! letting a triangle flip. Each chart is first given a flip-free layout
//! (the existing one, or a mean value map onto a circle), moved onto its
//! pins, and then improved by local-global iterations.
//!
//! # Pipeline
//!
//! 1. [`MatrixTransferChart::from_chart`] copies a chart into dense arrays.
//! 2. [`GeometryData::construct_slim_data`] initializes the layout and
//!    precomputes the solver state.
//! 3. [`slim_solve`] runs a fixed number of iterations.
//!
//! [`MatrixTransfer`] runs this for many charts at once, in parallel.
//!
//! # Example
//!
//! ```
//! use unfold::algo::slim::{slim_precompute, slim_solve, SlimData, SlimEnergy, SOFT_CONST_P};
//! use nalgebra::{Point2, Point3};
//!
//! let v = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let uv = vec![
//!     Point2::new(0.0, 0.0),
//!     Point2::new(2.0, 0.0),
//!     Point2::new(0.0, 0.5),
//! ];
//! let mut data = SlimData::new(v, vec![[0, 1, 2]], uv, vec![], vec![]);
//! slim_precompute(&mut data, SlimEnergy::SymmetricDirichlet, SOFT_CONST_P);
//! let before = data.energy;
//! slim_solve(&mut data, 5).unwrap();
//! assert!(data.energy < before);
//! ```
//!
//! # References
//!
//! - Rabinovich, M., Poranne, R., Panozzo, D., & Sorkine-Hornung, O. (2017).
//!   "Scalable locally injective mappings." ACM TOG.

mod area_compensation;
mod energy;
pub(crate) mod line_search;
mod relocator;
mod solver;
mod transfer;

pub use area_compensation::{correct_map_surface_area_if_necessary, correct_mesh_surface_area_if_necessary};
pub use energy::{polar_svd, EnergyModel, LocalWeights, PolarSvd, SlimEnergy};
pub use line_search::{count_flips, flip_avoiding_line_search, smallest_pos_quad_zero};
pub use relocator::{adjust_pins, transform_initialization_if_necessary, PinnedVertexData};
pub use solver::{slim_precompute, slim_solve, SlimData, PROXIMAL_P, SOFT_CONST_P};
pub use transfer::{GeometryData, MatrixTransfer, MatrixTransferChart};

/// Options for SLIM solves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlimOptions {
    /// Iterations per chart for a full solve.
    pub iterations: usize,
    /// How strongly vertex weights scale faces; zero disables weighting.
    pub weight_influence: f64,
    /// Allow the initial layout to be mirrored to fit the pins.
    pub allow_reflection: bool,
    /// Start from the existing UVs instead of a fresh initialization,
    /// when they contain no flipped triangle.
    pub skip_initialization: bool,
    /// Pin the outer boundary at its initial position.
    pub fixed_boundary: bool,
    /// Stretch minimization: every unselected vertex is pinned.
    pub minimize_stretch: bool,
    /// Energy to minimize.
    pub energy: SlimEnergy,
    /// Exponent scale of the exponential energies.
    pub exp_factor: f64,
}

impl Default for SlimOptions {
    fn default() -> Self {
        Self {
            iterations: 10,
            weight_influence: 0.0,
            allow_reflection: false,
            skip_initialization: false,
            fixed_boundary: false,
            minimize_stretch: false,
            energy: SlimEnergy::SymmetricDirichlet,
            exp_factor: 1.0,
        }
    }
}

impl SlimOptions {
    /// Options for stretch minimization of an existing layout.
    pub fn stretch() -> Self {
        Self {
            skip_initialization: true,
            minimize_stretch: true,
            ..Default::default()
        }
    }

    /// Set the iteration count.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the vertex weight influence.
    pub fn with_weight_influence(mut self, influence: f64) -> Self {
        self.weight_influence = influence;
        self
    }

    /// Allow or forbid mirroring the initial layout.
    pub fn with_reflection(mut self, allow: bool) -> Self {
        self.allow_reflection = allow;
        self
    }

    /// Keep the existing UVs as the starting layout.
    pub fn with_skip_initialization(mut self, skip: bool) -> Self {
        self.skip_initialization = skip;
        self
    }

    /// Pin the outer boundary.
    pub fn with_fixed_boundary(mut self, fixed: bool) -> Self {
        self.fixed_boundary = fixed;
        self
    }

    /// Enable stretch minimization.
    pub fn with_minimize_stretch(mut self, minimize: bool) -> Self {
        self.minimize_stretch = minimize;
        self
    }

    /// Set the energy.
    pub fn with_energy(mut self, energy: SlimEnergy) -> Self {
        self.energy = energy;
        self
    }

    /// Set the exponent scale of the exponential energies.
    pub fn with_exp_factor(mut self, factor: f64) -> Self {
        self.exp_factor = factor;
        self
    }
}

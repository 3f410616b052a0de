//! Flattening of individual charts.
//!
//! This module holds the building blocks of the classic unwrap path and the
//! SLIM initializer:
//!
//! - [`abf_solve`]: Angle Based Flattening, planar angles close to the 3D ones
//! - [`lscm_begin`] / [`lscm_solve`] / [`lscm_finish`]: Least Squares
//!   Conformal Maps with automatic pin selection
//! - [`convex_border_parameterization`]: Tutte, harmonic or mean value
//!   embedding with the boundary on a circle
//! - [`minimum_area_angle`]: rotation to the smallest enclosing rectangle
//!
//! # Requirements
//!
//! Charts need at least one boundary loop. Closed meshes must be cut along
//! seams first.
//!
//! # Example
//!
//! ```
//! use unfold::algo::parameterize::{lscm_begin, lscm_finish, lscm_solve, LscmOptions};
//! use unfold::mesh::{ChartBuilder, FaceInput};
//! use nalgebra::{Point2, Point3};
//!
//! let uv_layer = vec![Point2::origin(); 6];
//! let co = [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.3),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mut builder = ChartBuilder::new();
//! builder
//!     .add_face(&FaceInput::new(0, &[0, 1, 2], &[co[0], co[1], co[2]], &[0, 1, 2]), &uv_layer)
//!     .unwrap();
//! builder
//!     .add_face(&FaceInput::new(1, &[0, 2, 3], &[co[0], co[2], co[3]], &[3, 4, 5]), &uv_layer)
//!     .unwrap();
//! let mut chart = builder.end(&uv_layer, 1.0, false, false).charts.remove(0).mesh;
//!
//! let mut ctx = lscm_begin(&mut chart, &LscmOptions::default()).unwrap();
//! lscm_solve(&mut chart, &mut ctx).unwrap();
//! lscm_finish(&mut chart, &ctx);
//! assert!(chart.face_ids().all(|f| chart.face_uv_area_signed(f) > 0.0));
//! ```

mod abf;
mod convex_border;
mod hull;
mod lscm;
mod pins;

pub use abf::{abf_solve, abf_tolerance, ABF_MAX_ITER};
pub use convex_border::{convex_border_parameterization, map_vertices_to_convex_border, BorderMethod};
pub use hull::{convex_hull, minimum_area_angle, ConvexHull};
pub use lscm::{
    lscm_begin, lscm_finish, lscm_solve, match_boundary_length, rotate_minimum_area, LscmContext,
    LscmOptions,
};
pub use pins::{extrema_verts, pin_positions, symmetry_pins};

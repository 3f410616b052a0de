//! Geometry kernels over dense vertex/face arrays.
//!
//! These are the numerical primitives shared by the border initializer,
//! ABF and SLIM. Faces are `[usize; 3]` triangles indexing into a vertex
//! slice. Per-face scans are data-parallel through rayon.
//!
//! Per-face edge quantities follow one fixed column convention: column 0 is
//! the edge `[1,2]` (opposite corner 0), column 1 is `[2,0]`, column 2 is
//! `[0,1]`.

mod angles;
mod area;
mod gradient;
mod laplacian;
mod lengths;

pub use angles::{corner_angle, triangle_angles};
pub use area::{doublearea, doublearea_from_lengths, doublearea_signed, surface_area};
pub use gradient::{grad, local_basis, GradMode, GradientOperator};
pub use laplacian::cotmatrix;
pub use lengths::{edge_lengths, squared_edge_lengths};

/// Minimum number of faces handed to one rayon task in per-face scans.
pub(crate) const FACE_GRAIN: usize = 1000;

//! Parameterization algorithms.
//!
//! This module contains the numerical side of unwrapping:
//!
//! - **Kernels**: edge lengths, areas, angles, cotangent Laplacian, gradients
//! - **Sparse**: triplet assembly and direct solvers backed by faer
//! - **Parameterization**: convex border maps, ABF, LSCM, convex hulls
//! - **SLIM**: locally injective distortion minimization
//! - **Packing**: placing charts in the unit square
//! - **Smoothing**: evening out UV area across a chart
//!
//! Algorithms work on a [`Chart`](crate::mesh::Chart) or on dense
//! vertex/face arrays. The [`handle`](crate::handle) module strings them
//! together into the unwrap lifecycle.

pub mod kernels;
pub mod pack;
pub mod parameterize;
pub mod progress;
pub mod slim;
pub mod smooth;
pub mod sparse;

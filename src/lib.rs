//! # Unfold
//!
//! UV unwrapping for triangle and quad meshes.
//!
//! Unfold cuts a mesh into charts along seams, flattens each chart into the
//! plane and packs the results into the unit square. Two flattening paths are
//! provided:
//!
//! - **LSCM**, optionally on angles optimized by ABF, with automatic pins
//!   and a minimum-area rotation of unpinned charts
//! - **SLIM**, which minimizes a distortion energy without ever flipping a
//!   triangle, starting from a mean value map onto a circle
//!
//! ## Features
//!
//! - **Half-edge charts**: index-addressed vertices, edges and faces with
//!   seam, pin and selection flags
//! - **Sparse solvers**: Cholesky and LU factorizations through faer
//! - **Parallel charts**: independent charts are solved on rayon worker threads
//! - **Live sessions**: pins can be moved and the chart solved again without
//!   rebuilding it
//!
//! ## Quick Start
//!
//! ```
//! use unfold::prelude::*;
//! use nalgebra::{Point2, Point3};
//!
//! // A bent quad strip: two quads sharing an edge
//! let co = [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(2.0, 0.0, 0.5),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(2.0, 1.0, 0.5),
//! ];
//! let quads = [[0, 1, 4, 3], [1, 2, 5, 4]];
//!
//! let mut handle = ParamHandle::new(vec![Point2::origin(); 8]);
//! for (f, quad) in quads.iter().enumerate() {
//!     let keys = quad.map(|v| v as u64);
//!     let pos = quad.map(|v| co[v]);
//!     let slots = [4 * f, 4 * f + 1, 4 * f + 2, 4 * f + 3];
//!     handle.add_face(&FaceInput::new(f as u64, &keys, &pos, &slots)).unwrap();
//! }
//! handle.end(&ConstructOptions::default()).unwrap();
//!
//! let report = handle.slim_solve(&SlimOptions::default()).unwrap();
//! assert_eq!(report.failed, 0);
//!
//! handle.pack(&PackOptions::default()).unwrap();
//! handle.flush().unwrap();
//! let uvs = handle.into_uv_layer();
//! assert!(uvs.iter().all(|uv| uv.x >= -1e-9 && uv.x <= 1.0 + 1e-9));
//! ```
//!
//! ## Lower Level
//!
//! The solvers can be used without a handle. [`mesh::ChartBuilder`] builds
//! charts, [`algo::parameterize`] flattens them, and [`algo::slim`] also
//! accepts plain vertex and face arrays.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod handle;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use unfold::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::pack::PackOptions;
    pub use crate::algo::parameterize::LscmOptions;
    pub use crate::algo::slim::{SlimEnergy, SlimOptions};
    pub use crate::error::{ParamError, Result};
    pub use crate::handle::{ConstructOptions, ParamHandle, SolveReport};
    pub use crate::mesh::{Chart, ChartBuilder, EdgeId, FaceId, FaceInput, ParamKey, VertId};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::{Point2, Point3};

    #[test]
    fn test_open_pyramid() {
        // Four triangles around an apex: one chart with one boundary loop
        let co = [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
        ];
        let mut handle = ParamHandle::new(vec![Point2::origin(); 12]);
        for f in 0..4 {
            let tri = [0, 1 + f, 1 + (f + 1) % 4];
            let keys = tri.map(|v| v as ParamKey);
            let pos = tri.map(|v| co[v]);
            let slots = [3 * f, 3 * f + 1, 3 * f + 2];
            handle
                .add_face(&FaceInput::new(f as ParamKey, &keys, &pos, &slots))
                .unwrap();
        }
        handle.end(&ConstructOptions::default()).unwrap();
        assert_eq!(handle.num_charts(), 1);

        let chart = handle.charts()[0].mesh();
        assert_eq!(chart.num_verts(), 5);
        assert_eq!(chart.num_faces(), 4);
        assert_eq!(chart.boundaries().count, 1);
    }
}

//! Chart data structures and construction.
//!
//! # Overview
//!
//! Faces are fed to a [`ChartBuilder`] one polygon at a time, keyed by the
//! host's vertex and face keys. [`ChartBuilder::end`] connects edges shared by
//! two faces, splits the input into connected [`Chart`]s along seams and
//! non-manifold vertices, and optionally fills inner holes.
//!
//! # Index Types
//!
//! Chart elements are identified by type-safe `u32` index wrappers:
//! - [`VertId`] - Identifies a vertex
//! - [`EdgeId`] - Identifies a half-edge
//! - [`FaceId`] - Identifies a face
//!
//! # Construction
//!
//! ```
//! use unfold::mesh::{ChartBuilder, FaceInput};
//! use nalgebra::{Point2, Point3};
//!
//! let uv_layer = vec![Point2::origin(); 3];
//! let co = [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//!
//! let mut builder = ChartBuilder::new();
//! builder
//!     .add_face(&FaceInput::new(0, &[0, 1, 2], &co, &[0, 1, 2]), &uv_layer)
//!     .unwrap();
//! let built = builder.end(&uv_layer, 1.0, false, false);
//! assert_eq!(built.charts.len(), 1);
//! ```

mod builder;
mod chart;
mod fill;
mod index;
#[cfg(test)]
pub(crate) mod testing;

pub use builder::{BuiltChart, BuiltCharts, ChartBuilder, FaceInput};
pub(crate) use builder::load_pin_select_uvs;
pub use chart::{Boundaries, Chart, Edge, Face, Vert, WheelIter};
pub use index::{EdgeFlags, EdgeId, FaceFlags, FaceId, ParamKey, VertFlags, VertId};

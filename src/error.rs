//! Error types for unfold.
//!
//! Every solver entry point returns [`Result`]. Failures are chart-scoped: the
//! orchestration layer turns them into per-chart success flags instead of
//! aborting a whole batch.

use thiserror::Error;

/// Result type alias using [`ParamError`].
pub type Result<T> = std::result::Result<T, ParamError>;

/// Errors that can occur while building or solving charts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    /// A face has repeated vertex keys.
    #[error("face {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The face key.
        face: u64,
    },

    /// Only triangles and quads can be added to a handle.
    #[error("faces with {nverts} vertices are not supported")]
    UnsupportedPolygon {
        /// Number of vertices supplied.
        nverts: usize,
    },

    /// The per-corner input slices of a face have mismatched lengths.
    #[error("face {face}: expected {expected} per-corner values, got {found}")]
    CornerCountMismatch {
        /// The face key.
        face: u64,
        /// Number of vertex keys.
        expected: usize,
        /// Length of the offending slice.
        found: usize,
    },

    /// A UV slot index is outside the handle's UV layer.
    #[error("uv slot {slot} is outside the uv layer (len {len})")]
    InvalidUvSlot {
        /// The slot index.
        slot: usize,
        /// Length of the UV layer.
        len: usize,
    },

    /// The handle is not in the state required by the operation.
    #[error("invalid handle state: expected {expected}, found {found}")]
    InvalidState {
        /// State the operation requires.
        expected: &'static str,
        /// Current state.
        found: &'static str,
    },

    /// Building a sparse matrix from triplets failed.
    #[error("failed to assemble {context} matrix")]
    Assembly {
        /// Which system was being assembled.
        context: &'static str,
    },

    /// A sparse factorization failed (singular or not positive definite).
    #[error("{context} factorization failed")]
    Factorization {
        /// Which system was being factorized.
        context: &'static str,
    },

    /// A solve produced NaN or infinite values.
    #[error("{context} produced non-finite values")]
    NonFinite {
        /// Which stage produced them.
        context: &'static str,
    },

    /// ABF did not reach its gradient tolerance within the iteration cap.
    #[error("angle based flattening did not converge after {iterations} iterations")]
    AbfNotConverged {
        /// Number of iterations attempted.
        iterations: usize,
    },

    /// A SLIM chart could not be set up or solved.
    #[error("slim failed: {reason}")]
    SlimFailed {
        /// Short description of the failure.
        reason: &'static str,
    },

    /// An interior vertex has no weighted neighbours in the border system.
    #[error("interior vertex {vertex} has a zero diagonal in the border system")]
    IsolatedVertex {
        /// The vertex index.
        vertex: usize,
    },

    /// Not enough points for a convex hull.
    #[error("need at least {required} points, got {found}")]
    TooFewPoints {
        /// Minimum required.
        required: usize,
        /// Points supplied.
        found: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl ParamError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        ParamError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

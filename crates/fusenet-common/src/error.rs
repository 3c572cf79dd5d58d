//! Error taxonomy shared by every fusenet crate.
//!
//! Three families matter to callers:
//!
//! - [`ConfigError`]: an operator's attributes are malformed. Raised when the
//!   operator config is built and never retried.
//! - [`FusenetError::UnsupportedShape`]: the static input shape cannot be
//!   lowered. Detected while planning, recorded, and returned from every
//!   subsequent bind.
//! - [`FusenetError::Allocation`]: scratch or intermediate memory could not
//!   be obtained during bind.
//!
//! All variants are `Clone` so a recorded failure can be handed back on each
//! call without re-running the step that produced it.

use thiserror::Error;

/// Top-level error for planning, binding and executing a fused chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FusenetError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("unsupported shape {shape:?}: {reason}")]
    UnsupportedShape { shape: Vec<usize>, reason: String },

    #[error("allocation failed: size={size} bytes")]
    Allocation { size: usize },

    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("binding error: {0}")]
    Binding(String),
}

impl FusenetError {
    pub fn unsupported_shape(shape: &[usize], reason: impl Into<String>) -> Self {
        Self::UnsupportedShape { shape: shape.to_vec(), reason: reason.into() }
    }

    pub fn binding(reason: impl Into<String>) -> Self {
        Self::Binding(reason.into())
    }
}

/// Malformed operator attributes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("required attribute `{name}` is missing")]
    MissingAttribute { name: String },

    #[error("attribute `{name}` has the wrong type: expected {expected}")]
    AttributeType { name: String, expected: &'static str },

    #[error("unrecognized auto_pad value `{0}`")]
    InvalidAutoPad(String),

    #[error("kernel extent on axis {axis} must be > 0, got {value}")]
    NonPositiveKernel { axis: usize, value: i64 },

    #[error("pad on axis {axis} must be smaller than kernel extent {kernel}, got {pad}")]
    PadNotSmallerThanKernel { axis: usize, pad: usize, kernel: usize },

    #[error("strides have {strides} entries but kernel_shape has {kernel}")]
    StrideLengthMismatch { strides: usize, kernel: usize },

    #[error("pads must have {expected} entries, got {got}")]
    PadsLength { expected: usize, got: usize },

    #[error("stride on axis {axis} must be > 0")]
    NonPositiveStride { axis: usize },

    #[error("attribute `{name}` contains negative value {value}")]
    NegativeValue { name: String, value: i64 },

    #[error("operator `{0}` is not a supported pooling operator")]
    UnsupportedOperator(String),

    #[error("kernel has {kernel} spatial axes but input has {input}")]
    SpatialRankMismatch { kernel: usize, input: usize },
}

/// Failures raised by the primitive library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("invalid kernel arguments: {reason}")]
    InvalidArguments { reason: String },

    #[error("format `{format}` cannot describe a rank-{rank} tensor")]
    UnsupportedFormat { format: String, rank: usize },

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("{role} buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { role: &'static str, required: usize, actual: usize },
}

impl KernelError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArguments { reason: reason.into() }
    }
}

/// Result type used across the fusenet crates.
pub type Result<T, E = FusenetError> = std::result::Result<T, E>;

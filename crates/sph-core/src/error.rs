//! Error types for sph-core.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SphError {
    #[error("system resolution ratio must be positive and finite, got {0}")]
    InvalidResolutionRatio(f32),

    #[error("smoothing length to spacing ratio must be positive and finite, got {0}")]
    InvalidSpacingRatio(f32),

    #[error("particle spacing must be positive and finite, got {0}")]
    InvalidSpacing(f32),

    #[error("local refinement level {level} exceeds the supported maximum {max}")]
    RefinementTooDeep { level: u32, max: u32 },

    #[error("invalid domain: lower corner {lower:?} must lie below upper corner {upper:?}")]
    InvalidDomain { lower: [f32; 3], upper: [f32; 3] },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid material parameter: {0}")]
    InvalidMaterial(String),

    #[error("particles {i} and {j} occupy the same position")]
    CoincidentParticles { i: usize, j: usize },

    #[error("field `{name}` holds {found} values but the particle set has {expected}")]
    FieldSizeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("non-finite {field} at particle {index} (t = {time})")]
    Diverged {
        field: &'static str,
        index: usize,
        time: f32,
    },

    #[error("body index {0} is out of range")]
    UnknownBody(usize),

    #[error("contact link index {0} is out of range")]
    UnknownContact(usize),

    #[error("bodies {body} and {target} use different kernels and cannot be linked")]
    KernelMismatch { body: usize, target: usize },
}

pub type Result<T> = std::result::Result<T, SphError>;

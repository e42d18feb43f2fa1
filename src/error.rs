// errors for building and stepping the solver
use std::fmt;

#[derive(Debug)]
pub enum FluidError {
    NoParticles,
    NoMeshVertices,
    TriangleIndexCount { len: usize },
    TriangleIndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },
    InvalidSmoothingRadius(f32),
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    InvalidParameter {
        name: &'static str,
        reason: &'static str,
    },
    TooManyPoints(usize),
    ResetWhileRunning,
    // the only error a running frame can return
    NonFiniteState { index: usize },
    Config(serde_json::Error),
}

impl fmt::Display for FluidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluidError::NoParticles => write!(f, "Simulation needs at least one particle"),
            FluidError::NoMeshVertices => write!(f, "Collision mesh needs at least one vertex"),
            FluidError::TriangleIndexCount { len } => write!(
                f,
                "Triangle index list has {} entries, which is not a multiple of 3",
                len
            ),
            FluidError::TriangleIndexOutOfRange {
                triangle,
                index,
                vertex_count,
            } => write!(
                f,
                "Triangle {} references vertex {} but the mesh only has {} vertices",
                triangle, index, vertex_count
            ),
            FluidError::InvalidSmoothingRadius(h) => {
                write!(f, "Smoothing radius must be positive and finite, got {}", h)
            }
            FluidError::LengthMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "Length mismatch for {}: expected {}, got {}",
                what, expected, actual
            ),
            FluidError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter `{}`: {}", name, reason)
            }
            FluidError::TooManyPoints(n) => {
                write!(f, "{} points do not fit a 32-bit spatial hash table", n)
            }
            FluidError::ResetWhileRunning => {
                write!(f, "Simulation must be paused before it can be reset")
            }
            FluidError::NonFiniteState { index } => {
                write!(f, "Particle {} reached a non-finite state", index)
            }
            FluidError::Config(e) => write!(f, "Failed to parse fluid parameters: {}", e),
        }
    }
}

impl std::error::Error for FluidError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FluidError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FluidError {
    fn from(e: serde_json::Error) -> Self {
        FluidError::Config(e)
    }
}

// kernel support and hash cell size must be finite and > 0
pub(crate) fn check_smoothing_radius(h: f32) -> Result<(), FluidError> {
    if h.is_finite() && h > 0.0 {
        Ok(())
    } else {
        Err(FluidError::InvalidSmoothingRadius(h))
    }
}

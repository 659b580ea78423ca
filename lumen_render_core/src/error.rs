//! Error types for the Lumen render core
//!
//! This module defines the error types used by the resource registry,
//! the mapped-resource cache, the render device and the render graph.

use std::fmt;

/// Result type for Lumen render core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lumen render core errors
///
/// Variants are split into two families. Recoverable errors (stale handles,
/// contract violations, setup failures) are logged and the caller skips the
/// affected pass or resource. Fatal errors mean a lifetime invariant has
/// already been broken; see [`Error::is_fatal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (Vulkan, Metal, mock, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Stale or unknown resource handle
    InvalidResource(String),

    /// Operation not permitted for the resource (bind type, usage flags, binding name)
    ContractViolation(String),

    /// A render graph node failed its setup
    SetupFailed(String),

    /// Resource still referenced and cannot be destroyed yet
    ResourceInUse(String),

    /// Double release or reference count underflow
    LifetimeViolation(String),

    /// Resource already mapped with a different access mode
    MapModeMismatch(String),

    /// Second producer declared for one logical graph resource
    MultipleProducers(String),
}

impl Error {
    /// Whether this error is a broken lifetime invariant rather than a recoverable failure
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::LifetimeViolation(_) | Error::MapModeMismatch(_) | Error::MultipleProducers(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::ContractViolation(msg) => write!(f, "Contract violation: {}", msg),
            Error::SetupFailed(msg) => write!(f, "Setup failed: {}", msg),
            Error::ResourceInUse(msg) => write!(f, "Resource in use: {}", msg),
            Error::LifetimeViolation(msg) => write!(f, "Lifetime violation: {}", msg),
            Error::MapModeMismatch(msg) => write!(f, "Map mode mismatch: {}", msg),
            Error::MultipleProducers(msg) => write!(f, "Multiple producers: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

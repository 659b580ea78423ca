//! Unit tests for error.rs
//!
//! Tests Error variants, their Display output and fatal classification.

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("device lost".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("device lost"));
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");
}

#[test]
fn test_invalid_resource_display() {
    let err = Error::InvalidResource("stale handle".to_string());
    assert_eq!(format!("{}", err), "Invalid resource: stale handle");
}

#[test]
fn test_contract_violation_display() {
    let err = Error::ContractViolation("resource 'depth' is not writable".to_string());
    let display = format!("{}", err);
    assert!(display.starts_with("Contract violation"));
    assert!(display.contains("'depth'"));
}

#[test]
fn test_lifetime_violation_display() {
    let err = Error::LifetimeViolation("double release".to_string());
    assert_eq!(format!("{}", err), "Lifetime violation: double release");
}

// ============================================================================
// FATAL CLASSIFICATION
// ============================================================================

#[test]
fn test_fatal_errors() {
    assert!(Error::LifetimeViolation(String::new()).is_fatal());
    assert!(Error::MapModeMismatch(String::new()).is_fatal());
    assert!(Error::MultipleProducers(String::new()).is_fatal());
}

#[test]
fn test_recoverable_errors() {
    assert!(!Error::BackendError(String::new()).is_fatal());
    assert!(!Error::OutOfMemory.is_fatal());
    assert!(!Error::InvalidResource(String::new()).is_fatal());
    assert!(!Error::ContractViolation(String::new()).is_fatal());
    assert!(!Error::SetupFailed(String::new()).is_fatal());
    assert!(!Error::ResourceInUse(String::new()).is_fatal());
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_clone_and_eq() {
    let err = Error::SetupFailed("node 'bloom'".to_string());
    assert_eq!(err.clone(), err);
    assert_ne!(err, Error::SetupFailed("node 'taa'".to_string()));
}

#[test]
fn test_result_alias_propagates() {
    fn inner() -> Result<u32> {
        Err(Error::ResourceInUse("buffer".to_string()))
    }
    fn outer() -> Result<u32> {
        let value = inner()?;
        Ok(value + 1)
    }
    assert!(matches!(outer(), Err(Error::ResourceInUse(_))));
}

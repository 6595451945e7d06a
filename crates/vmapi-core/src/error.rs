//! Error types for vmapi-core.

use crate::vm::VmId;
use thiserror::Error;
use vmapi_virt::VirtError;

/// Result type alias for vmapi-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur during VM lifecycle operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The hypervisor has no domain with this identifier
    #[error("VM with ID {0} not found")]
    NotFound(VmId),

    /// Request rejected before any hypervisor call
    #[error("invalid request: {0}")]
    Validation(String),

    /// Orchestrator configuration is unusable
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A hypervisor or disk step failed
    #[error("failed to {action}: {source}")]
    Operation {
        /// What the orchestrator was doing
        action: &'static str,
        /// Gateway error behind the failure
        #[source]
        source: VirtError,
    },
}

impl CoreError {
    /// Returns true if no VM exists for the requested identifier.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }

    /// Wrap a gateway failure, keeping the cause.
    pub(crate) fn operation(action: &'static str) -> impl FnOnce(VirtError) -> CoreError {
        move |source| CoreError::Operation { action, source }
    }

    /// Like [`CoreError::operation`], but a missing domain becomes
    /// [`CoreError::NotFound`].
    pub(crate) fn lookup(id: VmId) -> impl FnOnce(VirtError) -> CoreError {
        move |source| {
            if source.is_not_found() {
                CoreError::NotFound(id)
            } else {
                CoreError::Operation {
                    action: "look up domain",
                    source,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_found_message() {
        let id: VmId = "123e4567-e89b-12d3-a456-426614174000".parse().unwrap();
        let err = CoreError::NotFound(id);
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "VM with ID 123e4567-e89b-12d3-a456-426614174000 not found"
        );
    }

    #[test]
    fn test_lookup_maps_missing_domain() {
        let id = VmId::new();
        let err = CoreError::lookup(id)(VirtError::DomainNotFound(id.to_string()));
        assert!(matches!(err, CoreError::NotFound(found) if found == id));
    }

    #[test]
    fn test_lookup_keeps_other_failures_operational() {
        let err = CoreError::lookup(VmId::new())(VirtError::Mock("socket closed".into()));
        assert!(!err.is_not_found());
        assert!(err.to_string().starts_with("failed to look up domain"));
        assert!(err.source().is_some());
    }
}

//! Error types for vmapi-virt.

use thiserror::Error;

/// Result type alias for vmapi-virt operations.
pub type Result<T> = std::result::Result<T, VirtError>;

/// Errors that can occur while talking to the hypervisor or the disk tool.
#[derive(Debug, Error)]
pub enum VirtError {
    /// Could not open a connection to the hypervisor endpoint
    #[error("failed to connect to {uri}: {reason}")]
    Connect {
        /// Endpoint URI that was dialled
        uri: String,
        /// Reason reported by the hypervisor client
        reason: String,
    },

    /// The hypervisor has no domain with this identifier
    #[error("domain not found: {0}")]
    DomainNotFound(String),

    /// An external tool could not be launched at all
    #[error("failed to launch {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An external tool ran and reported failure
    #[error("{program} {args} exited with {status}: {stderr}")]
    Command {
        /// Program that was run
        program: String,
        /// Space-joined argument list
        args: String,
        /// Exit status as reported by the OS
        status: String,
        /// Trimmed standard error output
        stderr: String,
    },

    /// Disk provisioning failed at the named step
    #[error("failed to {step} disk image: {source}")]
    Provision {
        /// "clone" or "resize"
        step: &'static str,
        /// The failing tool invocation
        #[source]
        source: Box<VirtError>,
    },

    /// Domain descriptor could not be built
    #[error("descriptor error: {0}")]
    Descriptor(String),

    /// Injected failure from the mock gateway
    #[error("mock failure: {0}")]
    Mock(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VirtError {
    /// Check if this error means the domain does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VirtError::DomainNotFound(_))
    }
}

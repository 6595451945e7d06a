//! Hypervisor gateway traits.

use crate::descriptor::DomainDescriptor;
use crate::domain::{Domain, DomainState};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Capability boundary around a live hypervisor connection.
///
/// Every method is an independent call; no two calls share a transaction.
/// Implementations hold nothing beyond the connection itself, so a fresh
/// gateway can be connected for every operation.
#[async_trait]
pub trait HypervisorGateway: Send + Sync {
    /// Look up a domain by UUID.
    ///
    /// # Errors
    /// Returns [`VirtError::DomainNotFound`](crate::VirtError::DomainNotFound)
    /// only when the hypervisor reports that no such domain exists.
    async fn lookup_by_identifier(&self, id: Uuid) -> Result<Domain>;

    /// Define (persist) a domain from its descriptor without starting it.
    async fn define_from_descriptor(&self, descriptor: &DomainDescriptor) -> Result<Domain>;

    /// Boot a defined domain.
    async fn start(&self, domain: &Domain) -> Result<()>;

    /// Read the domain name.
    async fn name(&self, domain: &Domain) -> Result<String>;

    /// Read the live domain state.
    async fn state(&self, domain: &Domain) -> Result<DomainState>;

    /// Ask the guest to shut down (ACPI). Returns once the request is sent.
    async fn request_graceful_stop(&self, domain: &Domain) -> Result<()>;

    /// Power the domain off immediately. A domain that is already off is not
    /// an error.
    async fn force_stop(&self, domain: &Domain) -> Result<()>;

    /// Remove the domain definition.
    async fn undefine(&self, domain: &Domain) -> Result<()>;

    /// Produce a copy-on-write clone of `base` at `dest` and resize it to
    /// `size_gb` GiB.
    ///
    /// `allow_shrink` has to be passed explicitly: shrinking below the data
    /// held in the image is destructive and refused unless requested.
    async fn clone_and_resize(
        &self,
        base: &Path,
        dest: &Path,
        size_gb: u32,
        allow_shrink: bool,
    ) -> Result<()>;
}

/// Opens [`HypervisorGateway`] connections.
///
/// This trait allows different hypervisor backends to be swapped without
/// changing the orchestrator logic.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    /// Connect to the hypervisor at `uri`.
    ///
    /// # Errors
    /// Returns [`VirtError::Connect`](crate::VirtError::Connect) if the
    /// endpoint cannot be reached. Callers do not retry.
    async fn connect(&self, uri: &str) -> Result<Arc<dyn HypervisorGateway>>;
}

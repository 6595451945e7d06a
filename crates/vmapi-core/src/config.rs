//! Orchestrator configuration.

use crate::error::CoreError;
use crate::vm::VmId;
use std::path::PathBuf;

/// Where and how the orchestrator reaches the hypervisor.
///
/// Passed to [`VmOrchestrator::new`](crate::VmOrchestrator::new); there is no
/// process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// libvirt connection URI (default: `qemu:///system`).
    pub endpoint_uri: String,
    /// Directory holding per-VM disk images.
    pub image_root: PathBuf,
    /// libvirt network the VM NIC attaches to (default: `default`).
    pub network: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            endpoint_uri: "qemu:///system".into(),
            image_root: PathBuf::from("/var/lib/libvirt/images"),
            network: "default".into(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a new config builder.
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.endpoint_uri.is_empty() {
            return Err(CoreError::Config("endpoint_uri is required".into()));
        }
        if self.image_root.as_os_str().is_empty() {
            return Err(CoreError::Config("image_root is required".into()));
        }
        if self.network.is_empty() {
            return Err(CoreError::Config("network is required".into()));
        }
        Ok(())
    }

    /// Disk image path for a VM: `<image_root>/<id>.qcow2`.
    pub fn disk_path(&self, id: VmId) -> PathBuf {
        self.image_root.join(format!("{id}.qcow2"))
    }
}

/// Builder for OrchestratorConfig.
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    /// Set the libvirt URI.
    pub fn endpoint_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.endpoint_uri = uri.into();
        self
    }

    /// Set the disk image directory.
    pub fn image_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.image_root = path.into();
        self
    }

    /// Set the libvirt network.
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.config.network = network.into();
        self
    }

    /// Build the configuration, validating all required fields.
    pub fn build(self) -> Result<OrchestratorConfig, CoreError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

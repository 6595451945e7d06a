//! libvirt backend driven through the `virsh` client.
//!
//! Every call runs `virsh --connect <uri> ...` so no native libvirt linkage is
//! needed at build time. libvirt error strings are matched to tell a missing
//! domain apart from other failures.

use crate::command::run;
use crate::descriptor::DomainDescriptor;
use crate::disk::QemuImg;
use crate::domain::{Domain, DomainState};
use crate::error::{Result, VirtError};
use crate::gateway::{GatewayConnector, HypervisorGateway};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// libvirt message for `VIR_ERR_NO_DOMAIN`.
const NO_DOMAIN_MARKER: &str = "Domain not found";

/// libvirt message when destroying a domain that is already off.
const NOT_RUNNING_MARKER: &str = "domain is not running";

/// Connects [`VirshGateway`]s.
#[derive(Debug, Clone)]
pub struct VirshConnector {
    virsh: PathBuf,
    qemu_img: QemuImg,
}

impl Default for VirshConnector {
    fn default() -> Self {
        Self::new("virsh", QemuImg::default())
    }
}

impl VirshConnector {
    /// Use the given `virsh` binary and disk tool.
    pub fn new(virsh: impl Into<PathBuf>, qemu_img: QemuImg) -> Self {
        Self {
            virsh: virsh.into(),
            qemu_img,
        }
    }
}

#[async_trait]
impl GatewayConnector for VirshConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn HypervisorGateway>> {
        let gateway = VirshGateway::connect(&self.virsh, uri, self.qemu_img.clone()).await?;
        Ok(Arc::new(gateway))
    }
}

/// Hypervisor gateway backed by `virsh` and `qemu-img`.
#[derive(Debug, Clone)]
pub struct VirshGateway {
    virsh: PathBuf,
    uri: String,
    qemu_img: QemuImg,
}

impl VirshGateway {
    /// Open a connection to `uri`, verifying the endpoint answers.
    ///
    /// # Errors
    /// Returns [`VirtError::Connect`] if `virsh` cannot reach the endpoint.
    pub async fn connect(virsh: &Path, uri: &str, qemu_img: QemuImg) -> Result<Self> {
        tracing::debug!(%uri, "Connecting to hypervisor");
        let gateway = Self {
            virsh: virsh.to_path_buf(),
            uri: uri.to_string(),
            qemu_img,
        };

        gateway
            .virsh(&["uri"])
            .await
            .map_err(|e| VirtError::Connect {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(%uri, "Hypervisor connection established");
        Ok(gateway)
    }

    /// Endpoint URI of this connection.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    async fn virsh(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["--connect", self.uri.as_str()];
        full.extend_from_slice(args);
        run(&self.virsh, full).await
    }

    /// Run a virsh subcommand against one domain, mapping "no such domain".
    async fn domain_command(&self, subcommand: &str, id: Uuid) -> Result<String> {
        let id_str = id.to_string();
        self.virsh(&[subcommand, id_str.as_str()])
            .await
            .map_err(|e| classify(e, id))
    }
}

/// Turn a libvirt "no domain" failure into [`VirtError::DomainNotFound`].
fn classify(err: VirtError, id: Uuid) -> VirtError {
    let missing = matches!(
        &err,
        VirtError::Command { stderr, .. } if stderr.contains(NO_DOMAIN_MARKER)
    );
    if missing {
        VirtError::DomainNotFound(id.to_string())
    } else {
        err
    }
}

#[async_trait]
impl HypervisorGateway for VirshGateway {
    async fn lookup_by_identifier(&self, id: Uuid) -> Result<Domain> {
        tracing::debug!(%id, "Looking up domain");
        self.domain_command("domuuid", id).await?;
        Ok(Domain::new(id))
    }

    async fn define_from_descriptor(&self, descriptor: &DomainDescriptor) -> Result<Domain> {
        tracing::debug!(uuid = %descriptor.uuid(), name = %descriptor.name(), "Defining domain");

        let mut file = tempfile::Builder::new()
            .prefix("vmapi-domain-")
            .suffix(".xml")
            .tempfile()?;
        file.write_all(descriptor.xml().as_bytes())?;
        file.flush()?;

        let path = file.path().to_string_lossy().into_owned();
        self.virsh(&["define", path.as_str()]).await?;
        Ok(Domain::new(descriptor.uuid()))
    }

    async fn start(&self, domain: &Domain) -> Result<()> {
        tracing::debug!(uuid = %domain.uuid(), "Starting domain");
        self.domain_command("start", domain.uuid()).await?;
        Ok(())
    }

    async fn name(&self, domain: &Domain) -> Result<String> {
        self.domain_command("domname", domain.uuid()).await
    }

    async fn state(&self, domain: &Domain) -> Result<DomainState> {
        let out = self.domain_command("domstate", domain.uuid()).await?;
        Ok(DomainState::from_virsh(&out))
    }

    async fn request_graceful_stop(&self, domain: &Domain) -> Result<()> {
        tracing::debug!(uuid = %domain.uuid(), "Requesting graceful shutdown");
        self.domain_command("shutdown", domain.uuid()).await?;
        Ok(())
    }

    async fn force_stop(&self, domain: &Domain) -> Result<()> {
        tracing::debug!(uuid = %domain.uuid(), "Forcing domain off");
        match self.domain_command("destroy", domain.uuid()).await {
            Ok(_) => Ok(()),
            Err(VirtError::Command { stderr, .. }) if stderr.contains(NOT_RUNNING_MARKER) => {
                tracing::trace!(uuid = %domain.uuid(), "Domain already off");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn undefine(&self, domain: &Domain) -> Result<()> {
        tracing::debug!(uuid = %domain.uuid(), "Undefining domain");
        self.domain_command("undefine", domain.uuid()).await?;
        Ok(())
    }

    async fn clone_and_resize(
        &self,
        base: &Path,
        dest: &Path,
        size_gb: u32,
        allow_shrink: bool,
    ) -> Result<()> {
        self.qemu_img
            .clone_and_resize(base, dest, size_gb, allow_shrink)
            .await
    }
}

//! VM lifecycle orchestrator.
//!
//! Composes disk provisioning, descriptor rendering and the hypervisor
//! gateway into the three lifecycle operations. A fresh gateway connection
//! is opened for every operation and domain handles never outlive it.

use crate::config::OrchestratorConfig;
use crate::error::{CoreError, Result};
use crate::locks::VmLocks;
use crate::models::{VmCreation, VmCreationRequest, VmDeletion, VmStatusReport};
use crate::rollback::{Compensation, Rollback};
use crate::vm::{VmId, VmStatus};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use vmapi_virt::{DomainBuilder, DomainState, GatewayConnector, HypervisorGateway, MacAddress};

/// Creates, inspects and deletes VMs.
///
/// Operations on one VM identifier are serialized; operations on different
/// identifiers run concurrently.
pub struct VmOrchestrator {
    config: OrchestratorConfig,
    connector: Arc<dyn GatewayConnector>,
    locks: VmLocks,
}

impl std::fmt::Debug for VmOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmOrchestrator")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl VmOrchestrator {
    /// Create an orchestrator that reaches the hypervisor through `connector`.
    pub fn new(config: OrchestratorConfig, connector: Arc<dyn GatewayConnector>) -> Self {
        Self {
            config,
            connector,
            locks: VmLocks::new(),
        }
    }

    /// Get the orchestrator configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Get the per-VM lock registry.
    pub fn locks(&self) -> &VmLocks {
        &self.locks
    }

    async fn connect(&self) -> Result<Arc<dyn HypervisorGateway>> {
        self.connector
            .connect(&self.config.endpoint_uri)
            .await
            .map_err(CoreError::operation("connect to hypervisor"))
    }

    /// Create and boot a VM from a cloned base image.
    ///
    /// The caller is expected to have checked that the base image exists.
    /// If any step after the disk clone fails, the steps already taken are
    /// undone before the error is returned. Dropping the returned future
    /// after the clone undoes them on a background task.
    ///
    /// # Errors
    /// [`CoreError::Validation`] for a malformed request, otherwise
    /// [`CoreError::Operation`] naming the failed step.
    pub async fn create(&self, request: &VmCreationRequest) -> Result<VmCreation> {
        request.validate()?;

        let id = VmId::new();
        let start = Instant::now();
        let _lock = self.locks.acquire(id).await;
        let disk = self.config.disk_path(id);

        tracing::info!(
            vm_id = %id,
            vcpus = request.vcpus,
            memory_mb = request.memory,
            disk_size_gb = request.disk_size,
            base_image = %request.base_image.display(),
            "Creating VM"
        );

        let gateway = self.connect().await?;

        tracing::debug!(vm_id = %id, disk = %disk.display(), "Provisioning disk");
        gateway
            .clone_and_resize(&request.base_image, &disk, request.disk_size, true)
            .await
            .map_err(CoreError::operation("provision disk"))?;

        let mut rollback = Rollback::new(id, Arc::clone(&gateway));
        rollback.push(Compensation::RemoveDisk(disk.clone()));

        match self.define_and_start(gateway.as_ref(), id, request, &disk, &mut rollback).await {
            Ok(mac) => {
                rollback.commit();
                tracing::info!(
                    vm_id = %id,
                    mac = %mac,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "VM created"
                );
                Ok(VmCreation {
                    vm_id: id,
                    status: VmStatus::Running,
                    vcpus: request.vcpus,
                    memory: request.memory,
                    disk_size: request.disk_size,
                    disk_file: disk,
                    mac_address: mac,
                    message: "VM successfully created and storage cloned".into(),
                })
            }
            Err(e) => {
                tracing::error!(vm_id = %id, error = %e, "VM creation failed, rolling back");
                rollback.unwind().await;
                Err(e)
            }
        }
    }

    /// Render the descriptor, define the domain and boot it. Returns the MAC
    /// written into the descriptor.
    async fn define_and_start(
        &self,
        gateway: &dyn HypervisorGateway,
        id: VmId,
        request: &VmCreationRequest,
        disk: &Path,
        rollback: &mut Rollback,
    ) -> Result<MacAddress> {
        let mac = MacAddress::generate();
        let mut builder = DomainBuilder::new(id.as_uuid())
            .vcpus(request.vcpus)
            .memory_mib(u64::from(request.memory))
            .disk(disk)
            .mac(mac)
            .network(self.config.network.as_str());
        if let Some(pinning) = &request.cpu_pinning {
            builder = builder.pin_cpus(pinning.cores.iter().copied());
        }
        if let Some(limits) = &request.io_limits {
            builder = builder.iops_limit(limits.iops);
        }
        let descriptor = builder
            .build()
            .map_err(CoreError::operation("build domain descriptor"))?;

        tracing::debug!(vm_id = %id, "Defining domain");
        let domain = gateway
            .define_from_descriptor(&descriptor)
            .await
            .map_err(CoreError::operation("define domain"))?;
        rollback.push(Compensation::Undefine(domain.clone()));

        tracing::debug!(vm_id = %id, "Starting domain");
        gateway
            .start(&domain)
            .await
            .map_err(CoreError::operation("start domain"))?;

        Ok(mac)
    }

    /// Report the live status of a VM.
    ///
    /// # Errors
    /// [`CoreError::NotFound`] if the hypervisor has no such domain.
    pub async fn status(&self, id: VmId) -> Result<VmStatusReport> {
        let _lock = self.locks.acquire(id).await;
        let gateway = self.connect().await?;

        let domain = gateway
            .lookup_by_identifier(id.as_uuid())
            .await
            .map_err(CoreError::lookup(id))?;
        let name = gateway
            .name(&domain)
            .await
            .map_err(CoreError::operation("read domain name"))?;
        let state = gateway
            .state(&domain)
            .await
            .map_err(CoreError::operation("read domain state"))?;

        tracing::debug!(vm_id = %id, %state, "Read VM status");
        Ok(VmStatusReport::new(id, name, VmStatus::from(state)))
    }

    /// Stop, undefine and remove the disk of a VM.
    ///
    /// Once the hypervisor connection is up, the disk file is removed on
    /// every exit path, including a missing domain or a failed undefine.
    /// Disk removal failures are logged and never returned.
    ///
    /// # Errors
    /// [`CoreError::NotFound`] if the hypervisor has no such domain, or
    /// [`CoreError::Operation`] if the domain could not be stopped or
    /// undefined.
    pub async fn delete(&self, id: VmId) -> Result<VmDeletion> {
        let _lock = self.locks.acquire(id).await;
        let start = Instant::now();
        let disk = self.config.disk_path(id);
        tracing::info!(vm_id = %id, "Deleting VM");

        let gateway = self.connect().await?;
        let result = self.teardown(gateway.as_ref(), id).await;
        remove_disk(id, &disk).await;
        result?;

        tracing::info!(
            vm_id = %id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "VM deleted"
        );
        Ok(VmDeletion {
            vm_id: id,
            status: "deleted".into(),
            message: "VM successfully deleted".into(),
            disk_file: disk,
        })
    }

    async fn teardown(&self, gateway: &dyn HypervisorGateway, id: VmId) -> Result<()> {
        let domain = gateway
            .lookup_by_identifier(id.as_uuid())
            .await
            .map_err(CoreError::lookup(id))?;

        if let Err(e) = gateway.request_graceful_stop(&domain).await {
            tracing::warn!(vm_id = %id, error = %e, "Graceful shutdown failed, forcing stop");
            gateway
                .force_stop(&domain)
                .await
                .map_err(CoreError::operation("force stop domain"))?;
        }

        let state = gateway
            .state(&domain)
            .await
            .map_err(CoreError::operation("read domain state"))?;
        if state != DomainState::Shutoff {
            tracing::debug!(vm_id = %id, %state, "Domain still up, forcing stop");
            gateway
                .force_stop(&domain)
                .await
                .map_err(CoreError::operation("force stop domain"))?;
        }

        gateway
            .undefine(&domain)
            .await
            .map_err(CoreError::operation("undefine domain"))
    }
}

/// Best-effort removal of a VM disk image.
async fn remove_disk(id: VmId, disk: &Path) {
    match tokio::fs::remove_file(disk).await {
        Ok(()) => tracing::debug!(vm_id = %id, disk = %disk.display(), "Removed disk image"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(vm_id = %id, disk = %disk.display(), "No disk image to remove");
        }
        Err(e) => {
            tracing::warn!(
                vm_id = %id,
                disk = %disk.display(),
                error = %e,
                "Failed to delete disk image"
            );
        }
    }
}

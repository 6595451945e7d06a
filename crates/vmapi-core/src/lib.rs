//! # vmapi-core
//!
//! VM lifecycle orchestration for vmapi.
//!
//! This crate sequences disk provisioning, domain definition and teardown
//! against a [`HypervisorGateway`](vmapi_virt::HypervisorGateway), and owns
//! the partial-failure policy of every lifecycle operation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      vmapi-core                          │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐    │
//! │  │ VmOrchestrator  │────▶│  VmLocks                 │    │
//! │  │   - create()    │     │  (one lock per VmId)     │    │
//! │  │   - status()    │     └──────────────────────────┘    │
//! │  │   - delete()    │     ┌──────────────────────────┐    │
//! │  └─────────────────┘────▶│  Rollback                │    │
//! │           │              │  (undo stack for create) │    │
//! │           │              └──────────────────────────┘    │
//! └───────────┼──────────────────────────────────────────────┘
//!             │ GatewayConnector::connect(uri)
//!             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                      vmapi-virt                          │
//! │     HypervisorGateway (virsh + qemu-img, or mock)        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vmapi_core::{CpuPinning, OrchestratorConfig, VmCreationRequest, VmOrchestrator};
//! use vmapi_virt::VirshConnector;
//!
//! # async fn example() -> vmapi_core::Result<()> {
//! let config = OrchestratorConfig::builder()
//!     .endpoint_uri("qemu:///system")
//!     .image_root("/var/lib/libvirt/images")
//!     .build()?;
//! let orchestrator = VmOrchestrator::new(config, Arc::new(VirshConnector::default()));
//!
//! let created = orchestrator
//!     .create(&VmCreationRequest {
//!         vcpus: 2,
//!         memory: 4096,
//!         disk_size: 20,
//!         base_image: "/images/ubuntu.qcow2".into(),
//!         cpu_pinning: Some(CpuPinning { cores: vec![0, 1] }),
//!         io_limits: None,
//!     })
//!     .await?;
//!
//! let status = orchestrator.status(created.vm_id).await?;
//! println!("{}", status.message);
//!
//! orchestrator.delete(created.vm_id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Create**: clone and resize a base image, define and boot the domain,
//!   roll back on failure
//! - **Status**: map the live domain state to `running | stopped | paused | unknown`
//! - **Delete**: graceful stop with forced fallback, undefine, disk cleanup
//! - **Per-VM Serialization**: concurrent requests for one VM never interleave

mod config;
mod error;
mod locks;
mod models;
mod orchestrator;
mod rollback;
mod vm;

pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};
pub use error::{CoreError, Result};
pub use locks::{VmLockGuard, VmLocks};
pub use models::{CpuPinning, IoLimits, VmCreation, VmCreationRequest, VmDeletion, VmStatusReport};
pub use orchestrator::VmOrchestrator;
pub use vm::{VmId, VmStatus};

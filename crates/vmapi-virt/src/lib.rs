//! # vmapi-virt
//!
//! Hypervisor gateway for vmapi.
//! Provides the capability traits the orchestrator is written against, a
//! libvirt backend, disk provisioning with `qemu-img`, and the domain
//! descriptor builder.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vmapi_virt::{
//!     DomainBuilder, GatewayConnector, HypervisorGateway, MacAddress, VirshConnector,
//! };
//! use std::path::Path;
//! use uuid::Uuid;
//!
//! # async fn example() -> vmapi_virt::Result<()> {
//! let gateway = VirshConnector::default().connect("qemu:///system").await?;
//!
//! let id = Uuid::new_v4();
//! let disk = format!("/var/lib/libvirt/images/{id}.qcow2");
//! gateway
//!     .clone_and_resize(Path::new("/images/ubuntu.qcow2"), Path::new(&disk), 20, true)
//!     .await?;
//!
//! let descriptor = DomainBuilder::new(id)
//!     .vcpus(2)
//!     .memory_mib(2048)
//!     .disk(&disk)
//!     .mac(MacAddress::generate())
//!     .build()?;
//!
//! let domain = gateway.define_from_descriptor(&descriptor).await?;
//! gateway.start(&domain).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Gateway Traits**: `HypervisorGateway` and `GatewayConnector` keep callers
//!   independent of the backend
//! - **libvirt Backend**: `VirshConnector` drives libvirt through `virsh`
//! - **Disk Provisioning**: copy-on-write qcow2 overlays, resized in place
//! - **Descriptors**: domain XML with optional CPU pinning and IOPS caps
//! - **Mock Backend**: `MockGateway` with call recording and failure injection

mod command;
mod descriptor;
mod disk;
mod domain;
mod error;
mod gateway;
mod mac;
pub mod mock;
mod virsh;

pub use descriptor::{DomainBuilder, DomainDescriptor};
pub use disk::QemuImg;
pub use domain::{Domain, DomainState};
pub use error::{Result, VirtError};
pub use gateway::{GatewayConnector, HypervisorGateway};
pub use mac::{MacAddress, MAC_PREFIX};
pub use mock::MockGateway;
pub use virsh::{VirshConnector, VirshGateway};

//! # vmapi-server
//!
//! HTTP API for creating, inspecting and deleting libvirt VMs.
//!
//! ```bash
//! # Start the server
//! vmapi server --config config.yaml
//!
//! # Create a VM
//! curl -X POST http://localhost:8080/vms \
//!   -H "Content-Type: application/json" \
//!   -d '{"vcpus": 2, "memory": 4096, "disk_size": 20, "base_image": "/images/ubuntu.qcow2"}'
//!
//! # Inspect and delete it
//! curl http://localhost:8080/vms/<vm_id>/status
//! curl -X DELETE http://localhost:8080/vms/<vm_id>
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod http;

pub use config::{ConfigError, LogFormat, LogLevel, ServerConfig};
pub use error::ApiError;
pub use http::{build_router, serve};

//! Request and result types for the lifecycle operations.

use crate::error::{CoreError, Result};
use crate::vm::{VmId, VmStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vmapi_virt::MacAddress;

/// Request to create a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmCreationRequest {
    /// Number of virtual CPUs.
    pub vcpus: u32,
    /// Memory in MB.
    pub memory: u32,
    /// Root disk size in GB. The clone is grown or shrunk to this size.
    pub disk_size: u32,
    /// Base image cloned for the root disk.
    pub base_image: PathBuf,
    /// Optional vCPU to host core pinning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_pinning: Option<CpuPinning>,
    /// Optional disk I/O ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_limits: Option<IoLimits>,
}

/// Physical cores the vCPUs are pinned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuPinning {
    pub cores: Vec<u32>,
}

/// Disk I/O limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoLimits {
    /// Total operations per second.
    pub iops: u64,
}

impl VmCreationRequest {
    /// Check field constraints. Existence of the base image is not checked
    /// here.
    pub fn validate(&self) -> Result<()> {
        if self.vcpus == 0 {
            return Err(CoreError::Validation("vcpus must be > 0".into()));
        }
        if self.memory == 0 {
            return Err(CoreError::Validation("memory must be > 0".into()));
        }
        if self.disk_size == 0 {
            return Err(CoreError::Validation("disk_size must be > 0".into()));
        }
        if self.base_image.as_os_str().is_empty() {
            return Err(CoreError::Validation("base_image is required".into()));
        }
        if let Some(pinning) = &self.cpu_pinning {
            if pinning.cores.is_empty() {
                return Err(CoreError::Validation(
                    "cpu_pinning.cores must not be empty".into(),
                ));
            }
        }
        if let Some(limits) = &self.io_limits {
            if limits.iops == 0 {
                return Err(CoreError::Validation("io_limits.iops must be > 0".into()));
            }
        }
        Ok(())
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmCreation {
    pub vm_id: VmId,
    pub status: VmStatus,
    pub vcpus: u32,
    pub memory: u32,
    pub disk_size: u32,
    pub disk_file: PathBuf,
    /// Serialized as `xx:xx:xx:xx:xx:xx`.
    pub mac_address: MacAddress,
    pub message: String,
}

/// Result of a successful delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDeletion {
    pub vm_id: VmId,
    /// Always `deleted`.
    pub status: String,
    pub message: String,
    /// Disk the delete attempted to remove.
    pub disk_file: PathBuf,
}

/// Current status of a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmStatusReport {
    pub vm_id: VmId,
    pub name: String,
    pub status: VmStatus,
    pub message: String,
}

impl VmStatusReport {
    pub(crate) fn new(vm_id: VmId, name: String, status: VmStatus) -> Self {
        let message = format!("VM {name} is {status}");
        Self {
            vm_id,
            name,
            status,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> VmCreationRequest {
        VmCreationRequest {
            vcpus: 2,
            memory: 4096,
            disk_size: 20,
            base_image: "/images/ubuntu.qcow2".into(),
            cpu_pinning: None,
            io_limits: None,
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_zero_fields_rejected() {
        let mutations: [fn(&mut VmCreationRequest); 6] = [
            |r: &mut VmCreationRequest| r.vcpus = 0,
            |r: &mut VmCreationRequest| r.memory = 0,
            |r: &mut VmCreationRequest| r.disk_size = 0,
            |r: &mut VmCreationRequest| r.base_image = PathBuf::new(),
            |r: &mut VmCreationRequest| r.cpu_pinning = Some(CpuPinning { cores: vec![] }),
            |r: &mut VmCreationRequest| r.io_limits = Some(IoLimits { iops: 0 }),
        ];
        for mutate in mutations {
            let mut req = request();
            mutate(&mut req);
            assert!(
                matches!(req.validate(), Err(CoreError::Validation(_))),
                "{req:?}"
            );
        }
    }

    #[test]
    fn test_request_from_json() {
        let req: VmCreationRequest = serde_json::from_str(
            r#"{
                "vcpus": 2,
                "memory": 4096,
                "disk_size": 20,
                "base_image": "/images/ubuntu.qcow2",
                "cpu_pinning": {"cores": [0, 1]},
                "io_limits": {"iops": 500}
            }"#,
        )
        .unwrap();
        assert_eq!(req.cpu_pinning.unwrap().cores, vec![0, 1]);
        assert_eq!(req.io_limits.unwrap().iops, 500);
    }

    #[test]
    fn test_negative_vcpus_do_not_parse() {
        let result = serde_json::from_str::<VmCreationRequest>(
            r#"{"vcpus": -1, "memory": 1, "disk_size": 1, "base_image": "/x"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_status_report_message() {
        let report = VmStatusReport::new(VmId::new(), "web-1".into(), VmStatus::Running);
        assert_eq!(report.message, "VM web-1 is running");
    }

    #[test]
    fn test_creation_serializes_mac_as_string() {
        let uuid = uuid::Uuid::parse_str("0a0b0c00-0000-4000-8000-000000000000").unwrap();
        let created = VmCreation {
            vm_id: VmId::from(uuid),
            status: VmStatus::Running,
            vcpus: 1,
            memory: 512,
            disk_size: 10,
            disk_file: "/images/vm.qcow2".into(),
            mac_address: MacAddress::from_uuid(uuid),
            message: "created".into(),
        };
        let json = serde_json::to_value(&created).unwrap();
        assert_eq!(json["mac_address"], "00:16:3e:0a:0b:0c");
        assert_eq!(json["status"], "running");
    }
}

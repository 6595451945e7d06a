//! Builder for libvirt domain descriptors.

use crate::error::{Result, VirtError};
use crate::mac::MacAddress;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Rendered domain XML together with the identity it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainDescriptor {
    uuid: Uuid,
    name: String,
    xml: String,
}

impl DomainDescriptor {
    /// UUID declared in `<uuid>`.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Name declared in `<name>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full domain XML document.
    pub fn xml(&self) -> &str {
        &self.xml
    }
}

/// Fluent builder for [`DomainDescriptor`].
///
/// # Example
///
/// ```
/// use vmapi_virt::{DomainBuilder, MacAddress};
/// use uuid::Uuid;
///
/// let id = Uuid::new_v4();
/// let descriptor = DomainBuilder::new(id)
///     .vcpus(2)
///     .memory_mib(4096)
///     .disk(format!("/var/lib/libvirt/images/{id}.qcow2"))
///     .mac(MacAddress::generate())
///     .pin_cpus([0, 1])
///     .build()
///     .unwrap();
///
/// assert!(descriptor.xml().contains("host-passthrough"));
/// ```
#[derive(Debug, Clone)]
pub struct DomainBuilder {
    uuid: Uuid,
    name: Option<String>,
    vcpus: u32,
    memory_mib: u64,
    arch: String,
    machine: String,
    disk: Option<PathBuf>,
    mac: Option<MacAddress>,
    network: String,
    pinned_cores: Vec<u32>,
    iops_limit: Option<u64>,
}

impl DomainBuilder {
    /// Start a descriptor for the domain identified by `uuid`.
    ///
    /// The domain name defaults to the UUID string.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            name: None,
            vcpus: 1,
            memory_mib: 512,
            arch: "x86_64".into(),
            machine: "pc".into(),
            disk: None,
            mac: None,
            network: "default".into(),
            pinned_cores: Vec::new(),
            iops_limit: None,
        }
    }

    /// Override the domain name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the static vCPU count.
    pub fn vcpus(mut self, count: u32) -> Self {
        self.vcpus = count;
        self
    }

    /// Set guest memory in MiB. Rendered in KiB.
    pub fn memory_mib(mut self, mib: u64) -> Self {
        self.memory_mib = mib;
        self
    }

    /// Set the guest architecture (default `x86_64`).
    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Set the machine type (default `pc`).
    pub fn machine(mut self, machine: impl Into<String>) -> Self {
        self.machine = machine.into();
        self
    }

    /// Set the qcow2 root disk.
    pub fn disk(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk = Some(path.into());
        self
    }

    /// Set the NIC MAC address.
    pub fn mac(mut self, mac: MacAddress) -> Self {
        self.mac = Some(mac);
        self
    }

    /// Attach the NIC to this libvirt network (default `default`).
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Pin vCPUs to these host cores and request host-passthrough CPU mode.
    ///
    /// vCPU `i` is pinned to `cores[i % cores.len()]`; the whole set is also
    /// the domain's allowed cpuset.
    pub fn pin_cpus(mut self, cores: impl IntoIterator<Item = u32>) -> Self {
        self.pinned_cores = cores.into_iter().collect();
        self
    }

    /// Cap total disk IOPS.
    pub fn iops_limit(mut self, iops: u64) -> Self {
        self.iops_limit = Some(iops);
        self
    }

    /// Validate the configuration and render the XML.
    ///
    /// # Errors
    /// Returns [`VirtError::Descriptor`] if the disk or MAC is missing, or a
    /// resource count is zero.
    pub fn build(self) -> Result<DomainDescriptor> {
        if self.vcpus == 0 {
            return Err(VirtError::Descriptor("vcpus must be > 0".into()));
        }
        if self.memory_mib == 0 {
            return Err(VirtError::Descriptor("memory must be > 0".into()));
        }
        if self.iops_limit == Some(0) {
            return Err(VirtError::Descriptor("iops limit must be > 0".into()));
        }
        let disk = self
            .disk
            .as_ref()
            .ok_or_else(|| VirtError::Descriptor("disk path is required".into()))?;
        let mac = self
            .mac
            .ok_or_else(|| VirtError::Descriptor("mac address is required".into()))?;

        let name = self.name.clone().unwrap_or_else(|| self.uuid.to_string());
        let mut xml = String::new();
        self.render(&mut xml, &name, disk, mac)
            .map_err(|e| VirtError::Descriptor(format!("failed to render XML: {e}")))?;

        tracing::trace!(uuid = %self.uuid, xml = %xml, "Rendered domain descriptor");

        Ok(DomainDescriptor {
            uuid: self.uuid,
            name,
            xml,
        })
    }

    /// Write the domain XML into `xml`.
    fn render(
        &self,
        xml: &mut String,
        name: &str,
        disk: &Path,
        mac: MacAddress,
    ) -> std::fmt::Result {
        let memory_kib = self.memory_mib.saturating_mul(1024);
        writeln!(xml, "<domain type='kvm'>")?;
        writeln!(xml, "  <name>{}</name>", escape(name))?;
        writeln!(xml, "  <uuid>{}</uuid>", self.uuid)?;
        writeln!(xml, "  <memory unit='KiB'>{memory_kib}</memory>")?;
        if self.pinned_cores.is_empty() {
            writeln!(xml, "  <vcpu placement='static'>{}</vcpu>", self.vcpus)?;
        } else {
            let cpuset: Vec<String> = self.pinned_cores.iter().map(u32::to_string).collect();
            writeln!(
                xml,
                "  <vcpu placement='static' cpuset='{}'>{}</vcpu>",
                cpuset.join(","),
                self.vcpus
            )?;
        }
        writeln!(xml, "  <os>")?;
        writeln!(
            xml,
            "    <type arch='{}' machine='{}'>hvm</type>",
            escape(&self.arch),
            escape(&self.machine)
        )?;
        writeln!(xml, "    <boot dev='hd'/>")?;
        writeln!(xml, "  </os>")?;

        if !self.pinned_cores.is_empty() {
            writeln!(xml, "  <cpu mode='host-passthrough' check='none'/>")?;
            writeln!(xml, "  <cputune>")?;
            for (vcpu, core) in self.pinned_vcpus() {
                writeln!(xml, "    <vcpupin vcpu='{vcpu}' cpuset='{core}'/>")?;
            }
            writeln!(xml, "  </cputune>")?;
        }

        writeln!(xml, "  <devices>")?;
        writeln!(xml, "    <disk type='file' device='disk'>")?;
        writeln!(xml, "      <driver name='qemu' type='qcow2'/>")?;
        writeln!(
            xml,
            "      <source file='{}'/>",
            escape(&disk.to_string_lossy())
        )?;
        writeln!(xml, "      <target dev='vda' bus='virtio'/>")?;
        if let Some(iops) = self.iops_limit {
            writeln!(xml, "      <iotune>")?;
            writeln!(xml, "        <total_iops_sec>{iops}</total_iops_sec>")?;
            writeln!(xml, "      </iotune>")?;
        }
        writeln!(xml, "    </disk>")?;
        writeln!(xml, "    <interface type='network'>")?;
        writeln!(xml, "      <mac address='{mac}'/>")?;
        writeln!(xml, "      <source network='{}'/>", escape(&self.network))?;
        writeln!(xml, "      <model type='virtio'/>")?;
        writeln!(xml, "    </interface>")?;
        writeln!(xml, "  </devices>")?;
        writeln!(xml, "</domain>")?;
        Ok(())
    }

    /// vCPU to host core assignments, cycling through the pinned cores.
    fn pinned_vcpus(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let cores = &self.pinned_cores;
        (0..self.vcpus).map(move |vcpu| (vcpu, cores[vcpu as usize % cores.len()]))
    }
}

/// Escape text for use inside XML attributes and element content.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

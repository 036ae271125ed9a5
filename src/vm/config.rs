//! Validated VM configuration types.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Disk image format, inferred from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    /// Raw disk image (`.raw`, `.img`, or anything unrecognized).
    #[default]
    Raw,
    /// QCOW2 format (copy-on-write).
    Qcow2,
    /// VMware disk (`.vmdk`).
    Vmdk,
}

impl DiskFormat {
    /// Infer the format of a disk image from its extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("qcow2") => DiskFormat::Qcow2,
            Some("vmdk") => DiskFormat::Vmdk,
            _ => DiskFormat::Raw,
        }
    }

    /// Check if the format is copy-on-write.
    pub fn is_copy_on_write(&self) -> bool {
        matches!(self, DiskFormat::Qcow2)
    }

    /// Format name as understood by `-drive format=`.
    pub fn name(&self) -> &'static str {
        match self {
            DiskFormat::Raw => "raw",
            DiskFormat::Qcow2 => "qcow2",
            DiskFormat::Vmdk => "vmdk",
        }
    }
}

/// Complete, validated VM launch configuration.
///
/// Only the configuration resolver can build one, so every instance has
/// passed validation. Fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmConfig {
    executable: PathBuf,
    disk: Option<PathBuf>,
    memory_mb: u32,
    cpus: u32,
    cpu_model: String,
    firmware: Option<PathBuf>,
    machine: String,
}

impl VmConfig {
    pub(crate) fn from_parts(
        executable: PathBuf,
        disk: Option<PathBuf>,
        memory_mb: u32,
        cpus: u32,
        cpu_model: String,
        firmware: Option<PathBuf>,
        machine: String,
    ) -> Self {
        Self {
            executable,
            disk,
            memory_mb,
            cpus,
            cpu_model,
            firmware,
            machine,
        }
    }

    /// VM executable, either a path or a bare command name.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Disk image attached to the VM.
    pub fn disk(&self) -> Option<&Path> {
        self.disk.as_deref()
    }

    /// Format of the attached disk image.
    pub fn disk_format(&self) -> Option<DiskFormat> {
        self.disk().map(DiskFormat::from_path)
    }

    /// Memory size in megabytes.
    pub fn memory_mb(&self) -> u32 {
        self.memory_mb
    }

    /// Number of virtual CPUs.
    pub fn cpus(&self) -> u32 {
        self.cpus
    }

    /// CPU model identifier.
    pub fn cpu_model(&self) -> &str {
        &self.cpu_model
    }

    /// Firmware image loaded at startup.
    pub fn firmware(&self) -> Option<&Path> {
        self.firmware.as_deref()
    }

    /// Machine type identifier.
    pub fn machine(&self) -> &str {
        &self.machine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_format_from_extension() {
        let cases = [
            ("disk.qcow2", DiskFormat::Qcow2),
            ("DISK.QCOW2", DiskFormat::Qcow2),
            ("disk.vmdk", DiskFormat::Vmdk),
            ("disk.img", DiskFormat::Raw),
            ("disk.raw", DiskFormat::Raw),
            ("disk", DiskFormat::Raw),
        ];

        for (path, format) in cases {
            assert_eq!(DiskFormat::from_path(Path::new(path)), format, "{}", path);
        }
        assert!(DiskFormat::Qcow2.is_copy_on_write());
        assert!(!DiskFormat::Vmdk.is_copy_on_write());
    }

    #[test]
    fn test_accessors() {
        let config = VmConfig::from_parts(
            PathBuf::from("qemu-system-x86_64"),
            Some(PathBuf::from("/vms/a.vmdk")),
            1024,
            4,
            "v4004".into(),
            None,
            "q35".into(),
        );
        assert_eq!(config.memory_mb(), 1024);
        assert_eq!(config.cpus(), 4);
        assert_eq!(config.disk_format(), Some(DiskFormat::Vmdk));
        assert!(config.firmware().is_none());
        assert_eq!(config.machine(), "q35");
    }
}

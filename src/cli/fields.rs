//! Launch field flags shared by commands that resolve a configuration.

use bemu_manager::{resolve, FieldValues, LauncherSettings, LegacyDescriptor, VmConfig};
use clap::Args;
use std::path::PathBuf;

/// VM launch fields.
///
/// Numeric fields are taken as text so that invalid input is reported by
/// validation with the offending field named.
#[derive(Args, Debug, Clone, Default)]
pub struct FieldArgs {
    /// VM executable (path or command name) [env: BEMU_BINARY, QEMU_BINARY].
    #[arg(long, value_name = "PATH")]
    pub binary: Option<String>,

    /// Disk image, or a .vmx descriptor to import.
    #[arg(long, value_name = "PATH")]
    pub disk: Option<String>,

    /// Legacy .vmx descriptor to import memory, vCPUs and disk from.
    #[arg(long, value_name = "PATH")]
    pub vmx: Option<PathBuf>,

    /// Memory in MB.
    #[arg(short, long, value_name = "MB")]
    pub memory: Option<String>,

    /// Number of vCPUs.
    #[arg(long, value_name = "N")]
    pub cpus: Option<String>,

    /// CPU model.
    #[arg(long, value_name = "MODEL")]
    pub cpu_model: Option<String>,

    /// Machine type.
    #[arg(long, value_name = "TYPE")]
    pub machine: Option<String>,

    /// SeaBIOS firmware image; pass an empty value to boot without one.
    #[arg(long, value_name = "PATH")]
    pub bios: Option<String>,
}

impl FieldArgs {
    /// Convert flags into raw field values.
    pub fn field_values(&self) -> FieldValues {
        FieldValues {
            executable: self.binary.clone(),
            disk: self.disk.clone(),
            memory_mb: self.memory.clone(),
            cpus: self.cpus.clone(),
            cpu_model: self.cpu_model.clone(),
            machine: self.machine.clone(),
            firmware: self.bios.clone(),
        }
    }

    /// Resolve the flags into a validated configuration, printing descriptor summaries.
    pub fn resolve(&self, settings: &LauncherSettings) -> bemu_manager::Result<VmConfig> {
        let mut fields = self.field_values();

        if let Some(path) = &self.vmx {
            let descriptor = LegacyDescriptor::parse_file(path);
            println!("{}", fields.apply_descriptor(&descriptor));
        }
        if let Some(summary) = fields.expand_descriptor_disk() {
            println!("{}", summary);
        }

        Ok(resolve(&fields, None, settings)?)
    }
}

//! Configuration resolution.
//!
//! Merges the raw field values supplied by the user, values read from a
//! legacy descriptor, and discovered defaults into a validated [`VmConfig`].

use crate::config::LauncherSettings;
use crate::descriptor::{self, LegacyDescriptor};
use crate::error::{Field, ValidationError};
use crate::firmware;
use crate::vm::VmConfig;
use std::path::{Path, PathBuf};

/// Raw, unvalidated field values as entered by the user.
///
/// `None` means the field was never set; defaults and descriptor values may
/// fill it. For `disk` and `firmware`, a blank value means "none" and
/// suppresses the descriptor disk and firmware discovery respectively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldValues {
    /// Executable path or command name.
    pub executable: Option<String>,
    /// Disk image path, or a `.vmx` descriptor to load.
    pub disk: Option<String>,
    /// Memory size in megabytes.
    pub memory_mb: Option<String>,
    /// vCPU count.
    pub cpus: Option<String>,
    /// CPU model identifier.
    pub cpu_model: Option<String>,
    /// Machine type identifier.
    pub machine: Option<String>,
    /// Firmware image path.
    pub firmware: Option<String>,
}

impl FieldValues {
    /// Create an empty set of fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the executable.
    pub fn executable(mut self, value: impl Into<String>) -> Self {
        self.executable = Some(value.into());
        self
    }

    /// Set the disk image.
    pub fn disk(mut self, value: impl Into<String>) -> Self {
        self.disk = Some(value.into());
        self
    }

    /// Set the memory size.
    pub fn memory(mut self, value: impl ToString) -> Self {
        self.memory_mb = Some(value.to_string());
        self
    }

    /// Set the vCPU count.
    pub fn cpus(mut self, value: impl ToString) -> Self {
        self.cpus = Some(value.to_string());
        self
    }

    /// Set the CPU model.
    pub fn cpu_model(mut self, value: impl Into<String>) -> Self {
        self.cpu_model = Some(value.into());
        self
    }

    /// Set the machine type.
    pub fn machine(mut self, value: impl Into<String>) -> Self {
        self.machine = Some(value.into());
        self
    }

    /// Set the firmware image.
    pub fn firmware(mut self, value: impl Into<String>) -> Self {
        self.firmware = Some(value.into());
        self
    }

    /// Fill unset fields from a legacy descriptor.
    ///
    /// Fields already set are left alone. Descriptor numbers that are not
    /// positive integers are ignored. Returns the descriptor summary line.
    pub fn apply_descriptor(&mut self, descriptor: &LegacyDescriptor) -> String {
        if self.disk.is_none() {
            self.disk = descriptor
                .disk
                .as_ref()
                .map(|d| d.to_string_lossy().into_owned());
        }
        if self.memory_mb.is_none() {
            self.memory_mb = advisory_count("memsize", descriptor.memsize.as_deref());
        }
        if self.cpus.is_none() {
            self.cpus = advisory_count("numvcpus", descriptor.numvcpus.as_deref());
        }
        descriptor.summary()
    }

    /// If the disk field names a `.vmx` descriptor, load it in place of a disk.
    ///
    /// Returns the descriptor summary line when one was loaded.
    pub fn expand_descriptor_disk(&mut self) -> Option<String> {
        let path = expand_tilde(non_blank(self.disk.as_deref())?);
        if !descriptor::is_descriptor_path(&path) {
            return None;
        }

        tracing::info!(path = %path.display(), "loading legacy descriptor");
        self.disk = None;
        Some(self.apply_descriptor(&LegacyDescriptor::parse_file(&path)))
    }
}

/// Resolve fields, an optional descriptor, and defaults into a [`VmConfig`].
///
/// Validation runs in a fixed order and stops at the first failure:
/// executable, memory, vCPUs, disk, firmware, CPU model, machine. Settings
/// defaults are held to the same rules as user input.
pub fn resolve(
    fields: &FieldValues,
    descriptor: Option<&LegacyDescriptor>,
    settings: &LauncherSettings,
) -> Result<VmConfig, ValidationError> {
    let mut fields = fields.clone();
    if let Some(descriptor) = descriptor {
        fields.apply_descriptor(descriptor);
    }
    fields.expand_descriptor_disk();

    let executable = resolve_executable(fields.executable.as_deref(), settings)?;
    let memory_mb = parse_count(Field::Memory, fields.memory_mb.as_deref(), settings.memory_mb)?;
    let cpus = parse_count(Field::Cpus, fields.cpus.as_deref(), settings.cpus)?;

    let disk = match non_blank(fields.disk.as_deref()) {
        Some(raw) => Some(existing(raw, |path| ValidationError::DiskNotFound { path })?),
        None => None,
    };

    let firmware = match fields.firmware.as_deref() {
        Some(raw) => match non_blank(Some(raw)) {
            Some(raw) => Some(existing(raw, |path| ValidationError::FirmwareNotFound {
                path,
            })?),
            None => None,
        },
        None => firmware::find_default(settings),
    };

    let cpu_model = text_value(Field::CpuModel, fields.cpu_model.as_deref(), &settings.cpu_model)?;
    let machine = text_value(Field::Machine, fields.machine.as_deref(), &settings.machine)?;

    let config = VmConfig::from_parts(
        executable, disk, memory_mb, cpus, cpu_model, firmware, machine,
    );
    tracing::debug!(config = ?config, "resolved VM configuration");
    Ok(config)
}

fn resolve_executable(
    raw: Option<&str>,
    settings: &LauncherSettings,
) -> Result<PathBuf, ValidationError> {
    let raw = raw.unwrap_or(settings.executable.as_str()).trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingExecutable);
    }

    let path = expand_tilde(raw);
    // bare command names are looked up on PATH at spawn time
    if raw.chars().any(std::path::is_separator) && !path.exists() {
        return Err(ValidationError::ExecutableNotFound { path });
    }
    Ok(path)
}

fn parse_count(field: Field, raw: Option<&str>, default: u32) -> Result<u32, ValidationError> {
    let Some(raw) = raw else {
        // defaults come from a settings file and get the same check
        if default == 0 {
            return Err(ValidationError::InvalidNumericField {
                field,
                value: default.to_string(),
            });
        }
        return Ok(default);
    };
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ValidationError::InvalidNumericField {
            field,
            value: raw.to_string(),
        }),
    }
}

/// Field value if non-blank, else the default if non-blank.
fn text_value(field: Field, raw: Option<&str>, default: &str) -> Result<String, ValidationError> {
    non_blank(raw)
        .or_else(|| non_blank(Some(default)))
        .map(str::to_string)
        .ok_or(ValidationError::MissingValue { field })
}

/// Descriptor numbers are advisory: unusable values are dropped.
fn advisory_count(key: &str, raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Some(n.to_string()),
        _ => {
            tracing::debug!(key, value = raw, "ignoring unusable descriptor value");
            None
        }
    }
}

fn existing<F>(raw: &str, not_found: F) -> Result<PathBuf, ValidationError>
where
    F: FnOnce(PathBuf) -> ValidationError,
{
    let path = expand_tilde(raw);
    if path.exists() {
        Ok(path)
    } else {
        Err(not_found(path))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(raw: &str) -> PathBuf {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(std::path::is_separator) => rest,
        _ => return PathBuf::from(raw),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest.trim_start_matches(std::path::is_separator)),
        None => PathBuf::from(raw),
    }
}

//! Legacy `.vmx` descriptor parsing.
//!
//! Only a narrow subset of a VMware descriptor is understood: `memsize`,
//! `numvcpus` (any case), and the first usable disk referenced by a
//! `*.fileName` key (exact case).
//! Parsing never fails; unreadable files produce an empty descriptor.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Key suffix marking a file reference. Matched case-sensitively.
const FILE_REFERENCE_SUFFIX: &str = ".fileName";

/// Disk image extensions accepted from a descriptor.
pub const DISK_EXTENSIONS: [&str; 4] = ["vmdk", "qcow2", "img", "raw"];

/// Extension identifying a legacy descriptor file.
pub const DESCRIPTOR_EXTENSION: &str = "vmx";

/// Values recognized in a legacy descriptor.
///
/// Numeric values are kept as raw strings; conversion happens during resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LegacyDescriptor {
    /// Raw `memsize` value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memsize: Option<String>,

    /// Raw `numvcpus` value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numvcpus: Option<String>,

    /// Absolute path of the first existing disk image referenced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<PathBuf>,
}

impl LegacyDescriptor {
    /// Parse the descriptor at `path`.
    ///
    /// I/O failures are logged and yield an empty descriptor.
    pub fn parse_file(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read descriptor");
                return Self::default();
            }
        };

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse_str(&String::from_utf8_lossy(&bytes), base_dir)
    }

    /// Parse descriptor text, resolving relative file references against `base_dir`.
    pub fn parse_str(contents: &str, base_dir: &Path) -> Self {
        let mut descriptor = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::debug!(line, "skipping descriptor line without '='");
                continue;
            };

            let key = key.trim();
            let value = value.trim().trim_matches('"');

            match key.to_ascii_lowercase().as_str() {
                "memsize" => descriptor.memsize = Some(value.to_string()),
                "numvcpus" => descriptor.numvcpus = Some(value.to_string()),
                _ if key.ends_with(FILE_REFERENCE_SUFFIX)
                    && descriptor.disk.is_none()
                    && !value.is_empty() =>
                {
                    descriptor.disk = resolve_disk_reference(value, base_dir);
                }
                _ => {}
            }
        }

        descriptor
    }

    /// Check if nothing was recognized.
    pub fn is_empty(&self) -> bool {
        self.memsize.is_none() && self.numvcpus.is_none() && self.disk.is_none()
    }

    /// One-line summary of what was recognized.
    pub fn summary(&self) -> String {
        let mut details = Vec::new();
        if let Some(disk) = &self.disk {
            let name = disk.file_name().unwrap_or(disk.as_os_str());
            details.push(format!("disk: {}", name.to_string_lossy()));
        }
        if let Some(mem) = &self.memsize {
            details.push(format!("memory: {} MB", mem));
        }
        if let Some(cpus) = &self.numvcpus {
            details.push(format!("vCPUs: {}", cpus));
        }

        if details.is_empty() {
            "Loaded VMX configuration".to_string()
        } else {
            format!("Loaded VMX ({})", details.join(", "))
        }
    }
}

/// Check if `path` names a legacy descriptor by extension.
pub fn is_descriptor_path(path: &Path) -> bool {
    has_extension(path, &[DESCRIPTOR_EXTENSION])
}

/// Resolve a file reference, accepting it only if it is an existing disk image.
fn resolve_disk_reference(value: &str, base_dir: &Path) -> Option<PathBuf> {
    let candidate = Path::new(value);
    let candidate = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    };

    // canonicalize fails for paths that do not exist
    let resolved = match std::fs::canonicalize(&candidate) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(path = %candidate.display(), error = %e, "ignoring missing file reference");
            return None;
        }
    };

    if has_extension(&resolved, &DISK_EXTENSIONS) {
        Some(resolved)
    } else {
        tracing::debug!(path = %resolved.display(), "ignoring non-disk file reference");
        None
    }
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

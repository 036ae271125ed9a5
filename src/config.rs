//! Launcher settings.
//!
//! Defaults for fields the user leaves blank, the environment overrides the
//! launcher honours, and an optional read-only TOML settings file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default memory in MiB.
pub const DEFAULT_MEMORY_MB: u32 = 2048;

/// Default vCPU count.
pub const DEFAULT_CPUS: u32 = 2;

/// Default CPU model passed to `-cpu`.
pub const DEFAULT_CPU_MODEL: &str = "v4004";

/// Default machine type passed to `-machine`.
pub const DEFAULT_MACHINE: &str = "q35";

/// Executable used when no override is set.
pub const DEFAULT_EXECUTABLE: &str = "qemu-system-x86_64";

/// File name of the SeaBIOS image searched for by the firmware locator.
pub const DEFAULT_FIRMWARE_NAME: &str = "bios.bin";

/// Default wait between the interrupt and kill signals.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Environment variables consulted for the executable, in priority order.
pub const EXECUTABLE_ENV_VARS: [&str; 2] = ["BEMU_BINARY", "QEMU_BINARY"];

/// Environment variable naming an extra firmware search directory.
pub const FIRMWARE_DIR_ENV_VAR: &str = "SEABIOS_DIR";

/// Launcher-wide defaults and overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Executable used when the executable field is not supplied.
    pub executable: String,

    /// Caller-configured firmware search directory.
    pub firmware_dir: Option<PathBuf>,

    /// Firmware file name looked up in each search directory.
    pub firmware_name: String,

    /// Memory in MiB when neither the field nor a descriptor supplies one.
    pub memory_mb: u32,

    /// vCPU count when neither the field nor a descriptor supplies one.
    pub cpus: u32,

    /// CPU model used when the field is blank.
    pub cpu_model: String,

    /// Machine type used when the field is blank.
    pub machine: String,

    /// Bounded wait after the interrupt signal before escalating.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            executable: DEFAULT_EXECUTABLE.to_string(),
            firmware_dir: None,
            firmware_name: DEFAULT_FIRMWARE_NAME.to_string(),
            memory_mb: DEFAULT_MEMORY_MB,
            cpus: DEFAULT_CPUS,
            cpu_model: DEFAULT_CPU_MODEL.to_string(),
            machine: DEFAULT_MACHINE.to_string(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl LauncherSettings {
    /// Load settings from an optional TOML file, then apply environment overrides.
    ///
    /// Without a file this starts from the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.overlay_env();
        Ok(settings)
    }

    /// Parse a TOML settings file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::settings_load(format!("{}: {}", path.display(), e)))?;
        let settings = Self::from_toml(&contents)
            .map_err(|e| Error::settings_load(format!("{}: {}", path.display(), e)))?;
        settings
            .validate()
            .map_err(|e| Error::settings_load(format!("{}: {}", path.display(), e)))?;
        Ok(settings)
    }

    /// Check that the fallback values can produce a launchable VM.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.memory_mb == 0 {
            return Err("memory_mb must be a positive integer".to_string());
        }
        if self.cpus == 0 {
            return Err("cpus must be a positive integer".to_string());
        }
        if self.cpu_model.trim().is_empty() {
            return Err("cpu_model must not be blank".to_string());
        }
        if self.machine.trim().is_empty() {
            return Err("machine must not be blank".to_string());
        }
        if self.firmware_name.trim().is_empty() {
            return Err("firmware_name must not be blank".to_string());
        }
        Ok(())
    }

    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Apply overrides from the process environment.
    pub fn overlay_env(&mut self) {
        self.overlay_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides using the given variable lookup.
    ///
    /// Empty values count as unset.
    pub fn overlay_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(executable) = EXECUTABLE_ENV_VARS.iter().find_map(|key| get(key)) {
            tracing::debug!(executable = %executable, "executable overridden from environment");
            self.executable = executable;
        }

        if let Some(dir) = get(FIRMWARE_DIR_ENV_VAR) {
            self.firmware_dir = Some(PathBuf::from(dir));
        }
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

//! Error types for bemu-manager.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using bemu-manager's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can cross the resolver or lifecycle manager boundary.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    /// A field failed validation; no process was started.
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// Failed to load launcher settings.
    #[error("failed to load settings: {0}")]
    SettingsLoad(String),

    // Lifecycle errors
    /// The VM executable could not be spawned.
    #[error("launch failed: {0}")]
    LaunchFailed(LaunchFailure),

    /// A VM process is already owned by the manager.
    #[error("the VM is already running")]
    AlreadyRunning,

    /// The manager is in the wrong state for the requested operation.
    #[error("invalid vm state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state.
        expected: String,
        /// Actual state.
        actual: String,
    },

    // IO errors
    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a settings load error with a message.
    pub fn settings_load(msg: impl Into<String>) -> Self {
        Self::SettingsLoad(msg.into())
    }

    /// Convert the error into the notification shown by the presentation layer.
    pub fn notification(&self) -> Notification {
        match self {
            Error::Validation(e) => Notification::new(e.category(), e.to_string()),
            Error::LaunchFailed(e) => Notification::new("Launch Failed", e.to_string()),
            Error::AlreadyRunning => Notification::new("VM Running", "The VM is already running"),
            Error::InvalidState { .. } | Error::SettingsLoad(_) | Error::Io(_) => {
                Notification::new("Error", self.to_string())
            }
        }
    }
}

/// A user-editable launch field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Path or command name of the VM executable.
    Executable,
    /// Disk image path.
    Disk,
    /// Memory size in megabytes.
    Memory,
    /// Number of virtual CPUs.
    Cpus,
    /// CPU model identifier.
    CpuModel,
    /// Machine type identifier.
    Machine,
    /// Firmware image path.
    Firmware,
}

impl Field {
    /// Human-readable field label.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Executable => "executable",
            Field::Disk => "disk image",
            Field::Memory => "memory (MB)",
            Field::Cpus => "vCPUs",
            Field::CpuModel => "CPU model",
            Field::Machine => "machine",
            Field::Firmware => "firmware",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Field validation failures produced by the configuration resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The executable field is blank.
    #[error("please choose a VM executable")]
    MissingExecutable,

    /// A path-qualified executable does not exist.
    #[error("VM executable '{}' does not exist", path.display())]
    ExecutableNotFound {
        /// Path that was not found.
        path: PathBuf,
    },

    /// A numeric field is not a positive integer.
    #[error("{field} must be a positive integer, got '{value}'")]
    InvalidNumericField {
        /// The offending field.
        field: Field,
        /// Raw value as entered.
        value: String,
    },

    /// A required text field is blank and has no usable default.
    #[error("{field} must not be blank")]
    MissingValue {
        /// The offending field.
        field: Field,
    },

    /// The disk image does not exist.
    #[error("disk image '{}' does not exist", path.display())]
    DiskNotFound {
        /// Path that was not found.
        path: PathBuf,
    },

    /// The firmware image does not exist.
    #[error("firmware image '{}' was not found", path.display())]
    FirmwareNotFound {
        /// Path that was not found.
        path: PathBuf,
    },
}

impl ValidationError {
    /// The field this failure refers to.
    pub fn field(&self) -> Field {
        match self {
            ValidationError::MissingExecutable | ValidationError::ExecutableNotFound { .. } => {
                Field::Executable
            }
            ValidationError::InvalidNumericField { field, .. }
            | ValidationError::MissingValue { field } => *field,
            ValidationError::DiskNotFound { .. } => Field::Disk,
            ValidationError::FirmwareNotFound { .. } => Field::Firmware,
        }
    }

    /// Notification category for this failure.
    pub fn category(&self) -> &'static str {
        match self.field() {
            Field::Disk => "Invalid Disk",
            Field::Firmware => "Invalid BIOS",
            _ => "Invalid Configuration",
        }
    }
}

/// Reasons a VM process could not be created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchFailure {
    /// The executable could not be located.
    #[error("could not find executable '{}'", program.display())]
    ExecutableNotFound {
        /// Program that was invoked.
        program: PathBuf,
    },

    /// The executable exists but may not be run.
    #[error("permission denied running '{}'", program.display())]
    PermissionDenied {
        /// Program that was invoked.
        program: PathBuf,
    },

    /// Any other spawn failure.
    #[error("failed to launch '{}': {message}", program.display())]
    Spawn {
        /// Program that was invoked.
        program: PathBuf,
        /// OS error message.
        message: String,
    },
}

impl LaunchFailure {
    /// Classify a spawn error for the given program.
    pub fn from_io(program: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        let program = program.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::ExecutableNotFound { program },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { program },
            _ => Self::Spawn {
                program,
                message: err.to_string(),
            },
        }
    }
}

/// Error notification delivered to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Short category, used as a dialog title.
    pub category: &'static str,
    /// Field- or reason-qualified message.
    pub message: String,
}

impl Notification {
    /// Create a new notification.
    pub fn new(category: &'static str, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

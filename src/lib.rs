//! bemu-manager - launch configuration and lifecycle for BEMU virtual machines.
//!
//! Raw field values flow through the [`resolve`] module (which consults
//! [`descriptor`] and [`firmware`]) into a validated [`VmConfig`], which
//! [`vm::build_command`] renders and [`VmManager`] runs.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod firmware;
pub mod resolve;
pub mod vm;

pub use config::LauncherSettings;
pub use descriptor::LegacyDescriptor;
pub use error::{Error, Field, LaunchFailure, Notification, Result, ValidationError};
pub use resolve::{resolve, FieldValues};
pub use vm::{
    build_command, ExitReason, ExitReport, LaunchCommand, LifecycleState, StopOutcome, VmConfig,
    VmManager,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

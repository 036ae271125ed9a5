//! VM configuration and process lifecycle.
//!
//! - [`VmConfig`]: validated launch configuration
//! - [`build_command`]: renders a config into a [`LaunchCommand`]
//! - [`VmManager`]: starts, monitors and stops the single VM process

pub mod command;
pub mod config;
pub mod manager;
pub mod state;

pub use command::{build_command, LaunchCommand};
pub use config::{DiskFormat, VmConfig};
pub use manager::VmManager;
pub use state::{ExitReason, ExitReport, LifecycleState, StopOutcome, StopPhase};

//! VM lifecycle state types.

use crate::error::LaunchFailure;
use serde::{Deserialize, Serialize};
use std::process::ExitStatus;

/// Progress of a graceful-then-forceful stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPhase {
    /// The interrupt signal has been dispatched.
    SentInterrupt,
    /// Waiting out the grace period for the process to exit.
    GracePeriod,
    /// The grace period expired and the process was killed.
    SentKill,
}

/// Lifecycle of the managed VM process.
///
/// ```text
/// Idle -> Starting -> Running -> Stopping -> Exited
///            \-> LaunchFailed
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// No process has been started.
    Idle,

    /// Spawning the process.
    Starting,

    /// Process is running.
    Running {
        /// OS process ID.
        pid: u32,
    },

    /// A stop was requested and the process has not exited yet.
    Stopping {
        /// OS process ID.
        pid: u32,
        /// Current stop sub-state.
        phase: StopPhase,
    },

    /// Process has terminated.
    Exited(ExitReport),

    /// The process could not be spawned.
    LaunchFailed(LaunchFailure),
}

impl LifecycleState {
    /// Check if a new process may be started.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            LifecycleState::Idle | LifecycleState::Exited(_) | LifecycleState::LaunchFailed(_)
        )
    }

    /// Check if a stop may be requested.
    pub fn can_stop(&self) -> bool {
        matches!(self, LifecycleState::Running { .. })
    }

    /// Check if a process is owned (starting, running or stopping).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            LifecycleState::Starting
                | LifecycleState::Running { .. }
                | LifecycleState::Stopping { .. }
        )
    }

    /// Get the state name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Running { .. } => "running",
            LifecycleState::Stopping { .. } => "stopping",
            LifecycleState::Exited(_) => "exited",
            LifecycleState::LaunchFailed(_) => "launch failed",
        }
    }

    /// Status line for the presentation layer.
    pub fn status(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "Ready",
            LifecycleState::Starting => "Starting VM...",
            LifecycleState::Running { .. } => "VM running",
            LifecycleState::Stopping { .. } => "Stopping VM...",
            LifecycleState::Exited(report) if report.requested => "VM stopped",
            LifecycleState::Exited(_) => "VM exited",
            LifecycleState::LaunchFailed(_) => "Launch failed",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Exited(report) => write!(f, "exited: {}", report.reason),
            LifecycleState::LaunchFailed(reason) => write!(f, "launch failed: {}", reason),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// How the VM process terminated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExitReason {
    /// Clean exit with code.
    Exited {
        /// Exit code from the process.
        code: i32,
    },

    /// Killed by signal.
    Signaled {
        /// Signal number.
        signal: i32,
    },

    /// Waiting on the process failed.
    WaitFailed {
        /// Details about the error.
        details: String,
    },
}

impl ExitReason {
    /// Classify a process exit status.
    pub fn from_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited { code },
            (None, Some(signal)) => Self::Signaled { signal },
            (None, None) => Self::WaitFailed {
                details: format!("unrecognized exit status: {}", status),
            },
        }
    }

    /// Map to a shell-style exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitReason::Exited { code } => *code,
            ExitReason::Signaled { signal } => 128 + signal,
            ExitReason::WaitFailed { .. } => 1,
        }
    }

    /// Check if this represents a successful exit.
    pub fn is_success(&self) -> bool {
        matches!(self, ExitReason::Exited { code: 0 })
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Exited { code } => write!(f, "exited with code {}", code),
            ExitReason::Signaled { signal } => write!(f, "killed by signal {}", signal),
            ExitReason::WaitFailed { details } => write!(f, "wait failed: {}", details),
        }
    }
}

/// Termination report published by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExitReport {
    /// How the process ended.
    pub reason: ExitReason,
    /// Whether the exit followed an explicit stop request.
    pub requested: bool,
    /// Whether the grace period expired and the process was killed.
    pub escalated: bool,
}

impl ExitReport {
    /// Report for a process that exited on its own.
    pub fn spontaneous(reason: ExitReason) -> Self {
        Self {
            reason,
            requested: false,
            escalated: false,
        }
    }
}

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The shutdown sequence has begun.
    Requested,
    /// A shutdown sequence is already in progress.
    AlreadyStopping,
    /// No process is running.
    NothingToStop,
}

impl StopOutcome {
    /// Status line for the presentation layer.
    pub fn status(&self) -> &'static str {
        match self {
            StopOutcome::Requested | StopOutcome::AlreadyStopping => "Stopping VM...",
            StopOutcome::NothingToStop => "No VM running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let exited = LifecycleState::Exited(ExitReport::spontaneous(ExitReason::Exited { code: 0 }));
        let failed = LifecycleState::LaunchFailed(LaunchFailure::ExecutableNotFound {
            program: "qemu".into(),
        });
        // (state, can_start, can_stop, is_active)
        let cases = [
            (LifecycleState::Idle, true, false, false),
            (LifecycleState::Starting, false, false, true),
            (LifecycleState::Running { pid: 7 }, false, true, true),
            (
                LifecycleState::Stopping {
                    pid: 7,
                    phase: StopPhase::GracePeriod,
                },
                false,
                false,
                true,
            ),
            (exited, true, false, false),
            (failed, true, false, false),
        ];

        for (state, start, stop, active) in cases {
            assert_eq!(state.can_start(), start, "{:?}.can_start()", state);
            assert_eq!(state.can_stop(), stop, "{:?}.can_stop()", state);
            assert_eq!(state.is_active(), active, "{:?}.is_active()", state);
        }
    }

    #[test]
    fn test_status_lines() {
        let stopped = ExitReport {
            reason: ExitReason::Exited { code: 0 },
            requested: true,
            escalated: false,
        };
        assert_eq!(LifecycleState::Idle.status(), "Ready");
        assert_eq!(LifecycleState::Running { pid: 1 }.status(), "VM running");
        assert_eq!(LifecycleState::Exited(stopped).status(), "VM stopped");
        assert_eq!(
            LifecycleState::Exited(ExitReport::spontaneous(ExitReason::Exited { code: 1 })).status(),
            "VM exited"
        );
        assert_eq!(StopOutcome::NothingToStop.status(), "No VM running");
    }

    #[test]
    fn test_exit_reason_exit_codes() {
        assert_eq!(ExitReason::Exited { code: 0 }.exit_code(), 0);
        assert_eq!(ExitReason::Exited { code: 3 }.exit_code(), 3);
        assert_eq!(ExitReason::Signaled { signal: 9 }.exit_code(), 137); // 128 + SIGKILL
        assert_eq!(ExitReason::Signaled { signal: 2 }.exit_code(), 130); // 128 + SIGINT
        assert!(ExitReason::Exited { code: 0 }.is_success());
        assert!(!ExitReason::Signaled { signal: 15 }.is_success());
    }

    #[test]
    fn test_exit_reason_from_status() {
        use std::os::unix::process::ExitStatusExt;

        // raw wait status: exit code in the high byte, signal in the low bits
        assert_eq!(
            ExitReason::from_status(ExitStatus::from_raw(3 << 8)),
            ExitReason::Exited { code: 3 }
        );
        assert_eq!(
            ExitReason::from_status(ExitStatus::from_raw(libc::SIGKILL)),
            ExitReason::Signaled { signal: 9 }
        );
    }

    #[test]
    fn test_exit_report_serialization() {
        let report = ExitReport {
            reason: ExitReason::Signaled { signal: 9 },
            requested: true,
            escalated: true,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("signaled"));
        let deserialized: ExitReport = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, report);
    }
}

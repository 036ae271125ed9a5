//! VM process lifecycle management.
//!
//! The [`VmManager`] owns at most one child process. Starting and stopping
//! happen on the caller's path; a single monitor task per process owns the
//! child handle, waits for it to exit, and drives the stop sequence:
//!
//! ```text
//! stop() --oneshot--> monitor: SIGINT -> grace timer -> SIGKILL -> wait
//!                        \--> watch channel: Stopping{..} -> Exited(report)
//! ```

use super::command::{build_command, LaunchCommand};
use super::config::VmConfig;
use super::state::{ExitReason, ExitReport, LifecycleState, StopOutcome, StopPhase};
use crate::config::LauncherSettings;
use crate::error::{Error, LaunchFailure, Result};
use parking_lot::Mutex;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{oneshot, watch};

/// Lifecycle manager for a single VM process.
///
/// Must be used from within a Tokio runtime.
pub struct VmManager {
    /// Wait between the interrupt and kill signals.
    grace_period: Duration,
    /// Published lifecycle state.
    state: Arc<watch::Sender<LifecycleState>>,
    /// Stop request channel to the current monitor task.
    stop_tx: Arc<Mutex<Option<StopHandle>>>,
}

/// Stop request sender, tagged with the process it belongs to.
struct StopHandle {
    pid: u32,
    tx: oneshot::Sender<()>,
}

impl VmManager {
    /// Create an idle manager with the given grace period.
    pub fn new(grace_period: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            grace_period,
            state: Arc::new(state),
            stop_tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Create an idle manager using the configured grace period.
    pub fn from_settings(settings: &LauncherSettings) -> Self {
        Self::new(settings.grace_period)
    }

    /// Get the current state.
    pub fn state(&self) -> LifecycleState {
        self.state.borrow().clone()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Grace period used when stopping.
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Start a VM for a validated configuration.
    ///
    /// Returns the PID of the new process.
    pub fn start(&self, config: &VmConfig) -> Result<u32> {
        self.launch(&build_command(config))
    }

    /// Spawn `command` as the managed process.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRunning`] if a process is starting, running or stopping.
    ///   Nothing is spawned.
    /// - [`Error::LaunchFailed`] if the process could not be created. The state
    ///   becomes [`LifecycleState::LaunchFailed`].
    pub fn launch(&self, command: &LaunchCommand) -> Result<u32> {
        let claimed = self.state.send_if_modified(|state| {
            if state.can_start() {
                *state = LifecycleState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            tracing::debug!(state = %self.state.borrow().name(), "start rejected");
            return Err(Error::AlreadyRunning);
        }

        tracing::info!(command = %command, "starting VM");

        let child = match command.to_command().spawn() {
            Ok(child) => child,
            Err(e) => {
                let failure = LaunchFailure::from_io(command.program(), &e);
                tracing::error!(error = %failure, "failed to launch VM");
                self.state
                    .send_replace(LifecycleState::LaunchFailed(failure.clone()));
                return Err(Error::LaunchFailed(failure));
            }
        };

        // id() is only None once the child has been reaped
        let pid = child.id().unwrap_or_default();

        let (tx, stop_rx) = oneshot::channel();
        *self.stop_tx.lock() = Some(StopHandle { pid, tx });

        // Running must be published before the monitor can publish Exited
        self.state.send_replace(LifecycleState::Running { pid });
        tracing::info!(pid, "VM running");

        tokio::spawn(monitor(
            child,
            stop_rx,
            Arc::clone(&self.state),
            Arc::clone(&self.stop_tx),
            self.grace_period,
        ));

        Ok(pid)
    }

    /// Request a graceful stop.
    ///
    /// Returns as soon as the request is handed to the monitor; the interrupt,
    /// grace period and kill happen in the background and are observable
    /// through [`subscribe`](Self::subscribe).
    pub fn stop(&self) -> Result<StopOutcome> {
        let mut outcome = Ok(StopOutcome::NothingToStop);
        let mut request = None;
        self.state.send_if_modified(|state| match state {
            LifecycleState::Running { pid } => {
                let pid = *pid;
                // taken under the state lock so it always matches the running pid
                request = match self.stop_tx.lock().take() {
                    Some(handle) if handle.pid == pid => Some(handle.tx),
                    _ => None,
                };
                *state = LifecycleState::Stopping {
                    pid,
                    phase: StopPhase::SentInterrupt,
                };
                outcome = Ok(StopOutcome::Requested);
                true
            }
            LifecycleState::Stopping { .. } => {
                outcome = Ok(StopOutcome::AlreadyStopping);
                false
            }
            LifecycleState::Starting => {
                outcome = Err(Error::InvalidState {
                    expected: "running".to_string(),
                    actual: "starting".to_string(),
                });
                false
            }
            _ => false,
        });

        let outcome = outcome?;
        match outcome {
            StopOutcome::Requested => match request {
                Some(tx) => {
                    if tx.send(()).is_err() {
                        tracing::debug!("monitor finished before stop request arrived");
                    }
                }
                None => tracing::warn!("running VM has no stop channel"),
            },
            StopOutcome::AlreadyStopping => tracing::debug!("stop already in progress"),
            StopOutcome::NothingToStop => tracing::debug!("no VM running, nothing to stop"),
        }
        Ok(outcome)
    }

    /// Wait until no process is active.
    ///
    /// Returns the exit report if the last process ran and exited, `None` if
    /// nothing was started or the launch failed.
    pub async fn wait_for_exit(&self) -> Option<ExitReport> {
        let mut rx = self.state.subscribe();
        let state = rx.wait_for(|s| !s.is_active()).await.ok()?;
        match &*state {
            LifecycleState::Exited(report) => Some(report.clone()),
            _ => None,
        }
    }
}

impl Drop for VmManager {
    fn drop(&mut self) {
        // Best-effort cleanup; kill_on_drop covers a monitor that never runs
        let running = self.state.borrow().can_stop();
        if running {
            if let Err(e) = self.stop() {
                tracing::debug!(error = %e, "stop on drop failed");
            }
        }
    }
}

/// What woke the monitor first.
enum Wake {
    Exited(std::io::Result<ExitStatus>),
    StopRequested,
    ManagerGone,
}

/// Watch a child until it exits, running the stop sequence if requested.
async fn monitor(
    mut child: Child,
    stop_rx: oneshot::Receiver<()>,
    state: Arc<watch::Sender<LifecycleState>>,
    stop_slot: Arc<Mutex<Option<StopHandle>>>,
    grace_period: Duration,
) {
    let pid = child.id();

    let wake = tokio::select! {
        status = child.wait() => Wake::Exited(status),
        request = stop_rx => match request {
            Ok(()) => Wake::StopRequested,
            Err(_) => Wake::ManagerGone,
        },
    };

    let report = match wake {
        Wake::Exited(status) => ExitReport::spontaneous(exit_reason(status)),
        Wake::StopRequested => shutdown(&mut child, &state, grace_period).await,
        // manager dropped the channel without stopping; keep waiting
        Wake::ManagerGone => ExitReport::spontaneous(exit_reason(child.wait().await)),
    };

    tracing::info!(
        pid = ?pid,
        reason = %report.reason,
        requested = report.requested,
        escalated = report.escalated,
        "VM exited"
    );
    {
        let mut slot = stop_slot.lock();
        if matches!((slot.as_ref(), pid), (Some(handle), Some(pid)) if handle.pid == pid) {
            *slot = None;
        }
    }
    state.send_replace(LifecycleState::Exited(report));
}

/// Interrupt, wait out the grace period, then kill.
async fn shutdown(
    child: &mut Child,
    state: &watch::Sender<LifecycleState>,
    grace_period: Duration,
) -> ExitReport {
    if let Err(e) = interrupt(child) {
        tracing::warn!(error = %e, "failed to interrupt VM, killing it");
        if let Err(e) = child.start_kill() {
            tracing::warn!(error = %e, "failed to kill VM");
        }
    }
    publish_phase(state, StopPhase::GracePeriod);

    let (status, escalated) = match tokio::time::timeout(grace_period, child.wait()).await {
        Ok(status) => (status, false),
        Err(_) => {
            tracing::warn!(
                grace_secs = grace_period.as_secs_f64(),
                "VM did not exit within grace period, killing"
            );
            publish_phase(state, StopPhase::SentKill);
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "failed to kill VM");
            }
            (child.wait().await, true)
        }
    };

    ExitReport {
        reason: exit_reason(status),
        requested: true,
        escalated,
    }
}

/// Send SIGINT to the child, if it has not been reaped yet.
fn interrupt(child: &Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };

    tracing::debug!(pid, "sending SIGINT");
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn publish_phase(state: &watch::Sender<LifecycleState>, phase: StopPhase) {
    state.send_if_modified(|s| match s {
        LifecycleState::Stopping { phase: current, .. } => {
            *current = phase;
            true
        }
        _ => false,
    });
}

fn exit_reason(status: std::io::Result<ExitStatus>) -> ExitReason {
    match status {
        Ok(status) => ExitReason::from_status(status),
        Err(e) => ExitReason::WaitFailed {
            details: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn script(body: impl Into<String>) -> LaunchCommand {
        LaunchCommand::new("/bin/sh", ["-c".to_string(), body.into()])
    }

    /// Loop forever after installing `trap` and touching `ready`.
    fn looping(trap: &str, ready: &Path) -> LaunchCommand {
        script(format!(
            "{}; touch '{}'; while :; do sleep 0.1; done",
            trap,
            ready.display()
        ))
    }

    async fn wait_for_file(path: &Path) {
        let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
        while !path.exists() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {}",
                path.display()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn exit_report(manager: &VmManager) -> ExitReport {
        tokio::time::timeout(TEST_TIMEOUT, manager.wait_for_exit())
            .await
            .expect("VM should exit")
            .expect("VM should report an exit")
    }

    #[tokio::test]
    async fn test_spontaneous_exit_reported() {
        let manager = VmManager::new(Duration::from_secs(5));
        let pid = manager.launch(&script("exit 3")).unwrap();
        assert!(pid > 0);

        let report = exit_report(&manager).await;
        assert_eq!(report.reason, ExitReason::Exited { code: 3 });
        assert!(!report.requested);
        assert_eq!(manager.state().status(), "VM exited");
    }

    #[tokio::test]
    async fn test_graceful_stop() {
        let dir = tempfile::tempdir().unwrap();
        let ready = dir.path().join("ready");
        let manager = VmManager::new(Duration::from_secs(5));
        let pid = manager
            .launch(&looping("trap 'exit 0' INT", &ready))
            .unwrap();
        wait_for_file(&ready).await;

        assert_eq!(manager.stop().unwrap(), StopOutcome::Requested);
        assert!(matches!(
            manager.state(),
            LifecycleState::Stopping { pid: p, .. } if p == pid
        ));

        let report = exit_report(&manager).await;
        assert_eq!(report.reason, ExitReason::Exited { code: 0 });
        assert!(report.requested);
        assert!(!report.escalated);
        assert_eq!(manager.state().status(), "VM stopped");
    }

    #[tokio::test]
    async fn test_stop_escalates_after_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let ready = dir.path().join("ready");
        let manager = VmManager::new(Duration::from_millis(200));
        manager.launch(&looping("trap '' INT", &ready)).unwrap();
        wait_for_file(&ready).await;

        let mut rx = manager.subscribe();
        manager.stop().unwrap();
        let saw_kill = tokio::time::timeout(
            TEST_TIMEOUT,
            rx.wait_for(|s| {
                matches!(
                    s,
                    LifecycleState::Stopping {
                        phase: StopPhase::SentKill,
                        ..
                    } | LifecycleState::Exited(_)
                )
            }),
        )
        .await
        .is_ok();
        assert!(saw_kill);

        let report = exit_report(&manager).await;
        assert_eq!(report.reason, ExitReason::Signaled { signal: libc::SIGKILL });
        assert!(report.requested);
        assert!(report.escalated);
    }

    #[tokio::test]
    async fn test_stop_while_stopping() {
        let dir = tempfile::tempdir().unwrap();
        let ready = dir.path().join("ready");
        let manager = VmManager::new(Duration::from_secs(5));
        manager
            .launch(&looping("trap 'sleep 0.5; exit 0' INT", &ready))
            .unwrap();
        wait_for_file(&ready).await;

        let mut rx = manager.subscribe();
        assert_eq!(manager.stop().unwrap(), StopOutcome::Requested);
        assert_eq!(manager.stop().unwrap(), StopOutcome::AlreadyStopping);

        let in_grace = tokio::time::timeout(
            TEST_TIMEOUT,
            rx.wait_for(|s| {
                matches!(
                    s,
                    LifecycleState::Stopping {
                        phase: StopPhase::GracePeriod,
                        ..
                    }
                )
            }),
        )
        .await
        .is_ok();
        assert!(in_grace, "grace period phase should be published");
        assert_eq!(manager.stop().unwrap(), StopOutcome::AlreadyStopping);

        let report = exit_report(&manager).await;
        assert_eq!(report.reason, ExitReason::Exited { code: 0 });
        assert!(report.requested);
        assert!(!report.escalated);

        // exactly one exit is published
        rx.borrow_and_update();
        let again = tokio::time::timeout(Duration::from_millis(300), rx.changed()).await;
        assert!(again.is_err(), "no further state change expected");
    }

    #[tokio::test]
    async fn test_stop_channel_cleared_after_exit() {
        let dir = tempfile::tempdir().unwrap();
        let ready = dir.path().join("ready");
        let manager = VmManager::new(Duration::from_secs(5));

        manager.launch(&script("exit 0")).unwrap();
        exit_report(&manager).await;
        assert!(manager.stop_tx.lock().is_none());

        let pid = manager
            .launch(&looping("trap 'exit 0' INT", &ready))
            .unwrap();
        assert_eq!(manager.stop_tx.lock().as_ref().map(|h| h.pid), Some(pid));
        wait_for_file(&ready).await;

        assert_eq!(manager.stop().unwrap(), StopOutcome::Requested);
        assert!(manager.stop_tx.lock().is_none());
        let report = exit_report(&manager).await;
        assert!(report.requested);
        assert!(!report.escalated);
    }

    #[test]
    fn test_vm_killed_when_runtime_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let ready = dir.path().join("ready");
        let alive = dir.path().join("alive");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let manager = VmManager::new(Duration::from_secs(5));

        runtime.block_on(async {
            manager
                .launch(&script(format!(
                    "touch '{}'; while :; do touch '{}'; sleep 0.05; done",
                    ready.display(),
                    alive.display()
                )))
                .unwrap();
            wait_for_file(&ready).await;
        });

        // dropping the runtime cancels the monitor and drops the child handle
        drop(runtime);
        std::thread::sleep(Duration::from_millis(200));
        let _ = std::fs::remove_file(&alive);
        std::thread::sleep(Duration::from_millis(300));
        assert!(!alive.exists(), "VM process outlived its handle");
        drop(manager);
    }

    #[tokio::test]
    async fn test_start_while_running_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ready = dir.path().join("ready");
        let marker = dir.path().join("second");
        let manager = VmManager::new(Duration::from_secs(5));
        let pid = manager
            .launch(&looping("trap 'exit 0' INT", &ready))
            .unwrap();
        wait_for_file(&ready).await;

        let second = script(format!("touch '{}'", marker.display()));
        assert!(matches!(manager.launch(&second), Err(Error::AlreadyRunning)));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!marker.exists(), "rejected start must not spawn a process");
        assert_eq!(manager.state(), LifecycleState::Running { pid });

        manager.stop().unwrap();
        exit_report(&manager).await;
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let manager = VmManager::new(Duration::from_secs(1));
        assert_eq!(manager.stop().unwrap(), StopOutcome::NothingToStop);
        assert_eq!(manager.state(), LifecycleState::Idle);
        assert!(manager.wait_for_exit().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_after_exit_is_noop() {
        let manager = VmManager::new(Duration::from_secs(1));
        manager.launch(&script("exit 0")).unwrap();
        let report = exit_report(&manager).await;

        assert_eq!(manager.stop().unwrap(), StopOutcome::NothingToStop);
        assert_eq!(manager.state(), LifecycleState::Exited(report));
    }

    #[tokio::test]
    async fn test_missing_executable_launch_failed() {
        let manager = VmManager::new(Duration::from_secs(1));

        for program in ["/nonexistent/bin/bemu", "bemu-manager-test-no-such-binary"] {
            let err = manager
                .launch(&LaunchCommand::new(program, Vec::<String>::new()))
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    Error::LaunchFailed(LaunchFailure::ExecutableNotFound { .. })
                ),
                "{}: {:?}",
                program,
                err
            );
            assert!(matches!(manager.state(), LifecycleState::LaunchFailed(_)));
            assert!(manager.wait_for_exit().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_start_config_with_removed_executable() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("bemu");
        std::fs::write(&exe, b"").unwrap();
        let config = VmConfig::from_parts(
            exe.clone(),
            None,
            2048,
            2,
            "v4004".into(),
            None,
            "q35".into(),
        );
        std::fs::remove_file(&exe).unwrap();

        let manager = VmManager::new(Duration::from_secs(1));
        let err = manager.start(&config).unwrap_err();
        assert!(matches!(
            err,
            Error::LaunchFailed(LaunchFailure::ExecutableNotFound { ref program }) if *program == PathBuf::from(&exe)
        ));
        assert_eq!(err.notification().category, "Launch Failed");
    }

    #[tokio::test]
    async fn test_restart_after_exit_and_failure() {
        let manager = VmManager::new(Duration::from_secs(1));
        assert!(manager
            .launch(&LaunchCommand::new("/nonexistent/bemu", Vec::<String>::new()))
            .is_err());

        manager.launch(&script("exit 0")).unwrap();
        exit_report(&manager).await;

        manager.launch(&script("exit 1")).unwrap();
        let report = exit_report(&manager).await;
        assert_eq!(report.reason, ExitReason::Exited { code: 1 });
    }
}

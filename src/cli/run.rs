//! Run command implementation.

use super::fields::FieldArgs;
use bemu_manager::{Error, LauncherSettings, LifecycleState, StopOutcome, VmConfig, VmManager};
use clap::Args;
use tokio::signal::unix::{signal, SignalKind};

/// Start a VM in the foreground and wait for it to exit.
///
/// Ctrl-C requests a graceful stop: the VM receives SIGINT and is killed if
/// it is still running after the grace period.
#[derive(Args, Debug)]
pub struct RunCmd {
    #[command(flatten)]
    pub fields: FieldArgs,
}

impl RunCmd {
    /// Execute the run command.
    pub fn run(self, settings: &LauncherSettings) -> bemu_manager::Result<()> {
        let config = self.fields.resolve(settings)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let code = runtime.block_on(run_vm(config, settings))?;
        std::process::exit(code);
    }
}

async fn run_vm(config: VmConfig, settings: &LauncherSettings) -> bemu_manager::Result<i32> {
    let manager = VmManager::from_settings(settings);
    let mut states = manager.subscribe();
    let mut interrupts = signal(SignalKind::interrupt())?;
    let mut interrupted = false;
    let mut last_status = "";

    manager.start(&config)?;

    loop {
        let state = states.borrow_and_update().clone();
        if state.status() != last_status {
            last_status = state.status();
            println!("{}", last_status);
        }

        match &state {
            LifecycleState::Exited(report) => {
                println!("VM {}", report.reason);
                return Ok(report.reason.exit_code());
            }
            LifecycleState::LaunchFailed(reason) => {
                return Err(Error::LaunchFailed(reason.clone()));
            }
            _ => {}
        }

        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    return Err(Error::InvalidState {
                        expected: "exited".to_string(),
                        actual: state.name().to_string(),
                    });
                }
            }
            Some(()) = interrupts.recv(), if !interrupted => {
                interrupted = true;
                tracing::info!(grace = ?manager.grace_period(), "interrupt received, stopping VM");
                if manager.stop()? == StopOutcome::NothingToStop {
                    println!("{}", StopOutcome::NothingToStop.status());
                }
            }
        }
    }
}

//! Rendering a [`VmConfig`] into an executable invocation.

use super::config::VmConfig;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// Program plus discrete argument list. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl LaunchCommand {
    /// Create an invocation from a program and its arguments.
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Program to execute.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Ordered arguments.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Build a process command for this invocation.
    ///
    /// The child is killed if its handle is dropped without being reaped.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", display_arg(self.program.as_os_str()))?;
        for arg in &self.args {
            write!(f, " {}", display_arg(arg))?;
        }
        Ok(())
    }
}

/// Quote arguments containing whitespace so the rendered line reads unambiguously.
fn display_arg(arg: &OsStr) -> String {
    let s = arg.to_string_lossy();
    if s.is_empty() || s.contains(char::is_whitespace) {
        format!("'{}'", s)
    } else {
        s.into_owned()
    }
}

/// Render the invocation for a configuration.
///
/// Option order is fixed: machine, memory, vCPUs, CPU model, then firmware
/// and disk when present.
pub fn build_command(config: &VmConfig) -> LaunchCommand {
    let mut args: Vec<OsString> = vec![
        "-machine".into(),
        config.machine().into(),
        "-m".into(),
        config.memory_mb().to_string().into(),
        "-smp".into(),
        config.cpus().to_string().into(),
        "-cpu".into(),
        config.cpu_model().into(),
    ];

    if let Some(firmware) = config.firmware() {
        args.push("-bios".into());
        args.push(firmware.into());
    }

    if let (Some(disk), Some(format)) = (config.disk(), config.disk_format()) {
        if format.is_copy_on_write() {
            let mut drive = OsString::from("file=");
            drive.push(disk);
            drive.push(format!(",if=virtio,format={}", format.name()));
            args.push("-drive".into());
            args.push(drive);
        } else {
            args.push("-hda".into());
            args.push(disk.into());
        }
    }

    LaunchCommand {
        program: config.executable().to_path_buf(),
        args,
    }
}

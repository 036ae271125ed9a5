//! bemu-manager CLI entry point.

use bemu_manager::LauncherSettings;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod cli;

/// bemu-manager - launch and manage a BEMU virtual machine
#[derive(Parser, Debug)]
#[command(name = "bemu-manager")]
#[command(about = "Launch and manage a BEMU virtual machine")]
#[command(version)]
struct Cli {
    /// TOML file with launcher defaults.
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Wait after SIGINT before killing the VM (e.g. "10s", "500ms").
    #[arg(long, global = true, value_parser = cli::parsers::parse_duration)]
    grace: Option<Duration>,

    /// Log lifecycle events at info level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a VM and wait for it to exit.
    Run(cli::run::RunCmd),

    /// Print the VM invocation without starting it.
    Print(cli::print::PrintCmd),

    /// Show what a legacy .vmx descriptor provides.
    Vmx(cli::vmx::VmxCmd),

    /// Show where firmware is searched for.
    Firmware(cli::firmware::FirmwareCmd),
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on RUST_LOG or default to warn
    init_logging(cli.verbose);

    tracing::debug!(version = bemu_manager::VERSION, "starting bemu-manager");

    let mut settings = match LauncherSettings::load(cli.settings.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(grace) = cli.grace {
        settings.grace_period = grace;
    }

    // Execute command
    let result = match cli.command {
        Commands::Run(cmd) => cmd.run(&settings),
        Commands::Print(cmd) => cmd.run(&settings),
        Commands::Vmx(cmd) => cmd.run(),
        Commands::Firmware(cmd) => cmd.run(&settings),
    };

    // Handle errors
    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("{}", e.notification());
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
///
/// `BEMU_LOG_FORMAT=json` switches to JSON output.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "bemu_manager=info"
    } else {
        "bemu_manager=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if std::env::var("BEMU_LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

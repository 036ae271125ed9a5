//! Descriptor inspection command.

use bemu_manager::LegacyDescriptor;
use clap::Args;
use std::path::PathBuf;

/// Show what a legacy .vmx descriptor provides.
#[derive(Args, Debug)]
pub struct VmxCmd {
    /// Path to the .vmx file.
    pub path: PathBuf,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl VmxCmd {
    /// Execute the vmx command.
    pub fn run(&self) -> bemu_manager::Result<()> {
        let descriptor = LegacyDescriptor::parse_file(&self.path);

        if self.json {
            println!("{:#}", serde_json::json!(descriptor));
            return Ok(());
        }

        println!("{}", descriptor.summary());
        if descriptor.is_empty() {
            return Ok(());
        }
        println!("{:<10} {}", "memsize", descriptor.memsize.as_deref().unwrap_or("-"));
        println!("{:<10} {}", "numvcpus", descriptor.numvcpus.as_deref().unwrap_or("-"));
        println!(
            "{:<10} {}",
            "disk",
            descriptor
                .disk
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        Ok(())
    }
}

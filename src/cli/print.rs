//! Print command implementation.

use super::fields::FieldArgs;
use bemu_manager::{build_command, LauncherSettings};
use clap::Args;

/// Print the VM invocation without starting it.
#[derive(Args, Debug)]
pub struct PrintCmd {
    #[command(flatten)]
    pub fields: FieldArgs,

    /// Output the resolved configuration and arguments as JSON.
    #[arg(long)]
    pub json: bool,
}

impl PrintCmd {
    /// Execute the print command.
    pub fn run(self, settings: &LauncherSettings) -> bemu_manager::Result<()> {
        let config = self.fields.resolve(settings)?;
        let command = build_command(&config);

        if self.json {
            let args: Vec<String> = command
                .args()
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            let output = serde_json::json!({
                "config": config,
                "program": command.program(),
                "args": args,
            });
            println!("{:#}", output);
        } else {
            println!("{}", command);
        }
        Ok(())
    }
}

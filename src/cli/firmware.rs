//! Firmware discovery command.

use bemu_manager::firmware;
use bemu_manager::LauncherSettings;
use clap::Args;

/// List the firmware search directories and the image that would be used.
#[derive(Args, Debug)]
pub struct FirmwareCmd {}

impl FirmwareCmd {
    /// Execute the firmware command.
    pub fn run(&self, settings: &LauncherSettings) -> bemu_manager::Result<()> {
        let found = firmware::find_default(settings);

        println!("Searching for {}:", settings.firmware_name);
        for dir in firmware::search_dirs(settings).into_iter().flatten() {
            let hit = found.as_ref().and_then(|f| f.parent()) == Some(dir.as_path());
            println!("  {} {}", if hit { "*" } else { " " }, dir.display());
        }

        match found {
            Some(path) => println!("Firmware: {}", path.display()),
            None => println!("Firmware: not found (VM will boot with its built-in default)"),
        }
        Ok(())
    }
}

//! Firmware image discovery.

use crate::config::LauncherSettings;
use std::path::{Path, PathBuf};

/// System-wide SeaBIOS directories, searched last.
pub const SYSTEM_FIRMWARE_DIRS: [&str; 2] = ["/usr/share/seabios", "/usr/local/share/seabios"];

/// Ordered firmware search directories for the given settings.
///
/// The caller-configured directory comes first, then the `pc-bios` directory
/// shipped next to the installed executable, the per-user data directory and
/// finally the system-wide locations. Unknown entries are `None`.
pub fn search_dirs(settings: &LauncherSettings) -> Vec<Option<PathBuf>> {
    let mut candidates = vec![settings.firmware_dir.clone(), bundled_dir()];
    candidates.push(dirs::home_dir().map(|home| home.join(".local").join("share").join("seabios")));
    candidates.extend(SYSTEM_FIRMWARE_DIRS.iter().map(|d| Some(PathBuf::from(d))));
    candidates
}

/// Return the first `<dir>/<name>` that is a regular file.
///
/// Unset and empty entries are skipped.
pub fn locate<I, P>(dirs: I, name: &str) -> Option<PathBuf>
where
    I: IntoIterator<Item = Option<P>>,
    P: AsRef<Path>,
{
    for dir in dirs.into_iter().flatten() {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(name);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "found firmware image");
            return Some(candidate);
        }
    }
    None
}

/// Locate the default firmware image for the given settings.
pub fn find_default(settings: &LauncherSettings) -> Option<PathBuf> {
    locate(search_dirs(settings), &settings.firmware_name)
}

/// `<prefix>/pc-bios` for an executable installed as `<prefix>/bin/<exe>`.
fn bundled_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let prefix = exe.parent()?.parent()?;
    Some(prefix.join("pc-bios"))
}

//! Chrome executable discovery.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{HarvestError, Result};

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Locate a Chrome/Chromium binary: explicit path first, then well-known
/// install locations, then `PATH`.
pub fn find_chrome(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(HarvestError::SessionInit(format!(
            "configured Chrome executable does not exist: {}",
            path.display()
        )));
    }

    for path in CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in CHROME_COMMANDS {
        if let Ok(path) = which::which(cmd) {
            info!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(HarvestError::SessionInit(
        "Chrome/Chromium not found. Install it or set CHROME_PATH / BROWSER_URL".to_string(),
    ))
}

//! Canonical application paths.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `<home>/config.json` | Persisted settings |
//! | `<home>/history.json` | Conversion history (newest first) |
//! | `<home>/temp/<session>` | Per-run workspaces |
//! | `~/Documents/enPDF2zhMD_Output` | Default bundle destination |

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Environment variable overriding the application home directory
pub const HOME_ENV: &str = "ENPDF2ZHMD_HOME";

/// Application home directory name under the user's home
pub const APP_DIR_NAME: &str = ".enPDF2zhMD";

/// Default output folder name under the user's documents directory
pub const OUTPUT_DIR_NAME: &str = "enPDF2zhMD_Output";

/// Get the application home directory ($ENPDF2ZHMD_HOME or ~/.enPDF2zhMD)
pub fn app_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }

    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(APP_DIR_NAME))
}

/// Get the config file path (<home>/config.json)
pub fn config_file() -> Result<PathBuf> {
    Ok(app_home()?.join("config.json"))
}

/// Get the history file path (<home>/history.json)
pub fn history_file() -> Result<PathBuf> {
    Ok(app_home()?.join("history.json"))
}

/// Get the process-wide temp root for session workspaces (<home>/temp)
pub fn temp_root() -> Result<PathBuf> {
    Ok(app_home()?.join("temp"))
}

/// Default bundle destination (~/Documents/enPDF2zhMD_Output)
pub fn default_output_root() -> PathBuf {
    dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Documents")))
        .unwrap_or_else(|| PathBuf::from("Documents"))
        .join(OUTPUT_DIR_NAME)
}

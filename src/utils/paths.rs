use anyhow::Context;
use directories::ProjectDirs;
use std::path::PathBuf;

/// Data directory: `SKINVAULT_DATA_DIR` if set, otherwise the platform data dir
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("SKINVAULT_DATA_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let dirs = ProjectDirs::from("net", "skinvault", "skinvault")
        .context("Could not determine a home directory for the data folder")?;
    Ok(dirs.data_dir().to_path_buf())
}

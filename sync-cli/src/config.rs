//! Configuration and data directory handling for the trailsync CLI.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use trailsync_client::ClientConfig;

/// Config file looked up in the data directory when `--config` is absent.
pub const CONFIG_FILE: &str = "trailsync.toml";

/// Key-value state file inside the data directory.
pub const STATE_FILE: &str = "state.json";

/// Load client configuration.
///
/// An explicit path must exist. Without one, `<data_dir>/trailsync.toml` is
/// used if present, otherwise built-in defaults.
pub fn load_client_config(explicit: Option<&Path>, data_dir: &Path) -> Result<ClientConfig> {
    if let Some(path) = explicit {
        return ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    let implicit = data_dir.join(CONFIG_FILE);
    if implicit.exists() {
        return ClientConfig::from_file(&implicit)
            .with_context(|| format!("Failed to load config from {}", implicit.display()));
    }
    Ok(ClientConfig::default())
}

/// Create the data directory, owner-only.
pub async fn prepare_data_dir(data_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    set_dir_permissions_0700(data_dir).await
}

/// Default data directory for the CLI.
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("dev", "trailsync", "trailsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

use crate::config::VaultConfig;

mod handles;
mod map;
mod rotate;

pub use handles::run_handles;
pub use map::{MapCmd, run_map};
pub use rotate::run_rotate_key;

pub(crate) async fn run_command(
    config_file: PathBuf,
    vault_data_dir: &Path,
    cmd: crate::Commands,
) -> Result<()> {
    match cmd {
        crate::Commands::Config { cmd } => {
            cmd.run(config_file, vault_data_dir)?;
            Ok(())
        }
        crate::Commands::Map { cmd } => {
            let config = VaultConfig::load(&config_file)?;
            run_map(cmd, &config, &config_file).await
        }
        crate::Commands::RotateKey => {
            let config = VaultConfig::load(&config_file)?;
            run_rotate_key(&config, &config_file).await
        }
        crate::Commands::Handles { sweep } => {
            let config = VaultConfig::load(&config_file)?;
            run_handles(&config, &config_file, sweep).await
        }
    }
}

/// Every regular file under the vault root, skipping leftover temp files.
fn vault_files(config: &VaultConfig) -> Vec<PathBuf> {
    WalkDir::new(&config.vault.root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with(".tmp"))
        .map(|entry| entry.into_path())
        .collect()
}

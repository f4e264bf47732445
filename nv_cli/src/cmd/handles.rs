use std::path::Path;

use anyhow::Result;

use super::vault_files;
use crate::config::VaultConfig;

/// Opens a handle for every vault file and prints its state.
pub async fn run_handles(config: &VaultConfig, config_file: &Path, sweep: bool) -> Result<()> {
    let registry = config.open_registry(config_file)?;
    for file in vault_files(config) {
        registry.get_handle(&file).await?;
    }

    for handle in registry.handles() {
        let relative = handle
            .path()
            .strip_prefix(&config.vault.root)
            .unwrap_or(handle.path());
        println!(
            "{:>6} {:>10} {:<6} {:>3} refs  {}",
            handle.id().to_string(),
            handle.file_size().await?,
            if handle.is_locked() { "locked" } else { "free" },
            handle.reference_count(),
            relative.display()
        );
    }
    println!("{} handles open", registry.len());

    if sweep {
        let removed = registry.cleanup_unused_interfaces();
        println!("swept {removed} idle handles, {} remain", registry.len());
    }
    Ok(())
}

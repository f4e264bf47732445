use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use nv_files::XChaChaCipher;
use rand::RngCore;
use tracing::{info, warn};

use super::vault_files;
use crate::config::{Encryption, VaultConfig};

/// Re-encrypts every vault file under a freshly generated secret.
///
/// The new secret is staged next to the key file and only moved over it
/// once every file has been rewritten.
pub async fn run_rotate_key(config: &VaultConfig, config_file: &Path) -> Result<()> {
    if config.vault.encryption == Encryption::None {
        bail!("vault is not encrypted; nothing to rotate");
    }
    let registry = config.open_registry(config_file)?;
    let files = vault_files(config);
    for file in &files {
        registry.get_handle(file).await?;
    }

    let mut secret = [0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    let key_path = config.key_path(config_file);
    let staged = key_path.with_extension("secretkey.new");
    std::fs::write(&staged, secret)
        .with_context(|| format!("could not stage new key at {}", staged.display()))?;

    match registry
        .rotate_key(Arc::new(XChaChaCipher::from_secret(&secret)))
        .await
    {
        Ok(count) => {
            std::fs::rename(&staged, &key_path)?;
            info!(files = count, "vault key rotated");
            println!("re-encrypted {count} files");
            Ok(())
        }
        Err(err) => {
            if let Err(cleanup) = std::fs::remove_file(&staged) {
                warn!("could not remove staged key {}: {cleanup}", staged.display());
            }
            Err(err).context("key rotation failed; vault left on the old key")
        }
    }
}

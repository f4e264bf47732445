use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use nv_files::{CipherBackend, FileHandleRegistry, PlaintextCipher, RegistryConfig, XChaChaCipher};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultConfig {
    pub vault: VaultSection,
    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultSection {
    /// Directory holding the vault's note files.
    pub root: PathBuf,
    /// Secret key file, relative to the config file's directory.
    pub key_file: String,
    #[serde(default)]
    pub encryption: Encryption,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Encryption {
    #[default]
    Xchacha20Poly1305,
    None,
}

impl VaultConfig {
    pub fn load(config_file: &Path) -> Result<Self> {
        let toml_content = std::fs::read_to_string(config_file).with_context(|| {
            format!(
                "could not read {}; run `notevault config init` first",
                config_file.display()
            )
        })?;
        toml::from_str(&toml_content).context("could not parse vault config file")
    }

    pub fn key_path(&self, config_file: &Path) -> PathBuf {
        match config_file.parent() {
            Some(dir) => dir.join(&self.vault.key_file),
            None => PathBuf::from(&self.vault.key_file),
        }
    }

    pub fn read_secret(&self, config_file: &Path) -> Result<Vec<u8>> {
        let key_path = self.key_path(config_file);
        let secret = std::fs::read(&key_path)
            .with_context(|| format!("could not read key file {}", key_path.display()))?;
        if secret.is_empty() {
            bail!("key file {} is empty", key_path.display());
        }
        Ok(secret)
    }

    pub fn cipher(&self, config_file: &Path) -> Result<Arc<dyn CipherBackend>> {
        Ok(match self.vault.encryption {
            Encryption::Xchacha20Poly1305 => {
                Arc::new(XChaChaCipher::from_secret(&self.read_secret(config_file)?))
            }
            Encryption::None => Arc::new(PlaintextCipher),
        })
    }

    pub fn open_registry(&self, config_file: &Path) -> Result<FileHandleRegistry> {
        Ok(FileHandleRegistry::new(
            self.cipher(config_file)?,
            self.registry.clone(),
        ))
    }

    /// Maps a vault-relative file name to its path under the vault root.
    pub fn resolve(&self, file: &str) -> Result<PathBuf> {
        let relative = Path::new(file);
        if file.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(anyhow!(
                "Invalid path: '{}'. Must be a relative path without '..'.",
                file
            ));
        }
        Ok(self.vault.root.join(relative))
    }
}

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use clap::Subcommand;
use nv_files::DEFAULT_CLEANUP_DELAY_MS;
use rand::RngCore;
use toml_edit::{DocumentMut, Item, Table, value};
use tracing::info;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the vault config file if it doesn't exist and generates a secret key
    Init,
}

fn table_mut<'a>(doc: &'a mut DocumentMut, name: &str) -> anyhow::Result<&'a mut Table> {
    doc.entry(name)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .ok_or_else(|| anyhow!("`{name}` in config file is not a table"))
}

impl CmdConfig {
    pub fn run(self, config_file: PathBuf, vault_data_dir: &Path) -> anyhow::Result<()> {
        let config_dir = config_file
            .parent()
            .context("config file has no parent directory")?;
        let mut doc = if config_file.exists() {
            fs::read_to_string(&config_file)?
        } else {
            fs::create_dir_all(config_dir)?;
            "".to_owned()
        }
        .parse::<DocumentMut>()
        .context("could not parse vault config file")?;

        match self {
            Self::Init => {
                let secretkey_file = config_file.with_extension("secretkey");
                let key_name = secretkey_file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .context("secret key file name is not valid UTF-8")?
                    .to_owned();
                let root = vault_data_dir
                    .join("vault")
                    .to_str()
                    .context("vault root path is not valid UTF-8")?
                    .to_owned();

                let vault = table_mut(&mut doc, "vault")?;
                if !vault.contains_key("root") {
                    vault.insert("root", value(root));
                }
                vault.insert("key_file", value(key_name));

                let registry = table_mut(&mut doc, "registry")?;
                if !registry.contains_key("cleanup_delay_ms") {
                    registry.insert("cleanup_delay_ms", value(DEFAULT_CLEANUP_DELAY_MS as i64));
                }

                if !secretkey_file.exists() {
                    info!("generating secure random secret key for vault");
                    let mut bytes = [0u8; 32];
                    rand::rng().fill_bytes(&mut bytes);
                    fs::write(secretkey_file, bytes)?;
                }
            }
        }

        info!("writing to config file {config_file:?}");

        let tmp_path = config_file.with_extension("tmp");
        let mut tmp = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(doc.to_string().as_bytes())?;
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, config_file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;

    #[test]
    fn init_writes_loadable_config_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("cfg").join("local.toml");
        CmdConfig::Init
            .run(config_file.clone(), &dir.path().join("data"))
            .unwrap();

        let config = VaultConfig::load(&config_file).unwrap();
        assert_eq!(config.vault.root, dir.path().join("data").join("vault"));
        assert_eq!(config.read_secret(&config_file).unwrap().len(), 32);

        // Re-running keeps the existing key.
        let key = config.read_secret(&config_file).unwrap();
        CmdConfig::Init
            .run(config_file.clone(), &dir.path().join("data"))
            .unwrap();
        assert_eq!(config.read_secret(&config_file).unwrap(), key);
    }
}

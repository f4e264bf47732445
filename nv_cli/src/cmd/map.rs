use std::path::Path;

use anyhow::Result;
use clap::{ArgAction, Subcommand};
use nv_core::{ByteDecoding, Note, NotePair};

use crate::config::VaultConfig;

#[derive(Subcommand)]
pub enum MapCmd {
    /// Append a key/value pair to a map file
    Put {
        /// Map file, relative to the vault root
        file: String,
        key: String,
        value: String,
        /// Text form of VALUE (utf8, base16, base32, base64, base64url)
        #[arg(short, long, default_value = "utf8")]
        encoding: ByteDecoding,
        /// Remove every existing pair with KEY first
        #[arg(long, action = ArgAction::SetTrue)]
        replace: bool,
    },
    /// Print the value of the first pair with KEY
    Get {
        file: String,
        key: String,
        /// Print the values of all pairs with KEY
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,
        #[arg(short, long, default_value = "utf8")]
        encoding: ByteDecoding,
    },
    /// Remove every pair with KEY
    Rm { file: String, key: String },
    /// List all pairs in file order
    Ls {
        file: String,
        #[arg(short, long, default_value = "utf8")]
        encoding: ByteDecoding,
    },
}

fn render(note: &Note, encoding: ByteDecoding) -> String {
    note.with_tag(encoding)
        .as_string()
        .unwrap_or_else(|_| format!("<{} bytes>", note.len()))
}

pub async fn run_map(cmd: MapCmd, config: &VaultConfig, config_file: &Path) -> Result<()> {
    let registry = config.open_registry(config_file)?;
    match cmd {
        MapCmd::Put {
            file,
            key,
            value,
            encoding,
            replace,
        } => {
            let value = Note::from_text(&value, encoding)?;
            let key = Note::text(&key);
            let guard = registry.lock(config.resolve(&file)?).await?;
            let size = guard
                .handle()
                .update_map(&guard, |map| {
                    if replace {
                        map.remove(&key)?;
                    }
                    map.add(NotePair::new(key.clone(), value))?;
                    map.size()
                })
                .await?;
            println!("{file}: {size} entries");
        }
        MapCmd::Get {
            file,
            key,
            all,
            encoding,
        } => {
            let guard = registry.lock(config.resolve(&file)?).await?;
            let map = guard.handle().read_map(&guard).await?;
            let key = Note::text(&key);
            if all {
                for pair in map.iter() {
                    let pair = pair?;
                    if pair.key() == &key {
                        println!("{}", render(pair.value(), encoding));
                    }
                }
            } else if let Some(value) = map.get_value(&key)? {
                println!("{}", render(&value, encoding));
            } else {
                anyhow::bail!("key not found in {file}");
            }
        }
        MapCmd::Rm { file, key } => {
            let key = Note::text(&key);
            let guard = registry.lock(config.resolve(&file)?).await?;
            let removed = guard
                .handle()
                .update_map(&guard, |map| map.remove(&key))
                .await?;
            println!("removed {} entries", removed.len());
        }
        MapCmd::Ls { file, encoding } => {
            let guard = registry.lock(config.resolve(&file)?).await?;
            let map = guard.handle().read_map(&guard).await?;
            for pair in map.to_sequence()? {
                println!(
                    "{} = {}",
                    render(pair.key(), ByteDecoding::Utf8),
                    render(pair.value(), encoding)
                );
            }
        }
    }
    Ok(())
}

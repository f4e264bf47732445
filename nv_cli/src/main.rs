use crate::cmd::MapCmd;
use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;

mod cmd;
mod config;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// which vault this command should run on
    #[arg(long, value_name = "NAME", default_value = "local")]
    vault: String,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the vault's config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Read and edit map files inside the vault
    Map {
        #[command(subcommand)]
        cmd: MapCmd,
    },
    /// Generate a new secret and re-encrypt every vault file with it
    RotateKey,
    /// Open a handle for every vault file and print its state
    Handles {
        /// Evict idle handles afterwards
        #[arg(long, action = ArgAction::SetTrue)]
        sweep: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // Configs under ~/.config/notevault/<vault>.toml, data under
    // ~/.local/share/notevault/<vault>/
    let dirs = ProjectDirs::from("", "", "notevault")
        .context("failed to determine config directory path")?;

    let config_file = dirs.config_dir().join(&cli.vault).with_extension("toml");
    let vault_data_dir = dirs.data_dir().join(&cli.vault);

    cmd::run_command(config_file, &vault_data_dir, cli.cmd).await
}

//! `trellis-token`: reads and writes plugin tokens in the persisted store.
//!
//! Plugins are addressed by source URL, the same way the registry lists
//! them, so operators never handle derived ids directly.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use ortho_config::OrthoConfig;
use thiserror::Error;
use trellis_config::{Config, DataLayout};
use trellis_plugins::{
    ExecutionError, ExecutionManager, ExecutionStore, JsonFileStore, PluginId, ServiceProviders,
    StoreError,
};

/// Command-line interface for the token helper.
#[derive(Parser, Debug)]
#[command(name = "trellis-token", disable_help_subcommand = true)]
struct Cli {
    /// Data directory holding the plugin store; defaults to the configured one.
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: TokenCommand,
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Prints the stored token for the plugin at SOURCE_URL.
    Get {
        /// Repository URL the plugin is installed from.
        source_url: String,
    },
    /// Stores TOKEN for the plugin at SOURCE_URL.
    Set {
        /// Repository URL the plugin is installed from.
        source_url: String,
        /// Secret token handed to the plugin at launch.
        token: String,
    },
}

#[derive(Debug, Error)]
enum TokenError {
    #[error(transparent)]
    Usage(#[from] clap::Error),
    #[error("failed to load configuration: {0}")]
    Configuration(String),
    #[error("no token stored for {source_url}")]
    Missing { source_url: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Runs the helper with `args`, writing results to `stdout` and failures to
/// `stderr`.
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    match execute(args, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(TokenError::Usage(error)) if !error.use_stderr() => {
            drop(write!(stdout, "{}", error.render()));
            ExitCode::SUCCESS
        }
        Err(TokenError::Usage(error)) => {
            drop(write!(stderr, "{}", error.render()));
            ExitCode::from(2)
        }
        Err(error) => {
            drop(writeln!(stderr, "trellis-token: {error}"));
            ExitCode::FAILURE
        }
    }
}

fn execute<I, W>(args: I, stdout: &mut W) -> Result<(), TokenError>
where
    I: IntoIterator<Item = OsString>,
    W: Write,
{
    let cli = Cli::try_parse_from(args)?;
    let store = JsonFileStore::new(store_path(cli.data_dir)?);
    match cli.command {
        TokenCommand::Get { source_url } => {
            let record = store.load(&PluginId::from_source(&source_url))?;
            let Some(token) = record
                .filter(|record| record.has_token())
                .map(|record| record.app_secret_token)
            else {
                return Err(TokenError::Missing { source_url });
            };
            drop(writeln!(stdout, "{token}"));
        }
        TokenCommand::Set { source_url, token } => {
            let execution = ExecutionManager::new(Arc::new(store), ServiceProviders::new());
            execution.update_token(&PluginId::from_source(&source_url), &token)?;
        }
    }
    Ok(())
}

/// Resolves the store file from `--data-dir`, falling back to the
/// environment and configuration file layers.
fn store_path(data_dir: Option<PathBuf>) -> Result<PathBuf, TokenError> {
    let root = match data_dir {
        Some(dir) => Utf8PathBuf::from_path_buf(dir).map_err(|dir| {
            TokenError::Configuration(format!("data directory {} is not UTF-8", dir.display()))
        })?,
        None => {
            Config::load_from_iter([OsString::from("trellis-token")])
                .map_err(|error| TokenError::Configuration(error.to_string()))?
                .data_dir
        }
    };
    Ok(DataLayout::new(root).store_path().into_std_path_buf())
}

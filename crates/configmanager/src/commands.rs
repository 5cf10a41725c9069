//! Subcommand execution

use crate::cli::{Cli, Commands};
use crate::error::{ConfigManagerError, Result};
use crate::export;
use crate::manager::ConfigManager;
use crate::output::Destination;
use crate::stores::default_registry;
use configmanager_secrets::{Resolver, StoreRegistry};
use std::path::Path;
use tracing::Instrument;

/// Run `cli` against the built-in stores.
///
/// Ctrl-C cancels every in-flight fetch; an interrupted command writes
/// nothing and fails with [`ConfigManagerError::Interrupted`].
///
/// # Errors
///
/// Returns the first error of the command.
pub async fn run(cli: Cli) -> Result<()> {
    run_with_registry(cli, default_registry()).await
}

/// [`run`] against a caller-supplied registry
///
/// # Errors
///
/// Returns the first error of the command.
pub async fn run_with_registry(cli: Cli, registry: StoreRegistry) -> Result<()> {
    let span = crate::tracing::command_span(cli.command.name());
    let resolver = Resolver::builder(registry)
        .config(cli.config())
        .span(span.clone())
        .build()?;
    let manager = ConfigManager::from(resolver);

    let cancel = manager.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling in-flight fetches");
            cancel.cancel();
        }
    });

    let result = execute(&manager, &cli.command).instrument(span).await;
    watcher.abort();
    result
}

/// Execute one subcommand with `manager`.
///
/// # Errors
///
/// Returns resolution, read and write errors.
pub async fn execute(manager: &ConfigManager, command: &Commands) -> Result<()> {
    match command {
        Commands::Retrieve { tokens, path } => {
            retrieve(manager, tokens, &Destination::parse(path)).await
        }
        Commands::StringInput { input, path } => {
            string_input(manager, input, &Destination::parse(path)).await
        }
        Commands::FromFileInput { input, path } => {
            from_file_input(manager, input, &Destination::parse(path)).await
        }
    }
}

/// Resolve `tokens` and write them as `export` lines.
///
/// # Errors
///
/// Returns an error if nothing resolved or the output cannot be written.
pub async fn retrieve(manager: &ConfigManager, tokens: &[String], dest: &Destination) -> Result<()> {
    let resolved = manager.retrieve(tokens).await?;
    ensure_not_interrupted(manager)?;
    tracing::info!(
        resolved = resolved.len(),
        failed = resolved.failures().len(),
        "tokens retrieved"
    );
    dest.write(&export::render(&resolved, manager.resolver().config()))
}

/// Replace tokens in `input` and write the result.
///
/// When `input` names an existing file the file's contents are used instead,
/// exactly as [`from_file_input`] does, so `--path` may point back at it.
///
/// # Errors
///
/// Returns an error if tokens were found and none resolved, or the output
/// cannot be written.
pub async fn string_input(manager: &ConfigManager, input: &str, dest: &Destination) -> Result<()> {
    let candidate = Path::new(input);
    if tokio::fs::metadata(candidate)
        .await
        .is_ok_and(|metadata| metadata.is_file())
    {
        tracing::debug!(path = %candidate.display(), "string input names a file");
        return from_file_input(manager, candidate, dest).await;
    }

    let replaced = manager.retrieve_replaced(input).await?;
    ensure_not_interrupted(manager)?;
    dest.write(&replaced)
}

/// Replace tokens in the file at `input` and write the result, rewriting
/// the file atomically when `dest` is the file itself.
///
/// # Errors
///
/// Returns an error if the input cannot be read or is not UTF-8, if tokens
/// were found and none resolved, or if the output cannot be written.
pub async fn from_file_input(manager: &ConfigManager, input: &Path, dest: &Destination) -> Result<()> {
    let bytes = tokio::fs::read(input)
        .await
        .map_err(|e| ConfigManagerError::io("read", input, e))?;
    let text = std::str::from_utf8(&bytes)?;
    let replaced = manager.retrieve_replaced(text).await?;
    ensure_not_interrupted(manager)?;
    dest.write_derived(input, &replaced)
}

fn ensure_not_interrupted(manager: &ConfigManager) -> Result<()> {
    if manager.cancellation_token().is_cancelled() {
        return Err(ConfigManagerError::Interrupted);
    }
    Ok(())
}

use crate::error::ConfigManagerError;
use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use configmanager_secrets::{Config, DEFAULT_KEY_SEPARATOR, DEFAULT_TOKEN_SEPARATOR, STDOUT_PATH};
use miette::Report;
use std::io::Write;
use std::path::PathBuf;

/// Exit code on success
pub const EXIT_OK: i32 = 0;
/// Exit code for any failure, including usage errors
pub const EXIT_ERROR: i32 = 1;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "configmanager")]
#[command(about = "Resolve configuration and secret tokens from cloud secret stores")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Separator between a token's prefix and its store path.
    #[arg(
        long,
        global = true,
        env = "CONFIGMANAGER_TOKEN_SEPARATOR",
        default_value = DEFAULT_TOKEN_SEPARATOR
    )]
    pub token_separator: String,

    /// Separator between a token's store path and its key path.
    #[arg(
        long,
        global = true,
        env = "CONFIGMANAGER_KEY_SEPARATOR",
        default_value = DEFAULT_KEY_SEPARATOR
    )]
    pub key_separator: String,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        env = "CONFIGMANAGER_LOG_LEVEL",
        default_value = "warn",
        value_enum
    )]
    pub log_level: LogLevel,

    /// Log output format.
    #[arg(
        long,
        global = true,
        env = "CONFIGMANAGER_LOG_FORMAT",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Resolve tokens and write them as shell export lines.
    #[command(about = "Resolve tokens and write them as shell export lines")]
    Retrieve {
        /// Token to resolve; repeat for several.
        #[arg(short = 't', long = "token", required = true)]
        tokens: Vec<String>,
        /// `stdout` or a file path.
        #[arg(short = 'p', long, default_value = STDOUT_PATH)]
        path: String,
    },

    /// Replace tokens inside a string, or inside the file it names.
    #[command(about = "Replace tokens inside a string, or inside the file it names")]
    StringInput {
        /// Text containing tokens, or the path of a UTF-8 file.
        #[arg(short = 'i', long)]
        input: String,
        /// `stdout` or a file path; may be the input file itself.
        #[arg(short = 'p', long, default_value = STDOUT_PATH)]
        path: String,
    },

    /// Replace tokens inside a file.
    #[command(about = "Replace tokens inside a file")]
    FromFileInput {
        /// UTF-8 file containing tokens.
        #[arg(short = 'i', long)]
        input: PathBuf,
        /// `stdout` or a file path; may be the input file itself.
        #[arg(short = 'p', long, default_value = STDOUT_PATH)]
        path: String,
    },
}

impl Commands {
    /// Subcommand name, as typed
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Retrieve { .. } => "retrieve",
            Self::StringInput { .. } => "string-input",
            Self::FromFileInput { .. } => "from-file-input",
        }
    }

    /// The `--path` value
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Retrieve { path, .. }
            | Self::StringInput { path, .. }
            | Self::FromFileInput { path, .. } => path,
        }
    }
}

impl Cli {
    /// Engine configuration from the global flags
    #[must_use]
    pub fn config(&self) -> Config {
        Config::default()
            .with_token_separator(self.token_separator.clone())
            .with_key_separator(self.key_separator.clone())
            .with_output_path(self.command.path())
    }
}

/// Parse arguments, exiting with [`EXIT_ERROR`] on usage errors and
/// [`EXIT_OK`] after `--help` or `--version`.
#[must_use]
pub fn parse() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_ERROR } else { EXIT_OK };
            let _ = err.print();
            std::process::exit(code);
        }
    }
}

/// Print `err` to stderr as a miette report
pub fn render_error(err: ConfigManagerError) {
    let report = Report::new(err);
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{report:?}");
    let _ = stderr.flush();
}

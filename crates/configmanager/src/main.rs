//! configmanager CLI
//!
//! Exit code 0 on success, 1 on any error including usage errors.

// CLI binary needs to write to stderr when tracing is unavailable
#![allow(clippy::print_stderr)]

use configmanager::cli::{self, EXIT_ERROR, EXIT_OK};
use configmanager::commands;
use configmanager::tracing::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() {
    // NOTE: tracing may be unusable during a panic, so use eprintln!
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        ..Default::default()
    };
    if let Err(error) = init_tracing(tracing_config) {
        eprintln!("{error:?}");
        std::process::exit(EXIT_ERROR);
    }

    let code = match commands::run(cli).await {
        Ok(()) => EXIT_OK,
        Err(error) => {
            cli::render_error(error);
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

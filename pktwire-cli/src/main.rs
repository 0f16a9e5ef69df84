//! `pktwire` command-line entry point

use std::io;
use std::process::ExitCode;

use pktwire_cli::{run, Cli};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.log_level());

    let stdout = io::stdout();
    match run(&cli.command, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Command failed");
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr; `RUST_LOG` takes precedence over the -v level
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

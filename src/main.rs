use clap::Parser;
use tracing_subscriber::EnvFilter;

use dbshift::cli::Cli;
use dbshift::driver;

fn main() {
    let config = Cli::parse().into_config();

    let default_level = if config.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    if let Err(err) = driver::run(&config) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

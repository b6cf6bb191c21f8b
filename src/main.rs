//! `cdr-relay` command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use cdr_relay::logging::{self, LoggingConfig};
use cdr_relay::{Daemon, Settings, SettingsError, ShutdownSignal, SourceRegistry};

/// Relay call-detail records from a phone switch to the collection API.
#[derive(Debug, Parser)]
#[command(name = "cdr-relay", version, about)]
struct Cli {
    /// INI settings file.
    #[arg(short, long, env = "CDR_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Text encoding of the settings file (WHATWG label).
    #[arg(long, value_name = "LABEL")]
    config_encoding: Option<String>,

    /// Call source to run; overrides the settings file.
    #[arg(short, long)]
    plugin: Option<String>,

    /// Base URL of the collection API; overrides the settings file.
    #[arg(short, long)]
    domain: Option<String>,

    /// Log filter such as `debug` or `warn,cdr_relay=trace`. Defaults to
    /// `RUST_LOG`, then `info`.
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,

    /// Print the available call sources and exit.
    #[arg(long)]
    list_plugins: bool,
}

fn load_settings(cli: &Cli, registry: &SourceRegistry) -> Result<Settings, SettingsError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path, cli.config_encoding.as_deref())?,
        None => Settings::default(),
    };
    settings.apply_env(std::env::vars())?;
    if let Some(plugin) = &cli.plugin {
        settings.plugin = plugin.clone();
    }
    if let Some(domain) = &cli.domain {
        settings.domain = domain.clone();
    }
    settings.validate(registry)?;
    Ok(settings)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        filter: cli.log_level.clone(),
        ..LoggingConfig::default()
    };
    if let Err(err) = logging::init(&logging) {
        eprintln!("cdr-relay: {err}");
        return ExitCode::FAILURE;
    }

    let registry = SourceRegistry::with_builtin();
    if cli.list_plugins {
        for name in registry.names() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    let settings = match load_settings(&cli, &registry) {
        Ok(settings) => settings,
        Err(err) => {
            error!("cdr-relay: {err}");
            return ExitCode::from(2);
        }
    };

    let shutdown = ShutdownSignal::new();
    let on_signal = shutdown.clone();
    if let Err(err) = ctrlc::set_handler(move || on_signal.trigger()) {
        error!("cdr-relay: failed to install signal handler: {err}");
        return ExitCode::FAILURE;
    }

    info!(
        "cdr-relay {} starting with plugin {:?}",
        env!("CARGO_PKG_VERSION"),
        settings.plugin
    );
    match Daemon::new(settings, registry).run(&shutdown) {
        Ok(()) => {
            info!("cdr-relay stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("cdr-relay: {err}");
            if err.is_revoked() {
                ExitCode::from(3)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

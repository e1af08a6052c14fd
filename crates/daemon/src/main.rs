//! NavFiles Daemon
//!
//! Serves the NavFiles file-management API over HTTP.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::files::RootRegistry;
use tracing_subscriber::EnvFilter;

/// NavFiles Daemon - multi-root file manager served over HTTP.
#[derive(Parser, Debug)]
#[command(name = "navfiles-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server
    Serve,

    /// Validate the configuration and print the configured roots
    Check,

    /// Write a starter configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Serve => {
            let config = load_config(&config_path, cli.verbose)?;
            daemon::server::serve(&config, wait_for_shutdown_signal()).await
        }
        Commands::Check => {
            let config = load_config(&config_path, cli.verbose)?;
            check_config(&config)
        }
        Commands::Init { force } => {
            init_tracing("info", cli.verbose);
            init_config(&config_path, force)
        }
    }
}

/// Load, override and validate the configuration, then start logging.
fn load_config(path: &Path, verbose: bool) -> anyhow::Result<Config> {
    let mut config = Config::load(path)?;
    let overrides = config.apply_env_overrides();
    config.validate()?;

    init_tracing(&config.daemon.log_level, verbose);
    tracing::info!("Using config file: {:?}", path);
    for (var, value) in overrides {
        tracing::info!("Overriding from environment: {}={}", var, value);
    }
    Ok(config)
}

/// Initialize tracing. `RUST_LOG` wins over the configured level; `--verbose`
/// forces debug.
fn init_tracing(level: &str, verbose: bool) {
    let default_level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    Config::starter().save(path)?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}

fn check_config(config: &Config) -> anyhow::Result<()> {
    let registry = RootRegistry::load(&config.roots)?;

    println!("Configuration OK");
    println!("  Listen:     {}", config.bind_addr()?);
    println!("  Mount path: {}", config.server.mount_path);
    println!(
        "  Archiver:   {}{}",
        config.archive.program,
        if config.archiver_available() {
            ""
        } else {
            " (not found on PATH)"
        }
    );

    if registry.is_empty() {
        println!("  Roots:      none (file routes disabled)");
    } else {
        println!("  Roots:");
        for root in registry.roots() {
            println!(
                "    {:<12} {:<20} {}",
                root.id,
                root.label,
                root.absolute_path.display()
            );
        }
    }

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or Ctrl-C).
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from(["navfiles-daemon", "serve"]).unwrap();
        assert_eq!(cli.command, Commands::Serve);
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags() {
        let cli =
            Cli::try_parse_from(["navfiles-daemon", "check", "-v", "-c", "/tmp/nav.toml"]).unwrap();
        assert_eq!(cli.command, Commands::Check);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/nav.toml")));
    }

    #[test]
    fn test_init_force() {
        let cli = Cli::try_parse_from(["navfiles-daemon", "init", "--force"]).unwrap();
        assert_eq!(cli.command, Commands::Init { force: true });

        let cli = Cli::try_parse_from(["navfiles-daemon", "init"]).unwrap();
        assert_eq!(cli.command, Commands::Init { force: false });
    }

    #[test]
    fn test_command_required() {
        assert!(Cli::try_parse_from(["navfiles-daemon"]).is_err());
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        init_config(&path, false).unwrap();
        assert!(Config::load(&path).unwrap().roots.len() == 1);

        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
    }
}

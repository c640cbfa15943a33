pub mod ask;
pub mod config;

use clap::{Parser, Subcommand};

/// ThreadRelay: a conversation relay in front of a thread + run assistants service.
#[derive(Debug, Parser)]
#[command(name = "threadrelay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Send a single message, wait for the reply and print it.
    Ask {
        /// The message to send.
        message: String,
        /// User the turn is recorded under.
        #[arg(long, default_value = "cli")]
        user: String,
        /// Persona to talk to (mentor or companion).
        #[arg(long, default_value = "mentor")]
        personality: String,
        /// Continue an existing upstream thread.
        #[arg(long)]
        thread: Option<String>,
    },
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `TR_CONFIG` (or
/// `config.toml` by default). A missing file yields the defaults.
/// Returns the parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(tr_domain::config::Config, String)> {
    let config_path =
        std::env::var("TR_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        tr_domain::config::Config::default()
    };

    Ok((config, config_path))
}

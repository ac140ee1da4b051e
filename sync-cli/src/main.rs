//! # trailsync
//!
//! Command-line driver for the trailsync preference sync engine.
//!
//! ## Commands
//!
//! - `device` / `devices`: this installation and the user's devices
//! - `login` / `logout`: session handling, including anonymous migration
//! - `anonymous`: remember an anonymous session for the next login
//! - `pull` / `sync`: fetch preferences
//! - `set-theme`, `set-general`, `set-map`, `set-nav`: write preferences
//! - `watch`: follow realtime updates
//! - `status`: local state
//!
//! ## Example
//!
//! ```bash
//! # Try everything against an in-process server
//! trailsync --mock login demo-token
//! trailsync --mock set-theme dark
//! trailsync --mock watch --seconds 5
//!
//! # Real backend, configured in trailsync.toml
//! trailsync login "$TOKEN"
//! trailsync sync
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trailsync_types::{DistanceUnit, Theme};

mod commands;
mod config;
mod engine;

use commands::{device, preferences, session, status, watch};
use engine::Engine;

/// Cross-device preference sync.
#[derive(Parser, Debug)]
#[command(name = "trailsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to trailsync.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for device identity, session and cached preferences
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Talk to an in-process mock server instead of the configured backend
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show this device's identity and metadata
    Device,

    /// List devices registered for the signed-in user
    Devices,

    /// Log in with a bearer token
    Login {
        /// Bearer token from the auth flow
        token: String,
    },

    /// Log out and drop cached preferences
    Logout,

    /// Remember an anonymous session to migrate at the next login
    Anonymous {
        /// Anonymous session id
        id: String,

        /// Chat to reopen after login
        #[arg(long)]
        chat: Option<String>,
    },

    /// Fetch all preferences and register this device
    Pull {
        /// Print the raw document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch preferences only if the server has newer ones
    Sync,

    /// Set the colour theme
    SetTheme {
        /// light, dark or system
        #[arg(value_parser = parse_theme)]
        theme: Theme,
    },

    /// Set language and/or distance unit
    SetGeneral {
        /// Language tag, e.g. en-US
        #[arg(long)]
        language: Option<String>,

        /// km or mi
        #[arg(long, value_parser = parse_unit)]
        unit: Option<DistanceUnit>,
    },

    /// Save the map view
    SetMap {
        /// Latitude of the centre
        #[arg(allow_hyphen_values = true)]
        lat: f64,

        /// Longitude of the centre
        #[arg(allow_hyphen_values = true)]
        lng: f64,

        /// Zoom level
        zoom: f64,

        /// Map style
        #[arg(long, default_value = "terrain")]
        style: String,
    },

    /// Save navigation state
    SetNav {
        /// Last visited path
        #[arg(long)]
        path: Option<String>,

        /// Active tab
        #[arg(long)]
        tab: Option<String>,

        /// Recent search (repeatable)
        #[arg(long = "search")]
        searches: Vec<String>,
    },

    /// Follow realtime preference updates
    Watch {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Show local sync state
    Status,
}

fn parse_theme(value: &str) -> Result<Theme, String> {
    Theme::parse(value).ok_or_else(|| format!("unknown theme '{}'", value))
}

fn parse_unit(value: &str) -> Result<DistanceUnit, String> {
    DistanceUnit::parse(value).ok_or_else(|| format!("unknown distance unit '{}'", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => config::default_data_dir()?,
    };
    config::prepare_data_dir(&data_dir).await?;
    let client_config = config::load_client_config(cli.config.as_deref(), &data_dir)?;
    let engine = Engine::open(&data_dir, client_config, cli.mock)?;

    match cli.command {
        Commands::Device => device::show(&engine)?,
        Commands::Devices => device::list(&engine).await?,
        Commands::Login { token } => session::login(&engine, &token).await?,
        Commands::Logout => session::logout(&engine)?,
        Commands::Anonymous { id, chat } => {
            session::remember_anonymous(&engine, &id, chat.as_deref())?
        }
        Commands::Pull { json } => preferences::pull(&engine, json).await?,
        Commands::Sync => preferences::sync(&engine).await?,
        Commands::SetTheme { theme } => preferences::set_theme(&engine, theme).await?,
        Commands::SetGeneral { language, unit } => {
            preferences::set_general(&engine, language, unit).await?
        }
        Commands::SetMap {
            lat,
            lng,
            zoom,
            style,
        } => preferences::set_map(&engine, lat, lng, zoom, style).await?,
        Commands::SetNav {
            path,
            tab,
            searches,
        } => preferences::set_navigation(&engine, path, tab, searches).await?,
        Commands::Watch { seconds } => watch::run(&engine, seconds).await?,
        Commands::Status => status::run(&engine)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_negative_coordinates() {
        let cli = Cli::try_parse_from(["trailsync", "set-map", "37.7", "-119.5", "10"]).unwrap();
        match cli.command {
            Commands::SetMap { lat, lng, style, .. } => {
                assert_eq!(lat, 37.7);
                assert_eq!(lng, -119.5);
                assert_eq!(style, "terrain");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_theme() {
        assert!(Cli::try_parse_from(["trailsync", "set-theme", "purple"]).is_err());
        assert!(Cli::try_parse_from(["trailsync", "--mock", "set-theme", "DARK"]).is_ok());
    }
}

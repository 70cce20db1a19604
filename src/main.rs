//! Athlete Motion Agent CLI
//!
//! Serves recording clients and inspects stored sessions.

use athlete_motion_agent::{
    config::Config,
    persistence::{JsonFileStore, SessionStore},
    stats::PersistedStats,
    VERSION,
};
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "motion-agent")]
#[command(version = VERSION)]
#[command(about = "Real-time jump detection for athlete motion sensors", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept recording clients over WebSocket
    Serve {
        /// Port to listen on
        #[arg(long, short)]
        port: Option<u16>,

        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        /// Directory for stored sessions and statistics
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Directory holding classifier artifacts
        #[arg(long)]
        classifier_dir: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },

    /// List stored sessions of one or more athletes
    Sessions {
        /// Athlete id (repeatable)
        #[arg(long = "athlete", required = true)]
        athletes: Vec<Uuid>,

        /// Print full session records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show cumulative ingestion statistics
    Stats,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    match cli.command {
        Commands::Serve {
            port,
            host,
            data_dir,
            classifier_dir,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(dir) = data_dir {
                config.data_path = dir;
            }
            if let Some(dir) = classifier_dir {
                config.classifier_path = dir;
            }
            cmd_serve(config, host);
        }
        Commands::Config { save } => cmd_config(&config, cli.config.as_ref(), save),
        Commands::Sessions { athletes, json } => cmd_sessions(&config, &athletes, json),
        Commands::Stats => cmd_stats(&config),
    }
}

fn load_config(path: Option<&PathBuf>) -> Config {
    let loaded = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Could not load configuration: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "server")]
fn cmd_serve(config: Config, host: IpAddr) {
    use athlete_motion_agent::server::{run, ServerConfig};

    if let Err(e) = config.analysis.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    println!("Athlete Motion Agent v{VERSION}");
    println!();
    println!("  Sessions: {:?}", config.sessions_path());
    println!("  Classifiers: {:?}", config.classifier_path);
    println!(
        "  Event detection: window {} every {} readings",
        config.analysis.bool_window_size, config.analysis.bool_interval
    );
    println!(
        "  Type stage: window {}, chunks of {} ({:?})",
        config.analysis.type_window_size,
        config.analysis.type_interval,
        config.analysis.aggregation
    );
    println!();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: Could not start runtime: {e}");
            std::process::exit(1);
        }
    };

    let result: anyhow::Result<()> = runtime.block_on(async move {
        let (addr, shutdown_tx, server) = run(ServerConfig::new(config).with_host(host)).await?;
        println!("Listening on ws://{addr}/ws");
        println!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;
        println!();
        println!("Stopping...");
        let _ = shutdown_tx.send(());
        server.await?;
        Ok(())
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "server"))]
fn cmd_serve(_config: Config, _host: IpAddr) {
    eprintln!("Error: this build does not include the server feature");
    std::process::exit(1);
}

fn cmd_config(config: &Config, path: Option<&PathBuf>, save: bool) {
    let config_path = path.cloned().unwrap_or_else(Config::config_path);

    if save {
        if let Err(e) = config.save_to(&config_path) {
            eprintln!("Error: Could not save configuration: {e}");
            std::process::exit(1);
        }
        println!("Configuration saved to {config_path:?}");
        return;
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {config_path:?}");
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_sessions(config: &Config, athletes: &[Uuid], json: bool) {
    let store = match JsonFileStore::open(config.sessions_path()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    for athlete in athletes {
        let sessions = match store.find_sessions_by_athlete(*athlete) {
            Ok(sessions) => sessions,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        };

        if json {
            println!(
                "{}",
                serde_json::to_string_pretty(&sessions).unwrap_or_else(|_| "[]".to_string())
            );
            continue;
        }

        println!("Athlete {athlete}: {} session(s)", sessions.len());
        for session in &sessions {
            let end = session
                .end
                .map(|end| end.to_string())
                .unwrap_or_else(|| "open".to_string());
            println!(
                "  {}  {:?}  {} -> {}  placements: {}  readings: {}  events: {}",
                session.id,
                session.sport,
                session.start,
                end,
                session.placements.len(),
                session.reading_count(),
                session.events.len()
            );
            for event in &session.events {
                println!(
                    "      {}  {}  {} -> {}  ({})",
                    event.id,
                    event.event_type,
                    event.start,
                    event.end,
                    event.provenance.event_detector
                );
            }
        }
    }
}

fn cmd_stats(config: &Config) {
    let stats_path = config.stats_path();
    if !stats_path.exists() {
        println!("No statistics recorded yet.");
        return;
    }

    let stats = std::fs::read_to_string(&stats_path)
        .map_err(|e| e.to_string())
        .and_then(|content| {
            serde_json::from_str::<PersistedStats>(&content).map_err(|e| e.to_string())
        });

    match stats {
        Ok(stats) => {
            println!("Cumulative Statistics");
            println!("=====================");
            println!("  Readings accepted: {}", stats.readings_accepted);
            println!("  Duplicate readings ignored: {}", stats.readings_duplicate);
            println!("  Readings dropped: {}", stats.readings_dropped);
            println!("  Detection windows evaluated: {}", stats.detection_windows);
            println!("  Events recorded in session: {}", stats.events_in_session);
            println!(
                "  Events persisted after session close: {}",
                stats.events_standalone
            );
            println!("  Events lost: {}", stats.events_lost);
            println!("  Last updated: {}", stats.last_updated);
        }
        Err(e) => {
            eprintln!("Error: Could not read {stats_path:?}: {e}");
            std::process::exit(1);
        }
    }
}

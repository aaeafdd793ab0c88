//! Station process entrypoint: loads configuration, opens the durable
//! store, builds the [`Station`], and starts the background dispatch
//! loop, heartbeat monitor, and HTTP server. Structured the way the
//! teacher's `fluxion-main` wires its own resources into one process —
//! manual `--help`/`--version` handling, `tracing_subscriber` with
//! `RUST_LOG` support, a startup summary log — minus the Bevy ECS
//! scheduler this station has no use for.

mod dispatch_loop;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ev_core::clock::SystemClock;
use ev_core::config::StationConfig;
use ev_core::station::Station;
use ev_store::{AlertConfig, EmailNotifier, HeartbeatTracker, SqliteStore};
use tracing::{error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

struct Args {
    config_path: PathBuf,
    db_path: PathBuf,
    alerts_path: PathBuf,
    port: u16,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("station_config.toml"),
            db_path: PathBuf::from("station.db"),
            alerts_path: PathBuf::from("alerts.toml"),
            port: 8080,
        }
    }
}

/// The config path is the first positional argument (default
/// `station_config.toml`, per the Configuration Layer); everything else
/// is a named flag.
fn parse_args() -> Option<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    let mut config_path_set = false;
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("ev-station - EV charging station dispatch engine");
                println!("Version: {VERSION}");
                println!();
                println!("Usage: ev-station [CONFIG_PATH] [OPTIONS]");
                println!();
                println!("Arguments:");
                println!("  [CONFIG_PATH]     Station config TOML (default: station_config.toml)");
                println!();
                println!("Options:");
                println!("  --db <PATH>       Sqlite database path (default: station.db)");
                println!("  --alerts <PATH>   Admin alert SMTP config (default: alerts.toml)");
                println!("  --port <PORT>     HTTP listen port (default: 8080)");
                println!("  -h, --help        Print this help message");
                println!("  -v, --version     Print version");
                return None;
            }
            "--version" | "-v" => {
                println!("{VERSION}");
                return None;
            }
            "--db" => args.db_path = PathBuf::from(iter.next().unwrap_or_default()),
            "--alerts" => args.alerts_path = PathBuf::from(iter.next().unwrap_or_default()),
            "--port" => {
                if let Some(p) = iter.next().and_then(|s| s.parse().ok()) {
                    args.port = p;
                }
            }
            positional if !config_path_set => {
                args.config_path = PathBuf::from(positional);
                config_path_set = true;
            }
            _ => {}
        }
    }
    Some(args)
}

fn load_alert_config(path: &PathBuf) -> AlertConfig {
    let base = std::fs::read_to_string(path)
        .ok()
        .and_then(|text| toml::from_str::<AlertConfig>(&text).ok())
        .unwrap_or_default();
    base.with_env_overrides()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let Some(args) = parse_args() else {
        return Ok(());
    };

    let config = StationConfig::load_from_file(&args.config_path)
        .with_context(|| format!("loading station configuration from {}", args.config_path.display()))?;
    let validation = config.validate();
    if !validation.is_valid() {
        for message in &validation.errors {
            error!(%message, "invalid station configuration");
        }
        anyhow::bail!("station configuration failed validation");
    }

    info!("Starting ev-station {VERSION}");
    info!("Piles: {}", config.piles.len());
    for pile in &config.piles {
        info!("  - {} ({:?}, {} kW)", pile.pile_id, pile.pile_type, pile.power_kw);
    }
    info!("Waiting area capacity: {}", config.waiting_area_capacity);
    info!("Heartbeat timeout: {}s", config.heartbeat_timeout_secs);
    info!("Dispatch policy: {}", config.dispatch_policy);

    let db_path = args.db_path.to_str().context("db path must be valid utf-8")?;
    let store = Arc::new(SqliteStore::open(db_path).context("opening station database")?);
    let clock = Arc::new(SystemClock);
    let station = Arc::new(Station::new(&config, clock, store));

    let heartbeats = Arc::new(HeartbeatTracker::new());

    let alert_config = load_alert_config(&args.alerts_path);
    let notifier = if alert_config.enabled {
        match EmailNotifier::new(&alert_config) {
            Ok(notifier) => Some(Arc::new(notifier)),
            Err(e) => {
                error!(error = %e, "failed to build email notifier, admin alerts disabled");
                None
            }
        }
    } else {
        None
    };

    let _monitor = ev_store::monitor::spawn_heartbeat_monitor(
        station.clone(),
        heartbeats.clone(),
        config.heartbeat_timeout_secs,
        notifier,
    );

    let _dispatch_thread = dispatch_loop::spawn(station.clone(), Duration::from_secs(config.dispatch_tick_secs));

    let state = ev_api::ApiState::new(station.clone(), heartbeats.clone());
    let _command_relay = state.clone().spawn_command_relay(Duration::from_secs(2));
    let router = ev_api::build_router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    info!(%addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await.context("binding HTTP listener")?;
    axum::serve(listener, router).await.context("serving HTTP")?;

    Ok(())
}

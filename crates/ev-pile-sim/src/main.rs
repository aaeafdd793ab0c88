//! Simulated physical pile: a standalone process speaking the pile side
//! of §6's wire protocol over HTTP against `ev-api`. Grounded in the
//! teacher's `heartbeat_client::spawn_heartbeat_task` (a `reqwest::Client`
//! looping on a `tokio::time::interval`, posting JSON, logging failures
//! rather than panicking) applied to three loops instead of one:
//! register-once, heartbeat, and long-poll for commands.
//!
//! The station (`Station::tick_progress_all`) is the authority on session
//! progress and completion; this simulator's own progress/complete
//! reports are a protocol-conformant echo for demonstration and for
//! exercising `ev-api`'s inbound pile endpoints, not an update the core
//! applies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ev_shared::{
    ChargeMode, PileCommand, PileHeartbeat, PileHeartbeatAck, PileId, PileRegisterRequest,
    PileStatus, ProgressReport, SessionCompleteReport, SessionStatus, UserId,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Clone)]
struct Args {
    pile_id: PileId,
    station_url: String,
    power_kw: f64,
    mode: ChargeMode,
    heartbeat_interval_secs: u64,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut pile_id = None;
        let mut station_url = "http://127.0.0.1:8080".to_owned();
        let mut power_kw = 7.0;
        let mut mode = ChargeMode::Trickle;
        let mut heartbeat_interval_secs = 10;

        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--pile-id" => pile_id = iter.next(),
                "--station-url" => station_url = iter.next().unwrap_or(station_url),
                "--power-kw" => {
                    power_kw = iter.next().and_then(|s| s.parse().ok()).unwrap_or(power_kw);
                }
                "--mode" => {
                    mode = match iter.next().as_deref() {
                        Some("fast") => ChargeMode::Fast,
                        _ => ChargeMode::Trickle,
                    };
                }
                "--heartbeat-interval-secs" => {
                    heartbeat_interval_secs = iter
                        .next()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(heartbeat_interval_secs);
                }
                "--help" | "-h" => {
                    println!("ev-pile-sim --pile-id <ID> [--station-url URL] [--power-kw KW] [--mode fast|trickle] [--heartbeat-interval-secs N]");
                    std::process::exit(0);
                }
                _ => {}
            }
        }

        let pile_id = pile_id.ok_or_else(|| anyhow::anyhow!("--pile-id is required"))?;
        Ok(Self {
            pile_id: PileId::from(pile_id),
            station_url,
            power_kw,
            mode,
            heartbeat_interval_secs,
        })
    }
}

struct ChargeState {
    status: Mutex<PileStatus>,
    session: Mutex<Option<JoinHandle<()>>>,
}

impl ChargeState {
    fn new() -> Self {
        Self {
            status: Mutex::new(PileStatus::Available),
            session: Mutex::new(None),
        }
    }

    fn status(&self) -> PileStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: PileStatus) {
        *self.status.lock() = status;
    }

    fn stop_session(&self) {
        if let Some(handle) = self.session.lock().take() {
            handle.abort();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse()?;
    let client = reqwest::Client::new();

    register(&client, &args).await?;
    info!(pile_id = %args.pile_id, power_kw = args.power_kw, mode = %args.mode, "pile simulator registered");

    let state = Arc::new(ChargeState::new());

    let heartbeat = tokio::spawn(heartbeat_loop(client.clone(), args.clone(), state.clone()));
    let commands = tokio::spawn(command_loop(client.clone(), args.clone(), state.clone()));

    let _ = tokio::join!(heartbeat, commands);
    Ok(())
}

async fn register(client: &reqwest::Client, args: &Args) -> anyhow::Result<()> {
    let url = format!("{}/api/piles/register", args.station_url);
    let body = PileRegisterRequest {
        pile_id: args.pile_id.clone(),
        pile_type: args.mode,
        power_kw: args.power_kw,
    };
    let resp = client.post(&url).json(&body).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("registration rejected with status {}", resp.status());
    }
    Ok(())
}

async fn heartbeat_loop(client: reqwest::Client, args: Args, state: Arc<ChargeState>) {
    let url = format!("{}/api/piles/heartbeat", args.station_url);
    let mut interval = tokio::time::interval(Duration::from_secs(args.heartbeat_interval_secs));
    loop {
        interval.tick().await;
        let body = PileHeartbeat {
            pile_id: args.pile_id.clone(),
            ts: Utc::now(),
            status: state.status(),
        };
        match client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                let _ = resp.json::<PileHeartbeatAck>().await;
            }
            Ok(resp) => warn!(status = %resp.status(), "heartbeat rejected by station"),
            Err(e) => error!(error = %e, "failed to send heartbeat"),
        }
    }
}

async fn command_loop(client: reqwest::Client, args: Args, state: Arc<ChargeState>) {
    let url = format!("{}/api/piles/{}/commands", args.station_url, args.pile_id);
    loop {
        let resp = match client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "failed to poll for commands, retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
                continue;
            }
        };
        let payload: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "malformed command payload");
                continue;
            }
        };
        let Some(commands) = payload.get("commands").and_then(|c| c.as_array()) else {
            continue;
        };
        for raw in commands {
            match serde_json::from_value::<PileCommand>(raw.clone()) {
                Ok(command) => handle_command(&client, &args, &state, command).await,
                Err(e) => warn!(error = %e, "dropping malformed command"),
            }
        }
    }
}

async fn handle_command(
    client: &reqwest::Client,
    args: &Args,
    state: &Arc<ChargeState>,
    command: PileCommand,
) {
    match command {
        PileCommand::StartCharging { user_id, target_kwh } => {
            info!(user_id = %user_id, target_kwh, "starting simulated charge session");
            state.stop_session();
            state.set_status(PileStatus::Charging);
            let handle = tokio::spawn(run_charge_session(
                client.clone(),
                args.clone(),
                state.clone(),
                user_id,
                target_kwh,
            ));
            *state.session.lock() = Some(handle);
        }
        PileCommand::StopCharging => {
            info!("stopping simulated charge session");
            state.stop_session();
            state.set_status(PileStatus::Available);
        }
        PileCommand::SetFault { reason } => {
            warn!(reason, "pile entering fault state");
            state.stop_session();
            state.set_status(PileStatus::Fault);
        }
        PileCommand::RecoverFault => {
            info!("pile recovering from fault");
            state.set_status(PileStatus::Available);
        }
        PileCommand::Shutdown => {
            info!("shutdown command received, exiting");
            std::process::exit(0);
        }
    }
}

async fn run_charge_session(
    client: reqwest::Client,
    args: Args,
    state: Arc<ChargeState>,
    user_id: UserId,
    target_kwh: f64,
) {
    let started_at = Utc::now();
    let mut delivered_kwh = 0.0;
    let tick = Duration::from_secs(1);
    let mut interval = tokio::time::interval(tick);

    while delivered_kwh < target_kwh {
        interval.tick().await;
        delivered_kwh = (delivered_kwh + args.power_kw * tick.as_secs_f64() / 3600.0).min(target_kwh);
        let progress = ProgressReport {
            pile_id: args.pile_id.clone(),
            user_id: user_id.clone(),
            delivered_kwh,
            target_kwh,
            progress_pct: (delivered_kwh / target_kwh * 100.0).min(100.0),
        };
        let url = format!("{}/api/piles/progress", args.station_url);
        if let Err(e) = client.post(&url).json(&progress).send().await {
            error!(error = %e, "failed to report progress");
        }
    }

    let report = SessionCompleteReport {
        pile_id: args.pile_id.clone(),
        user_id,
        delivered_kwh,
        started_at,
        ended_at: Utc::now(),
        status: SessionStatus::Completed,
        reason: None,
    };
    let url = format!("{}/api/piles/complete", args.station_url);
    if let Err(e) = client.post(&url).json(&report).send().await {
        error!(error = %e, "failed to report session completion");
    }
    state.set_status(PileStatus::Available);
}

//! Shared handler state (`ApiState`), modeled on the teacher's
//! `MobileApiState`/`AppState`: a small `#[derive(Clone, Debug)]` struct
//! of `Arc`-wrapped dependencies that axum's `State` extractor pulls into
//! every handler, rather than a global.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use ev_core::station::Station;
use ev_shared::{PileCommand, PileId, PileStatus};
use ev_store::heartbeat::HeartbeatTracker;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::info;

/// Per-pile outbound command queue plus a [`Notify`] so the long-poll
/// `GET /api/piles/:id/commands` handler can wake as soon as a command
/// lands instead of spinning.
#[derive(Default)]
struct PileOutbox {
    commands: Mutex<VecDeque<PileCommand>>,
    notify: Notify,
}

struct Inner {
    station: Arc<Station>,
    heartbeats: Arc<HeartbeatTracker>,
    outboxes: Mutex<HashMap<PileId, Arc<PileOutbox>>>,
}

#[derive(Clone)]
pub struct ApiState {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState").finish_non_exhaustive()
    }
}

impl ApiState {
    #[must_use]
    pub fn new(station: Arc<Station>, heartbeats: Arc<HeartbeatTracker>) -> Self {
        Self {
            inner: Arc::new(Inner {
                station,
                heartbeats,
                outboxes: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn station(&self) -> &Arc<Station> {
        &self.inner.station
    }

    #[must_use]
    pub fn heartbeats(&self) -> &Arc<HeartbeatTracker> {
        &self.inner.heartbeats
    }

    fn outbox_for(&self, pile_id: &PileId) -> Arc<PileOutbox> {
        self.inner
            .outboxes
            .lock()
            .entry(pile_id.clone())
            .or_insert_with(|| Arc::new(PileOutbox::default()))
            .clone()
    }

    pub fn enqueue_command(&self, pile_id: &PileId, command: PileCommand) {
        let outbox = self.outbox_for(pile_id);
        outbox.commands.lock().push_back(command);
        outbox.notify.notify_one();
    }

    /// Drains whatever is queued, waiting up to `timeout` if nothing is
    /// queued yet (the long-poll contract for `GET .../commands`).
    pub async fn poll_commands(&self, pile_id: &PileId, timeout: Duration) -> Vec<PileCommand> {
        let outbox = self.outbox_for(pile_id);

        {
            let mut queue = outbox.commands.lock();
            if !queue.is_empty() {
                return queue.drain(..).collect();
            }
        }

        let _ = tokio::time::timeout(timeout, outbox.notify.notified()).await;
        outbox.commands.lock().drain(..).collect()
    }

    /// Diffs pile status on every tick and turns the transition into the
    /// matching `PileCommand`, the same poll-and-diff shape as
    /// `ev_store::monitor::spawn_heartbeat_monitor` applied to the
    /// outbound command side of the wire protocol instead of heartbeat
    /// staleness.
    pub fn spawn_command_relay(self, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            let mut last_status: HashMap<PileId, PileStatus> = HashMap::new();

            loop {
                interval.tick().await;
                for pile in self.station().all_pile_snapshots() {
                    let pile_id = pile.pile_id.clone();
                    let previous = last_status.insert(pile_id.clone(), pile.status);
                    let Some(previous) = previous else { continue };
                    if previous == pile.status {
                        continue;
                    }

                    match (previous, pile.status) {
                        (_, PileStatus::Charging) => {
                            if let Some(session) = &pile.current {
                                self.enqueue_command(
                                    &pile_id,
                                    PileCommand::StartCharging {
                                        user_id: session.user_id.clone(),
                                        target_kwh: session.target_kwh,
                                    },
                                );
                                info!(pile_id = %pile_id, "relayed START_CHARGING");
                            }
                        }
                        (PileStatus::Charging, PileStatus::Available) => {
                            self.enqueue_command(&pile_id, PileCommand::StopCharging);
                            info!(pile_id = %pile_id, "relayed STOP_CHARGING");
                        }
                        (_, PileStatus::Fault) => {
                            self.enqueue_command(
                                &pile_id,
                                PileCommand::SetFault {
                                    reason: "station_fault".to_owned(),
                                },
                            );
                            info!(pile_id = %pile_id, "relayed SET_FAULT");
                        }
                        (PileStatus::Fault, _) => {
                            self.enqueue_command(&pile_id, PileCommand::RecoverFault);
                            info!(pile_id = %pile_id, "relayed RECOVER_FAULT");
                        }
                        _ => {}
                    }
                }
            }
        })
    }
}

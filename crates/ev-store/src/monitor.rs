//! Background heartbeat staleness monitor (C10), grounded directly in the
//! teacher's `spawn_monitor`: a `tokio::spawn`ed loop on a
//! `tokio::time::interval`, scanning every tracked pile under one lock
//! acquisition, transitioning stale piles and logging the transition.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use ev_core::station::Station;
use ev_shared::{PileId, PileStatus};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::heartbeat::HeartbeatTracker;
use crate::notifications::EmailNotifier;

pub fn spawn_heartbeat_monitor(
    station: Arc<Station>,
    tracker: Arc<HeartbeatTracker>,
    timeout_secs: u64,
    notifier: Option<Arc<EmailNotifier>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let poll_interval = std::time::Duration::from_secs((timeout_secs / 3).max(1));
        let mut interval = tokio::time::interval(poll_interval);
        let mut last_known_status: HashMap<PileId, PileStatus> = HashMap::new();
        info!(timeout_secs, "Pile heartbeat monitor started");

        loop {
            interval.tick().await;

            let samples = tracker.snapshot();
            let now = Utc::now();

            for pile_id in station.pile_ids() {
                let Some(snapshot) = station.pile_snapshot(&pile_id) else {
                    continue;
                };

                let elapsed_secs = samples
                    .get(&pile_id)
                    .map(|s| (now - s.received_at).num_seconds().max(0) as u64)
                    .unwrap_or(u64::MAX);

                if elapsed_secs > timeout_secs && snapshot.status != PileStatus::Offline {
                    last_known_status.insert(pile_id.clone(), snapshot.status);
                    station.mark_pile_offline(&pile_id);
                    warn!(
                        pile_id = %pile_id,
                        elapsed_secs,
                        threshold_secs = timeout_secs,
                        "Pile marked OFFLINE: heartbeat stale"
                    );
                    if let Some(notifier) = &notifier {
                        let notifier = Arc::clone(notifier);
                        let pile_id = pile_id.clone();
                        tokio::spawn(async move {
                            if let Err(e) = notifier.send_offline_alert(&pile_id).await {
                                tracing::error!(error = %e, "Failed to send pile-offline alert");
                            }
                        });
                    }
                } else if elapsed_secs <= timeout_secs && snapshot.status == PileStatus::Offline {
                    let restored = last_known_status.remove(&pile_id).unwrap_or(PileStatus::Available);
                    station.restore_pile_from_offline(&pile_id, restored);
                    info!(pile_id = %pile_id, restored_status = ?restored, "Pile heartbeat resumed, restored from OFFLINE");
                    if let Some(notifier) = &notifier {
                        let notifier = Arc::clone(notifier);
                        let pile_id = pile_id.clone();
                        tokio::spawn(async move {
                            if let Err(e) = notifier.send_recovery_alert(&pile_id).await {
                                tracing::error!(error = %e, "Failed to send pile-recovery alert");
                            }
                        });
                    }
                }
            }
        }
    })
}

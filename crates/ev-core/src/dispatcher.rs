//! Dispatcher (C5): selection rule plus the background task that drives
//! it. Grounded in the teacher's `async_tasks`/`monitor::spawn_monitor`
//! shape — a single task holding a `crossbeam_channel::Receiver` for
//! event-driven triggers and a `tokio::time::interval` as a periodic
//! safety net, rather than a `tokio::sync::mpsc` per caller.

use crate::model::Pile;
use crate::queue;
use ev_shared::{ChargeMode, PileId};
use std::time::Duration;

/// What woke the dispatcher. Multiple triggers queued before the task
/// wakes collapse into a single dispatch pass — the task drains the
/// channel before deciding whether to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTrigger {
    NewAdmission,
    SlotFreed,
    PeriodicTick,
    FaultEvent,
    RecoveryEvent,
}

/// The shortest-total-completion-time selection rule, restricted to piles
/// matching `mode`. Tie-break: lowest `pile_id` wins. `piles` must already
/// be sorted by `pile_id` for the tie-break to be deterministic without an
/// extra comparison.
#[must_use]
pub fn select_pile(
    piles: &[(PileId, Pile)],
    mode: ChargeMode,
    candidate_target_kwh: f64,
) -> Option<PileId> {
    piles
        .iter()
        .filter(|(_, pile)| pile.mode() == mode && has_free_slot(pile))
        .map(|(id, pile)| (id, queue::projected_completion_time(pile, candidate_target_kwh)))
        .min_by(|(id_a, t_a), (id_b, t_b)| {
            t_a.partial_cmp(t_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| id_a.cmp(id_b))
        })
        .map(|(id, _)| id.clone())
}

fn has_free_slot(pile: &Pile) -> bool {
    use ev_shared::PileStatus;
    matches!(pile.status, PileStatus::Available | PileStatus::Charging) && pile.waiting.is_none()
}

/// The default periodic safety-net cadence (§4.5 trigger source c), used
/// when a station's config doesn't override it.
#[must_use]
pub fn default_tick_interval() -> Duration {
    Duration::from_secs(5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PileType;

    fn pile(id: &str, mode: PileType, power_kw: f64) -> (PileId, Pile) {
        (PileId::from(id), Pile::new(PileId::from(id), mode, power_kw))
    }

    #[test]
    fn picks_lowest_completion_time() {
        let mut a = pile("A", PileType::Fast, 30.0);
        let mut b = pile("B", PileType::Fast, 30.0);
        // A has a longer remaining charge than B, so B should win for a
        // fresh 30 kWh candidate.
        a.1.current = Some(crate::model::ActiveSession {
            session_id: ev_shared::SessionId::from("S1"),
            request_id: ev_shared::RequestId::from("F1"),
            user_id: ev_shared::UserId::from("U1"),
            target_kwh: 30.0,
            delivered_kwh: 0.0,
            start_at: chrono::Utc::now(),
        });
        let piles = vec![a, b];
        let winner = select_pile(&piles, ChargeMode::Fast, 30.0).unwrap();
        assert_eq!(winner, PileId::from("B"));
    }

    #[test]
    fn tie_break_prefers_lower_pile_id() {
        let a = pile("A", PileType::Fast, 30.0);
        let b = pile("B", PileType::Fast, 30.0);
        let piles = vec![a, b];
        let winner = select_pile(&piles, ChargeMode::Fast, 30.0).unwrap();
        assert_eq!(winner, PileId::from("A"));
    }

    #[test]
    fn skips_piles_of_the_wrong_mode() {
        let piles = vec![pile("C", PileType::Trickle, 7.0)];
        assert!(select_pile(&piles, ChargeMode::Fast, 10.0).is_none());
    }
}

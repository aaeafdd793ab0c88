//! Per-pile two-slot reservation queue (C3): one `charging_car`, one
//! `waiting_car`. Built directly on top of the pile state machine in
//! [`crate::pile`] — a queue operation either installs an occupant or
//! promotes the waiting occupant into a fresh session, never both in the
//! same call.

use crate::model::{Pile, WaitingOccupant};
use crate::pile::{self, EndReason, FinishedSession};
use chrono::{DateTime, Utc};
use ev_shared::{PileStatus, RequestId, SessionId, UserId};

/// The two requests a pile is holding, in `[charging, waiting]` order, as
/// returned by [`evict_all`].
#[derive(Debug, Clone)]
pub struct EvictedOccupant {
    pub request_id: RequestId,
    pub user_id: UserId,
    pub remaining_target_kwh: f64,
}

/// Attempts to seat `request` on `pile`. Returns `false` without mutating
/// the pile if it is faulted, offline, or both slots are already taken.
#[allow(clippy::too_many_arguments)]
pub fn try_reserve(
    pile: &mut Pile,
    session_id: SessionId,
    request_id: RequestId,
    user_id: UserId,
    target_kwh: f64,
    now: DateTime<Utc>,
) -> bool {
    match pile.status {
        PileStatus::Fault | PileStatus::Offline => return false,
        PileStatus::Available | PileStatus::Charging => {}
    }

    if pile.current.is_none() {
        pile::begin_session(pile, session_id, request_id, user_id, target_kwh, now);
        true
    } else if pile.waiting.is_none() {
        pile.waiting = Some(WaitingOccupant {
            request_id,
            user_id,
            target_kwh,
        });
        true
    } else {
        false
    }
}

/// Promotes the waiting occupant into the charging slot once the current
/// session ends. No-op if nothing was waiting.
pub fn on_session_end(pile: &mut Pile, session_id: SessionId, now: DateTime<Utc>) {
    if let Some(waiting) = pile.waiting.take() {
        pile::begin_session(
            pile,
            session_id,
            waiting.request_id,
            waiting.user_id,
            waiting.target_kwh,
            now,
        );
    }
}

/// `remaining_of_current + full_charge_of_waiting + candidate / power_kw`,
/// in hours — the Dispatcher's selection metric.
#[must_use]
pub fn projected_completion_time(pile: &Pile, candidate_target_kwh: f64) -> f64 {
    let remaining_of_current = pile
        .current
        .as_ref()
        .map(|s| ((s.target_kwh - s.delivered_kwh) / pile.power_kw).max(0.0))
        .unwrap_or(0.0);
    let full_charge_of_waiting = pile
        .waiting
        .as_ref()
        .map(|w| w.target_kwh / pile.power_kw)
        .unwrap_or(0.0);
    remaining_of_current + full_charge_of_waiting + candidate_target_kwh / pile.power_kw
}

/// Clears both slots, ending any open session with [`EndReason::PileFault`]
/// first. Used by the Fault Coordinator, both on the faulted pile itself
/// and on other piles it evacuates `waiting_car` from during `time_order`
/// redistribution — this function never touches `pile.status`, leaving
/// that transition to the caller. Returns the evicted occupants in
/// `[charging, waiting]` order plus the finished session (if one was
/// open) so the caller can settle its bill.
pub fn evict_all(
    pile: &mut Pile,
    now: DateTime<Utc>,
) -> (Vec<EvictedOccupant>, Option<FinishedSession>) {
    let mut evicted = Vec::with_capacity(2);

    let finished = pile::end_session(pile, now, EndReason::PileFault);
    if let Some(f) = &finished {
        evicted.push(EvictedOccupant {
            request_id: f.request_id.clone(),
            user_id: f.user_id.clone(),
            remaining_target_kwh: (f.target_kwh - f.delivered_kwh).max(0.0),
        });
    }

    if let Some(waiting) = pile.waiting.take() {
        evicted.push(EvictedOccupant {
            request_id: waiting.request_id,
            user_id: waiting.user_id,
            remaining_target_kwh: waiting.target_kwh,
        });
    }

    (evicted, finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PileType;
    use chrono::TimeZone;
    use ev_shared::PileId;

    fn sample_pile() -> Pile {
        Pile::new(PileId::from("A"), PileType::Fast, 30.0)
    }

    #[test]
    fn first_reservation_starts_charging() {
        let mut pile = sample_pile();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert!(try_reserve(
            &mut pile,
            SessionId::from("S1"),
            RequestId::from("F1"),
            UserId::from("U1"),
            30.0,
            now
        ));
        assert_eq!(pile.status, PileStatus::Charging);
    }

    #[test]
    fn second_reservation_waits() {
        let mut pile = sample_pile();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        try_reserve(
            &mut pile,
            SessionId::from("S1"),
            RequestId::from("F1"),
            UserId::from("U1"),
            30.0,
            now,
        );
        assert!(try_reserve(
            &mut pile,
            SessionId::from("S2"),
            RequestId::from("F2"),
            UserId::from("U2"),
            15.0,
            now
        ));
        assert!(pile.waiting.is_some());
    }

    #[test]
    fn third_reservation_rejected() {
        let mut pile = sample_pile();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        try_reserve(
            &mut pile,
            SessionId::from("S1"),
            RequestId::from("F1"),
            UserId::from("U1"),
            30.0,
            now,
        );
        try_reserve(
            &mut pile,
            SessionId::from("S2"),
            RequestId::from("F2"),
            UserId::from("U2"),
            15.0,
            now,
        );
        assert!(!try_reserve(
            &mut pile,
            SessionId::from("S3"),
            RequestId::from("F3"),
            UserId::from("U3"),
            10.0,
            now
        ));
    }

    #[test]
    fn projected_completion_accounts_for_both_slots() {
        let mut pile = sample_pile();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        try_reserve(
            &mut pile,
            SessionId::from("S1"),
            RequestId::from("F1"),
            UserId::from("U1"),
            30.0,
            now,
        );
        // 30kWh @ 30kW = 1h remaining, no waiting car, candidate 15kWh -> 0.5h.
        assert!((projected_completion_time(&pile, 15.0) - 1.5).abs() < 1e-9);
    }
}

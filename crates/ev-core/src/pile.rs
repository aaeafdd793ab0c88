//! Per-pile state machine (C2): `AVAILABLE ↔ CHARGING`, plus `FAULT` and
//! `OFFLINE`. Every function here takes `&mut Pile` and is meant to be
//! called with that pile's own mutex held — see [`crate::station::Station`]
//! for the lock-ordering contract.

use crate::model::{ActiveSession, Pile};
use chrono::{DateTime, Utc};
use ev_shared::{PileStatus, RequestId, SessionId, UserId};

/// Why a session ended. Threaded through to billing and logging; never
/// stored as a free-form string past this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Completed,
    UserCancel,
    PileFault,
    CommandTimeout,
}

impl EndReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Completed => "completed",
            EndReason::UserCancel => "user_cancel",
            EndReason::PileFault => "pile_fault",
            EndReason::CommandTimeout => "command_timeout",
        }
    }
}

/// A session that just ended, carrying everything the caller needs to
/// build a `Session`/`Bill` pair.
#[derive(Debug, Clone)]
pub struct FinishedSession {
    pub session_id: SessionId,
    pub request_id: RequestId,
    pub user_id: UserId,
    pub pile_id: ev_shared::PileId,
    pub target_kwh: f64,
    pub delivered_kwh: f64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub reason: EndReason,
}

/// `AVAILABLE -> CHARGING`. Caller must have already confirmed the pile had
/// no charging occupant (the queue's `charging_car` slot was empty).
pub fn begin_session(
    pile: &mut Pile,
    session_id: SessionId,
    request_id: RequestId,
    user_id: UserId,
    target_kwh: f64,
    now: DateTime<Utc>,
) {
    pile.status = PileStatus::Charging;
    pile.current = Some(ActiveSession {
        session_id,
        request_id,
        user_id,
        target_kwh,
        delivered_kwh: 0.0,
        start_at: now,
    });
}

/// `CHARGING -> AVAILABLE`, freezing delivered energy and folding it into
/// the pile's cumulative totals. A no-op returning `None` if nothing was
/// charging.
pub fn end_session(pile: &mut Pile, now: DateTime<Utc>, reason: EndReason) -> Option<FinishedSession> {
    let active = pile.current.take()?;
    let duration_hours = (now - active.start_at).num_milliseconds() as f64 / 3_600_000.0;
    pile.totals.sessions += 1;
    pile.totals.energy_kwh += active.delivered_kwh;
    pile.totals.hours += duration_hours.max(0.0);
    if pile.status == PileStatus::Charging {
        pile.status = PileStatus::Available;
    }
    Some(FinishedSession {
        session_id: active.session_id,
        request_id: active.request_id,
        user_id: active.user_id,
        pile_id: pile.pile_id.clone(),
        target_kwh: active.target_kwh,
        delivered_kwh: active.delivered_kwh,
        start_at: active.start_at,
        end_at: now,
        reason,
    })
}

/// Advances delivered energy by `elapsed_secs` of wall-clock time at the
/// pile's constant power, clamped so it never overshoots `target_kwh`.
/// Returns `true` once the target has been reached (caller must then call
/// [`end_session`] with [`EndReason::Completed`]).
pub fn tick_progress(pile: &mut Pile, elapsed_secs: f64) -> bool {
    let Some(active) = pile.current.as_mut() else {
        return false;
    };
    let increment = pile.power_kw * elapsed_secs / 3600.0;
    active.delivered_kwh = (active.delivered_kwh + increment).min(active.target_kwh);
    active.delivered_kwh >= active.target_kwh
}

/// Any state `-> FAULT`. If a session was open it is ended first with
/// [`EndReason::PileFault`] so the caller can bill the partial delivery.
pub fn set_fault(pile: &mut Pile, now: DateTime<Utc>) -> Option<FinishedSession> {
    let finished = end_session(pile, now, EndReason::PileFault);
    pile.status = PileStatus::Fault;
    finished
}

/// `FAULT -> AVAILABLE`.
pub fn recover(pile: &mut Pile) {
    if pile.status == PileStatus::Fault {
        pile.status = PileStatus::Available;
    }
}

/// Admin-initiated `AVAILABLE -> OFFLINE` (no session open, checked by the
/// caller against the queue state).
pub fn go_offline(pile: &mut Pile) {
    if pile.status == PileStatus::Available {
        pile.status = PileStatus::Offline;
    }
}

/// Heartbeat-driven `OFFLINE -> AVAILABLE` (or `FAULT`, if the pile
/// self-reported a fault while unreachable). Distinct from [`recover`]:
/// this never touches the queue, it only makes the pile eligible for
/// dispatch again.
pub fn restore_from_offline(pile: &mut Pile, last_known: PileStatus) {
    if pile.status == PileStatus::Offline {
        pile.status = last_known;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ev_shared::PileId;

    fn sample_pile() -> Pile {
        Pile::new(PileId::from("A"), crate::model::PileType::Fast, 30.0)
    }

    #[test]
    fn begin_then_end_updates_totals() {
        let mut pile = sample_pile();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        begin_session(
            &mut pile,
            SessionId::from("S1"),
            RequestId::from("F1"),
            UserId::from("U1"),
            30.0,
            t0,
        );
        assert_eq!(pile.status, PileStatus::Charging);

        assert!(!tick_progress(&mut pile, 3600.0));
        assert_eq!(pile.current.as_ref().unwrap().delivered_kwh, 30.0);
        assert!(tick_progress(&mut pile, 1.0));

        let t1 = t0 + chrono::Duration::hours(1);
        let finished = end_session(&mut pile, t1, EndReason::Completed).unwrap();
        assert_eq!(finished.delivered_kwh, 30.0);
        assert_eq!(pile.status, PileStatus::Available);
        assert_eq!(pile.totals.sessions, 1);
        assert_eq!(pile.totals.energy_kwh, 30.0);
    }

    #[test]
    fn fault_ends_open_session() {
        let mut pile = sample_pile();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        begin_session(
            &mut pile,
            SessionId::from("S1"),
            RequestId::from("F1"),
            UserId::from("U1"),
            30.0,
            t0,
        );
        tick_progress(&mut pile, 1800.0);
        let finished = set_fault(&mut pile, t0 + chrono::Duration::minutes(30)).unwrap();
        assert_eq!(finished.reason, EndReason::PileFault);
        assert_eq!(pile.status, PileStatus::Fault);
        assert!(pile.current.is_none());
    }

    #[test]
    fn offline_restore_does_not_touch_queue() {
        let mut pile = sample_pile();
        pile.status = PileStatus::Offline;
        restore_from_offline(&mut pile, PileStatus::Available);
        assert_eq!(pile.status, PileStatus::Available);
    }
}

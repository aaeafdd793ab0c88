//! Data model (§3): piles, requests, sessions, and bills. Plain structs
//! with closed status enums, never a class hierarchy — mutation happens
//! through the owning module (`pile`, `queue`, `waiting_area`, `station`),
//! not through setters scattered across the crate.

use chrono::{DateTime, Utc};
use ev_shared::{BillId, Cents, ChargeMode, PileId, PileStatus, RequestId, RequestStatus, SessionId, SessionStatus, BillStatus, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PileType {
    Fast,
    Trickle,
}

impl From<PileType> for ChargeMode {
    fn from(t: PileType) -> ChargeMode {
        match t {
            PileType::Fast => ChargeMode::Fast,
            PileType::Trickle => ChargeMode::Trickle,
        }
    }
}

/// Cumulative lifetime counters a pile never resets, reported in station
/// stats queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PileTotals {
    pub sessions: u64,
    pub energy_kwh: f64,
    pub hours: f64,
}

/// The currently-charging occupant of a pile, if any. Lives inside
/// [`Pile`] rather than as a free-standing map so the pile's own mutex
/// covers it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveSession {
    pub session_id: SessionId,
    pub request_id: RequestId,
    pub user_id: UserId,
    pub target_kwh: f64,
    pub delivered_kwh: f64,
    pub start_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pile {
    pub pile_id: PileId,
    pub pile_type: PileType,
    pub power_kw: f64,
    pub status: PileStatus,
    pub totals: PileTotals,
    pub current: Option<ActiveSession>,
    pub waiting: Option<WaitingOccupant>,
}

impl Pile {
    #[must_use]
    pub fn new(pile_id: PileId, pile_type: PileType, power_kw: f64) -> Self {
        Self {
            pile_id,
            pile_type,
            power_kw,
            status: PileStatus::Available,
            totals: PileTotals::default(),
            current: None,
            waiting: None,
        }
    }

    #[must_use]
    pub fn mode(&self) -> ChargeMode {
        self.pile_type.into()
    }
}

/// A reservation sitting in a pile's waiting slot (`QUEUED`), distinct
/// from an active session in the charging slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitingOccupant {
    pub request_id: RequestId,
    pub user_id: UserId,
    pub target_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub request_id: RequestId,
    pub user_id: UserId,
    pub mode: ChargeMode,
    pub target_kwh: f64,
    pub queue_number: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub assigned_pile_id: Option<PileId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub session_id: SessionId,
    pub request_id: RequestId,
    pub user_id: UserId,
    pub pile_id: PileId,
    pub target_kwh: f64,
    pub delivered_kwh: f64,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bill {
    pub bill_id: BillId,
    pub session_id: SessionId,
    pub energy_kwh: f64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub energy_cost: Cents,
    pub service_cost: Cents,
    pub total_cost: Cents,
    pub status: BillStatus,
}

impl Bill {
    /// Invariant 7: the two components always sum, exactly, to the total.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.energy_cost + self.service_cost == self.total_cost
    }
}

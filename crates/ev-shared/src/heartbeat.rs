//! Pile <-> core wire protocol (transport-agnostic; bound to HTTP by
//! `ev-api`). Mirrors the register / heartbeat / status_report / command
//! messages of the pile-facing contract.

use crate::ids::PileId;
use crate::status::PileStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `register{pile_id, type, power_kw}` — idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PileRegisterRequest {
    pub pile_id: PileId,
    #[serde(rename = "type")]
    pub pile_type: crate::status::ChargeMode,
    pub power_kw: f64,
}

/// `heartbeat{pile_id, ts, status}`, sent at least every `H/3` seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PileHeartbeat {
    pub pile_id: PileId,
    pub ts: DateTime<Utc>,
    pub status: PileStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PileHeartbeatAck {
    pub ok: bool,
    pub server_time: DateTime<Utc>,
}

/// `status_report{pile_id, status, current?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PileStatusReport {
    pub pile_id: PileId,
    pub status: PileStatus,
    pub current: Option<CurrentSessionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSessionView {
    pub user_id: crate::ids::UserId,
    pub delivered_kwh: f64,
    pub target_kwh: f64,
    pub started_at: DateTime<Utc>,
}

/// Commands the core issues to a pile. Delivered over a long-poll endpoint
/// rather than a persistent connection (see `ev-api::pile_api`), which
/// keeps the contract transport-agnostic as specified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PileCommand {
    StartCharging {
        user_id: crate::ids::UserId,
        target_kwh: f64,
    },
    StopCharging,
    SetFault {
        reason: String,
    },
    RecoverFault,
    Shutdown,
}

/// `progress{pile_id, user_id, delivered_kwh, target_kwh, progress_pct}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub pile_id: PileId,
    pub user_id: crate::ids::UserId,
    pub delivered_kwh: f64,
    pub target_kwh: f64,
    pub progress_pct: f64,
}

/// `complete{pile_id, user_id, delivered_kwh, started_at, ended_at, status, reason?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCompleteReport {
    pub pile_id: PileId,
    pub user_id: crate::ids::UserId,
    pub delivered_kwh: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: crate::status::SessionStatus,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_serializes_with_screaming_snake_tag() {
        let cmd = PileCommand::StartCharging {
            user_id: "u1".into(),
            target_kwh: 30.0,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"command\":\"START_CHARGING\""));
    }
}

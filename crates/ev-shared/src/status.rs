//! Closed status enums. Every lifecycle in this station is a tagged union,
//! never a class hierarchy — see the station's design notes on why.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeMode {
    Fast,
    Trickle,
}

impl ChargeMode {
    #[must_use]
    pub fn queue_prefix(self) -> char {
        match self {
            ChargeMode::Fast => 'F',
            ChargeMode::Trickle => 'T',
        }
    }
}

impl fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargeMode::Fast => f.write_str("fast"),
            ChargeMode::Trickle => f.write_str("trickle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PileStatus {
    Available,
    Charging,
    Fault,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    Waiting,
    Queued,
    Charging,
    Completed,
    Cancelled,
    Interrupted,
}

impl RequestStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Interrupted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Charging,
    Completed,
    Interrupted,
    Cancelled,
}

impl SessionStatus {
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, SessionStatus::Charging)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BillStatus {
    Completed,
    Interrupted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    Priority,
    TimeOrder,
}

impl fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchPolicy::Priority => f.write_str("priority"),
            DispatchPolicy::TimeOrder => f.write_str("time_order"),
        }
    }
}

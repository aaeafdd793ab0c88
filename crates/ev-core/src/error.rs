use ev_shared::{PileId, RequestId, UserId};
use thiserror::Error;

/// Errors the dispatch core can report to a caller (`ev-api` maps these to
/// HTTP statuses; `ev-store` and tests match on them directly).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("target_kwh must be greater than zero")]
    InvalidTarget,
    #[error("user {0} already has an active request")]
    DuplicateActiveRequest(UserId),
    #[error("waiting area is full")]
    WaitingAreaFull,
    #[error("request is not in the waiting area")]
    NotInWaiting,
    #[error("user {0} has no active charging session")]
    NoActiveSession(UserId),
    #[error("request {0} not found")]
    RequestNotFound(RequestId),
    #[error("pile {0} not found")]
    PileNotFound(PileId),
    #[error("mode is unchanged")]
    SameMode,
    #[error("invalid dispatch policy: {0}")]
    InvalidDispatchPolicy(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Internal faults that never escape the core as user-visible errors. They
/// are logged and the offending input is dropped, per the recovery policy:
/// a malformed pile message must never mutate station state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("progress report for unknown session on pile {0}")]
    UnknownSession(PileId),
    #[error("progress report references pile {0} not in this station")]
    UnknownPile(PileId),
}

/// Raised only for programmer errors in tariff math (negative energy,
/// inverted interval). Fatal by design — callers should treat this as a
/// bug, not a recoverable condition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TariffDomainError {
    #[error("energy_kwh must be non-negative, got {0}")]
    NegativeEnergy(f64),
    #[error("session end ({end}) precedes start ({start})")]
    InvertedInterval {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },
}

//! Wire types and small value types shared between the dispatch core, the
//! persistence layer, and the HTTP surface.
//!
//! Nothing in this crate owns behavior beyond simple invariants (e.g. money
//! rounding) — it exists so `ev-core`, `ev-store`, and `ev-api` agree on the
//! shape of a pile, a request, and a bill without depending on each other.

pub mod heartbeat;
pub mod ids;
pub mod money;
pub mod status;

pub use heartbeat::{
    PileCommand, PileHeartbeat, PileHeartbeatAck, PileRegisterRequest, PileStatusReport,
    ProgressReport, SessionCompleteReport,
};
pub use ids::{BillId, PileId, RequestId, SessionId, UserId};
pub use money::Cents;
pub use status::{BillStatus, ChargeMode, DispatchPolicy, PileStatus, RequestStatus, SessionStatus};

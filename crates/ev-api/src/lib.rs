//! Thin HTTP binding for the station's user, admin, and pile contracts
//! (§6). Mirrors how the teacher keeps its web crate a pure transport
//! layer over an already-complete domain core (`fluxion-web` over
//! `fluxion-core`'s `WebQuerySender`/`UserControlApiState`): this crate
//! owns no dispatch logic, only request parsing, `Station` calls, and
//! response shaping.

mod admin_api;
mod error;
mod pile_api;
mod router;
mod state;
mod user_api;

pub use error::ApiError;
pub use router::build_router;
pub use state::ApiState;

//! Dispatch and billing core for a fixed-pile EV charging station.
//!
//! This crate owns the three-layer queueing engine (waiting area, per-pile
//! queues, dispatcher), the pile runtime state machine, the time-of-use
//! tariff calculator, and the fault-redistribution protocol. It has no
//! knowledge of HTTP, SQL, or email — those live in `ev-api` and `ev-store`
//! and talk to this crate through [`Station`] and the [`store::SessionBillStore`]
//! trait.

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fault;
pub mod model;
pub mod pile;
pub mod queue;
pub mod station;
pub mod store;
pub mod tariff;
pub mod waiting_area;

pub use clock::{Clock, SystemClock};
pub use error::DispatchError;
pub use station::Station;

//! Persistence and pile-liveness tracking for the station: a sqlite-backed
//! `SessionBillStore` (C6), the heartbeat staleness monitor (C10), and an
//! optional SMTP admin-alert notifier, adapted from the teacher's
//! `fluxion-server` in the same division of labor (`db.rs`, `monitor.rs`,
//! `notifications.rs`).

pub mod config;
pub mod db;
pub mod heartbeat;
pub mod monitor;
pub mod notifications;

pub use config::AlertConfig;
pub use db::SqliteStore;
pub use heartbeat::HeartbeatTracker;
pub use notifications::EmailNotifier;

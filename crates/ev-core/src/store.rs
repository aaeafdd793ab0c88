//! Append-only session/bill persistence (C6), specified here only as a
//! trait — `ev-store` provides the sqlite-backed implementation; this
//! crate also ships an in-memory one for unit and scenario tests so
//! `ev-core`'s test suite never depends on `ev-store`.

use crate::model::{Bill, Session};
use ev_shared::{BillId, SessionId, UserId};
use parking_lot::Mutex;

/// One writer per session row; bill rows are immutable after insert.
/// Implementations must not expose partial writes — a failed `record_*`
/// call must leave no trace of the attempted row, and must return `Err`
/// rather than panic so a backend outage surfaces as a `persistence_failure`
/// to the caller instead of taking the process down (§7).
pub trait SessionBillStore: Send + Sync {
    fn record_session(&self, session: Session) -> anyhow::Result<()>;
    fn record_bill(&self, bill: Bill) -> anyhow::Result<()>;
    fn sessions_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Session>>;
    fn bills_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Bill>>;
    fn next_bill_sequence(&self, day_prefix: &str) -> anyhow::Result<u32>;
}

/// `BILL{YYYYMMDD}{seq:04d}`, monotonic within a day, per §6.
#[must_use]
pub fn format_bill_id(day_prefix: &str, seq: u32) -> BillId {
    BillId::from(format!("BILL{day_prefix}{seq:04}"))
}

#[derive(Default)]
struct Inner {
    sessions: Vec<Session>,
    bills: Vec<Bill>,
    day_sequences: std::collections::HashMap<String, u32>,
}

/// A process-lifetime, in-memory store. Not durable across restarts, which
/// is consistent with the Non-goal of no partial resumption.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    #[must_use]
    pub fn bill_count(&self) -> usize {
        self.inner.lock().bills.len()
    }
}

impl SessionBillStore for MemoryStore {
    fn record_session(&self, session: Session) -> anyhow::Result<()> {
        self.inner.lock().sessions.push(session);
        Ok(())
    }

    fn record_bill(&self, bill: Bill) -> anyhow::Result<()> {
        self.inner.lock().bills.push(bill);
        Ok(())
    }

    fn sessions_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Session>> {
        Ok(self
            .inner
            .lock()
            .sessions
            .iter()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect())
    }

    fn bills_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Bill>> {
        let inner = self.inner.lock();
        Ok(inner
            .bills
            .iter()
            .filter(|b| {
                inner
                    .sessions
                    .iter()
                    .any(|s| s.session_id == b.session_id && &s.user_id == user_id)
            })
            .cloned()
            .collect())
    }

    fn next_bill_sequence(&self, day_prefix: &str) -> anyhow::Result<u32> {
        let mut inner = self.inner.lock();
        let counter = inner.day_sequences.entry(day_prefix.to_owned()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bill_id_format() {
        assert_eq!(format_bill_id("20240101", 3).to_string(), "BILL202401010003");
    }

    #[test]
    fn sequence_is_monotonic_per_day() {
        let store = MemoryStore::new();
        assert_eq!(store.next_bill_sequence("20240101").unwrap(), 1);
        assert_eq!(store.next_bill_sequence("20240101").unwrap(), 2);
        assert_eq!(store.next_bill_sequence("20240102").unwrap(), 1);
    }
}

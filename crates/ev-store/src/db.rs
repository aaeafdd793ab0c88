//! Sqlite-backed [`SessionBillStore`], the durable half of C6. Schema and
//! connection handling follow the teacher's `Database` (a single
//! `Mutex<rusqlite::Connection>`, `CREATE TABLE IF NOT EXISTS` at open,
//! plain `params!` calls) adapted from client/telemetry tables to
//! session/bill tables.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ev_core::model::{Bill, Session};
use ev_core::store::SessionBillStore;
use ev_shared::{BillId, BillStatus, Cents, PileId, RequestId, SessionId, SessionStatus, UserId};
use rusqlite::params;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// A failed sqlite operation, surfaced through [`SessionBillStore`] instead
/// of panicking: the statement itself never partially applies, so the
/// caller sees a clean `Err` and can report `persistence_failure` rather
/// than taking the whole process down.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite connection mutex poisoned")]
    Poisoned,
    #[error("sqlite operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn session_status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Charging => "CHARGING",
        SessionStatus::Completed => "COMPLETED",
        SessionStatus::Interrupted => "INTERRUPTED",
        SessionStatus::Cancelled => "CANCELLED",
    }
}

fn session_status_from_str(s: &str) -> SessionStatus {
    match s {
        "COMPLETED" => SessionStatus::Completed,
        "INTERRUPTED" => SessionStatus::Interrupted,
        "CANCELLED" => SessionStatus::Cancelled,
        _ => SessionStatus::Charging,
    }
}

fn bill_status_str(status: BillStatus) -> &'static str {
    match status {
        BillStatus::Completed => "COMPLETED",
        BillStatus::Interrupted => "INTERRUPTED",
        BillStatus::Cancelled => "CANCELLED",
    }
}

fn bill_status_from_str(s: &str) -> BillStatus {
    match s {
        "INTERRUPTED" => BillStatus::Interrupted,
        "CANCELLED" => BillStatus::Cancelled,
        _ => BillStatus::Completed,
    }
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create database directory: {}", parent.display()))?;
        }

        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("failed to open database: {path}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id    TEXT PRIMARY KEY,
                request_id    TEXT NOT NULL,
                user_id       TEXT NOT NULL,
                pile_id       TEXT NOT NULL,
                target_kwh    REAL NOT NULL,
                delivered_kwh REAL NOT NULL,
                start_at      TEXT NOT NULL,
                end_at        TEXT,
                status        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS bills (
                bill_id       TEXT PRIMARY KEY,
                session_id    TEXT NOT NULL,
                energy_kwh    REAL NOT NULL,
                start_at      TEXT NOT NULL,
                end_at        TEXT NOT NULL,
                energy_cost_cents INTEGER NOT NULL,
                service_cost_cents INTEGER NOT NULL,
                total_cost_cents INTEGER NOT NULL,
                status        TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(session_id)
            );

            CREATE TABLE IF NOT EXISTS bill_day_sequences (
                day_prefix    TEXT PRIMARY KEY,
                next_seq      INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_bills_session ON bills(session_id);",
        )
        .context("failed to initialize database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<R>(&self, f: impl FnOnce(&rusqlite::Connection) -> rusqlite::Result<R>) -> Result<R, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&conn)?)
    }
}

impl SessionBillStore for SqliteStore {
    fn record_session(&self, session: Session) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, request_id, user_id, pile_id, target_kwh, delivered_kwh, start_at, end_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(session_id) DO UPDATE SET
                    delivered_kwh = excluded.delivered_kwh,
                    end_at = excluded.end_at,
                    status = excluded.status",
                params![
                    session.session_id.as_str(),
                    session.request_id.as_str(),
                    session.user_id.as_str(),
                    session.pile_id.as_str(),
                    session.target_kwh,
                    session.delivered_kwh,
                    session.start_at.to_rfc3339(),
                    session.end_at.map(|t| t.to_rfc3339()),
                    session_status_str(session.status),
                ],
            )
        })?;
        Ok(())
    }

    fn record_bill(&self, bill: Bill) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bills (bill_id, session_id, energy_kwh, start_at, end_at, energy_cost_cents, service_cost_cents, total_cost_cents, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    bill.bill_id.as_str(),
                    bill.session_id.as_str(),
                    bill.energy_kwh,
                    bill.start_at.to_rfc3339(),
                    bill.end_at.to_rfc3339(),
                    bill.energy_cost.0,
                    bill.service_cost.0,
                    bill.total_cost.0,
                    bill_status_str(bill.status),
                ],
            )
        })?;
        Ok(())
    }

    fn sessions_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Session>> {
        let sessions = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, request_id, user_id, pile_id, target_kwh, delivered_kwh, start_at, end_at, status
                 FROM sessions WHERE user_id = ?1 ORDER BY start_at ASC",
            )?;
            stmt.query_map(params![user_id.as_str()], |row| {
                let start_at: String = row.get(6)?;
                let end_at: Option<String> = row.get(7)?;
                let status: String = row.get(8)?;
                Ok(Session {
                    session_id: SessionId::from(row.get::<_, String>(0)?),
                    request_id: RequestId::from(row.get::<_, String>(1)?),
                    user_id: UserId::from(row.get::<_, String>(2)?),
                    pile_id: PileId::from(row.get::<_, String>(3)?),
                    target_kwh: row.get(4)?,
                    delivered_kwh: row.get(5)?,
                    start_at: parse_rfc3339(&start_at),
                    end_at: end_at.as_deref().map(parse_rfc3339),
                    status: session_status_from_str(&status),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
        })?;
        Ok(sessions)
    }

    fn bills_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Bill>> {
        let bills = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT b.bill_id, b.session_id, b.energy_kwh, b.start_at, b.end_at,
                        b.energy_cost_cents, b.service_cost_cents, b.total_cost_cents, b.status
                 FROM bills b
                 JOIN sessions s ON s.session_id = b.session_id
                 WHERE s.user_id = ?1
                 ORDER BY b.start_at ASC",
            )?;
            stmt.query_map(params![user_id.as_str()], |row| {
                let start_at: String = row.get(3)?;
                let end_at: String = row.get(4)?;
                let status: String = row.get(8)?;
                Ok(Bill {
                    bill_id: BillId::from(row.get::<_, String>(0)?),
                    session_id: SessionId::from(row.get::<_, String>(1)?),
                    energy_kwh: row.get(2)?,
                    start_at: parse_rfc3339(&start_at),
                    end_at: parse_rfc3339(&end_at),
                    energy_cost: Cents(row.get(5)?),
                    service_cost: Cents(row.get(6)?),
                    total_cost: Cents(row.get(7)?),
                    status: bill_status_from_str(&status),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
        })?;
        Ok(bills)
    }

    fn next_bill_sequence(&self, day_prefix: &str) -> anyhow::Result<u32> {
        let seq = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bill_day_sequences (day_prefix, next_seq) VALUES (?1, 2)
                 ON CONFLICT(day_prefix) DO UPDATE SET next_seq = next_seq + 1",
                params![day_prefix],
            )?;
            conn.query_row(
                "SELECT next_seq FROM bill_day_sequences WHERE day_prefix = ?1",
                params![day_prefix],
                |row| {
                    let next: u32 = row.get(0)?;
                    Ok(next - 1)
                },
            )
        })?;
        Ok(seq)
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("stored timestamp is valid rfc3339")
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_session(id: &str, user: &str) -> Session {
        Session {
            session_id: SessionId::from(id),
            request_id: RequestId::from("REQ1"),
            user_id: UserId::from(user),
            pile_id: PileId::from("A"),
            target_kwh: 10.0,
            delivered_kwh: 10.0,
            start_at: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            end_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap()),
            status: SessionStatus::Completed,
        }
    }

    #[test]
    fn round_trips_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("station.db").to_str().unwrap()).unwrap();
        store.record_session(sample_session("SESS1", "u1")).unwrap();
        let fetched = store.sessions_for_user(&UserId::from("u1")).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].session_id, SessionId::from("SESS1"));
        assert_eq!(fetched[0].delivered_kwh, 10.0);
    }

    #[test]
    fn bill_sequence_is_monotonic_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("station.db").to_str().unwrap()).unwrap();
        assert_eq!(store.next_bill_sequence("20240101").unwrap(), 1);
        assert_eq!(store.next_bill_sequence("20240101").unwrap(), 2);
        assert_eq!(store.next_bill_sequence("20240102").unwrap(), 1);
    }

    #[test]
    fn bills_for_user_joins_through_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("station.db").to_str().unwrap()).unwrap();
        store.record_session(sample_session("SESS1", "u1")).unwrap();
        store
            .record_bill(Bill {
                bill_id: BillId::from("BILL202401010001"),
                session_id: SessionId::from("SESS1"),
                energy_kwh: 10.0,
                start_at: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
                end_at: Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap(),
                energy_cost: Cents(700),
                service_cost: Cents(800),
                total_cost: Cents(1500),
                status: BillStatus::Completed,
            })
            .unwrap();
        let bills = store.bills_for_user(&UserId::from("u1")).unwrap();
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].total_cost.to_string(), "15.00");
    }
}

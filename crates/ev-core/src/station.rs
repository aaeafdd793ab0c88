//! The station: one process, one set of piles, one waiting area. Ties
//! together C1-C7, C9, and C10 behind the command surface C8 specifies.
//!
//! The struct's field declaration order documents the lock-ordering rule
//! from §5: a reviewer reads top-to-bottom and sees the order in which
//! locks must be acquired when a single operation needs more than one.
//! Piles are stored sorted by `pile_id` and always locked in that order
//! when an operation (fault redistribution, a dispatch pass) must hold
//! more than one at a time.

use crate::clock::Clock;
use crate::config::StationConfig;
use crate::dispatcher::{self, DispatchTrigger};
use crate::error::DispatchError;
use crate::fault::{self, FaultOutcome, RecoverOutcome};
use crate::model::{Bill, Pile, Request, Session};
use crate::pile::{self, EndReason};
use crate::queue;
use crate::store::{format_bill_id, SessionBillStore};
use crate::tariff::TariffSchedule;
use crate::waiting_area::WaitingArea;
use chrono::{DateTime, Utc};
use ev_shared::{
    BillStatus, ChargeMode, DispatchPolicy, PileId, PileStatus, RequestId, RequestStatus,
    SessionId, SessionStatus, UserId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A snapshot returned by `get_status`, assembled from whichever of the
/// waiting area / pile queue / pile session currently holds the request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestStatusView {
    pub request_id: RequestId,
    pub queue_number: String,
    pub mode: ChargeMode,
    pub status: RequestStatus,
    pub target_kwh: f64,
    pub delivered_kwh: Option<f64>,
    pub assigned_pile_id: Option<PileId>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SessionRecord {
    pub session: Session,
    pub bill: Option<Bill>,
}

pub struct Station {
    dispatch_paused: RwLock<bool>,
    dispatch_policy: RwLock<DispatchPolicy>,
    waiting_area: Mutex<WaitingArea>,
    piles: Vec<Mutex<Pile>>,
    pile_index: HashMap<PileId, usize>,
    requests: Mutex<HashMap<RequestId, Request>>,
    store: Arc<dyn SessionBillStore>,

    clock: Arc<dyn Clock>,
    tariff: TariffSchedule,
    tz: chrono_tz::Tz,
    command_timeout_secs: u64,
    command_retry_attempts: u32,
    request_seq: AtomicU64,
    session_seq: AtomicU64,
    trigger_tx: Mutex<Option<crossbeam_channel::Sender<DispatchTrigger>>>,
}

impl Station {
    #[must_use]
    pub fn new(config: &StationConfig, clock: Arc<dyn Clock>, store: Arc<dyn SessionBillStore>) -> Self {
        let mut pile_configs = config.piles.clone();
        pile_configs.sort_by(|a, b| a.pile_id.cmp(&b.pile_id));

        let mut piles = Vec::with_capacity(pile_configs.len());
        let mut pile_index = HashMap::with_capacity(pile_configs.len());
        for (idx, pc) in pile_configs.iter().enumerate() {
            let pile_id = PileId::from(pc.pile_id.clone());
            piles.push(Mutex::new(Pile::new(pile_id.clone(), pc.pile_type, pc.power_kw)));
            pile_index.insert(pile_id, idx);
        }

        Self {
            dispatch_paused: RwLock::new(false),
            dispatch_policy: RwLock::new(config.dispatch_policy),
            waiting_area: Mutex::new(WaitingArea::new(config.waiting_area_capacity)),
            piles,
            pile_index,
            requests: Mutex::new(HashMap::new()),
            store,
            clock,
            tariff: config.tariff.clone(),
            tz: chrono_tz::UTC,
            command_timeout_secs: config.command_timeout_secs,
            command_retry_attempts: config.command_retry_attempts,
            request_seq: AtomicU64::new(0),
            session_seq: AtomicU64::new(0),
            trigger_tx: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn attach_trigger_sender(&self, tx: crossbeam_channel::Sender<DispatchTrigger>) {
        *self.trigger_tx.lock() = Some(tx);
    }

    fn trigger(&self, t: DispatchTrigger) {
        if let Some(tx) = self.trigger_tx.lock().as_ref() {
            let _ = tx.send(t);
        }
    }

    fn next_request_id(&self) -> RequestId {
        let n = self.request_seq.fetch_add(1, Ordering::Relaxed) + 1;
        RequestId::from(format!("REQ{n}"))
    }

    fn next_session_id(&self) -> SessionId {
        let n = self.session_seq.fetch_add(1, Ordering::Relaxed) + 1;
        SessionId::from(format!("SESS{n}"))
    }

    fn pile_ids_sorted(&self) -> Vec<PileId> {
        let mut ids: Vec<PileId> = self.pile_index.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn pile_lock(&self, pile_id: &PileId) -> Option<&Mutex<Pile>> {
        self.pile_index.get(pile_id).map(|&idx| &self.piles[idx])
    }

    fn has_active_request(&self, user_id: &UserId) -> bool {
        self.requests
            .lock()
            .values()
            .any(|r| &r.user_id == user_id && !r.status.is_terminal())
    }

    // ---- C8 user-facing command surface ----------------------------------

    pub fn submit_request(
        &self,
        user_id: UserId,
        mode: ChargeMode,
        target_kwh: f64,
    ) -> Result<Request, DispatchError> {
        if target_kwh <= 0.0 {
            return Err(DispatchError::InvalidTarget);
        }
        if self.has_active_request(&user_id) {
            return Err(DispatchError::DuplicateActiveRequest(user_id));
        }

        let request_id = self.next_request_id();
        let now = self.now();
        let mut wa = self.waiting_area.lock();
        if self.has_active_request(&user_id) {
            // Re-check under the waiting-area lock per §5's guidance that
            // the per-user index is updated under that lock.
            return Err(DispatchError::DuplicateActiveRequest(user_id));
        }
        let request = wa.admit(request_id, user_id, mode, target_kwh, now)?;
        self.requests.lock().insert(request.request_id.clone(), request.clone());
        drop(wa);

        self.trigger(DispatchTrigger::NewAdmission);
        Ok(request)
    }

    #[must_use]
    pub fn get_status(&self, user_id: &UserId) -> Option<RequestStatusView> {
        let requests = self.requests.lock();
        let request = requests
            .values()
            .find(|r| &r.user_id == user_id && !r.status.is_terminal())?
            .clone();
        drop(requests);

        let delivered_kwh = request.assigned_pile_id.as_ref().and_then(|pid| {
            self.pile_lock(pid).and_then(|m| {
                let pile = m.lock();
                pile.current
                    .as_ref()
                    .filter(|s| s.user_id == request.user_id)
                    .map(|s| s.delivered_kwh)
            })
        });

        Some(RequestStatusView {
            request_id: request.request_id,
            queue_number: request.queue_number,
            mode: request.mode,
            status: request.status,
            target_kwh: request.target_kwh,
            delivered_kwh,
            assigned_pile_id: request.assigned_pile_id,
        })
    }

    pub fn modify_target(&self, user_id: &UserId, new_kwh: f64) -> Result<(), DispatchError> {
        let request_id = self.active_waiting_request_id(user_id)?;
        let mut wa = self.waiting_area.lock();
        wa.change_target_kwh(&request_id, new_kwh)?;
        drop(wa);
        if let Some(r) = self.requests.lock().get_mut(&request_id) {
            r.target_kwh = new_kwh;
        }
        Ok(())
    }

    pub fn modify_mode(&self, user_id: &UserId, new_mode: ChargeMode) -> Result<String, DispatchError> {
        let request_id = self.active_waiting_request_id(user_id)?;
        let mut wa = self.waiting_area.lock();
        let new_number = wa.change_mode(&request_id, new_mode)?;
        drop(wa);
        if let Some(r) = self.requests.lock().get_mut(&request_id) {
            r.mode = new_mode;
            r.queue_number = new_number.clone();
        }
        Ok(new_number)
    }

    fn active_waiting_request_id(&self, user_id: &UserId) -> Result<RequestId, DispatchError> {
        let requests = self.requests.lock();
        requests
            .values()
            .find(|r| &r.user_id == user_id && r.status == RequestStatus::Waiting)
            .map(|r| r.request_id.clone())
            .ok_or(DispatchError::NotInWaiting)
    }

    /// Idempotent: cancelling an already-terminal request returns `Ok(())`
    /// with no effect, per §5's cancellation rule.
    pub fn cancel(&self, user_id: &UserId, request_id: &RequestId) -> Result<(), DispatchError> {
        let status = {
            let requests = self.requests.lock();
            requests
                .get(request_id)
                .filter(|r| &r.user_id == user_id)
                .map(|r| r.status)
                .ok_or_else(|| DispatchError::RequestNotFound(request_id.clone()))?
        };

        if status.is_terminal() {
            return Ok(());
        }

        match status {
            RequestStatus::Waiting => {
                self.waiting_area.lock().remove(request_id);
                self.set_request_status(request_id, RequestStatus::Cancelled);
                self.trigger(DispatchTrigger::SlotFreed);
            }
            RequestStatus::Queued => {
                let pile_id = self.assigned_pile_of(request_id);
                if let Some(pile_id) = pile_id {
                    if let Some(lock) = self.pile_lock(&pile_id) {
                        lock.lock().waiting = None;
                    }
                }
                self.set_request_status(request_id, RequestStatus::Cancelled);
                self.trigger(DispatchTrigger::SlotFreed);
            }
            RequestStatus::Charging => {
                self.stop_charging_internal(user_id, request_id, EndReason::UserCancel)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn assigned_pile_of(&self, request_id: &RequestId) -> Option<PileId> {
        self.requests.lock().get(request_id).and_then(|r| r.assigned_pile_id.clone())
    }

    fn set_request_status(&self, request_id: &RequestId, status: RequestStatus) {
        if let Some(r) = self.requests.lock().get_mut(request_id) {
            r.status = status;
        }
    }

    pub fn stop_charging(&self, user_id: &UserId) -> Result<Option<Bill>, DispatchError> {
        let request_id = {
            let requests = self.requests.lock();
            requests
                .values()
                .find(|r| &r.user_id == user_id && r.status == RequestStatus::Charging)
                .map(|r| r.request_id.clone())
                .ok_or_else(|| DispatchError::NoActiveSession(user_id.clone()))?
        };
        self.stop_charging_internal(user_id, &request_id, EndReason::UserCancel)
    }

    fn stop_charging_internal(
        &self,
        _user_id: &UserId,
        request_id: &RequestId,
        reason: EndReason,
    ) -> Result<Option<Bill>, DispatchError> {
        let pile_id = self
            .assigned_pile_of(request_id)
            .ok_or_else(|| DispatchError::RequestNotFound(request_id.clone()))?;
        let lock = self
            .pile_lock(&pile_id)
            .ok_or_else(|| DispatchError::PileNotFound(pile_id.clone()))?;

        let now = self.now();
        let (finished, promoted_session_id) = {
            let mut pile = lock.lock();
            let finished = pile::end_session(&mut pile, now, reason);
            let promoted = if finished.is_some() && pile.waiting.is_some() {
                let sid = self.next_session_id();
                queue::on_session_end(&mut pile, sid.clone(), now);
                Some(sid)
            } else {
                None
            };
            (finished, promoted)
        };

        let Some(finished) = finished else {
            return Ok(None);
        };

        self.set_request_status(request_id, RequestStatus::Completed);

        let bill = self.settle(&finished, BillStatus::Cancelled, now)?;

        if promoted_session_id.is_some() {
            if let Some(waiting_request_id) = self.find_request_by_pile_waiting_promotion(&pile_id) {
                self.set_request_status(&waiting_request_id, RequestStatus::Charging);
            }
        }

        self.trigger(DispatchTrigger::SlotFreed);
        Ok(bill)
    }

    fn find_request_by_pile_waiting_promotion(&self, pile_id: &PileId) -> Option<RequestId> {
        let lock = self.pile_lock(pile_id)?;
        let pile = lock.lock();
        let current = pile.current.as_ref()?;
        Some(current.request_id.clone())
    }

    /// Produces and persists the session + bill for a just-finished pile
    /// session, if it delivered any energy (§3: "Created exactly once per
    /// terminated session with `delivered_kwh > 0`").
    fn settle(
        &self,
        finished: &pile::FinishedSession,
        terminal_status: BillStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Bill>, DispatchError> {
        let session_status = match finished.reason {
            EndReason::Completed => SessionStatus::Completed,
            EndReason::UserCancel => SessionStatus::Cancelled,
            EndReason::PileFault => SessionStatus::Interrupted,
            EndReason::CommandTimeout => SessionStatus::Interrupted,
        };
        let session = Session {
            session_id: finished.session_id.clone(),
            request_id: finished.request_id.clone(),
            user_id: finished.user_id.clone(),
            pile_id: finished.pile_id.clone(),
            target_kwh: finished.target_kwh,
            delivered_kwh: finished.delivered_kwh,
            start_at: finished.start_at,
            end_at: Some(finished.end_at),
            status: session_status,
        };
        self.store
            .record_session(session)
            .map_err(|e| DispatchError::Persistence(e.to_string()))?;

        if finished.delivered_kwh <= 0.0 {
            return Ok(None);
        }

        let bill_status = match finished.reason {
            EndReason::Completed => BillStatus::Completed,
            EndReason::UserCancel => BillStatus::Cancelled,
            EndReason::PileFault | EndReason::CommandTimeout => terminal_status,
        };

        let priced = self
            .tariff
            .compute_cost(finished.delivered_kwh, finished.start_at, finished.end_at, self.tz)
            .expect("tariff inputs are validated before settlement");

        let day_prefix = now.format("%Y%m%d").to_string();
        let seq = self
            .store
            .next_bill_sequence(&day_prefix)
            .map_err(|e| DispatchError::Persistence(e.to_string()))?;
        let bill = Bill {
            bill_id: format_bill_id(&day_prefix, seq),
            session_id: finished.session_id.clone(),
            energy_kwh: finished.delivered_kwh,
            start_at: finished.start_at,
            end_at: finished.end_at,
            energy_cost: priced.energy_cost,
            service_cost: priced.service_cost,
            total_cost: priced.total_cost(),
            status: bill_status,
        };
        self.store
            .record_bill(bill.clone())
            .map_err(|e| DispatchError::Persistence(e.to_string()))?;
        Ok(Some(bill))
    }

    pub fn list_records(&self, user_id: &UserId) -> Result<Vec<SessionRecord>, DispatchError> {
        let sessions = self
            .store
            .sessions_for_user(user_id)
            .map_err(|e| DispatchError::Persistence(e.to_string()))?;
        let bills = self
            .store
            .bills_for_user(user_id)
            .map_err(|e| DispatchError::Persistence(e.to_string()))?;
        Ok(sessions
            .into_iter()
            .map(|session| {
                let bill = bills.iter().find(|b| b.session_id == session.session_id).cloned();
                SessionRecord { session, bill }
            })
            .collect())
    }

    // ---- Admin surface -----------------------------------------------------

    pub fn set_fault(&self, pile_id: &PileId, reason: &str) -> Result<FaultOutcome, DispatchError> {
        fault::on_fault(self, pile_id, reason)
    }

    pub fn recover(&self, pile_id: &PileId) -> Result<RecoverOutcome, DispatchError> {
        fault::on_recover(self, pile_id)
    }

    pub fn set_dispatch_policy(&self, policy: DispatchPolicy) {
        *self.dispatch_policy.write() = policy;
    }

    #[must_use]
    pub fn dispatch_policy(&self) -> DispatchPolicy {
        *self.dispatch_policy.read()
    }

    #[must_use]
    pub fn pile_snapshot(&self, pile_id: &PileId) -> Option<Pile> {
        self.pile_lock(pile_id).map(|m| m.lock().clone())
    }

    #[must_use]
    pub fn all_pile_snapshots(&self) -> Vec<Pile> {
        self.piles.iter().map(|m| m.lock().clone()).collect()
    }

    pub fn mark_pile_offline(&self, pile_id: &PileId) {
        if let Some(lock) = self.pile_lock(pile_id) {
            pile::go_offline(&mut lock.lock());
        }
    }

    pub fn restore_pile_from_offline(&self, pile_id: &PileId, last_known: PileStatus) {
        if let Some(lock) = self.pile_lock(pile_id) {
            pile::restore_from_offline(&mut lock.lock(), last_known);
        }
        self.trigger(DispatchTrigger::RecoveryEvent);
    }

    // ---- Internals shared with dispatcher/fault modules --------------------

    pub(crate) fn pause_dispatch(&self) {
        *self.dispatch_paused.write() = true;
    }

    pub(crate) fn resume_dispatch(&self) {
        *self.dispatch_paused.write() = false;
    }

    pub(crate) fn is_dispatch_paused(&self) -> bool {
        *self.dispatch_paused.read()
    }

    pub(crate) fn waiting_area(&self) -> &Mutex<WaitingArea> {
        &self.waiting_area
    }

    pub fn pile_ids(&self) -> Vec<PileId> {
        self.pile_ids_sorted()
    }

    pub(crate) fn with_pile<R>(&self, pile_id: &PileId, f: impl FnOnce(&mut Pile) -> R) -> Option<R> {
        self.pile_lock(pile_id).map(|m| {
            let mut guard = m.lock();
            f(&mut guard)
        })
    }

    pub(crate) fn all_piles_cloned(&self) -> Vec<(PileId, Pile)> {
        self.pile_ids_sorted()
            .into_iter()
            .filter_map(|id| self.pile_snapshot(&id).map(|p| (id, p)))
            .collect()
    }

    /// Per-user re-entrance guard: true if `user_id` already holds a
    /// charging or waiting slot on any pile. Checked before every
    /// `try_reserve` call so a user can never be seated twice under a
    /// race between normal dispatch and a concurrent fault/recovery pass.
    pub(crate) fn user_occupies_any_pile(&self, user_id: &UserId) -> bool {
        self.all_piles_cloned().into_iter().any(|(_, pile)| {
            pile.current.as_ref().map(|s| &s.user_id == user_id).unwrap_or(false)
                || pile.waiting.as_ref().map(|w| &w.user_id == user_id).unwrap_or(false)
        })
    }

    pub(crate) fn next_session_id_pub(&self) -> SessionId {
        self.next_session_id()
    }

    pub(crate) fn set_request_status_pub(&self, request_id: &RequestId, status: RequestStatus) {
        self.set_request_status(request_id, status);
    }

    pub(crate) fn set_request_assigned_pile(&self, request_id: &RequestId, pile_id: Option<PileId>, status: RequestStatus) {
        if let Some(r) = self.requests.lock().get_mut(request_id) {
            r.assigned_pile_id = pile_id;
            r.status = status;
        }
    }

    pub(crate) fn insert_request(&self, request: Request) {
        self.requests.lock().insert(request.request_id.clone(), request);
    }

    pub(crate) fn get_request(&self, request_id: &RequestId) -> Option<Request> {
        self.requests.lock().get(request_id).cloned()
    }

    pub(crate) fn settle_pub(
        &self,
        finished: &pile::FinishedSession,
        terminal_status: BillStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Bill>, DispatchError> {
        self.settle(finished, terminal_status, now)
    }

    /// Runs one pass of the selection rule for both modes. Called by the
    /// background dispatcher task and, in tests, directly.
    pub fn run_dispatch_pass(&self) {
        if self.is_dispatch_paused() {
            return;
        }
        for mode in [ChargeMode::Fast, ChargeMode::Trickle] {
            loop {
                let candidate = {
                    let wa = self.waiting_area.lock();
                    wa.head_of(mode).cloned()
                };
                let Some(candidate) = candidate else { break };

                if self.user_occupies_any_pile(&candidate.user_id) {
                    // Already seated elsewhere — e.g. a concurrent fault
                    // redistribution (run off another thread) reserved a
                    // slot for this user between this pass reading the
                    // waiting head and now. Leave the candidate queued and
                    // stop dispatching this mode; it will resolve on the
                    // next pass once the race has settled.
                    break;
                }

                let piles = self.all_piles_cloned();
                let Some(winner) = dispatcher::select_pile(&piles, mode, candidate.target_kwh) else {
                    break;
                };

                let now = self.now();
                let session_id = self.next_session_id();
                let reserved = self
                    .with_pile(&winner, |pile| {
                        queue::try_reserve(
                            pile,
                            session_id.clone(),
                            candidate.request_id.clone(),
                            candidate.user_id.clone(),
                            candidate.target_kwh,
                            now,
                        )
                    })
                    .unwrap_or(false);

                if !reserved {
                    // Lost a race against a concurrent admin action; try
                    // again next loop iteration rather than stalling the
                    // whole mode.
                    continue;
                }

                let mut wa = self.waiting_area.lock();
                wa.pop_head(mode);
                drop(wa);

                let new_status = self
                    .with_pile(&winner, |pile| {
                        if pile.current.as_ref().map(|s| s.request_id == candidate.request_id).unwrap_or(false) {
                            RequestStatus::Charging
                        } else {
                            RequestStatus::Queued
                        }
                    })
                    .unwrap_or(RequestStatus::Queued);

                self.set_request_assigned_pile(&candidate.request_id, Some(winner), new_status);
            }
        }
    }

    /// Integrates charging progress across every pile by `elapsed_secs`,
    /// settling any session that reaches its target. Called by a
    /// tokio-interval scanner task.
    pub fn tick_progress_all(&self, elapsed_secs: f64) {
        let now = self.now();
        for pile_id in self.pile_ids_sorted() {
            let Some(lock) = self.pile_lock(&pile_id) else { continue };

            let (completed, promoted_session_id, request_id) = {
                let mut pile = lock.lock();
                if pile.current.is_none() {
                    (None, None, None)
                } else {
                    let reached = pile::tick_progress(&mut pile, elapsed_secs);
                    if reached {
                        let request_id = pile.current.as_ref().map(|s| s.request_id.clone());
                        let finished = pile::end_session(&mut pile, now, EndReason::Completed);
                        let promoted = if pile.waiting.is_some() {
                            let sid = self.next_session_id();
                            queue::on_session_end(&mut pile, sid.clone(), now);
                            Some(sid)
                        } else {
                            None
                        };
                        (finished, promoted, request_id)
                    } else {
                        (None, None, None)
                    }
                }
            };

            if let Some(finished) = completed {
                if let Some(request_id) = &request_id {
                    self.set_request_status(request_id, RequestStatus::Completed);
                }
                if let Err(e) = self.settle(&finished, BillStatus::Completed, now) {
                    tracing::error!(error = %e, %pile_id, "failed to settle completed session");
                }
                if promoted_session_id.is_some() {
                    if let Some(waiting_request_id) = self.find_request_by_pile_waiting_promotion(&pile_id) {
                        self.set_request_status(&waiting_request_id, RequestStatus::Charging);
                    }
                }
                self.trigger(DispatchTrigger::SlotFreed);
            }
        }
    }

    #[must_use]
    pub fn command_timeout_secs(&self) -> u64 {
        self.command_timeout_secs
    }

    #[must_use]
    pub fn command_retry_attempts(&self) -> u32 {
        self.command_retry_attempts
    }
}

//! Fault Coordinator (C7): evacuates a faulted pile's reservations and
//! re-plans them under the station's configured policy, or rebalances
//! free capacity across waiting requests when a pile recovers.

use crate::dispatcher;
use crate::error::DispatchError;
use crate::model::{Bill, Request};
use crate::pile;
use crate::queue;
use crate::station::Station;
use ev_shared::{BillStatus, ChargeMode, DispatchPolicy, PileId, RequestId, RequestStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct FaultOutcome {
    pub affected_requests: Vec<RequestId>,
    pub bills_settled: Vec<Bill>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoverOutcome {
    pub rescheduled_requests: Vec<RequestId>,
}

/// An evicted occupant still carrying its original `Request` record, so
/// its `queue_number` survives the round trip back to the Waiting Area.
struct Pending {
    request: Request,
    remaining_target_kwh: f64,
}

pub fn on_fault(station: &Station, pile_id: &PileId, _reason: &str) -> Result<FaultOutcome, DispatchError> {
    if station.pile_ids().iter().all(|id| id != pile_id) {
        return Err(DispatchError::PileNotFound(pile_id.clone()));
    }

    station.pause_dispatch();

    let now = station.now();
    let (evicted, finished) = station
        .with_pile(pile_id, |pile| queue::evict_all(pile, now))
        .expect("pile existence checked above");

    station.with_pile(pile_id, |pile| pile.status = ev_shared::PileStatus::Fault);

    let mut bills_settled = Vec::new();
    if let Some(finished) = &finished {
        station.set_request_status_pub(&finished.request_id, RequestStatus::Interrupted);
        match station.settle_pub(finished, BillStatus::Interrupted, now) {
            Ok(Some(bill)) => bills_settled.push(bill),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, %pile_id, "failed to settle session evicted by fault"),
        }
    }

    let mode = station
        .with_pile(pile_id, |pile| pile.mode())
        .unwrap_or(ChargeMode::Fast);

    let mut pending: Vec<Pending> = evicted
        .into_iter()
        .filter_map(|e| {
            let request = station.get_request(&e.request_id)?;
            Some(Pending {
                request,
                remaining_target_kwh: e.remaining_target_kwh,
            })
        })
        .collect();

    let policy = station.dispatch_policy();
    if policy == DispatchPolicy::TimeOrder {
        for other in station.pile_ids() {
            if &other == pile_id {
                continue;
            }
            let same_mode = station.with_pile(&other, |p| p.mode()).map(|m| m == mode).unwrap_or(false);
            if !same_mode {
                continue;
            }
            let evicted_waiting = station.with_pile(&other, |p| p.waiting.take());
            if let Some(Some(w)) = evicted_waiting {
                if let Some(request) = station.get_request(&w.request_id) {
                    pending.push(Pending {
                        request,
                        remaining_target_kwh: w.target_kwh,
                    });
                }
            }
        }
    }

    pending.sort_by(|a, b| a.request.queue_number.cmp(&b.request.queue_number));

    let affected_requests: Vec<RequestId> = pending.iter().map(|p| p.request.request_id.clone()).collect();
    let leftover = redistribute(station, mode, pending);
    requeue_leftover(station, leftover);

    station.resume_dispatch();
    station.run_dispatch_pass();

    Ok(FaultOutcome {
        affected_requests,
        bills_settled,
    })
}

pub fn on_recover(station: &Station, pile_id: &PileId) -> Result<RecoverOutcome, DispatchError> {
    if station.pile_ids().iter().all(|id| id != pile_id) {
        return Err(DispatchError::PileNotFound(pile_id.clone()));
    }

    station.with_pile(pile_id, pile::recover);

    station.pause_dispatch();

    let mode = station
        .with_pile(pile_id, |p| p.mode())
        .unwrap_or(ChargeMode::Fast);

    let mut pending = Vec::new();
    for other in station.pile_ids() {
        if &other == pile_id {
            continue;
        }
        let same_mode = station.with_pile(&other, |p| p.mode()).map(|m| m == mode).unwrap_or(false);
        if !same_mode {
            continue;
        }
        let evicted_waiting = station.with_pile(&other, |p| p.waiting.take());
        if let Some(Some(w)) = evicted_waiting {
            if let Some(request) = station.get_request(&w.request_id) {
                pending.push(Pending {
                    request,
                    remaining_target_kwh: w.target_kwh,
                });
            }
        }
    }

    pending.sort_by(|a, b| a.request.queue_number.cmp(&b.request.queue_number));
    let rescheduled_requests: Vec<RequestId> = pending.iter().map(|p| p.request.request_id.clone()).collect();

    let leftover = redistribute(station, mode, pending);
    requeue_leftover(station, leftover);

    station.resume_dispatch();
    station.run_dispatch_pass();

    Ok(RecoverOutcome { rescheduled_requests })
}

/// Attempts to seat every pending request, restricted to `mode`'s piles,
/// via the Dispatcher's own selection rule. Returns the ones that found no
/// slot, in their original (queue-number-sorted) order.
fn redistribute(station: &Station, mode: ChargeMode, pending: Vec<Pending>) -> Vec<Pending> {
    let mut leftover = Vec::new();
    for item in pending {
        if station.user_occupies_any_pile(&item.request.user_id) {
            // Already seated elsewhere — e.g. normal dispatch reserved a
            // slot for this user between eviction and this redistribution
            // pass. Don't double-seat; let it fall back to the waiting
            // area like any other slot that couldn't be found.
            leftover.push(item);
            continue;
        }

        let piles = station.all_piles_cloned();
        let Some(winner) = dispatcher::select_pile(&piles, mode, item.remaining_target_kwh) else {
            leftover.push(item);
            continue;
        };

        let now = station.now();
        let session_id = station.next_session_id_pub();
        let reserved = station
            .with_pile(&winner, |pile| {
                queue::try_reserve(
                    pile,
                    session_id.clone(),
                    item.request.request_id.clone(),
                    item.request.user_id.clone(),
                    item.remaining_target_kwh,
                    now,
                )
            })
            .unwrap_or(false);

        if !reserved {
            leftover.push(item);
            continue;
        }

        let new_status = station
            .with_pile(&winner, |pile| {
                if pile
                    .current
                    .as_ref()
                    .map(|s| s.request_id == item.request.request_id)
                    .unwrap_or(false)
                {
                    RequestStatus::Charging
                } else {
                    RequestStatus::Queued
                }
            })
            .unwrap_or(RequestStatus::Queued);

        station.set_request_assigned_pile(&item.request.request_id, Some(winner), new_status);
    }
    leftover
}

/// Pushes leftovers back to the head of their mode's Waiting Area
/// partition, preserving queue-number order (pushed in reverse so the
/// lowest queue number ends up frontmost).
fn requeue_leftover(station: &Station, leftover: Vec<Pending>) {
    let mut wa = station.waiting_area().lock();
    for item in leftover.into_iter().rev() {
        let mut request = item.request;
        request.target_kwh = item.remaining_target_kwh;
        request.status = RequestStatus::Waiting;
        request.assigned_pile_id = None;
        station.set_request_assigned_pile(&request.request_id, None, RequestStatus::Waiting);
        wa.push_front(request);
    }
}

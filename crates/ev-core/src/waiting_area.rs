//! Bounded FIFO admission queue (C4), partitioned by charge mode. Queue
//! numbers are assigned from a monotonic per-mode counter and formatted
//! `F{n}`/`T{n}` — the counter never rewinds, even when a request leaves
//! the area (cancel, dispatch, or mode change).

use crate::error::DispatchError;
use crate::model::Request;
use chrono::{DateTime, Utc};
use ev_shared::{ChargeMode, RequestId, RequestStatus, UserId};
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct ModeQueue {
    next_number: u64,
    requests: VecDeque<Request>,
}

/// Holds the two mode partitions plus the shared capacity limit.
#[derive(Debug)]
pub struct WaitingArea {
    capacity: usize,
    fast: ModeQueue,
    trickle: ModeQueue,
}

impl WaitingArea {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            fast: ModeQueue::default(),
            trickle: ModeQueue::default(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fast.requests.len() + self.trickle.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn partition(&self, mode: ChargeMode) -> &ModeQueue {
        match mode {
            ChargeMode::Fast => &self.fast,
            ChargeMode::Trickle => &self.trickle,
        }
    }

    fn partition_mut(&mut self, mode: ChargeMode) -> &mut ModeQueue {
        match mode {
            ChargeMode::Fast => &mut self.fast,
            ChargeMode::Trickle => &mut self.trickle,
        }
    }

    fn next_queue_number(&mut self, mode: ChargeMode) -> String {
        let partition = self.partition_mut(mode);
        partition.next_number += 1;
        format!("{}{}", mode.queue_prefix(), partition.next_number)
    }

    /// Admits a new request at the tail of its mode partition. Callers are
    /// responsible for the cross-partition "one non-terminal request per
    /// user" check (invariant 1), since that check spans both partitions
    /// plus the pile queues and belongs to the station, not this area.
    pub fn admit(
        &mut self,
        request_id: RequestId,
        user_id: UserId,
        mode: ChargeMode,
        target_kwh: f64,
        now: DateTime<Utc>,
    ) -> Result<Request, DispatchError> {
        if target_kwh <= 0.0 {
            return Err(DispatchError::InvalidTarget);
        }
        if self.len() >= self.capacity {
            return Err(DispatchError::WaitingAreaFull);
        }

        let queue_number = self.next_queue_number(mode);
        let request = Request {
            request_id,
            user_id,
            mode,
            target_kwh,
            queue_number,
            status: RequestStatus::Waiting,
            created_at: now,
            assigned_pile_id: None,
        };
        self.partition_mut(mode).requests.push_back(request.clone());
        Ok(request)
    }

    /// The oldest request of `mode`, without removing it.
    #[must_use]
    pub fn head_of(&self, mode: ChargeMode) -> Option<&Request> {
        self.partition(mode).requests.front()
    }

    /// Removes and returns the head of `mode`. Called by the Dispatcher
    /// once it has successfully reserved a pile slot for that request.
    pub fn pop_head(&mut self, mode: ChargeMode) -> Option<Request> {
        self.partition_mut(mode).requests.pop_front()
    }

    /// Re-inserts `request` at the head of its mode partition, preserving
    /// its original `queue_number` — used by the Fault Coordinator to give
    /// evicted requests priority over ordinary admissions.
    pub fn push_front(&mut self, request: Request) {
        let mode = request.mode;
        self.partition_mut(mode).requests.push_front(request);
    }

    fn find_index(&self, request_id: &RequestId) -> Option<(ChargeMode, usize)> {
        for mode in [ChargeMode::Fast, ChargeMode::Trickle] {
            if let Some(idx) = self
                .partition(mode)
                .requests
                .iter()
                .position(|r| &r.request_id == request_id)
            {
                return Some((mode, idx));
            }
        }
        None
    }

    /// Allowed only while the request is still `WAITING`.
    pub fn change_target_kwh(
        &mut self,
        request_id: &RequestId,
        new_kwh: f64,
    ) -> Result<(), DispatchError> {
        if new_kwh <= 0.0 {
            return Err(DispatchError::InvalidTarget);
        }
        let (mode, idx) = self
            .find_index(request_id)
            .ok_or(DispatchError::NotInWaiting)?;
        self.partition_mut(mode).requests[idx].target_kwh = new_kwh;
        Ok(())
    }

    /// Removes the request from its current partition, assigns a fresh
    /// queue number under `new_mode`, and re-appends it at the new
    /// partition's tail. The old partition's counter is left untouched.
    pub fn change_mode(
        &mut self,
        request_id: &RequestId,
        new_mode: ChargeMode,
    ) -> Result<String, DispatchError> {
        let (old_mode, idx) = self
            .find_index(request_id)
            .ok_or(DispatchError::NotInWaiting)?;
        if old_mode == new_mode {
            return Err(DispatchError::SameMode);
        }
        let mut request = self.partition_mut(old_mode).requests.remove(idx).unwrap();
        let queue_number = self.next_queue_number(new_mode);
        request.mode = new_mode;
        request.queue_number = queue_number.clone();
        self.partition_mut(new_mode).requests.push_back(request);
        Ok(queue_number)
    }

    /// Removes the request entirely; callers mark it `CANCELLED` on their
    /// own `Request` record. Returns `false` if it was not in the area
    /// (already dispatched, or unknown).
    pub fn remove(&mut self, request_id: &RequestId) -> bool {
        match self.find_index(request_id) {
            Some((mode, idx)) => {
                self.partition_mut(mode).requests.remove(idx);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn assigns_sequential_queue_numbers_per_mode() {
        let mut wa = WaitingArea::new(6);
        let r1 = wa
            .admit(RequestId::from("r1"), UserId::from("u1"), ChargeMode::Fast, 10.0, now())
            .unwrap();
        let r2 = wa
            .admit(RequestId::from("r2"), UserId::from("u2"), ChargeMode::Fast, 10.0, now())
            .unwrap();
        let r3 = wa
            .admit(RequestId::from("r3"), UserId::from("u3"), ChargeMode::Trickle, 5.0, now())
            .unwrap();
        assert_eq!(r1.queue_number, "F1");
        assert_eq!(r2.queue_number, "F2");
        assert_eq!(r3.queue_number, "T1");
    }

    #[test]
    fn rejects_admission_over_capacity() {
        let mut wa = WaitingArea::new(1);
        wa.admit(RequestId::from("r1"), UserId::from("u1"), ChargeMode::Fast, 10.0, now())
            .unwrap();
        let err = wa
            .admit(RequestId::from("r2"), UserId::from("u2"), ChargeMode::Fast, 10.0, now())
            .unwrap_err();
        assert_eq!(err, DispatchError::WaitingAreaFull);
    }

    #[test]
    fn change_mode_assigns_new_number_and_does_not_rewind_old_counter() {
        let mut wa = WaitingArea::new(6);
        let r1 = wa
            .admit(RequestId::from("r1"), UserId::from("u1"), ChargeMode::Fast, 10.0, now())
            .unwrap();
        let new_number = wa.change_mode(&r1.request_id, ChargeMode::Trickle).unwrap();
        assert_eq!(new_number, "T1");
        // Next fast admission still gets F2, not F1 reused.
        let r2 = wa
            .admit(RequestId::from("r2"), UserId::from("u2"), ChargeMode::Fast, 10.0, now())
            .unwrap();
        assert_eq!(r2.queue_number, "F2");
    }

    #[test]
    fn fifo_head_order_preserved() {
        let mut wa = WaitingArea::new(6);
        wa.admit(RequestId::from("r1"), UserId::from("u1"), ChargeMode::Fast, 10.0, now())
            .unwrap();
        wa.admit(RequestId::from("r2"), UserId::from("u2"), ChargeMode::Fast, 10.0, now())
            .unwrap();
        assert_eq!(wa.head_of(ChargeMode::Fast).unwrap().request_id, RequestId::from("r1"));
    }
}

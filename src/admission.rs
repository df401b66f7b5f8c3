//! Concurrency-limited admission of new calls (C1). See SPEC_FULL.md §4.1.
//!
//! The controller itself never touches a [`crate::call::Call`]; it only
//! decides whether a freshly-submitted `InitiateCallRequest` may proceed
//! immediately or must wait in the FIFO pending queue, and which queued
//! request gets the slot a finished call frees up.

use std::collections::VecDeque;

use crate::config::Config;
use crate::protocol::ReqId;

/// A request that arrived while the core was already at capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    pub req_id: ReqId,
    pub party: String,
}

/// Outcome of [`AdmissionController::try_admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was free; the request should be forwarded immediately.
    Admitted,
    /// At capacity; the request was appended to the pending queue.
    Queued,
}

#[derive(Debug)]
pub struct AdmissionController {
    capacity: u32,
    active_count: u32,
    pending: VecDeque<PendingCall>,
}

impl AdmissionController {
    pub fn new(config: &Config) -> Self {
        AdmissionController {
            capacity: config.max_active_calls,
            active_count: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether `req_id` is already sitting in the pending queue, awaiting
    /// a free slot. Used by the dispatcher to reject duplicate
    /// `InitiateCallRequest`s that haven't yet been admitted (and so
    /// don't show up in the `Call` map).
    pub fn contains(&self, req_id: ReqId) -> bool {
        self.pending.iter().any(|p| p.req_id == req_id)
    }

    /// Decide whether `req_id`/`party` may be admitted now. A `Queued`
    /// result does not forward anything; the caller must hold the request
    /// until a future [`AdmissionController::release`] admits it.
    pub fn try_admit(&mut self, req_id: ReqId, party: String) -> Admission {
        if self.active_count < self.capacity {
            self.active_count += 1;
            tracing::debug!(req_id, active = self.active_count, capacity = self.capacity, "admitted");
            Admission::Admitted
        } else {
            tracing::debug!(req_id, queued = self.pending.len() + 1, "queued, at capacity");
            self.pending.push_back(PendingCall { req_id, party });
            Admission::Queued
        }
    }

    /// A call has reached `DONE` and its slot is free. Returns the next
    /// queued request to admit into that slot, if any; the caller is
    /// responsible for constructing its `Call` and forwarding the request.
    pub fn release(&mut self) -> Option<PendingCall> {
        match self.pending.pop_front() {
            Some(next) => {
                tracing::debug!(req_id = next.req_id, "promoted from pending queue");
                Some(next)
            }
            None => {
                self.active_count = self.active_count.saturating_sub(1);
                None
            }
        }
    }
}

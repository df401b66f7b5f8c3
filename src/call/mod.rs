//! The per-call state machine (C2). See SPEC_FULL.md §4.2.
//!
//! A [`Call`] owns no reference back to its controller (unlike the source
//! this is grounded on — see DESIGN.md): it mutates itself and returns the
//! [`StepEffects`] its caller owes to the VoIP sink and the application
//! callback. The dispatcher polls [`Call::is_completed`] after every step
//! to decide when to reclaim the Call's admission slot.

pub mod state;

use crate::protocol::{CallbackObject, DtmfDigit, FailureKind, ForwardObject, ReqId};

pub use state::CallState;
pub type CallId = crate::protocol::CallId;

/// Outbound effects produced by a single handler invocation. Delivered by
/// the dispatcher after the core lock is released (SPEC_FULL.md §5).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepEffects {
    pub to_app: Vec<CallbackObject>,
    pub to_voip: Vec<ForwardObject>,
}

impl StepEffects {
    fn app(obj: CallbackObject) -> Self {
        StepEffects { to_app: vec![obj], to_voip: vec![] }
    }

    fn voip(obj: ForwardObject) -> Self {
        StepEffects { to_app: vec![], to_voip: vec![obj] }
    }

    fn none() -> Self {
        StepEffects::default()
    }
}

/// A single call's state, owned exclusively by the dispatcher while it
/// exists. See SPEC_FULL.md §3 ("Call").
#[derive(Debug, Clone)]
pub struct Call {
    party: String,
    state: CallState,
    call_id: Option<CallId>,
    /// The request whose response is presently authoritative: a late
    /// arrival is validated against this id and, depending on state,
    /// either acted on normally or silently absorbed.
    current_req_id: Option<ReqId>,
    /// Set only while a `DropRequest` has been accepted but the request it
    /// superseded (`InitiateCallRequest` or `PlayFileRequest`) hasn't yet
    /// resolved. Promoted into `current_req_id` once that resolution
    /// arrives. See SPEC_FULL.md §4.2 tie-break rules and DESIGN.md.
    pending_drop_req_id: Option<ReqId>,
}

impl Call {
    pub fn new(party: String) -> Self {
        Call {
            party,
            state: CallState::Idle,
            call_id: None,
            current_req_id: None,
            pending_drop_req_id: None,
        }
    }

    pub fn party(&self) -> &str {
        &self.party
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn call_id(&self) -> Option<CallId> {
        self.call_id
    }

    pub fn current_req_id(&self) -> Option<ReqId> {
        self.current_req_id
    }

    pub fn is_completed(&self) -> bool {
        self.state == CallState::Done
    }

    fn next_state(&mut self, state: CallState) {
        tracing::debug!(from = %self.state, to = %state, "call state transition");
        self.state = state;
    }

    fn protocol_error(&self, event: &str) -> StepEffects {
        tracing::warn!(state = %self.state, event, "event is unexpected in current state");
        StepEffects::app(CallbackObject::ProtocolError {
            call_id: self.call_id,
            state: self.state.label().to_string(),
            event: event.to_string(),
            descr: format!("{event} is unexpected in state {}", self.state.label()),
        })
    }

    fn mismatch_error(&self, event: &str, expected: Option<ReqId>, got: ReqId) -> StepEffects {
        tracing::warn!(state = %self.state, event, expected = ?expected, got, "response req_id mismatch");
        StepEffects::app(CallbackObject::ProtocolError {
            call_id: self.call_id,
            state: self.state.label().to_string(),
            event: event.to_string(),
            descr: format!(
                "{event} carried req_id {got} but the outstanding request is {expected:?}"
            ),
        })
    }

    // ---- Forward path (application -> core) ---------------------------

    /// Transition `IDLE -> WAITING_INITIATE_CALL_RESP`. Only ever invoked
    /// by the dispatcher on a freshly-created Call.
    pub fn handle_initiate(&mut self, req_id: ReqId) -> StepEffects {
        if self.state != CallState::Idle {
            return self.protocol_error("InitiateCallRequest");
        }
        self.current_req_id = Some(req_id);
        self.next_state(CallState::WaitingInitiateCallResp);
        StepEffects::voip(ForwardObject::InitiateCallRequest {
            req_id,
            party: self.party.clone(),
        })
    }

    pub fn handle_play_file(&mut self, req_id: ReqId, filename: String) -> StepEffects {
        match self.state {
            CallState::Connected => {
                self.current_req_id = Some(req_id);
                self.next_state(CallState::ConnectedBusy);
                StepEffects::voip(ForwardObject::PlayFileRequest {
                    req_id,
                    call_id: self.call_id.expect("call_id set once CONNECTED"),
                    filename,
                })
            }
            CallState::ConnectedBusy => StepEffects::app(CallbackObject::RejectResponse {
                req_id,
                descr: format!(
                    "cannot process request, busy with processing request {}",
                    self.current_req_id.expect("set while CONNECTED_BUSY")
                ),
            }),
            _ => self.protocol_error("PlayFileRequest"),
        }
    }

    pub fn handle_drop(&mut self, req_id: ReqId) -> StepEffects {
        match self.state {
            CallState::Idle => {
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::DropResponse { req_id })
            }
            CallState::WaitingInitiateCallResp => {
                self.pending_drop_req_id = Some(req_id);
                self.next_state(CallState::CancelledInWicr);
                StepEffects::none()
            }
            CallState::WaitingConnected => {
                self.current_req_id = Some(req_id);
                self.next_state(CallState::CancelledInWc);
                StepEffects::voip(ForwardObject::DropRequest {
                    req_id,
                    call_id: self.call_id.expect("call_id set once WAITING_CONNECTED"),
                })
            }
            CallState::Connected => {
                self.current_req_id = Some(req_id);
                self.next_state(CallState::CancelledInC);
                StepEffects::voip(ForwardObject::DropRequest {
                    req_id,
                    call_id: self.call_id.expect("call_id set once CONNECTED"),
                })
            }
            CallState::ConnectedBusy => {
                self.pending_drop_req_id = Some(req_id);
                self.next_state(CallState::CancelledInCb);
                StepEffects::voip(ForwardObject::DropRequest {
                    req_id,
                    call_id: self.call_id.expect("call_id set once CONNECTED_BUSY"),
                })
            }
            _ => self.protocol_error("DropRequest"),
        }
    }

    // ---- Callback path (VoIP -> core) ----------------------------------

    pub fn handle_initiate_call_response(&mut self, req_id: ReqId, call_id: CallId) -> StepEffects {
        match self.state {
            CallState::WaitingInitiateCallResp => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("InitiateCallResponse", self.current_req_id, req_id);
                }
                self.current_req_id = None;
                self.call_id = Some(call_id);
                self.next_state(CallState::WaitingConnected);
                StepEffects::app(CallbackObject::InitiateCallResponse { req_id, call_id })
            }
            CallState::CancelledInWicr => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("InitiateCallResponse", self.current_req_id, req_id);
                }
                self.call_id = Some(call_id);
                let drop_req_id = self
                    .pending_drop_req_id
                    .take()
                    .expect("CANCELLED_IN_WICR always has a pending drop");
                self.current_req_id = Some(drop_req_id);
                self.next_state(CallState::CancelledInWc);
                StepEffects::voip(ForwardObject::DropRequest { req_id: drop_req_id, call_id })
            }
            _ => self.protocol_error("InitiateCallResponse"),
        }
    }

    pub fn handle_error_response(&mut self, req_id: ReqId, descr: String) -> StepEffects {
        match self.state {
            CallState::WaitingInitiateCallResp => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("ErrorResponse", self.current_req_id, req_id);
                }
                self.current_req_id = None;
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::ErrorResponse { req_id, descr })
            }
            CallState::CancelledInWicr => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("ErrorResponse", self.current_req_id, req_id);
                }
                self.current_req_id = None;
                let drop_req_id = self
                    .pending_drop_req_id
                    .take()
                    .expect("CANCELLED_IN_WICR always has a pending drop");
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::DropResponse { req_id: drop_req_id })
            }
            CallState::ConnectedBusy => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("ErrorResponse", self.current_req_id, req_id);
                }
                self.current_req_id = None;
                self.next_state(CallState::Connected);
                StepEffects::app(CallbackObject::ErrorResponse { req_id, descr })
            }
            CallState::CancelledInCb => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("ErrorResponse", self.current_req_id, req_id);
                }
                self.promote_pending_drop_and(CallState::CancelledInC)
            }
            _ => self.protocol_error("ErrorResponse"),
        }
    }

    pub fn handle_reject_response(&mut self, req_id: ReqId, descr: String) -> StepEffects {
        match self.state {
            CallState::WaitingInitiateCallResp => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("RejectResponse", self.current_req_id, req_id);
                }
                self.current_req_id = None;
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::RejectResponse { req_id, descr })
            }
            CallState::CancelledInWicr => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("RejectResponse", self.current_req_id, req_id);
                }
                self.current_req_id = None;
                let drop_req_id = self
                    .pending_drop_req_id
                    .take()
                    .expect("CANCELLED_IN_WICR always has a pending drop");
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::DropResponse { req_id: drop_req_id })
            }
            CallState::ConnectedBusy => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("RejectResponse", self.current_req_id, req_id);
                }
                self.current_req_id = None;
                self.next_state(CallState::Connected);
                StepEffects::app(CallbackObject::RejectResponse { req_id, descr })
            }
            CallState::CancelledInCb => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("RejectResponse", self.current_req_id, req_id);
                }
                self.promote_pending_drop_and(CallState::CancelledInC)
            }
            _ => self.protocol_error("RejectResponse"),
        }
    }

    pub fn handle_dialing(&mut self) -> StepEffects {
        match self.state {
            CallState::WaitingConnected | CallState::CancelledInWc => {
                tracing::debug!("dialing ...");
                StepEffects::none()
            }
            _ => self.protocol_error("Dialing"),
        }
    }

    pub fn handle_ringing(&mut self) -> StepEffects {
        match self.state {
            CallState::WaitingConnected | CallState::CancelledInWc => {
                tracing::debug!("ringing ...");
                StepEffects::none()
            }
            _ => self.protocol_error("Ringing"),
        }
    }

    pub fn handle_connected(&mut self) -> StepEffects {
        match self.state {
            CallState::WaitingConnected => {
                self.next_state(CallState::Connected);
                StepEffects::app(CallbackObject::Connected {
                    call_id: self.call_id.expect("call_id set once WAITING_CONNECTED"),
                })
            }
            CallState::CancelledInWc => {
                self.next_state(CallState::WrongConnected);
                StepEffects::none()
            }
            _ => self.protocol_error("Connected"),
        }
    }

    pub fn handle_failed(&mut self, kind: FailureKind, errorcode: u32, descr: String) -> StepEffects {
        match self.state {
            CallState::WaitingConnected => {
                let call_id = self.call_id.expect("call_id set once WAITING_CONNECTED");
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::Failed { call_id, kind, errorcode, descr })
            }
            CallState::CancelledInWc => {
                let req_id = self
                    .current_req_id
                    .take()
                    .expect("CANCELLED_IN_WC always has an outstanding drop req_id");
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::DropResponse { req_id })
            }
            _ => self.protocol_error("Failed"),
        }
    }

    pub fn handle_connection_lost(&mut self, errorcode: u32, descr: String) -> StepEffects {
        match self.state {
            CallState::Connected | CallState::ConnectedBusy => {
                let call_id = self.call_id.expect("call_id set once CONNECTED");
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::ConnectionLost { call_id, errorcode, descr })
            }
            CallState::CancelledInC | CallState::WrongConnected => {
                let req_id = self
                    .current_req_id
                    .take()
                    .expect("CANCELLED_IN_C/WRONG_CONNECTED always have an outstanding drop req_id");
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::DropResponse { req_id })
            }
            CallState::CancelledInCb => {
                // `current_req_id` still holds the superseded play request;
                // the drop that's actually outstanding lives in
                // `pending_drop_req_id`.
                self.current_req_id = None;
                let req_id = self
                    .pending_drop_req_id
                    .take()
                    .expect("CANCELLED_IN_CB always has a pending drop");
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::DropResponse { req_id })
            }
            _ => self.protocol_error("ConnectionLost"),
        }
    }

    pub fn handle_drop_response(&mut self, req_id: ReqId) -> StepEffects {
        match self.state {
            CallState::CancelledInWicr | CallState::CancelledInCb => {
                // The drop's own req_id lives in `pending_drop_req_id` in
                // both states: in WICR it hasn't been promoted yet, in CB
                // `current_req_id` is still pinned to the superseded play.
                if self.pending_drop_req_id != Some(req_id) {
                    return self.mismatch_error("DropResponse", self.pending_drop_req_id, req_id);
                }
                self.pending_drop_req_id = None;
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::DropResponse { req_id })
            }
            CallState::CancelledInWc | CallState::CancelledInC | CallState::WrongConnected => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("DropResponse", self.current_req_id, req_id);
                }
                self.current_req_id = None;
                self.next_state(CallState::Done);
                StepEffects::app(CallbackObject::DropResponse { req_id })
            }
            _ => self.protocol_error("DropResponse"),
        }
    }

    pub fn handle_play_file_response(&mut self, req_id: ReqId) -> StepEffects {
        match self.state {
            CallState::ConnectedBusy => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("PlayFileResponse", self.current_req_id, req_id);
                }
                self.current_req_id = None;
                self.next_state(CallState::Connected);
                StepEffects::app(CallbackObject::PlayFileResponse { req_id })
            }
            CallState::CancelledInCb => {
                if self.current_req_id != Some(req_id) {
                    return self.mismatch_error("PlayFileResponse", self.current_req_id, req_id);
                }
                self.promote_pending_drop_and(CallState::CancelledInC)
            }
            _ => self.protocol_error("PlayFileResponse"),
        }
    }

    pub fn handle_dtmf_tone(&mut self, tone: DtmfDigit) -> StepEffects {
        match self.state {
            CallState::Connected | CallState::ConnectedBusy => {
                StepEffects::app(CallbackObject::DtmfTone {
                    call_id: self.call_id.expect("call_id set once CONNECTED"),
                    tone,
                })
            }
            CallState::CancelledInC | CallState::CancelledInCb | CallState::WrongConnected => {
                tracing::warn!(state = %self.state, "DTMF tone is ignored");
                StepEffects::none()
            }
            _ => self.protocol_error("DtmfTone"),
        }
    }

    pub fn handle_call_duration(&mut self, seconds: u32) -> StepEffects {
        match self.state {
            CallState::Connected | CallState::ConnectedBusy => {
                StepEffects::app(CallbackObject::CallDuration {
                    call_id: self.call_id.expect("call_id set once CONNECTED"),
                    seconds,
                })
            }
            CallState::CancelledInC | CallState::CancelledInCb | CallState::WrongConnected => {
                StepEffects::none()
            }
            _ => self.protocol_error("CallDuration"),
        }
    }

    /// Shared tail of the `CANCELLED_IN_CB` absorb-the-superseded-response
    /// transitions: the response that lost the race is discarded, and the
    /// drop that superseded it becomes the authoritative correlation.
    fn promote_pending_drop_and(&mut self, to: CallState) -> StepEffects {
        let drop_req_id = self
            .pending_drop_req_id
            .take()
            .expect("CANCELLED_IN_CB always has a pending drop");
        self.current_req_id = Some(drop_req_id);
        self.next_state(to);
        StepEffects::none()
    }
}

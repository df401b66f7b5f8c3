//! Single-threaded dispatch and correlation (C3). See SPEC_FULL.md §4.3/§5.
//!
//! [`Core`] is the crate's only public entry point. It serializes every
//! request and every VoIP event through one [`tokio::sync::Mutex`], using
//! it to decide which [`Call`] an incoming message belongs to, running
//! that `Call`'s handler, and only then — after the lock is released —
//! performing the I/O (`VoipSink::consume` / `AppCallback::consume`) the
//! handler asked for. The lock is never held across an `.await`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::admission::AdmissionController;
use crate::call::{Call, CallState, StepEffects};
use crate::config::Config;
use crate::errors::{CoreError, Result};
use crate::protocol::{CallId, CallbackObject, ForwardObject, ReqId};
use crate::sink::{AppCallback, VoipSink};

/// A call is keyed, for its whole lifetime, by the `req_id` of the
/// `InitiateCallRequest` that created it. `call_id`s and later `req_id`s
/// are both resolved back to this key via the indices in [`Inner`].
type CallKey = ReqId;

struct Inner {
    admission: AdmissionController,
    voip: Arc<dyn VoipSink>,
    app: Arc<dyn AppCallback>,
    calls: HashMap<CallKey, Call>,
    by_call_id: HashMap<CallId, CallKey>,
    by_current_req: HashMap<ReqId, CallKey>,
    /// Keys in creation order, used to resolve a `DropRequest{call_id: 0}`
    /// to the oldest call still awaiting its `InitiateCallResponse`. See
    /// SPEC_FULL.md §4.3 and §9.
    creation_order: VecDeque<CallKey>,
}

impl Inner {
    fn new(config: Config, voip: Arc<dyn VoipSink>, app: Arc<dyn AppCallback>) -> Self {
        Inner {
            admission: AdmissionController::new(&config),
            voip,
            app,
            calls: HashMap::new(),
            by_call_id: HashMap::new(),
            by_current_req: HashMap::new(),
            creation_order: VecDeque::new(),
        }
    }

    /// Refresh the correlation indices for `key` after its `Call` ran a
    /// handler. Removes stale `by_current_req` entries pointing at `key`
    /// (cheap: the map is small and req_ids aren't reused within a call)
    /// and re-inserts whatever is presently outstanding.
    fn reindex(&mut self, key: CallKey) {
        let Some(call) = self.calls.get(&key) else { return };
        self.by_current_req.retain(|_, v| *v != key);
        if let Some(req_id) = call.current_req_id() {
            self.by_current_req.insert(req_id, key);
        }
        if let Some(call_id) = call.call_id() {
            self.by_call_id.entry(call_id).or_insert(key);
        }
    }

    /// Oldest key still genuinely awaiting its `InitiateCallResponse`, per
    /// the FIFO heuristic for `call_id`-less drops. Entries that have
    /// moved past that state are discarded permanently — a `Call` never
    /// re-enters `WAITING_INITIATE_CALL_RESP`.
    fn oldest_awaiting_call_id(&mut self) -> Option<CallKey> {
        while let Some(&front) = self.creation_order.front() {
            match self.calls.get(&front) {
                Some(call) if call.state() == CallState::WaitingInitiateCallResp => return Some(front),
                _ => {
                    self.creation_order.pop_front();
                }
            }
        }
        None
    }

    /// Remove `key` if its `Call` reached `DONE`, release its admission
    /// slot, and admit whatever was queued behind it. Returns the forward
    /// that must be sent for a newly-admitted call, if any.
    fn reap_if_completed(&mut self, key: CallKey) -> Option<ForwardObject> {
        let completed = self.calls.get(&key).is_some_and(Call::is_completed);
        if !completed {
            return None;
        }
        if let Some(call) = self.calls.remove(&key) {
            if let Some(call_id) = call.call_id() {
                self.by_call_id.remove(&call_id);
            }
        }
        self.by_current_req.retain(|_, v| *v != key);

        match self.admission.release() {
            Some(pending) => {
                let mut call = Call::new(pending.party);
                let effects = call.handle_initiate(pending.req_id);
                self.calls.insert(pending.req_id, call);
                self.creation_order.push_back(pending.req_id);
                self.reindex(pending.req_id);
                effects.to_voip.into_iter().next()
            }
            None => None,
        }
    }
}

/// The call-management core. Cheap to clone (an `Arc` internally would be
/// the usual shape, but callers are expected to hold one `Core` behind
/// their own `Arc` since every method only needs `&self`).
pub struct Core {
    inner: Mutex<Option<Inner>>,
}

impl Core {
    /// Construct an uninitialized core. No request may be submitted until
    /// [`Core::init`] completes.
    pub fn new() -> Self {
        Core { inner: Mutex::new(None) }
    }

    /// Validate `config` and wire up the collaborators. Must be called
    /// exactly once before any other method.
    pub async fn init(
        &self,
        config: Config,
        voip: Arc<dyn VoipSink>,
        app: Arc<dyn AppCallback>,
    ) -> Result<()> {
        config.validate()?;
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Err(CoreError::AlreadyInitialized);
        }
        *guard = Some(Inner::new(config, voip, app));
        Ok(())
    }

    /// Submit a request originating at the application.
    pub async fn submit_forward(&self, obj: ForwardObject) -> Result<()> {
        let (voip, app, to_app, to_voip) = {
            let mut guard = self.inner.lock().await;
            let inner = guard.as_mut().ok_or(CoreError::NotInitialized)?;
            let (to_app, to_voip) = self.step_forward(inner, obj);
            (inner.voip.clone(), inner.app.clone(), to_app, to_voip)
        };
        deliver(&*voip, &*app, to_app, to_voip).await;
        Ok(())
    }

    /// Submit an event or response originating at the VoIP transport.
    pub async fn submit_voip_event(&self, obj: CallbackObject) -> Result<()> {
        let (voip, app, to_app, to_voip) = {
            let mut guard = self.inner.lock().await;
            let inner = guard.as_mut().ok_or(CoreError::NotInitialized)?;
            let (to_app, to_voip) = self.step_voip_event(inner, obj);
            (inner.voip.clone(), inner.app.clone(), to_app, to_voip)
        };
        deliver(&*voip, &*app, to_app, to_voip).await;
        Ok(())
    }

    /// Drop the core's state. Outstanding `Call`s are discarded without
    /// further notification — consistent with there being no persistence
    /// or retry guarantees across a restart (SPEC_FULL.md §1, Non-goals).
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        *guard = None;
    }

    // ---- synchronous core, run under the lock --------------------------

    fn step_forward(
        &self,
        inner: &mut Inner,
        obj: ForwardObject,
    ) -> (Vec<CallbackObject>, Vec<ForwardObject>) {
        match obj {
            ForwardObject::InitiateCallRequest { req_id, party } => {
                if inner.calls.contains_key(&req_id) || inner.admission.contains(req_id) {
                    return (
                        vec![CallbackObject::ErrorResponse {
                            req_id,
                            descr: format!("req_id {req_id} is already in use"),
                        }],
                        vec![],
                    );
                }
                use crate::admission::Admission;
                match inner.admission.try_admit(req_id, party.clone()) {
                    Admission::Admitted => {
                        let mut call = Call::new(party);
                        let effects = call.handle_initiate(req_id);
                        inner.calls.insert(req_id, call);
                        inner.creation_order.push_back(req_id);
                        inner.reindex(req_id);
                        (effects.to_app, effects.to_voip)
                    }
                    Admission::Queued => (vec![], vec![]),
                }
            }
            ForwardObject::DropRequest { req_id, call_id } => {
                let key = if call_id == 0 {
                    inner.oldest_awaiting_call_id()
                } else {
                    inner.by_call_id.get(&call_id).copied()
                };
                match key {
                    Some(key) => self.run_on_call(inner, key, |c| c.handle_drop(req_id)),
                    None if call_id != 0 => {
                        tracing::warn!(req_id, call_id, "DropRequest for unknown call_id, forwarding blind");
                        (vec![], vec![ForwardObject::DropRequest { req_id, call_id }])
                    }
                    None => (
                        vec![CallbackObject::ErrorResponse {
                            req_id,
                            descr: "no call is currently awaiting connection to drop".to_string(),
                        }],
                        vec![],
                    ),
                }
            }
            ForwardObject::PlayFileRequest { req_id, call_id, filename } => {
                match inner.by_call_id.get(&call_id).copied() {
                    Some(key) => self.run_on_call(inner, key, |c| c.handle_play_file(req_id, filename)),
                    None => (
                        vec![CallbackObject::ErrorResponse {
                            req_id,
                            descr: format!("unknown call_id {call_id}"),
                        }],
                        vec![],
                    ),
                }
            }
        }
    }

    fn step_voip_event(
        &self,
        inner: &mut Inner,
        obj: CallbackObject,
    ) -> (Vec<CallbackObject>, Vec<ForwardObject>) {
        let key = self.correlate(inner, &obj);
        match key {
            Some(key) => self.run_on_call(inner, key, |c| dispatch_to_call(c, obj)),
            None => {
                tracing::warn!(?obj, "VoIP event did not correlate to any known call, dropping stale message");
                (vec![], vec![])
            }
        }
    }

    fn correlate(&self, inner: &Inner, obj: &CallbackObject) -> Option<CallKey> {
        match obj {
            CallbackObject::InitiateCallResponse { req_id, .. }
            | CallbackObject::ErrorResponse { req_id, .. }
            | CallbackObject::RejectResponse { req_id, .. }
            | CallbackObject::DropResponse { req_id }
            | CallbackObject::PlayFileResponse { req_id } => {
                inner.by_current_req.get(req_id).copied()
            }
            CallbackObject::Dialing { call_id }
            | CallbackObject::Ringing { call_id }
            | CallbackObject::Connected { call_id }
            | CallbackObject::Failed { call_id, .. }
            | CallbackObject::ConnectionLost { call_id, .. }
            | CallbackObject::DtmfTone { call_id, .. }
            | CallbackObject::CallDuration { call_id, .. } => {
                inner.by_call_id.get(call_id).copied()
            }
            CallbackObject::ProtocolError { .. } => None,
        }
    }

    /// Run `step` on the `Call` at `key`, reindex, reap it if it
    /// completed, and fold in whatever forward a newly-promoted pending
    /// call produced.
    fn run_on_call(
        &self,
        inner: &mut Inner,
        key: CallKey,
        step: impl FnOnce(&mut Call) -> StepEffects,
    ) -> (Vec<CallbackObject>, Vec<ForwardObject>) {
        let effects = match inner.calls.get_mut(&key) {
            Some(call) => step(call),
            None => return (vec![], vec![]),
        };
        inner.reindex(key);
        let mut to_voip = effects.to_voip;
        if let Some(promoted) = inner.reap_if_completed(key) {
            to_voip.push(promoted);
        }
        (effects.to_app, to_voip)
    }

}

impl Default for Core {
    fn default() -> Self {
        Core::new()
    }
}

async fn deliver(
    voip: &(dyn VoipSink + 'static),
    app: &(dyn AppCallback + 'static),
    to_app: Vec<CallbackObject>,
    to_voip: Vec<ForwardObject>,
) {
    for obj in to_app {
        app.consume(obj).await;
    }
    for obj in to_voip {
        voip.consume(obj).await;
    }
}

fn dispatch_to_call(call: &mut Call, obj: CallbackObject) -> StepEffects {
    match obj {
        CallbackObject::InitiateCallResponse { req_id, call_id } => {
            call.handle_initiate_call_response(req_id, call_id)
        }
        CallbackObject::ErrorResponse { req_id, descr } => call.handle_error_response(req_id, descr),
        CallbackObject::RejectResponse { req_id, descr } => call.handle_reject_response(req_id, descr),
        CallbackObject::DropResponse { req_id } => call.handle_drop_response(req_id),
        CallbackObject::PlayFileResponse { req_id } => call.handle_play_file_response(req_id),
        CallbackObject::Dialing { .. } => call.handle_dialing(),
        CallbackObject::Ringing { .. } => call.handle_ringing(),
        CallbackObject::Connected { .. } => call.handle_connected(),
        CallbackObject::Failed { kind, errorcode, descr, .. } => {
            call.handle_failed(kind, errorcode, descr)
        }
        CallbackObject::ConnectionLost { errorcode, descr, .. } => {
            call.handle_connection_lost(errorcode, descr)
        }
        CallbackObject::DtmfTone { tone, .. } => call.handle_dtmf_tone(tone),
        CallbackObject::CallDuration { seconds, .. } => call.handle_call_duration(seconds),
        CallbackObject::ProtocolError { .. } => StepEffects::default(),
    }
}

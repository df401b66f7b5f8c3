//! End-to-end scenarios exercising [`callman_core::Core`] through
//! in-memory collector sinks, one per concrete walkthrough.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use callman_core::{
    AppCallback, CallbackObject, Config, Core, DtmfDigit, FailureKind, ForwardObject, VoipSink,
};

#[derive(Default)]
struct Collector<T> {
    items: AsyncMutex<Vec<T>>,
}

impl<T: Clone> Collector<T> {
    async fn snapshot(&self) -> Vec<T> {
        self.items.lock().await.clone()
    }
}

#[async_trait]
impl AppCallback for Collector<CallbackObject> {
    async fn consume(&self, obj: CallbackObject) {
        self.items.lock().await.push(obj);
    }
}

#[async_trait]
impl VoipSink for Collector<ForwardObject> {
    async fn consume(&self, obj: ForwardObject) {
        self.items.lock().await.push(obj);
    }
}

async fn harness(capacity: u32) -> (Core, Arc<Collector<ForwardObject>>, Arc<Collector<CallbackObject>>) {
    let core = Core::new();
    let voip = Arc::new(Collector::<ForwardObject>::default());
    let app = Arc::new(Collector::<CallbackObject>::default());
    core.init(Config::new(capacity).unwrap(), voip.clone(), app.clone())
        .await
        .unwrap();
    (core, voip, app)
}

#[tokio::test]
async fn happy_path() {
    let (core, voip, app) = harness(1).await;

    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "alice".into() })
        .await
        .unwrap();
    assert_eq!(
        voip.snapshot().await,
        vec![ForwardObject::InitiateCallRequest { req_id: 1, party: "alice".into() }]
    );

    core.submit_voip_event(CallbackObject::InitiateCallResponse { req_id: 1, call_id: 100 })
        .await
        .unwrap();
    core.submit_voip_event(CallbackObject::Dialing { call_id: 100 }).await.unwrap();
    core.submit_voip_event(CallbackObject::Ringing { call_id: 100 }).await.unwrap();
    core.submit_voip_event(CallbackObject::Connected { call_id: 100 }).await.unwrap();

    assert_eq!(
        app.snapshot().await,
        vec![
            CallbackObject::InitiateCallResponse { req_id: 1, call_id: 100 },
            CallbackObject::Connected { call_id: 100 },
        ]
    );

    core.submit_forward(ForwardObject::PlayFileRequest {
        req_id: 2,
        call_id: 100,
        filename: "hello.wav".into(),
    })
    .await
    .unwrap();
    core.submit_voip_event(CallbackObject::PlayFileResponse { req_id: 2 }).await.unwrap();
    assert_eq!(
        app.snapshot().await.last(),
        Some(&CallbackObject::PlayFileResponse { req_id: 2 })
    );

    core.submit_forward(ForwardObject::DropRequest { req_id: 3, call_id: 100 }).await.unwrap();
    core.submit_voip_event(CallbackObject::DropResponse { req_id: 3 }).await.unwrap();
    assert_eq!(
        app.snapshot().await.last(),
        Some(&CallbackObject::DropResponse { req_id: 3 })
    );
}

#[tokio::test]
async fn cancel_before_initiate_response() {
    let (core, voip, app) = harness(1).await;

    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "bob".into() })
        .await
        .unwrap();
    core.submit_forward(ForwardObject::DropRequest { req_id: 2, call_id: 0 }).await.unwrap();
    core.submit_voip_event(CallbackObject::InitiateCallResponse { req_id: 1, call_id: 200 })
        .await
        .unwrap();

    assert_eq!(
        voip.snapshot().await,
        vec![
            ForwardObject::InitiateCallRequest { req_id: 1, party: "bob".into() },
            ForwardObject::DropRequest { req_id: 2, call_id: 200 },
        ]
    );

    core.submit_voip_event(CallbackObject::DropResponse { req_id: 2 }).await.unwrap();
    assert_eq!(app.snapshot().await, vec![CallbackObject::DropResponse { req_id: 2 }]);
}

#[tokio::test]
async fn wrong_connected() {
    let (core, _voip, app) = harness(1).await;

    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "carol".into() })
        .await
        .unwrap();
    core.submit_voip_event(CallbackObject::InitiateCallResponse { req_id: 1, call_id: 300 })
        .await
        .unwrap();
    core.submit_forward(ForwardObject::DropRequest { req_id: 2, call_id: 300 }).await.unwrap();

    core.submit_voip_event(CallbackObject::Connected { call_id: 300 }).await.unwrap();
    core.submit_voip_event(CallbackObject::ConnectionLost { call_id: 300, errorcode: 0, descr: "lost".into() })
        .await
        .unwrap();

    assert_eq!(app.snapshot().await, vec![CallbackObject::DropResponse { req_id: 2 }]);
}

#[tokio::test]
async fn play_rejection_while_busy() {
    let (core, _voip, app) = harness(1).await;

    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "dave".into() })
        .await
        .unwrap();
    core.submit_voip_event(CallbackObject::InitiateCallResponse { req_id: 1, call_id: 400 })
        .await
        .unwrap();
    core.submit_voip_event(CallbackObject::Connected { call_id: 400 }).await.unwrap();

    core.submit_forward(ForwardObject::PlayFileRequest { req_id: 2, call_id: 400, filename: "a.wav".into() })
        .await
        .unwrap();
    core.submit_forward(ForwardObject::PlayFileRequest { req_id: 3, call_id: 400, filename: "b.wav".into() })
        .await
        .unwrap();

    assert_eq!(
        app.snapshot().await.last(),
        Some(&CallbackObject::RejectResponse {
            req_id: 3,
            descr: "cannot process request, busy with processing request 2".into(),
        })
    );

    core.submit_voip_event(CallbackObject::PlayFileResponse { req_id: 2 }).await.unwrap();
    assert_eq!(
        app.snapshot().await.last(),
        Some(&CallbackObject::PlayFileResponse { req_id: 2 })
    );
}

#[tokio::test]
async fn queue_and_drain() {
    let (core, voip, app) = harness(2).await;

    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "a".into() })
        .await
        .unwrap();
    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 2, party: "b".into() })
        .await
        .unwrap();
    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 3, party: "c".into() })
        .await
        .unwrap();

    assert_eq!(
        voip.snapshot().await,
        vec![
            ForwardObject::InitiateCallRequest { req_id: 1, party: "a".into() },
            ForwardObject::InitiateCallRequest { req_id: 2, party: "b".into() },
        ]
    );

    core.submit_voip_event(CallbackObject::InitiateCallResponse { req_id: 1, call_id: 10 })
        .await
        .unwrap();
    core.submit_voip_event(CallbackObject::Failed {
        call_id: 10,
        kind: FailureKind::Failed,
        errorcode: 1,
        descr: "no route".into(),
    })
    .await
    .unwrap();

    assert_eq!(
        voip.snapshot().await.last(),
        Some(&ForwardObject::InitiateCallRequest { req_id: 3, party: "c".into() })
    );
    assert!(app.snapshot().await.iter().any(|o| matches!(
        o,
        CallbackObject::Failed { call_id: 10, .. }
    )));
}

#[tokio::test]
async fn dtmf_pass_through_and_silence() {
    let (core, _voip, app) = harness(1).await;

    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "erin".into() })
        .await
        .unwrap();
    core.submit_voip_event(CallbackObject::InitiateCallResponse { req_id: 1, call_id: 400 })
        .await
        .unwrap();
    core.submit_voip_event(CallbackObject::Connected { call_id: 400 }).await.unwrap();

    core.submit_voip_event(CallbackObject::DtmfTone { call_id: 400, tone: DtmfDigit::Star })
        .await
        .unwrap();
    assert_eq!(
        app.snapshot().await.last(),
        Some(&CallbackObject::DtmfTone { call_id: 400, tone: DtmfDigit::Star })
    );

    core.submit_forward(ForwardObject::DropRequest { req_id: 2, call_id: 400 }).await.unwrap();
    let before = app.snapshot().await.len();
    core.submit_voip_event(CallbackObject::DtmfTone { call_id: 400, tone: DtmfDigit::Star })
        .await
        .unwrap();
    assert_eq!(app.snapshot().await.len(), before, "DTMF must be silently discarded while cancelled");
}

#[tokio::test]
async fn duplicate_req_id_is_rejected() {
    let (core, _voip, app) = harness(1).await;

    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "frank".into() })
        .await
        .unwrap();
    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "again".into() })
        .await
        .unwrap();

    assert_eq!(
        app.snapshot().await,
        vec![CallbackObject::ErrorResponse { req_id: 1, descr: "req_id 1 is already in use".into() }]
    );
}

#[tokio::test]
async fn duplicate_req_id_while_still_queued_is_rejected() {
    // capacity 1: req_id 1 is admitted immediately, req_id 2 sits in the
    // pending queue (not yet in the call map) when the duplicate arrives.
    let (core, voip, app) = harness(1).await;

    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "a".into() })
        .await
        .unwrap();
    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 2, party: "b".into() })
        .await
        .unwrap();
    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 2, party: "b-again".into() })
        .await
        .unwrap();

    assert_eq!(
        app.snapshot().await,
        vec![CallbackObject::ErrorResponse { req_id: 2, descr: "req_id 2 is already in use".into() }]
    );

    // only the first req_id 2 is ever admitted, once req_id 1 frees its slot.
    core.submit_voip_event(CallbackObject::InitiateCallResponse { req_id: 1, call_id: 10 })
        .await
        .unwrap();
    core.submit_voip_event(CallbackObject::Failed {
        call_id: 10,
        kind: FailureKind::Failed,
        errorcode: 1,
        descr: "no route".into(),
    })
    .await
    .unwrap();

    assert_eq!(
        voip.snapshot().await.last(),
        Some(&ForwardObject::InitiateCallRequest { req_id: 2, party: "b".into() })
    );
}

#[tokio::test]
async fn stale_event_after_call_is_reaped_is_silently_dropped() {
    let (core, _voip, app) = harness(1).await;

    core.submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "gus".into() })
        .await
        .unwrap();
    core.submit_voip_event(CallbackObject::InitiateCallResponse { req_id: 1, call_id: 700 })
        .await
        .unwrap();
    core.submit_forward(ForwardObject::DropRequest { req_id: 2, call_id: 700 }).await.unwrap();
    core.submit_voip_event(CallbackObject::DropResponse { req_id: 2 }).await.unwrap();
    assert_eq!(app.snapshot().await, vec![CallbackObject::DropResponse { req_id: 2 }]);

    // the Call is reaped; a duplicate/late DropResponse and a stray DTMF
    // for the now-unknown call_id must produce no further app callbacks,
    // not a ProtocolError.
    core.submit_voip_event(CallbackObject::DropResponse { req_id: 2 }).await.unwrap();
    core.submit_voip_event(CallbackObject::DtmfTone { call_id: 700, tone: DtmfDigit::Pound })
        .await
        .unwrap();

    assert_eq!(app.snapshot().await, vec![CallbackObject::DropResponse { req_id: 2 }]);
}

#[tokio::test]
async fn shutdown_then_submit_is_a_no_op_error() {
    let (core, _voip, _app) = harness(1).await;
    core.shutdown().await;

    let result = core
        .submit_forward(ForwardObject::InitiateCallRequest { req_id: 1, party: "x".into() })
        .await;
    assert!(result.is_err());
}

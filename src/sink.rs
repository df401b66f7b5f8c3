//! External collaborators. Neither trait is ever invoked while the core's
//! lock is held (SPEC_FULL.md §5) — calls are fire-and-forget hand-offs.

use async_trait::async_trait;

use crate::protocol::{CallbackObject, ForwardObject};

/// The VoIP transport the core forwards requests to. An external
/// collaborator; the core never waits on it while mutating shared state.
#[async_trait]
pub trait VoipSink: Send + Sync {
    async fn consume(&self, obj: ForwardObject);
}

/// The application the core delivers callbacks to.
#[async_trait]
pub trait AppCallback: Send + Sync {
    async fn consume(&self, obj: CallbackObject);
}

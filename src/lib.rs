//! Admission-controlled, single-threaded call-management core sitting
//! between an application and a VoIP transport.
//!
//! The crate is organized around three collaborating pieces:
//!
//! - [`admission`] — a concurrency limiter with a FIFO pending queue.
//! - [`call`] — the per-call state machine.
//! - [`dispatch`] — [`dispatch::Core`], the single entry point that
//!   correlates incoming requests/events to a `Call` and serializes all
//!   state mutation behind one lock.
//!
//! Transport and application are represented only as traits
//! ([`sink::VoipSink`], [`sink::AppCallback`]); this crate never dials out
//! to real telephony infrastructure itself.

pub mod admission;
pub mod call;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod protocol;
pub mod sink;

pub use config::Config;
pub use dispatch::Core;
pub use errors::{CoreError, Result};
pub use protocol::{CallId, CallbackObject, DtmfDigit, FailureKind, ForwardObject, ReqId};
pub use sink::{AppCallback, VoipSink};

//! The two symmetric tagged-union interfaces the core exchanges with its
//! collaborators: [`ForwardObject`] flows application → core → VoIP,
//! [`CallbackObject`] flows VoIP → core → application.

use serde::{Deserialize, Serialize};

/// Opaque, application-supplied identifier for an outstanding request.
pub type ReqId = u32;

/// Opaque identifier minted by the VoIP service for a live call.
pub type CallId = u32;

/// A request submitted by the application, destined for the VoIP sink
/// (possibly intercepted and acted on by the core first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardObject {
    InitiateCallRequest { req_id: ReqId, party: String },
    DropRequest { req_id: ReqId, call_id: CallId },
    PlayFileRequest { req_id: ReqId, call_id: CallId, filename: String },
}

impl ForwardObject {
    pub fn req_id(&self) -> ReqId {
        match self {
            ForwardObject::InitiateCallRequest { req_id, .. } => *req_id,
            ForwardObject::DropRequest { req_id, .. } => *req_id,
            ForwardObject::PlayFileRequest { req_id, .. } => *req_id,
        }
    }
}

/// A notification or response originating at the VoIP service, destined
/// for the application (possibly synthesized by the core itself, as with
/// [`CallbackObject::ProtocolError`] and synthesized `DropResponse`s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackObject {
    InitiateCallResponse { req_id: ReqId, call_id: CallId },
    ErrorResponse { req_id: ReqId, descr: String },
    RejectResponse { req_id: ReqId, descr: String },
    DropResponse { req_id: ReqId },
    PlayFileResponse { req_id: ReqId },
    Dialing { call_id: CallId },
    Ringing { call_id: CallId },
    Connected { call_id: CallId },
    Failed { call_id: CallId, kind: FailureKind, errorcode: u32, descr: String },
    ConnectionLost { call_id: CallId, errorcode: u32, descr: String },
    DtmfTone { call_id: CallId, tone: DtmfDigit },
    CallDuration { call_id: CallId, seconds: u32 },
    /// Not present in the original interface: replaces a fatal assertion
    /// with a callback the application can observe and act on. See
    /// SPEC_FULL.md §7/§9.
    ProtocolError { call_id: Option<CallId>, state: String, event: String, descr: String },
}

/// Reason a call failed to connect, mirroring the VoIP service's own
/// classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Failed,
    Refused,
    Busy,
    NoAnswer,
}

/// A single DTMF digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtmfDigit {
    D0, D1, D2, D3, D4, D5, D6, D7, D8, D9,
    A, B, C, D,
    Star,
    Pound,
}

impl std::fmt::Display for DtmfDigit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = match self {
            DtmfDigit::D0 => '0', DtmfDigit::D1 => '1', DtmfDigit::D2 => '2',
            DtmfDigit::D3 => '3', DtmfDigit::D4 => '4', DtmfDigit::D5 => '5',
            DtmfDigit::D6 => '6', DtmfDigit::D7 => '7', DtmfDigit::D8 => '8',
            DtmfDigit::D9 => '9',
            DtmfDigit::A => 'A', DtmfDigit::B => 'B', DtmfDigit::C => 'C', DtmfDigit::D => 'D',
            DtmfDigit::Star => '*',
            DtmfDigit::Pound => '#',
        };
        write!(f, "{c}")
    }
}

impl TryFrom<char> for DtmfDigit {
    type Error = char;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        Ok(match c {
            '0' => DtmfDigit::D0, '1' => DtmfDigit::D1, '2' => DtmfDigit::D2,
            '3' => DtmfDigit::D3, '4' => DtmfDigit::D4, '5' => DtmfDigit::D5,
            '6' => DtmfDigit::D6, '7' => DtmfDigit::D7, '8' => DtmfDigit::D8,
            '9' => DtmfDigit::D9,
            'A' => DtmfDigit::A, 'B' => DtmfDigit::B, 'C' => DtmfDigit::C, 'D' => DtmfDigit::D,
            '*' => DtmfDigit::Star,
            '#' => DtmfDigit::Pound,
            other => return Err(other),
        })
    }
}

//! [`CallState`]: the states a [`super::Call`] can occupy.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    WaitingInitiateCallResp,
    WaitingConnected,
    Connected,
    ConnectedBusy,
    CancelledInWicr,
    CancelledInWc,
    CancelledInC,
    CancelledInCb,
    WrongConnected,
    Done,
}

impl CallState {
    pub fn label(&self) -> &'static str {
        match self {
            CallState::Idle => "IDLE",
            CallState::WaitingInitiateCallResp => "WAITING_INITIATE_CALL_RESP",
            CallState::WaitingConnected => "WAITING_CONNECTED",
            CallState::Connected => "CONNECTED",
            CallState::ConnectedBusy => "CONNECTED_BUSY",
            CallState::CancelledInWicr => "CANCELLED_IN_WICR",
            CallState::CancelledInWc => "CANCELLED_IN_WC",
            CallState::CancelledInC => "CANCELLED_IN_C",
            CallState::CancelledInCb => "CANCELLED_IN_CB",
            CallState::WrongConnected => "WRONG_CONNECTED",
            CallState::Done => "DONE",
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

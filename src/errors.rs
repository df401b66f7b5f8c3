//! Error types for the call-management core.

use thiserror::Error;

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by [`crate::dispatch::Core`].
///
/// Every variant carries what a caller needs to act on it without
/// re-deriving context from logs. Internal invariant breaches (duplicate
/// ids, a stuck `Call`) are represented here rather than panicking, since
/// a misbehaving application is expected input, not a bug in the core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// `init` was called a second time on an already-initialized core.
    #[error("core is already initialized")]
    AlreadyInitialized,

    /// A forward/callback message arrived before `init` completed.
    #[error("core has not been initialized")]
    NotInitialized,

    /// `Config` failed validation (see [`crate::config::Config::validate`]).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// Coarse category, for callers that want to branch without a full match.
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::AlreadyInitialized => "lifecycle",
            CoreError::NotInitialized => "lifecycle",
            CoreError::InvalidConfig(_) => "config",
        }
    }

    /// Whether retrying the same call is expected to help.
    ///
    /// None of the current variants are recoverable by retrying the same
    /// operation unchanged; `InvalidConfig` requires a different `Config`,
    /// and the lifecycle errors require a different call sequence.
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

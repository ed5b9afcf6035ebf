//! Error types for VodSync Core

use crate::types::{PlayerId, PlayerState};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    // Timing authority errors
    #[error("No event candidate satisfies the streaming-required filter")]
    NoSuitableEvent,

    // Stream validation errors
    #[error("Stream identity '{identity}' is not in the expected entrant set {expected:?}")]
    StreamIdentityMismatch {
        identity: String,
        expected: Vec<String>,
    },

    // Playback errors
    #[error("Buffering never cleared for {player} while in {state}")]
    BufferingStall { player: PlayerId, state: PlayerState },

    #[error(
        "{player} did not reach {expected} within {waited_ms}ms: \
         last state {actual}, buffering: {buffering}"
    )]
    StateWaitTimeout {
        player: PlayerId,
        expected: PlayerState,
        actual: PlayerState,
        buffering: bool,
        waited_ms: u64,
    },

    #[error("Invalid playback state transition for {player}: {from} -> {to}")]
    InvalidStateTransition {
        player: PlayerId,
        from: PlayerState,
        to: PlayerState,
    },

    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    // Credential gate errors
    #[error("Credentials required before streams can load")]
    CredentialsRequired,

    #[error("Credential callback did not carry an access token")]
    MissingCredentials,

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error is recoverable (retry may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::StateWaitTimeout { .. })
    }

    /// Returns the error code for diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoSuitableEvent => "NO_SUITABLE_EVENT",
            Error::StreamIdentityMismatch { .. } => "IDENTITY_MISMATCH",
            Error::BufferingStall { .. } => "BUFFERING_STALL",
            Error::StateWaitTimeout { .. } => "STATE_WAIT_TIMEOUT",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::UnknownPlayer(_) => "UNKNOWN_PLAYER",
            Error::CredentialsRequired => "CREDENTIALS_REQUIRED",
            Error::MissingCredentials => "MISSING_CREDENTIALS",
            Error::Network(_) => "NETWORK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// Returns true if this error must halt the session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NoSuitableEvent | Error::StreamIdentityMismatch { .. }
        )
    }
}

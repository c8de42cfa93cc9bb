//! Error taxonomy.
//!
//! Transient per-packet and per-window conditions (parse rejects, payload
//! mismatches, underruns, overflow drops) are never represented here: per the
//! propagation policy, they are absorbed into counters and never surface as a
//! `Result::Err`. These types exist only for the fatal paths that end a
//! session (bind/accept/device failures) and for the wire/encode helpers used
//! by tests and the sender-facing parts of the protocol module.

use thiserror::Error;

/// Failures that can occur while standing up or operating the network side
/// of a session. All of these are fatal: the session that produced one tears
/// itself down.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to bind socket: {0}")]
    BindFailed(String),

    #[error("failed to configure socket: {0}")]
    ConfigureFailed(String),

    #[error("failed to accept connection: {0}")]
    AcceptFailed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures opening or driving the audio output device. Fatal: the session
/// that produced one tears itself down.
#[derive(Debug, Error)]
pub enum AudioSinkError {
    #[error("no output device available")]
    NoDevice,

    #[error("unsupported stream configuration: {0}")]
    UnsupportedConfig(String),

    #[error("failed to build output stream: {0}")]
    BuildStreamFailed(String),

    #[error("failed to start output stream: {0}")]
    PlayFailed(String),

    #[error("output stream error: {0}")]
    StreamError(String),
}

/// Top-level error surfaced to the embedder when a session ends
/// abnormally (as opposed to a clean `stop()`).
#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("audio sink error: {0}")]
    AudioSink(#[from] AudioSinkError),

    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ReceiverError>;

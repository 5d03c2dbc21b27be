// Error taxonomy for the audio session core. These are kinds, not incident
// reports: hot-path variants (`Full`, `Timeout`, `DecodeError`) are expected
// to occur under normal operation and are absorbed by callers rather than
// propagated as panics.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Operation invoked before the owning component finished initialization.
    #[error("not ready")]
    NotReady,

    /// Null buffer, zero length where disallowed, misaligned sample count,
    /// volume > 100, etc.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Drop-on-full push could not fit the payload. Recoverable; caller logs
    /// and moves on.
    #[error("ring full")]
    Full,

    /// Blocking ring pop, transport send, or shutdown wait expired.
    #[error("timed out")]
    Timeout,

    /// Transport send attempted while disconnected.
    #[error("not connected")]
    NotConnected,

    /// Malformed JSON text frame. Ignored by the caller, logged at warn.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Unexpected wire opcode.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Allocation failure, I²S driver failure. Propagates to `Error` state.
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

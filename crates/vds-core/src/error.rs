use std::path::PathBuf;

use thiserror::Error;

/// Status codes reported by a buffer pool (sink or scratch).
///
/// These are propagated unchanged through the orchestrator; nothing at this layer retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum SourceError {
    #[error("no memory")]
    NoMemory,

    #[error("operation would block")]
    WouldBlock,

    /// The pool was never connected, or its consumer went away.
    #[error("source not initialized or abandoned")]
    NoInit,

    #[error("bad value")]
    BadValue,

    #[error("invalid operation")]
    InvalidOperation,

    /// Consumer-side acquire with nothing queued.
    #[error("no buffer available")]
    NoBufferAvailable,

    #[error("source failure (status {0})")]
    Status(i32),
}

/// Failures reported by the hardware compositor collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositorError {
    #[error("unknown display {0}")]
    BadDisplay(i32),

    #[error("{0}")]
    Backend(String),
}

/// Orchestrator-level errors used across vds crates.
///
/// Contract rule: this type lives in `vds-core` and is re-exported by `vds-surface`.
#[derive(Debug, Error)]
pub enum VdsError {
    // ---- Frame protocol ----
    /// A buffer the frame needs was never reserved (sink vanished, dequeue failed, ...).
    /// The caller must skip compositor submission for this frame.
    #[error("no buffer, bailing out ({context})")]
    NoBuffer { context: &'static str },

    #[error("composition mode {0} cannot be requested")]
    InvalidMode(&'static str),

    #[error("producer slot {0} out of range")]
    InvalidSlot(usize),

    #[error("producer slot {0} holds no buffer")]
    EmptySlot(usize),

    /// Both pools mapped a live buffer onto the same producer slot.
    #[error("producer slot {0} is already in use by the other source")]
    SlotInUse(usize),

    // ---- Collaborators ----
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Compositor(#[from] CompositorError),

    // ---- Config ----
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("json parse error at {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config: {msg}")]
    InvalidConfig { msg: String },

    // ---- Fallback ----
    #[error("{0}")]
    Other(String),
}

impl VdsError {
    pub fn other<T: Into<String>>(s: T) -> Self {
        VdsError::Other(s.into())
    }

    pub fn invalid_config<T: Into<String>>(msg: T) -> Self {
        VdsError::InvalidConfig { msg: msg.into() }
    }

    /// True for the "no buffer" class: the frame cannot be submitted.
    pub fn is_no_buffer(&self) -> bool {
        matches!(
            self,
            VdsError::NoBuffer { .. } | VdsError::Source(SourceError::NoMemory)
        )
    }

    /// The pool status code, if this error came from a buffer source.
    pub fn source_status(&self) -> Option<SourceError> {
        match self {
            VdsError::Source(e) => Some(*e),
            _ => None,
        }
    }
}

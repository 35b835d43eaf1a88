//! Error types for the frame pipeline.
//!
//! `PipelineError` is `Clone` because a single fault (end of stream, a
//! decode failure, shutdown) is delivered to every handle that was still
//! waiting when it happened.

use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The request queue has no free slot; the caller should retry later.
    #[error("request queue is full ({capacity} requests in flight)")]
    QueueFull { capacity: usize },

    #[error("end of stream")]
    EndOfStream,

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("scale failed: {0}")]
    Scale(String),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("cannot allocate {bytes} bytes for {what}")]
    Allocation { what: &'static str, bytes: usize },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid copy plan: {0}")]
    InvalidCopyPlan(String),

    #[error("invalid color table: {0}")]
    InvalidColorTable(String),

    /// A lock was poisoned by a panicking thread.
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),

    #[error("handle already completed")]
    AlreadyCompleted,

    #[error("handle already consumed")]
    AlreadyConsumed,

    #[error("pipeline is shut down")]
    Shutdown,

    #[error("cannot spawn {name}: {reason}")]
    Spawn { name: String, reason: String },

    #[error("{0} thread panicked")]
    ThreadPanicked(String),

    #[error("io: {0}")]
    Io(String),
}

impl PipelineError {
    /// Terminal errors put the whole pipeline into the faulted state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineError::EndOfStream | PipelineError::Decode(_) | PipelineError::Shutdown
        )
    }

    pub(crate) fn decode(err: anyhow::Error) -> Self {
        PipelineError::Decode(format!("{:#}", err))
    }

    pub(crate) fn scale(err: anyhow::Error) -> Self {
        PipelineError::Scale(format!("{:#}", err))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

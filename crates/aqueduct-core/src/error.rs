//! Error types.
//!
//! Every failure the bridge reports is either [`Error::Recoverable`] (the
//! engine is transiently unable to comply and the caller may retry later,
//! e.g. on the next render cycle) or [`Error::Fatal`] (a programming error or
//! an unrecoverable engine failure). The bridge itself never retries.

use aqueduct_utils::CodeDisplay;

pub(crate) fn code(status: &i32) -> CodeDisplay {
    CodeDisplay(*status)
}

/// Why an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Reason {
    /// The render thread holds a lock the operation needs.
    #[error("resource busy on render thread, cannot do in current context")]
    CannotDoInCurrentContext,

    /// The engine timed out waiting for a render.
    #[error("render timed out")]
    RenderTimeout,

    /// A queue buffer is still enqueued.
    #[error("buffer is still enqueued")]
    BufferInQueue,

    /// The queue is being reset.
    #[error("enqueue attempted during queue reset")]
    EnqueueDuringReset,

    /// Priming the queue timed out.
    #[error("queue prime timed out")]
    PrimeTimedOut,

    /// The device is in exclusive use by another process.
    #[error("device is in exclusive use by another process")]
    DeviceBusy,

    /// Topology change attempted while the graph is rendering.
    #[error("topology cannot be modified while the graph is running")]
    CannotModifyWhileRunning,

    /// A second output node was added to a graph.
    #[error("graph already has an output node")]
    OutputNodeConflict,

    #[error("invalid parameter")]
    InvalidParameter,

    #[error("invalid property")]
    InvalidProperty,

    #[error("invalid property value")]
    InvalidPropertyValue,

    /// Property data block size does not match the requested type.
    #[error("invalid property size")]
    InvalidPropertySize,

    #[error("property is not writable")]
    PropertyNotWritable,

    #[error("invalid scope")]
    InvalidScope,

    #[error("invalid element")]
    InvalidElement,

    #[error("object already initialized")]
    AlreadyInitialized,

    #[error("object not initialized")]
    Uninitialized,

    #[error("initialization failed")]
    FailedInitialization,

    #[error("format not supported")]
    FormatNotSupported,

    #[error("no connection")]
    NoConnection,

    #[error("too many frames to process")]
    TooManyFramesToProcess,

    #[error("graph node not found")]
    NodeNotFound,

    #[error("invalid graph connection")]
    InvalidConnection,

    #[error("invalid audio unit")]
    InvalidAudioUnit,

    #[error("invalid queue buffer")]
    InvalidBuffer,

    #[error("invalid queue run state")]
    InvalidRunState,

    #[error("queue cannot start")]
    CannotStart,

    #[error("queue was invalidated")]
    QueueInvalidated,

    #[error("invalid audio file")]
    InvalidFile,

    #[error("unknown audio file type")]
    UnknownFileType,

    #[error("file not found")]
    FileNotFound,

    #[error("out of memory")]
    OutOfMemory,

    #[error("operation not implemented by the engine")]
    Unimplemented,

    /// The handle is null, torn down, or unknown to the engine.
    #[error("invalid handle")]
    InvalidHandle,

    /// The operation is illegal in the current lifecycle state.
    #[error("operation is illegal in the current lifecycle state")]
    InvalidState,

    /// A native buffer list is null or its count exceeds the configured bound.
    #[error("malformed buffer list")]
    MalformedBufferList,

    /// Every context token slot is in use.
    #[error("context token table is full")]
    TokenTableFull,

    /// The bridge configuration was installed twice.
    #[error("bridge configuration already installed")]
    AlreadyConfigured,

    /// Unrecognized engine status code.
    #[error("unknown engine status {}", code(.0))]
    Unknown(i32),
}

/// Error returned by every fallible bridge operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// Transient; the caller may retry later.
    #[error("recoverable: {0}")]
    Recoverable(Reason),

    /// Not retryable.
    #[error("fatal: {0}")]
    Fatal(Reason),
}

impl Error {
    /// The underlying reason, regardless of severity.
    pub const fn reason(&self) -> Reason {
        match self {
            Self::Recoverable(reason) | Self::Fatal(reason) => *reason,
        }
    }

    /// True for transient failures worth retrying.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }

    pub(crate) const fn invalid_state() -> Self {
        Self::Fatal(Reason::InvalidState)
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

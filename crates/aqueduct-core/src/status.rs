//! Status code translation.
//!
//! Every native call returns a signed 32-bit status. [`translate`] classifies
//! it into an [`Outcome`] using a fixed table of known codes; anything not in
//! the table becomes `Fatal(Unknown(code))`. Translation is pure: retry
//! policy belongs to callers.

use aqueduct_utils::fourcc::fourcc;

use crate::error::{Error, Reason, Result};

/// Native status code type (`OSStatus`).
pub type OsStatus = i32;

/// No error.
pub const NO_ERR: OsStatus = 0;

/// Status codes returned by the native engine.
pub mod codes {
    use super::{fourcc, OsStatus};

    // General
    pub const UNIMPLEMENTED: OsStatus = -4;
    pub const FILE_NOT_FOUND: OsStatus = -43;
    pub const PARAM_ERR: OsStatus = -50;
    pub const MEM_FULL: OsStatus = -108;

    // Audio units
    pub const INVALID_PROPERTY: OsStatus = -10879;
    pub const INVALID_PARAMETER: OsStatus = -10878;
    pub const INVALID_ELEMENT: OsStatus = -10877;
    pub const NO_CONNECTION: OsStatus = -10876;
    pub const FAILED_INITIALIZATION: OsStatus = -10875;
    pub const TOO_MANY_FRAMES_TO_PROCESS: OsStatus = -10874;
    pub const INVALID_FILE: OsStatus = -10871;
    pub const UNKNOWN_FILE_TYPE: OsStatus = -10870;
    pub const FILE_NOT_SPECIFIED: OsStatus = -10869;
    pub const FORMAT_NOT_SUPPORTED: OsStatus = -10868;
    pub const UNINITIALIZED: OsStatus = -10867;
    pub const INVALID_SCOPE: OsStatus = -10866;
    pub const PROPERTY_NOT_WRITABLE: OsStatus = -10865;
    pub const CANNOT_DO_IN_CURRENT_CONTEXT: OsStatus = -10863;
    pub const INVALID_PROPERTY_VALUE: OsStatus = -10851;
    pub const PROPERTY_NOT_IN_USE: OsStatus = -10850;
    pub const INITIALIZED: OsStatus = -10849;
    pub const RENDER_TIMEOUT: OsStatus = -66745;

    // Graphs
    pub const GRAPH_NODE_NOT_FOUND: OsStatus = -10860;
    pub const GRAPH_INVALID_CONNECTION: OsStatus = -10861;
    pub const GRAPH_OUTPUT_NODE_ERR: OsStatus = -10862;
    pub const GRAPH_INVALID_AUDIO_UNIT: OsStatus = -10864;

    // Queues
    pub const QUEUE_INVALID_BUFFER: OsStatus = -66687;
    pub const QUEUE_BUFFER_EMPTY: OsStatus = -66686;
    pub const QUEUE_DISPOSAL_PENDING: OsStatus = -66685;
    pub const QUEUE_INVALID_PROPERTY: OsStatus = -66684;
    pub const QUEUE_INVALID_PROPERTY_SIZE: OsStatus = -66683;
    pub const QUEUE_INVALID_PARAMETER: OsStatus = -66682;
    pub const QUEUE_CANNOT_START: OsStatus = -66681;
    pub const QUEUE_BUFFER_IN_QUEUE: OsStatus = -66679;
    pub const QUEUE_INVALID_RUN_STATE: OsStatus = -66678;
    pub const QUEUE_PRIME_TIMED_OUT: OsStatus = -66674;
    pub const QUEUE_INVALIDATED: OsStatus = -66671;
    pub const QUEUE_ENQUEUE_DURING_RESET: OsStatus = -66632;

    // Hardware (four-character codes)
    pub const HARDWARE_UNSPECIFIED: OsStatus = fourcc(b"what") as OsStatus;
    pub const HARDWARE_BAD_OBJECT: OsStatus = fourcc(b"!obj") as OsStatus;
    pub const HARDWARE_ILLEGAL_OPERATION: OsStatus = fourcc(b"nope") as OsStatus;
    pub const DEVICE_PERMISSIONS: OsStatus = fourcc(b"!hog") as OsStatus;
}

/// Classified result of a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Ok,
    /// The engine asks the caller to try again later.
    Recoverable(Reason),
    Fatal(Reason),
}

impl Outcome {
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Convert into a `Result` for `?` propagation.
    pub const fn into_result(self) -> Result<()> {
        match self {
            Self::Ok => Ok(()),
            Self::Recoverable(reason) => Err(Error::Recoverable(reason)),
            Self::Fatal(reason) => Err(Error::Fatal(reason)),
        }
    }
}

/// Classify a native status code.
pub const fn translate(code: OsStatus) -> Outcome {
    use codes::*;

    match code {
        NO_ERR => Outcome::Ok,

        CANNOT_DO_IN_CURRENT_CONTEXT => Outcome::Recoverable(Reason::CannotDoInCurrentContext),
        RENDER_TIMEOUT => Outcome::Recoverable(Reason::RenderTimeout),
        QUEUE_BUFFER_IN_QUEUE => Outcome::Recoverable(Reason::BufferInQueue),
        QUEUE_ENQUEUE_DURING_RESET => Outcome::Recoverable(Reason::EnqueueDuringReset),
        QUEUE_PRIME_TIMED_OUT => Outcome::Recoverable(Reason::PrimeTimedOut),
        DEVICE_PERMISSIONS => Outcome::Recoverable(Reason::DeviceBusy),

        UNIMPLEMENTED => Outcome::Fatal(Reason::Unimplemented),
        FILE_NOT_FOUND => Outcome::Fatal(Reason::FileNotFound),
        PARAM_ERR | INVALID_PARAMETER | QUEUE_INVALID_PARAMETER => Outcome::Fatal(Reason::InvalidParameter),
        MEM_FULL => Outcome::Fatal(Reason::OutOfMemory),
        INVALID_PROPERTY | PROPERTY_NOT_IN_USE | QUEUE_INVALID_PROPERTY => {
            Outcome::Fatal(Reason::InvalidProperty)
        }
        INVALID_PROPERTY_VALUE => Outcome::Fatal(Reason::InvalidPropertyValue),
        QUEUE_INVALID_PROPERTY_SIZE => Outcome::Fatal(Reason::InvalidPropertySize),
        PROPERTY_NOT_WRITABLE => Outcome::Fatal(Reason::PropertyNotWritable),
        INVALID_SCOPE => Outcome::Fatal(Reason::InvalidScope),
        INVALID_ELEMENT => Outcome::Fatal(Reason::InvalidElement),
        NO_CONNECTION => Outcome::Fatal(Reason::NoConnection),
        FAILED_INITIALIZATION => Outcome::Fatal(Reason::FailedInitialization),
        TOO_MANY_FRAMES_TO_PROCESS => Outcome::Fatal(Reason::TooManyFramesToProcess),
        INVALID_FILE | FILE_NOT_SPECIFIED => Outcome::Fatal(Reason::InvalidFile),
        UNKNOWN_FILE_TYPE => Outcome::Fatal(Reason::UnknownFileType),
        FORMAT_NOT_SUPPORTED => Outcome::Fatal(Reason::FormatNotSupported),
        UNINITIALIZED => Outcome::Fatal(Reason::Uninitialized),
        INITIALIZED => Outcome::Fatal(Reason::AlreadyInitialized),
        GRAPH_NODE_NOT_FOUND => Outcome::Fatal(Reason::NodeNotFound),
        GRAPH_INVALID_CONNECTION => Outcome::Fatal(Reason::InvalidConnection),
        GRAPH_OUTPUT_NODE_ERR => Outcome::Fatal(Reason::OutputNodeConflict),
        GRAPH_INVALID_AUDIO_UNIT => Outcome::Fatal(Reason::InvalidAudioUnit),
        QUEUE_INVALID_BUFFER | QUEUE_BUFFER_EMPTY => Outcome::Fatal(Reason::InvalidBuffer),
        QUEUE_INVALID_RUN_STATE | QUEUE_DISPOSAL_PENDING => Outcome::Fatal(Reason::InvalidRunState),
        QUEUE_CANNOT_START => Outcome::Fatal(Reason::CannotStart),
        QUEUE_INVALIDATED => Outcome::Fatal(Reason::QueueInvalidated),
        HARDWARE_BAD_OBJECT => Outcome::Fatal(Reason::InvalidHandle),
        HARDWARE_ILLEGAL_OPERATION => Outcome::Fatal(Reason::InvalidState),

        other => Outcome::Fatal(Reason::Unknown(other)),
    }
}

/// Translate a status and convert it into a `Result`.
///
/// Recoverable outcomes are logged at `warn` level since the caller is
/// expected to schedule a retry.
#[inline]
pub fn check(code: OsStatus) -> Result<()> {
    let outcome = translate(code);
    if let Outcome::Recoverable(reason) = outcome {
        log::warn!("engine asked to retry later: {} ({})", reason, code);
    }
    outcome.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_error_is_ok() {
        assert_eq!(translate(NO_ERR), Outcome::Ok);
        assert!(check(NO_ERR).is_ok());
    }

    #[test]
    fn test_busy_is_recoverable() {
        assert_eq!(
            translate(codes::CANNOT_DO_IN_CURRENT_CONTEXT),
            Outcome::Recoverable(Reason::CannotDoInCurrentContext)
        );
        let err = check(codes::CANNOT_DO_IN_CURRENT_CONTEXT).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unknown_negative_is_fatal() {
        assert_eq!(translate(-12345), Outcome::Fatal(Reason::Unknown(-12345)));
    }

    #[test]
    fn test_unknown_positive_is_fatal() {
        assert_eq!(translate(7), Outcome::Fatal(Reason::Unknown(7)));
        assert_eq!(
            translate(codes::HARDWARE_UNSPECIFIED),
            Outcome::Fatal(Reason::Unknown(codes::HARDWARE_UNSPECIFIED))
        );
    }

    #[test]
    fn test_known_fatal_codes() {
        assert_eq!(
            translate(codes::INITIALIZED),
            Outcome::Fatal(Reason::AlreadyInitialized)
        );
        assert_eq!(
            translate(codes::INVALID_PARAMETER),
            Outcome::Fatal(Reason::InvalidParameter)
        );
        assert_eq!(
            translate(codes::HARDWARE_BAD_OBJECT),
            Outcome::Fatal(Reason::InvalidHandle)
        );
    }

    #[test]
    fn test_queue_busy_is_recoverable() {
        assert_eq!(
            translate(codes::QUEUE_BUFFER_IN_QUEUE),
            Outcome::Recoverable(Reason::BufferInQueue)
        );
        assert_eq!(
            translate(codes::DEVICE_PERMISSIONS),
            Outcome::Recoverable(Reason::DeviceBusy)
        );
    }

    #[test]
    fn test_fourcc_codes_are_positive() {
        const _: () = assert!(codes::HARDWARE_BAD_OBJECT > 0);
        const _: () = assert!(codes::DEVICE_PERMISSIONS > 0);
    }
}

//! Error types for rsplib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Failure codes reported by the hardware
//! API are carried as [`ApiErrorCode`] inside [`Error::Api`].

use std::fmt;

use crate::types::{DeviceState, Model};

/// A discrete failure code reported by the hardware API.
///
/// These mirror the status values of the vendor library. Every code has a
/// human-readable [`Display`](fmt::Display) form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorCode {
    /// Generic failure.
    Fail,
    /// A parameter was rejected as malformed.
    InvalidParam,
    /// A parameter was outside the range the hardware accepts.
    OutOfRange,
    /// The gain update could not be applied.
    GainUpdateError,
    /// The RF (tuner frequency) update could not be applied.
    RfUpdateError,
    /// The sample rate update could not be applied.
    FsUpdateError,
    /// The hardware reported a fault.
    HwError,
    /// Streaming is already initialised.
    AlreadyInitialised,
    /// Streaming has not been initialised.
    NotInitialised,
    /// The device does not support the requested feature.
    NotEnabled,
    /// The hardware version is not supported by this library version.
    HwVerError,
    /// The library could not allocate stream buffers.
    OutOfMemory,
    /// The background API service is not running or not responding.
    ServiceNotResponding,
    /// The device is claimed by another session.
    DeviceAlreadyClaimed,
    /// The device was unplugged or stopped responding.
    DeviceRemoved,
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiErrorCode::Fail => "operation failed",
            ApiErrorCode::InvalidParam => "invalid parameter",
            ApiErrorCode::OutOfRange => "parameter out of range",
            ApiErrorCode::GainUpdateError => "gain update error",
            ApiErrorCode::RfUpdateError => "RF frequency update error",
            ApiErrorCode::FsUpdateError => "sample rate update error",
            ApiErrorCode::HwError => "hardware error",
            ApiErrorCode::AlreadyInitialised => "stream already initialised",
            ApiErrorCode::NotInitialised => "stream not initialised",
            ApiErrorCode::NotEnabled => "feature not enabled on this device",
            ApiErrorCode::HwVerError => "unsupported hardware version",
            ApiErrorCode::OutOfMemory => "out of memory",
            ApiErrorCode::ServiceNotResponding => "API service not responding",
            ApiErrorCode::DeviceAlreadyClaimed => "device already claimed",
            ApiErrorCode::DeviceRemoved => "device removed",
        };
        write!(f, "{s}")
    }
}

/// Result type returned by [`HardwareApi`](crate::api::HardwareApi) methods.
pub type ApiResult<T> = std::result::Result<T, ApiErrorCode>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The hardware API is unavailable or failed to initialise.
    Session,
    /// The requested device is not present or is already claimed.
    Selection,
    /// The operation is not valid in the current lifecycle state.
    State,
    /// A value was out of range or rejected by the firmware.
    Parameter,
    /// Communication with already-open hardware was lost.
    Transport,
}

/// The error type for all rsplib operations.
///
/// Every variant is recoverable: the caller may retry, pick a different
/// device, or tear the session down.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The hardware API could not be opened.
    #[error("hardware API unavailable: {0}")]
    SessionUnavailable(String),

    /// The requested device is not currently attached.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The requested device is claimed by another session.
    #[error("device busy: {0}")]
    DeviceBusy(String),

    /// The operation is not valid in the current lifecycle state.
    #[error("{operation} not allowed in state {actual} (requires {required})")]
    InvalidState {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Human-readable description of the state(s) that would accept it.
        required: &'static str,
        /// The state the device was in.
        actual: DeviceState,
    },

    /// A variant-specific control was used after a different model was
    /// selected.
    #[error("{operation} requires {expected}, selected device is {actual}")]
    WrongVariant {
        /// Name of the rejected operation.
        operation: &'static str,
        /// The receiver family the control belongs to.
        expected: &'static str,
        /// The model that is actually selected.
        actual: Model,
    },

    /// A parameter was outside the supported range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The hardware API rejected a call.
    #[error("{operation} failed: {code}")]
    Api {
        /// Name of the hardware API call that failed.
        operation: &'static str,
        /// The code reported by the hardware API.
        code: ApiErrorCode,
    },

    /// The selected device stopped responding or was unplugged.
    #[error("connection lost")]
    ConnectionLost,
}

impl Error {
    /// Wrap a hardware API failure code, naming the call that produced it.
    pub fn api(operation: &'static str, code: ApiErrorCode) -> Self {
        Error::Api { operation, code }
    }

    /// Classify this error according to the error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SessionUnavailable(_) => ErrorKind::Session,
            Error::DeviceNotFound(_) | Error::DeviceBusy(_) => ErrorKind::Selection,
            Error::InvalidState { .. } | Error::WrongVariant { .. } => ErrorKind::State,
            Error::InvalidParameter(_) => ErrorKind::Parameter,
            Error::ConnectionLost => ErrorKind::Transport,
            Error::Api { code, .. } => match code {
                ApiErrorCode::ServiceNotResponding => ErrorKind::Session,
                ApiErrorCode::DeviceAlreadyClaimed => ErrorKind::Selection,
                ApiErrorCode::AlreadyInitialised | ApiErrorCode::NotInitialised => {
                    ErrorKind::State
                }
                ApiErrorCode::HwError | ApiErrorCode::DeviceRemoved => ErrorKind::Transport,
                _ => ErrorKind::Parameter,
            },
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_session() {
        let e = Error::SessionUnavailable("driver not installed".into());
        assert_eq!(e.to_string(), "hardware API unavailable: driver not installed");
    }

    #[test]
    fn error_display_invalid_state() {
        let e = Error::InvalidState {
            operation: "start_streaming",
            required: "StreamingInitialized",
            actual: DeviceState::DeviceSelected,
        };
        assert_eq!(
            e.to_string(),
            "start_streaming not allowed in state DeviceSelected (requires StreamingInitialized)"
        );
    }

    #[test]
    fn error_display_wrong_variant() {
        let e = Error::WrongVariant {
            operation: "set_hdr_mode",
            expected: "RSPdx family",
            actual: Model::Rsp1A,
        };
        assert_eq!(
            e.to_string(),
            "set_hdr_mode requires RSPdx family, selected device is RSP1A"
        );
    }

    #[test]
    fn error_display_api() {
        let e = Error::api("update", ApiErrorCode::RfUpdateError);
        assert_eq!(e.to_string(), "update failed: RF frequency update error");
    }

    #[test]
    fn error_display_connection_lost() {
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
    }

    #[test]
    fn error_kind_taxonomy() {
        assert_eq!(
            Error::SessionUnavailable("x".into()).kind(),
            ErrorKind::Session
        );
        assert_eq!(Error::DeviceBusy("x".into()).kind(), ErrorKind::Selection);
        assert_eq!(Error::DeviceNotFound("x".into()).kind(), ErrorKind::Selection);
        assert_eq!(Error::InvalidParameter("x".into()).kind(), ErrorKind::Parameter);
        assert_eq!(Error::ConnectionLost.kind(), ErrorKind::Transport);
    }

    #[test]
    fn error_kind_from_api_code() {
        assert_eq!(
            Error::api("open", ApiErrorCode::ServiceNotResponding).kind(),
            ErrorKind::Session
        );
        assert_eq!(
            Error::api("select_device", ApiErrorCode::DeviceAlreadyClaimed).kind(),
            ErrorKind::Selection
        );
        assert_eq!(
            Error::api("start_stream", ApiErrorCode::NotInitialised).kind(),
            ErrorKind::State
        );
        assert_eq!(
            Error::api("update", ApiErrorCode::OutOfRange).kind(),
            ErrorKind::Parameter
        );
        assert_eq!(
            Error::api("update", ApiErrorCode::HwError).kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}

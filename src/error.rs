//! Error types for stream-capture.
//!
//! All errors are terminal to the current start attempt only: they leave
//! the source idle with consistent state, and the next reconciliation
//! retries from scratch. Recoverable runtime conditions (audio holes,
//! post-teardown callbacks) are handled inline and never surface here.

use crate::format::SampleFormat;

/// Errors that abort a capture start attempt.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// An asynchronous server query returned a failure code.
    #[error("server query failed: {what}")]
    QueryFailed {
        /// Which query failed.
        what: &'static str,
    },

    /// A blocking query was never answered before its deadline.
    ///
    /// This usually means the server's dispatch thread is gone.
    #[error("server query timed out: {what}")]
    QueryTimeout {
        /// Which query timed out.
        what: &'static str,
    },

    /// The server reported an error while resolving a device.
    #[error("unable to resolve device info for '{device}'")]
    DeviceInfoFailed {
        /// Device identifier that could not be resolved.
        device: String,
    },

    /// The resolved sample spec is not valid for recording.
    #[error("sample spec is not valid: {format}, {rate} Hz, {channels} channels")]
    InvalidSampleSpec {
        /// Resolved sample format.
        format: SampleFormat,
        /// Resolved sample rate.
        rate: u32,
        /// Configured channel count.
        channels: u8,
    },

    /// The server refused to create a stream handle.
    #[error("unable to create stream for device '{device}'")]
    StreamCreateFailed {
        /// Device the stream was meant to record from.
        device: String,
    },

    /// Connecting the stream for recording failed; all partially created
    /// resources have been torn down.
    #[error("unable to connect stream to '{device}' (code {code})")]
    StreamConnectFailed {
        /// Device the connect targeted.
        device: String,
        /// Failure code reported by the server.
        code: i32,
    },

    /// A channel map exceeded the server's channel limit.
    #[error("channel map has {got} entries, limit is {limit}")]
    TooManyChannels {
        /// Requested entry count.
        got: usize,
        /// Maximum supported channels.
        limit: usize,
    },

    /// A channel map was empty.
    #[error("channel map must have at least one entry")]
    EmptyChannelMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CaptureError::DeviceInfoFailed {
            device: "alsa_input.usb".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unable to resolve device info for 'alsa_input.usb'"
        );
    }

    #[test]
    fn test_invalid_spec_display() {
        let err = CaptureError::InvalidSampleSpec {
            format: SampleFormat::Invalid,
            rate: 0,
            channels: 2,
        };
        assert!(err.to_string().contains("invalid"));
        assert!(err.to_string().contains("0 Hz"));
    }
}

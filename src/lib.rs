//! # stream-capture
//!
//! Multichannel audio capture from a sound server's input and
//! output-monitor devices, delivering timestamped PCM frame batches to
//! a consuming media pipeline.
//!
//! The sound server itself is abstracted behind the
//! [`ServerClient`](server::ServerClient) trait: a real backend supplies
//! the wire protocol and a single dispatch thread for callbacks, while
//! [`server::mock::FakeServer`] provides a deterministic in-memory
//! server for tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stream_capture::{
//!     frame_callback, CaptureSettings, CaptureSource, Direction, ServerSession,
//! };
//!
//! let session = ServerSession::connect(Arc::new(my_backend));
//! let mut source = CaptureSource::new(
//!     session,
//!     "desktop audio",
//!     Direction::OutputMonitor,
//!     frame_callback(|frame| pipeline.push(frame)),
//! );
//!
//! // Apply settings; the stream restarts only when they changed.
//! source.update(&CaptureSettings::default());
//!
//! // ...later
//! source.stop();
//! ```
//!
//! ## Architecture
//!
//! - **Control plane** ([`CaptureSource`]): reconciles settings against
//!   the active configuration and owns the stream lifecycle.
//! - **Query layer** ([`resolve_server_info`], [`resolve_device_info`]):
//!   blocking wrappers over the server's async device and format
//!   queries, used off the audio path.
//! - **Stream controller** ([`CaptureStream`]): the live record stream,
//!   its read callback, presentation timestamps, and the startup guard
//!   that absorbs post-connect jitter.
//!
//! All server callbacks run on one dispatch thread; cross-thread API
//! calls hold the session's global lock, and blocking queries wait on
//! the session's shared completion signal.

#![warn(missing_docs)]

mod config;
mod devices;
mod error;
mod format;
mod frame;
mod query;
mod source;
mod stream;

pub mod server;

pub use config::{
    CaptureConfig, CaptureSettings, ChannelMap, Direction, DEFAULT_DEVICE, MAX_CHANNELS,
};
pub use devices::{list_input_devices, list_output_monitor_devices, DeviceEntry};
pub use error::CaptureError;
pub use format::{
    channels_to_speaker_layout, sample_format_to_audio_format, AudioFormat, ChannelPosition,
    SampleFormat, SpeakerLayout,
};
pub use frame::{frame_callback, AudioFrame, FrameCallback};
pub use query::{resolve_device_info, resolve_server_info, ResolvedStreamFormat};
pub use server::{monotonic_clock, Clock, ServerSession, Tuning};
pub use source::CaptureSource;
pub use stream::{CaptureStats, CaptureStream, RunningStats};

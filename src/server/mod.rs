//! Abstract sound-server client capability.
//!
//! The wire protocol is out of scope for this crate; everything it needs
//! from the server is captured by the [`ServerClient`] trait. A real
//! backend drives all callbacks from a single dispatch thread; the
//! [`mock::FakeServer`] drives them synchronously from the calling
//! thread, which preserves the single-context ordering guarantee while
//! keeping tests deterministic.

mod session;

pub mod mock;

pub use session::{monotonic_clock, Clock, ServerSession, Tuning};

use std::time::Duration;

use bytes::Bytes;

use crate::config::MAX_CHANNELS;
use crate::format::SampleFormat;

/// Highest sample rate the server accepts (8 x 48 kHz).
pub const RATE_MAX: u32 = 384_000;

/// Identity and defaults reported by the server.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Server implementation name.
    pub name: String,
    /// Server version string.
    pub version: String,
    /// Name of the current default capture device.
    pub default_source_name: String,
    /// Name of the current default playback sink.
    pub default_sink_name: String,
}

/// One capture device, as reported by the server.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Stable device identifier.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// The sink this source monitors, if it is a monitor source.
    pub monitor_of_sink: Option<u32>,
    /// Native sample format of the device.
    pub sample_format: SampleFormat,
    /// Native sample rate of the device.
    pub sample_rate: u32,
    /// Native channel count of the device.
    pub channels: u8,
}

/// One playback sink, as reported by the server.
#[derive(Debug, Clone)]
pub struct SinkInfo {
    /// Stable sink identifier.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Index of the sink's monitor source, if it has one.
    pub monitor_source: Option<u32>,
    /// Name of the sink's monitor source.
    pub monitor_source_name: String,
}

/// One delivery from a list-style query.
///
/// List queries invoke their callback once per item, then once more with
/// either [`ListEvent::End`] or [`ListEvent::Error`].
#[derive(Debug)]
pub enum ListEvent<'a, T> {
    /// One item of the list.
    Item(&'a T),
    /// Terminating call: the list is complete.
    End,
    /// Terminating call: the query failed server-side.
    Error,
}

/// Callback receiving server identity.
pub type ServerInfoCallback = Box<dyn FnOnce(&ServerInfo) + Send>;

/// Callback receiving a list of items item-by-item.
pub type ListCallback<T> = Box<dyn FnMut(ListEvent<'_, T>) + Send>;

/// Callback invoked on the dispatch thread when stream data is ready.
/// The argument is the server's byte-count hint for the ready region.
pub type ReadCallback = Box<dyn FnMut(usize) + Send>;

/// Format, rate, and channel count of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    /// Sample format.
    pub format: SampleFormat,
    /// Sample rate in Hz.
    pub rate: u32,
    /// Channel count.
    pub channels: u8,
}

impl SampleSpec {
    /// Returns `true` if the server would accept this spec for a stream.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.format != SampleFormat::Invalid
            && self.rate > 0
            && self.rate <= RATE_MAX
            && self.channels >= 1
            && usize::from(self.channels) <= MAX_CHANNELS
    }

    /// Returns the size of one frame (one sample per channel) in bytes.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.format.bytes_per_sample() * usize::from(self.channels)
    }

    /// Returns how many bytes cover the given playback duration.
    #[must_use]
    pub fn bytes_for_duration(&self, duration: Duration) -> u32 {
        let frames = duration.as_nanos() * u128::from(self.rate) / 1_000_000_000;
        (frames * self.frame_size() as u128) as u32
    }
}

/// Sentinel for buffer attributes left to the server's discretion.
pub const DONT_CARE: u32 = u32::MAX;

/// Server-side buffering attributes for a record stream.
#[derive(Debug, Clone, Copy)]
pub struct BufferAttr {
    /// Fragment size: granularity of read callbacks, in bytes.
    pub fragsize: u32,
    /// Maximum buffer length.
    pub maxlength: u32,
    /// Minimum request size (playback only).
    pub minreq: u32,
    /// Pre-buffering (playback only).
    pub prebuf: u32,
    /// Target buffer length (playback only).
    pub tlength: u32,
}

impl BufferAttr {
    /// Attributes for recording: an explicit fragment size, everything
    /// else left to the server.
    #[must_use]
    pub fn recording(fragsize: u32) -> Self {
        Self {
            fragsize,
            maxlength: DONT_CARE,
            minreq: DONT_CARE,
            prebuf: DONT_CARE,
            tlength: DONT_CARE,
        }
    }
}

/// Flags for connecting a record stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    /// Let the server adjust buffering for the requested latency.
    pub adjust_latency: bool,
    /// Pin the stream to its device; disable automatic migration.
    pub dont_move: bool,
}

/// Opaque handle to a server-side record stream.
///
/// Handles are cheap to clone; the server reference-counts the
/// underlying object and [`ServerClient::stream_unref`] releases it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamHandle(u64);

impl StreamHandle {
    /// Wraps a raw server-side stream identifier.
    #[must_use]
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Result of peeking at a stream's capture buffer.
#[derive(Debug, Clone)]
pub enum Peek {
    /// No data is ready.
    Empty,
    /// An audio hole: the given number of bytes elapsed without data
    /// (buffer gap, e.g. after an overrun). Must still be dropped.
    Hole(usize),
    /// Captured bytes, valid until the region is dropped.
    Data(Bytes),
}

impl Peek {
    /// Returns the byte count of the peeked region.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Hole(bytes) => *bytes,
            Self::Data(data) => data.len(),
        }
    }

    /// Returns `true` if no data is ready.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Operations the sound server exposes to this crate.
///
/// All callbacks are eventually invoked on the server's single dispatch
/// thread. Integer returns follow the server convention: any negative
/// value is a failure, with no structured payload.
pub trait ServerClient: Send + Sync {
    /// Requests server identity and default device names.
    fn get_server_info(&self, callback: ServerInfoCallback) -> i32;

    /// Requests info for one capture device by name. The callback is
    /// invoked with the item (if found) and then a terminator.
    fn get_source_info(&self, name: &str, callback: ListCallback<SourceInfo>) -> i32;

    /// Requests the list of all capture devices.
    fn get_source_info_list(&self, callback: ListCallback<SourceInfo>) -> i32;

    /// Requests the list of all playback sinks.
    fn get_sink_info_list(&self, callback: ListCallback<SinkInfo>) -> i32;

    /// Creates a named record stream bound to a sample spec and channel
    /// map. Returns `None` if the server refuses.
    fn stream_new(
        &self,
        name: &str,
        spec: &SampleSpec,
        map: &[crate::format::ChannelPosition],
    ) -> Option<StreamHandle>;

    /// Registers the read callback for a stream.
    fn stream_set_read_callback(&self, handle: &StreamHandle, callback: ReadCallback);

    /// Connects a stream for recording from the given device.
    fn stream_connect_record(
        &self,
        handle: &StreamHandle,
        device: &str,
        attr: &BufferAttr,
        flags: StreamFlags,
    ) -> i32;

    /// Disconnects a connected stream.
    fn stream_disconnect(&self, handle: &StreamHandle) -> i32;

    /// Releases a stream reference. The handle is dead afterwards.
    fn stream_unref(&self, handle: StreamHandle);

    /// Peeks at the next ready region of a stream without consuming it.
    fn stream_peek(&self, handle: &StreamHandle) -> Peek;

    /// Releases the currently peeked region back to the server.
    fn stream_drop(&self, handle: &StreamHandle);
}

//! Live record stream: connect, read callback, timestamps, teardown.
//!
//! A [`CaptureStream`] owns exactly one server-side record stream. The
//! handle lives in a shared slot that the read callback re-checks on
//! every invocation: teardown clears the slot under the global lock
//! before releasing the handle, so a callback racing with `stop()` finds
//! the slot empty and does nothing. That race is expected, not a fault.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::format::{channels_to_speaker_layout, sample_format_to_audio_format};
use crate::format::{AudioFormat, SpeakerLayout};
use crate::frame::{AudioFrame, FrameCallback};
use crate::query::ResolvedStreamFormat;
use crate::server::{BufferAttr, Peek, SampleSpec, ServerSession, StreamFlags, StreamHandle};

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Packet and frame counters for a capture source, plus the startup
/// guard deadline. Shared between the control plane and the read
/// callback; fully reset on every stop so nothing leaks between stream
/// generations.
#[derive(Debug, Default)]
pub struct RunningStats {
    packets: AtomicU64,
    frames: AtomicU64,
    /// Startup-guard deadline in nanoseconds; 0 means "no batch seen
    /// since the last (re)start".
    first_ts: AtomicU64,
}

impl RunningStats {
    /// Creates zeroed stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counters as a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            packets: self.packets.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
        }
    }

    /// Zeroes the counters and clears the startup-guard deadline.
    pub fn reset(&self) {
        self.packets.store(0, Ordering::Relaxed);
        self.frames.store(0, Ordering::Relaxed);
        self.first_ts.store(0, Ordering::Relaxed);
    }

    fn record_batch(&self, frames: u64) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.frames.fetch_add(frames, Ordering::Relaxed);
    }
}

/// Snapshot of the running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Batches examined since the last stop.
    pub packets: u64,
    /// Frames examined since the last stop.
    pub frames: u64,
}

/// Converts a frame count to its playback duration in nanoseconds.
pub(crate) fn frames_to_ns(frames: u64, rate: u32) -> u64 {
    if rate == 0 {
        return 0;
    }
    (u128::from(frames) * u128::from(NSEC_PER_SEC) / u128::from(rate)) as u64
}

/// State shared between the controller and the read callback.
struct StreamShared {
    /// The handle slot. Cleared under the global server-access lock
    /// before release; the callback treats an empty slot as "already
    /// torn down".
    handle: Mutex<Option<StreamHandle>>,
    stats: Arc<RunningStats>,
    layout: SpeakerLayout,
    format: AudioFormat,
    sample_rate: u32,
    bytes_per_frame: usize,
    guard_ns: u64,
    frame_callback: FrameCallback,
}

/// An open record stream delivering timestamped frames to a consumer.
///
/// Exists only while capturing; [`CaptureStream::stop`] (or drop)
/// disconnects and releases the server-side stream.
pub struct CaptureStream {
    session: Arc<ServerSession>,
    shared: Arc<StreamShared>,
    device: String,
}

impl CaptureStream {
    /// Opens a record stream on `device` with the resolved format and
    /// the configuration's channel map, and connects it for recording.
    ///
    /// On any failure every partially created resource is torn down
    /// before the error is returned; there is no half-open state.
    ///
    /// # Errors
    ///
    /// Fails if the sample spec is invalid, the server refuses the
    /// stream, or the connect is rejected.
    pub fn open(
        session: Arc<ServerSession>,
        name: &str,
        device: &str,
        config: &CaptureConfig,
        resolved: &ResolvedStreamFormat,
        stats: Arc<RunningStats>,
        frame_callback: FrameCallback,
    ) -> Result<Self, CaptureError> {
        let spec = SampleSpec {
            format: resolved.sample_format,
            rate: resolved.sample_rate,
            channels: config.channels(),
        };
        if !spec.is_valid() {
            tracing::error!(?spec, "sample spec is not valid");
            return Err(CaptureError::InvalidSampleSpec {
                format: spec.format,
                rate: spec.rate,
                channels: spec.channels,
            });
        }

        let shared = Arc::new(StreamShared {
            handle: Mutex::new(None),
            stats,
            layout: channels_to_speaker_layout(config.channels()),
            format: sample_format_to_audio_format(resolved.sample_format),
            sample_rate: resolved.sample_rate,
            bytes_per_frame: spec.frame_size(),
            guard_ns: session.tuning().startup_guard.as_nanos() as u64,
            frame_callback,
        });

        let handle = {
            let _guard = session.lock();
            session
                .client()
                .stream_new(name, &spec, config.channel_map().positions())
        }
        .ok_or_else(|| CaptureError::StreamCreateFailed {
            device: device.to_string(),
        })?;
        *shared.handle.lock() = Some(handle.clone());

        let stream = Self {
            session: Arc::clone(&session),
            shared: Arc::clone(&shared),
            device: device.to_string(),
        };

        {
            let callback_session = Arc::clone(&session);
            let callback_shared = Arc::clone(&shared);
            let _guard = session.lock();
            session.client().stream_set_read_callback(
                &handle,
                Box::new(move |_nbytes| {
                    read_ready(&callback_session, &callback_shared);
                }),
            );
        }

        let attr = BufferAttr::recording(spec.bytes_for_duration(session.tuning().fragment));
        let flags = StreamFlags {
            adjust_latency: true,
            // Follow the server's default-device switching unless an
            // explicit device was configured.
            dont_move: !config.is_default(),
        };

        let rc = {
            let _guard = session.lock();
            session
                .client()
                .stream_connect_record(&handle, device, &attr, flags)
        };
        if rc < 0 {
            stream.stop();
            tracing::error!(%device, code = rc, "unable to connect stream");
            return Err(CaptureError::StreamConnectFailed {
                device: device.to_string(),
                code: rc,
            });
        }

        if config.is_default() {
            tracing::info!(%device, "started recording (default)");
        } else {
            tracing::info!(%device, "started recording");
        }
        Ok(stream)
    }

    /// Returns the device this stream records from.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Disconnects and releases the server-side stream.
    ///
    /// Idempotent; safe to call concurrently with an in-flight read
    /// callback, which will find the handle slot already cleared.
    pub fn stop(&self) {
        let _guard = self.session.lock();
        // Clear the slot before releasing so a racing callback backs off.
        let Some(handle) = self.shared.handle.lock().take() else {
            return;
        };
        self.session.client().stream_disconnect(&handle);
        self.session.client().stream_unref(handle);
        drop(_guard);

        tracing::info!(device = %self.device, "stopped recording");
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read-side of the stream, invoked on the server's dispatch thread
/// whenever data is ready.
///
/// May be invoked even after the stream was disconnected; the empty
/// handle slot makes that a no-op. Signals the shared completion
/// channel exactly once on every exit path.
fn read_ready(session: &Arc<ServerSession>, shared: &StreamShared) {
    let handle = shared.handle.lock().clone();
    let Some(handle) = handle else {
        session.signal();
        return;
    };

    match session.client().stream_peek(&handle) {
        Peek::Empty => {}
        Peek::Hole(bytes) => {
            tracing::error!(bytes, "got audio hole");
            session.client().stream_drop(&handle);
        }
        Peek::Data(data) => {
            let frames = (data.len() / shared.bytes_per_frame) as u64;
            // The batch sat in the server buffer while being captured:
            // its presentation time is now minus its own duration.
            let timestamp = session
                .now_ns()
                .saturating_sub(frames_to_ns(frames, shared.sample_rate));

            let deadline = shared.stats.first_ts.load(Ordering::Relaxed);
            if deadline == 0 {
                // First batch after (re)start: arm the guard, suppress.
                shared
                    .stats
                    .first_ts
                    .store(timestamp + shared.guard_ns, Ordering::Relaxed);
            } else if timestamp > deadline {
                (shared.frame_callback)(AudioFrame {
                    layout: shared.layout,
                    sample_rate: shared.sample_rate,
                    format: shared.format,
                    data: &data,
                    frames: frames as usize,
                    timestamp_ns: timestamp,
                });
            }

            shared.stats.record_batch(frames);
            session.client().stream_drop(&handle);
        }
    }

    session.signal();
}

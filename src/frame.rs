//! Timestamped PCM frame batches delivered to the consumer.

use std::sync::Arc;

use crate::format::{AudioFormat, SpeakerLayout};

/// A batch of interleaved PCM frames handed to the consumer callback.
///
/// The data is borrowed from the server's capture buffer and is only
/// valid for the duration of the callback; consumers that need to keep
/// it must copy.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    /// Speaker layout derived from the configured channel count.
    pub layout: SpeakerLayout,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Sample format of `data`.
    pub format: AudioFormat,
    /// Interleaved PCM bytes, `frames * bytes_per_frame` long.
    pub data: &'a [u8],
    /// Number of frames in `data` (one sample per channel each).
    pub frames: usize,
    /// Presentation timestamp in nanoseconds of monotonic time,
    /// referring to when capture of the first frame in the batch began.
    pub timestamp_ns: u64,
}

/// Callback type receiving captured frame batches.
///
/// Invoked zero or more times per capture session, never after `stop()`
/// has returned, and never concurrently for the same source.
pub type FrameCallback = Arc<dyn Fn(AudioFrame<'_>) + Send + Sync>;

/// Creates a [`FrameCallback`] from a closure.
///
/// # Example
///
/// ```
/// use stream_capture::frame_callback;
///
/// let callback = frame_callback(|frame| {
///     println!("{} frames at {} Hz", frame.frames, frame.sample_rate);
/// });
/// ```
pub fn frame_callback<F>(f: F) -> FrameCallback
where
    F: Fn(AudioFrame<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_frame_callback_helper() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let callback = frame_callback(move |frame| {
            seen_clone.fetch_add(frame.frames, Ordering::SeqCst);
        });

        let data = [0u8; 16];
        callback(AudioFrame {
            layout: SpeakerLayout::Stereo,
            sample_rate: 48000,
            format: AudioFormat::S16Bit,
            data: &data,
            frames: 4,
            timestamp_ns: 0,
        });

        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }
}

//! A reconciliation-driven capture source.
//!
//! `CaptureSource` is the control-plane object the host owns: it holds
//! the active configuration and at most one live stream, and applies
//! new settings by stopping and restarting the stream only when the
//! reconciled configuration actually changed.

use std::sync::Arc;

use crate::config::{CaptureConfig, CaptureSettings, Direction};
use crate::error::CaptureError;
use crate::frame::FrameCallback;
use crate::query::{resolve_device_info, resolve_server_info};
use crate::server::ServerSession;
use crate::stream::{CaptureStats, CaptureStream, RunningStats};

/// One logical capture source feeding a consumer callback.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use stream_capture::server::mock::FakeServer;
/// use stream_capture::{
///     frame_callback, CaptureSettings, CaptureSource, Direction, ServerSession,
/// };
///
/// let session = ServerSession::connect(Arc::new(FakeServer::new()));
/// let mut source = CaptureSource::new(
///     session,
///     "music capture",
///     Direction::Input,
///     frame_callback(|frame| println!("{} frames", frame.frames)),
/// );
///
/// // No such device on the fake server, so the start attempt fails and
/// // the source stays idle until the next settings change retries.
/// assert!(!source.update(&CaptureSettings::default()));
/// ```
pub struct CaptureSource {
    session: Arc<ServerSession>,
    name: String,
    config: CaptureConfig,
    stats: Arc<RunningStats>,
    stream: Option<CaptureStream>,
    frame_callback: FrameCallback,
}

impl CaptureSource {
    /// Creates an idle source. No stream exists until the first
    /// [`update`](Self::update).
    #[must_use]
    pub fn new(
        session: Arc<ServerSession>,
        name: &str,
        direction: Direction,
        frame_callback: FrameCallback,
    ) -> Self {
        Self {
            session,
            name: name.to_string(),
            config: CaptureConfig::initial(direction),
            stats: Arc::new(RunningStats::new()),
            stream: None,
            frame_callback,
        }
    }

    /// Applies new settings.
    ///
    /// Reconciles them against the active configuration; if the device
    /// or channel map changed, the active stream is stopped and a new
    /// one started. An idle source (including one whose previous start
    /// failed) retries the start even when nothing changed.
    ///
    /// Returns `true` if a stream is capturing when the call returns.
    /// Start failures are logged; there is no structured error to
    /// surface to the settings UI beyond this boolean.
    pub fn update(&mut self, requested: &CaptureSettings) -> bool {
        let (new_config, restart) = self.config.reconcile(requested);

        if !restart && self.stream.is_some() {
            return true;
        }

        if restart && self.stream.is_some() {
            self.stop();
        }
        self.config = new_config;

        match self.start_stream() {
            Ok(stream) => {
                self.stream = Some(stream);
                true
            }
            Err(error) => {
                tracing::error!(%error, "unable to start recording");
                false
            }
        }
    }

    fn start_stream(&self) -> Result<CaptureStream, CaptureError> {
        let device = resolve_server_info(&self.session, &self.config)?;
        let resolved = resolve_device_info(&self.session, &device, self.config.channels())?;

        CaptureStream::open(
            Arc::clone(&self.session),
            &self.name,
            &device,
            &self.config,
            &resolved,
            Arc::clone(&self.stats),
            Arc::clone(&self.frame_callback),
        )
    }

    /// Stops any active stream, logs the cumulative counters, and
    /// resets them. A no-op on an idle source apart from the stat log.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }

        let totals = self.stats.snapshot();
        tracing::info!(
            packets = totals.packets,
            frames = totals.frames,
            "capture totals"
        );
        self.stats.reset();
    }

    /// Returns `true` while a stream is capturing.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Returns the running packet and frame counters.
    #[must_use]
    pub fn stats(&self) -> CaptureStats {
        self.stats.snapshot()
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Blocking queries against the server's async API.
//!
//! Device discovery is not on the real-time audio path, so these calls
//! deliberately block the caller: each issues an asynchronous request
//! and waits on the session's completion signal until the dispatch
//! thread answers, or until the query deadline passes.

use crate::config::{CaptureConfig, Direction};
use crate::error::CaptureError;
use crate::format::{sample_format_to_audio_format, AudioFormat, SampleFormat};
use std::sync::Arc;

use crate::server::{ListEvent, ServerSession};

/// Suffix turning a sink name into the name of its monitor source.
pub(crate) const MONITOR_SUFFIX: &str = ".monitor";

/// Stream format resolved from the server for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedStreamFormat {
    /// Server-native sample format, post-substitution. Never `Invalid`
    /// when obtained through [`resolve_device_info`].
    pub sample_format: SampleFormat,
    /// Native sample rate in Hz.
    pub sample_rate: u32,
    /// Bytes per frame for the configured channel count.
    pub bytes_per_frame: usize,
}

/// Resolves the server's identity and returns the device name to record
/// from. An explicit configuration passes its identifier through; a
/// default-device configuration resolves to the server's current default
/// source (input) or the default sink's monitor source (output monitor).
///
/// # Errors
///
/// Fails if the server rejects the query or does not answer in time.
pub fn resolve_server_info(
    session: &Arc<ServerSession>,
    config: &CaptureConfig,
) -> Result<String, CaptureError> {
    let promise = session.promise::<ServerInfoSnapshot>();
    let fulfiller = promise.fulfiller();
    let dispatch = Arc::clone(session);

    let rc = {
        let _guard = session.lock();
        session.client().get_server_info(Box::new(move |info| {
            fulfiller.fulfill(ServerInfoSnapshot {
                name: info.name.clone(),
                version: info.version.clone(),
                default_source_name: info.default_source_name.clone(),
                default_sink_name: info.default_sink_name.clone(),
            });
            dispatch.signal();
        }))
    };
    if rc < 0 {
        tracing::error!("unable to get server info");
        return Err(CaptureError::QueryFailed {
            what: "server info",
        });
    }

    let info = promise.wait().ok_or(CaptureError::QueryTimeout {
        what: "server info",
    })?;

    tracing::info!(server = %info.name, version = %info.version, "server identity");

    if !config.is_default() {
        return Ok(config.device().to_string());
    }

    let device = match config.direction() {
        Direction::Input => info.default_source_name,
        Direction::OutputMonitor => format!("{}{MONITOR_SUFFIX}", info.default_sink_name),
    };
    tracing::debug!(%device, "resolved default device");
    Ok(device)
}

/// Resolves the native format of one device and derives the stream
/// format for the configured channel count.
///
/// Native formats the consumer cannot ingest are substituted with
/// 32-bit float, a superset format; the substitution is informational,
/// not an error.
///
/// # Errors
///
/// Fails if the query is rejected, reports a server-side error, or does
/// not answer in time.
pub fn resolve_device_info(
    session: &Arc<ServerSession>,
    device: &str,
    channels: u8,
) -> Result<ResolvedStreamFormat, CaptureError> {
    let promise = session.promise::<(SampleFormat, u32)>();
    let fulfiller = promise.fulfiller();
    let dispatch = Arc::clone(session);

    let issue_guard = session.lock();
    let rc = session.client().get_source_info(
        device,
        Box::new(move |event| {
            match event {
                ListEvent::Item(info) => {
                    tracing::info!(
                        format = %info.sample_format,
                        rate = info.sample_rate,
                        channels = info.channels,
                        "device native format"
                    );
                    let mut format = info.sample_format;
                    if sample_format_to_audio_format(format) == AudioFormat::Unknown {
                        tracing::info!(
                            native = %info.sample_format,
                            substitute = %SampleFormat::F32Le,
                            "native sample format not supported, substituting for recording"
                        );
                        format = SampleFormat::F32Le;
                    }
                    fulfiller.fulfill((format, info.sample_rate));
                }
                // End with no preceding item: the name matched nothing.
                // First write wins, so this is a no-op after an item.
                ListEvent::End => fulfiller.fulfill((SampleFormat::Invalid, 0)),
                // Server-side failure: resolve to Invalid and let the
                // caller abort the start attempt.
                ListEvent::Error => fulfiller.fulfill((SampleFormat::Invalid, 0)),
            }
            dispatch.signal();
        }),
    );
    drop(issue_guard);
    if rc < 0 {
        tracing::error!(%device, "unable to get source info");
        return Err(CaptureError::QueryFailed {
            what: "source info",
        });
    }

    let (sample_format, sample_rate) = promise.wait().ok_or(CaptureError::QueryTimeout {
        what: "source info",
    })?;

    if sample_format == SampleFormat::Invalid {
        tracing::error!(%device, "an error occurred while getting the source info");
        return Err(CaptureError::DeviceInfoFailed {
            device: device.to_string(),
        });
    }

    Ok(ResolvedStreamFormat {
        sample_format,
        sample_rate,
        bytes_per_frame: sample_format.bytes_per_sample() * usize::from(channels),
    })
}

#[derive(Debug, Clone)]
struct ServerInfoSnapshot {
    name: String,
    version: String,
    default_source_name: String,
    default_sink_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureConfig, CaptureSettings};
    use crate::server::mock::FakeServer;
    use crate::server::{monotonic_clock, SourceInfo, Tuning};
    use std::time::{Duration, Instant};

    fn session_over(server: FakeServer) -> Arc<ServerSession> {
        ServerSession::connect_with(
            Arc::new(server),
            Tuning {
                query_timeout: Duration::from_millis(100),
                ..Tuning::default()
            },
            monotonic_clock(),
        )
    }

    fn default_config(direction: Direction) -> CaptureConfig {
        let (config, _) = CaptureConfig::initial(direction).reconcile(&CaptureSettings::default());
        config
    }

    fn explicit_config(device: &str) -> CaptureConfig {
        let settings = CaptureSettings {
            device_id: device.to_string(),
            ..CaptureSettings::default()
        };
        let (config, _) = CaptureConfig::initial(Direction::Input).reconcile(&settings);
        config
    }

    #[test]
    fn test_default_input_resolves_to_default_source() {
        let server = FakeServer::new();
        server.set_defaults("alsa_input.mic", "alsa_output.speakers");
        let session = session_over(server);

        let device = resolve_server_info(&session, &default_config(Direction::Input))
            .expect("server info resolves");
        assert_eq!(device, "alsa_input.mic");
    }

    #[test]
    fn test_default_monitor_gets_suffix() {
        let server = FakeServer::new();
        server.set_defaults("alsa_input.mic", "alsa_output.speakers");
        let session = session_over(server);

        let device = resolve_server_info(&session, &default_config(Direction::OutputMonitor))
            .expect("server info resolves");
        assert_eq!(device, "alsa_output.speakers.monitor");
    }

    #[test]
    fn test_explicit_device_passes_through() {
        let session = session_over(FakeServer::new());
        let device = resolve_server_info(&session, &explicit_config("usb.mic"))
            .expect("server info resolves");
        assert_eq!(device, "usb.mic");
    }

    #[test]
    fn test_server_info_failure_aborts() {
        let server = FakeServer::new();
        server.fail_server_info();
        let session = session_over(server);

        let err = resolve_server_info(&session, &default_config(Direction::Input))
            .expect_err("query fails");
        assert!(matches!(err, CaptureError::QueryFailed { .. }));
    }

    #[test]
    fn test_device_info_resolution() {
        let server = FakeServer::new();
        server.add_source(SourceInfo {
            name: "usb.mic".to_string(),
            description: "USB Microphone".to_string(),
            monitor_of_sink: None,
            sample_format: SampleFormat::S16Le,
            sample_rate: 44100,
            channels: 2,
        });
        let session = session_over(server);

        let resolved = resolve_device_info(&session, "usb.mic", 2).expect("device resolves");
        assert_eq!(resolved.sample_format, SampleFormat::S16Le);
        assert_eq!(resolved.sample_rate, 44100);
        assert_eq!(resolved.bytes_per_frame, 4);
    }

    #[test]
    fn test_unsupported_format_substituted_with_float() {
        let server = FakeServer::new();
        server.add_source(SourceInfo {
            name: "odd.mic".to_string(),
            description: "Odd".to_string(),
            monitor_of_sink: None,
            sample_format: SampleFormat::Invalid,
            sample_rate: 96000,
            channels: 6,
        });
        let session = session_over(server);

        let resolved = resolve_device_info(&session, "odd.mic", 6).expect("device resolves");
        assert_eq!(resolved.sample_format, SampleFormat::F32Le);
        assert_eq!(resolved.sample_rate, 96000);
        assert_eq!(resolved.bytes_per_frame, 24);
    }

    #[test]
    fn test_unknown_device_fails_before_the_deadline() {
        // A name matching nothing ends the list cleanly, without a
        // server error; that must resolve immediately, not wait out
        // the query deadline.
        let session = session_over(FakeServer::new());
        let started = Instant::now();
        let err = resolve_device_info(&session, "missing", 2).expect_err("resolution fails");
        assert!(matches!(err, CaptureError::DeviceInfoFailed { .. }));
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_device_info_server_error_fails() {
        let server = FakeServer::new();
        server.add_source(SourceInfo {
            name: "usb.mic".to_string(),
            description: "USB Microphone".to_string(),
            monitor_of_sink: None,
            sample_format: SampleFormat::S16Le,
            sample_rate: 44100,
            channels: 2,
        });
        server.fail_source_info();
        let session = session_over(server);

        let err = resolve_device_info(&session, "usb.mic", 2).expect_err("resolution fails");
        assert!(matches!(err, CaptureError::DeviceInfoFailed { .. }));
    }

    #[test]
    fn test_query_issue_waits_for_server_lock() {
        let session = session_over(FakeServer::new());
        let (tx, rx) = std::sync::mpsc::channel();
        let locked = Arc::clone(&session);
        let holder = std::thread::spawn(move || {
            let guard = locked.lock();
            tx.send(()).expect("lock held");
            std::thread::sleep(Duration::from_millis(50));
            drop(guard);
        });
        rx.recv().expect("holder started");

        let started = Instant::now();
        let device = resolve_server_info(&session, &explicit_config("usb.mic"))
            .expect("server info resolves");
        assert_eq!(device, "usb.mic");
        assert!(started.elapsed() >= Duration::from_millis(40));
        holder.join().expect("holder finished");
    }
}

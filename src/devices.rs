//! Device enumeration for the host's configuration surface.
//!
//! Input listings exclude monitor sources (those capture a sink's
//! playback, not a real input); output-monitor listings are built from
//! sinks and report each sink's monitor source as the selectable
//! device. Both prepend a synthetic "Default" entry when the server
//! reported at least one real device.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DEFAULT_DEVICE;
use crate::error::CaptureError;
use crate::server::{ListEvent, ServerSession};

/// One selectable device: a display name and the identifier to put in
/// [`CaptureSettings::device_id`](crate::CaptureSettings::device_id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    /// Human-readable description for the UI.
    pub description: String,
    /// Server device identifier.
    pub id: String,
}

impl DeviceEntry {
    fn new(description: &str, id: &str) -> Self {
        Self {
            description: description.to_string(),
            id: id.to_string(),
        }
    }
}

fn prepend_default(mut entries: Vec<DeviceEntry>) -> Vec<DeviceEntry> {
    if !entries.is_empty() {
        entries.insert(0, DeviceEntry::new("Default", DEFAULT_DEVICE));
    }
    entries
}

/// Lists capture devices suitable for an input source.
///
/// Monitor-of-sink sources are excluded; use
/// [`list_output_monitor_devices`] for those.
///
/// # Errors
///
/// Fails if the server rejects the query or does not answer in time.
pub fn list_input_devices(
    session: &Arc<ServerSession>,
) -> Result<Vec<DeviceEntry>, CaptureError> {
    let promise = session.promise::<Vec<DeviceEntry>>();
    let fulfiller = promise.fulfiller();
    let dispatch = Arc::clone(session);
    let collected = Arc::new(Mutex::new(Vec::new()));

    let rc = {
        let _guard = session.lock();
        session.client().get_source_info_list(Box::new(move |event| {
            match event {
                ListEvent::Item(source) => {
                    if source.monitor_of_sink.is_none() {
                        collected
                            .lock()
                            .push(DeviceEntry::new(&source.description, &source.name));
                    }
                }
                ListEvent::End => fulfiller.fulfill(std::mem::take(&mut collected.lock())),
                ListEvent::Error => fulfiller.fulfill(Vec::new()),
            }
            dispatch.signal();
        }))
    };
    if rc < 0 {
        tracing::error!("unable to list source devices");
        return Err(CaptureError::QueryFailed {
            what: "source list",
        });
    }

    let entries = promise.wait().ok_or(CaptureError::QueryTimeout {
        what: "source list",
    })?;
    Ok(prepend_default(entries))
}

/// Lists the monitor sources of playback sinks, for an output-monitor
/// source.
///
/// Only sinks exposing a monitor source are listed, and the monitor
/// source's name (not the sink's) is the selectable identifier.
///
/// # Errors
///
/// Fails if the server rejects the query or does not answer in time.
pub fn list_output_monitor_devices(
    session: &Arc<ServerSession>,
) -> Result<Vec<DeviceEntry>, CaptureError> {
    let promise = session.promise::<Vec<DeviceEntry>>();
    let fulfiller = promise.fulfiller();
    let dispatch = Arc::clone(session);
    let collected = Arc::new(Mutex::new(Vec::new()));

    let rc = {
        let _guard = session.lock();
        session.client().get_sink_info_list(Box::new(move |event| {
            match event {
                ListEvent::Item(sink) => {
                    if sink.monitor_source.is_some() {
                        collected
                            .lock()
                            .push(DeviceEntry::new(&sink.description, &sink.monitor_source_name));
                    }
                }
                ListEvent::End => fulfiller.fulfill(std::mem::take(&mut collected.lock())),
                ListEvent::Error => fulfiller.fulfill(Vec::new()),
            }
            dispatch.signal();
        }))
    };
    if rc < 0 {
        tracing::error!("unable to list sink devices");
        return Err(CaptureError::QueryFailed { what: "sink list" });
    }

    let entries = promise.wait().ok_or(CaptureError::QueryTimeout {
        what: "sink list",
    })?;
    Ok(prepend_default(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;
    use crate::server::mock::FakeServer;
    use crate::server::{SinkInfo, SourceInfo};

    fn source(name: &str, description: &str, monitor_of_sink: Option<u32>) -> SourceInfo {
        SourceInfo {
            name: name.to_string(),
            description: description.to_string(),
            monitor_of_sink,
            sample_format: SampleFormat::S16Le,
            sample_rate: 48000,
            channels: 2,
        }
    }

    fn sink(name: &str, description: &str, monitor: Option<(u32, &str)>) -> SinkInfo {
        SinkInfo {
            name: name.to_string(),
            description: description.to_string(),
            monitor_source: monitor.map(|(index, _)| index),
            monitor_source_name: monitor.map(|(_, n)| n.to_string()).unwrap_or_default(),
        }
    }

    #[test]
    fn test_input_list_excludes_monitors() {
        let server = FakeServer::new();
        server.add_source(source("mic", "Microphone", None));
        server.add_source(source("speakers.monitor", "Monitor of Speakers", Some(3)));
        let session = ServerSession::connect(Arc::new(server));

        let entries = list_input_devices(&session).expect("list resolves");
        assert_eq!(
            entries,
            vec![
                DeviceEntry::new("Default", "default"),
                DeviceEntry::new("Microphone", "mic"),
            ]
        );
    }

    #[test]
    fn test_monitor_list_uses_monitor_source_names() {
        let server = FakeServer::new();
        server.add_sink(sink("speakers", "Speakers", Some((3, "speakers.monitor"))));
        server.add_sink(sink("null", "Null Sink", None));
        let session = ServerSession::connect(Arc::new(server));

        let entries = list_output_monitor_devices(&session).expect("list resolves");
        assert_eq!(
            entries,
            vec![
                DeviceEntry::new("Default", "default"),
                DeviceEntry::new("Speakers", "speakers.monitor"),
            ]
        );
    }

    #[test]
    fn test_no_devices_means_no_default_entry() {
        let session = ServerSession::connect(Arc::new(FakeServer::new()));
        assert!(list_input_devices(&session).expect("list resolves").is_empty());
        assert!(list_output_monitor_devices(&session)
            .expect("list resolves")
            .is_empty());
    }

    #[test]
    fn test_only_monitors_means_empty_input_list() {
        let server = FakeServer::new();
        server.add_source(source("speakers.monitor", "Monitor of Speakers", Some(0)));
        let session = ServerSession::connect(Arc::new(server));

        assert!(list_input_devices(&session).expect("list resolves").is_empty());
    }
}

//! Scriptable in-memory server for testing without a sound server.
//!
//! `FakeServer` implements [`ServerClient`] entirely in memory and
//! dispatches callbacks synchronously from the calling thread. Since the
//! real server runs all callbacks on one dispatch thread, synchronous
//! dispatch preserves the ordering guarantees while keeping tests
//! deterministic and CI-safe.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use super::{
    BufferAttr, ListCallback, ListEvent, Peek, ReadCallback, SampleSpec, ServerClient,
    ServerInfo, ServerInfoCallback, SinkInfo, SourceInfo, StreamFlags, StreamHandle,
};
use crate::format::ChannelPosition;

/// A recorded server API invocation, for asserting on call patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `get_server_info` was invoked.
    GetServerInfo,
    /// `get_source_info` was invoked for the named device.
    GetSourceInfo(String),
    /// `get_source_info_list` was invoked.
    GetSourceInfoList,
    /// `get_sink_info_list` was invoked.
    GetSinkInfoList,
    /// `stream_new` was invoked with the given stream name.
    StreamNew(String),
    /// `stream_set_read_callback` was invoked for the stream id.
    SetReadCallback(u64),
    /// `stream_connect_record` was invoked.
    ConnectRecord {
        /// Stream id being connected.
        stream: u64,
        /// Target device identifier.
        device: String,
        /// Requested fragment size in bytes.
        fragsize: u32,
        /// Whether device pinning was requested.
        dont_move: bool,
        /// Whether latency adjustment was requested.
        adjust_latency: bool,
    },
    /// `stream_disconnect` was invoked for the stream id.
    Disconnect(u64),
    /// `stream_unref` was invoked for the stream id.
    Unref(u64),
    /// `stream_peek` was invoked for the stream id.
    PeekCall(u64),
    /// `stream_drop` was invoked for the stream id.
    DropCall(u64),
}

struct FakeStream {
    spec: SampleSpec,
    map: Vec<ChannelPosition>,
    device: Option<String>,
    read_callback: Option<ReadCallback>,
    pending: VecDeque<Peek>,
    connected: bool,
}

struct Inner {
    server_info: ServerInfo,
    sources: Vec<SourceInfo>,
    sinks: Vec<SinkInfo>,
    streams: HashMap<u64, FakeStream>,
    next_stream_id: u64,
    fail_server_info: bool,
    fail_source_info: bool,
    refuse_stream_new: bool,
    fail_connect: bool,
}

/// In-memory [`ServerClient`] with scriptable devices and behavior.
pub struct FakeServer {
    inner: Mutex<Inner>,
    calls: Mutex<Vec<Call>>,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    /// Creates a fake server with an identity and no devices.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                server_info: ServerInfo {
                    name: "FakeAudio".to_string(),
                    version: "1.0".to_string(),
                    default_source_name: "fake.mic".to_string(),
                    default_sink_name: "fake.speakers".to_string(),
                },
                sources: Vec::new(),
                sinks: Vec::new(),
                streams: HashMap::new(),
                next_stream_id: 1,
                fail_server_info: false,
                fail_source_info: false,
                refuse_stream_new: false,
                fail_connect: false,
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Overrides the default device names reported by server info.
    pub fn set_defaults(&self, default_source: &str, default_sink: &str) {
        let mut inner = self.inner.lock();
        inner.server_info.default_source_name = default_source.to_string();
        inner.server_info.default_sink_name = default_sink.to_string();
    }

    /// Registers a capture device.
    pub fn add_source(&self, source: SourceInfo) {
        self.inner.lock().sources.push(source);
    }

    /// Registers a playback sink.
    pub fn add_sink(&self, sink: SinkInfo) {
        self.inner.lock().sinks.push(sink);
    }

    /// Makes `get_server_info` return a failure code.
    pub fn fail_server_info(&self) {
        self.inner.lock().fail_server_info = true;
    }

    /// Makes `get_source_info` report a server-side error.
    pub fn fail_source_info(&self) {
        self.inner.lock().fail_source_info = true;
    }

    /// Makes `stream_new` refuse to create streams.
    pub fn refuse_stream_new(&self) {
        self.inner.lock().refuse_stream_new = true;
    }

    /// Makes `stream_connect_record` fail.
    pub fn fail_connect(&self) {
        self.inner.lock().fail_connect = true;
    }

    /// Returns the handle of the currently connected stream, if any.
    #[must_use]
    pub fn connected_stream(&self) -> Option<StreamHandle> {
        self.inner
            .lock()
            .streams
            .iter()
            .find(|(_, s)| s.connected)
            .map(|(id, _)| StreamHandle::from_raw(*id))
    }

    /// Returns how many stream objects are still alive (not unref'd).
    #[must_use]
    pub fn live_streams(&self) -> usize {
        self.inner.lock().streams.len()
    }

    /// Returns the sample spec a stream was created with.
    #[must_use]
    pub fn stream_spec(&self, handle: &StreamHandle) -> Option<SampleSpec> {
        self.inner.lock().streams.get(&handle.raw()).map(|s| s.spec)
    }

    /// Returns the channel map a stream was created with.
    #[must_use]
    pub fn stream_map(&self, handle: &StreamHandle) -> Option<Vec<ChannelPosition>> {
        self.inner
            .lock()
            .streams
            .get(&handle.raw())
            .map(|s| s.map.clone())
    }

    /// Queues a peek result for the stream and fires its read callback,
    /// exactly as the dispatch thread would on data arrival.
    ///
    /// Delivering to a torn-down stream is a no-op, mirroring the real
    /// server's tolerance for post-disconnect dispatch.
    pub fn deliver(&self, handle: &StreamHandle, peek: Peek) {
        let nbytes = peek.len();
        let mut callback = {
            let mut inner = self.inner.lock();
            let Some(stream) = inner.streams.get_mut(&handle.raw()) else {
                return;
            };
            stream.pending.push_back(peek);
            stream.read_callback.take()
        };
        // The callback re-enters this server (peek/drop), so it must run
        // with the internal lock released.
        if let Some(cb) = callback.as_mut() {
            cb(nbytes);
        }
        if let Some(cb) = callback {
            let mut inner = self.inner.lock();
            if let Some(stream) = inner.streams.get_mut(&handle.raw()) {
                stream.read_callback = Some(cb);
            }
        }
    }

    /// Returns the recorded API calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Clears the recorded API calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl ServerClient for FakeServer {
    fn get_server_info(&self, callback: ServerInfoCallback) -> i32 {
        self.record(Call::GetServerInfo);
        let info = {
            let inner = self.inner.lock();
            if inner.fail_server_info {
                return -1;
            }
            inner.server_info.clone()
        };
        callback(&info);
        0
    }

    fn get_source_info(&self, name: &str, mut callback: ListCallback<SourceInfo>) -> i32 {
        self.record(Call::GetSourceInfo(name.to_string()));
        let (fail, found) = {
            let inner = self.inner.lock();
            (
                inner.fail_source_info,
                inner.sources.iter().find(|s| s.name == name).cloned(),
            )
        };
        if fail {
            callback(ListEvent::Error);
            return 0;
        }
        match found {
            Some(source) => {
                callback(ListEvent::Item(&source));
                callback(ListEvent::End);
            }
            // Unknown device: the server ends the list without an item
            // and without erroring.
            None => callback(ListEvent::End),
        }
        0
    }

    fn get_source_info_list(&self, mut callback: ListCallback<SourceInfo>) -> i32 {
        self.record(Call::GetSourceInfoList);
        let sources = self.inner.lock().sources.clone();
        for source in &sources {
            callback(ListEvent::Item(source));
        }
        callback(ListEvent::End);
        0
    }

    fn get_sink_info_list(&self, mut callback: ListCallback<SinkInfo>) -> i32 {
        self.record(Call::GetSinkInfoList);
        let sinks = self.inner.lock().sinks.clone();
        for sink in &sinks {
            callback(ListEvent::Item(sink));
        }
        callback(ListEvent::End);
        0
    }

    fn stream_new(
        &self,
        name: &str,
        spec: &SampleSpec,
        map: &[ChannelPosition],
    ) -> Option<StreamHandle> {
        self.record(Call::StreamNew(name.to_string()));
        let mut inner = self.inner.lock();
        if inner.refuse_stream_new {
            return None;
        }
        let id = inner.next_stream_id;
        inner.next_stream_id += 1;
        inner.streams.insert(
            id,
            FakeStream {
                spec: *spec,
                map: map.to_vec(),
                device: None,
                read_callback: None,
                pending: VecDeque::new(),
                connected: false,
            },
        );
        Some(StreamHandle::from_raw(id))
    }

    fn stream_set_read_callback(&self, handle: &StreamHandle, callback: ReadCallback) {
        self.record(Call::SetReadCallback(handle.raw()));
        if let Some(stream) = self.inner.lock().streams.get_mut(&handle.raw()) {
            stream.read_callback = Some(callback);
        }
    }

    fn stream_connect_record(
        &self,
        handle: &StreamHandle,
        device: &str,
        attr: &BufferAttr,
        flags: StreamFlags,
    ) -> i32 {
        self.record(Call::ConnectRecord {
            stream: handle.raw(),
            device: device.to_string(),
            fragsize: attr.fragsize,
            dont_move: flags.dont_move,
            adjust_latency: flags.adjust_latency,
        });
        let mut inner = self.inner.lock();
        if inner.fail_connect {
            return -1;
        }
        match inner.streams.get_mut(&handle.raw()) {
            Some(stream) => {
                stream.device = Some(device.to_string());
                stream.connected = true;
                0
            }
            None => -1,
        }
    }

    fn stream_disconnect(&self, handle: &StreamHandle) -> i32 {
        self.record(Call::Disconnect(handle.raw()));
        match self.inner.lock().streams.get_mut(&handle.raw()) {
            Some(stream) => {
                stream.connected = false;
                0
            }
            None => -1,
        }
    }

    fn stream_unref(&self, handle: StreamHandle) {
        self.record(Call::Unref(handle.raw()));
        self.inner.lock().streams.remove(&handle.raw());
    }

    fn stream_peek(&self, handle: &StreamHandle) -> Peek {
        self.record(Call::PeekCall(handle.raw()));
        self.inner
            .lock()
            .streams
            .get(&handle.raw())
            .and_then(|s| s.pending.front().cloned())
            .unwrap_or(Peek::Empty)
    }

    fn stream_drop(&self, handle: &StreamHandle) {
        self.record(Call::DropCall(handle.raw()));
        if let Some(stream) = self.inner.lock().streams.get_mut(&handle.raw()) {
            stream.pending.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn spec() -> SampleSpec {
        SampleSpec {
            format: SampleFormat::S16Le,
            rate: 48000,
            channels: 2,
        }
    }

    #[test]
    fn test_stream_lifecycle() {
        let server = FakeServer::new();
        let handle = server
            .stream_new("cap", &spec(), &[ChannelPosition::Mono])
            .expect("stream created");
        assert_eq!(server.live_streams(), 1);

        let rc = server.stream_connect_record(
            &handle,
            "fake.mic",
            &BufferAttr::recording(1024),
            StreamFlags::default(),
        );
        assert_eq!(rc, 0);
        assert_eq!(server.connected_stream(), Some(handle.clone()));

        assert_eq!(server.stream_disconnect(&handle), 0);
        server.stream_unref(handle);
        assert_eq!(server.live_streams(), 0);
    }

    #[test]
    fn test_deliver_invokes_read_callback() {
        let server = FakeServer::new();
        let handle = server
            .stream_new("cap", &spec(), &[ChannelPosition::Mono])
            .expect("stream created");

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        server.stream_set_read_callback(
            &handle,
            Box::new(move |nbytes| {
                assert_eq!(nbytes, 4);
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        server.deliver(&handle, Peek::Data(Bytes::from_static(&[0u8; 4])));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        // Peek returns the queued region until dropped.
        assert_eq!(server.stream_peek(&handle).len(), 4);
        server.stream_drop(&handle);
        assert!(server.stream_peek(&handle).is_empty());
    }

    #[test]
    fn test_deliver_after_unref_is_noop() {
        let server = FakeServer::new();
        let handle = server
            .stream_new("cap", &spec(), &[ChannelPosition::Mono])
            .expect("stream created");
        server.stream_unref(handle.clone());
        // Must not panic or invoke anything.
        server.deliver(&handle, Peek::Data(Bytes::from_static(&[0u8; 4])));
    }

    #[test]
    fn test_unknown_device_ends_list_without_items() {
        let server = FakeServer::new();
        let saw_end = Arc::new(AtomicUsize::new(0));
        let saw = saw_end.clone();
        server.get_source_info(
            "nope",
            Box::new(move |event| {
                assert!(!matches!(event, ListEvent::Item(_)));
                if matches!(event, ListEvent::End) {
                    saw.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        assert_eq!(saw_end.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_injected_failure_reports_error_terminator() {
        let server = FakeServer::new();
        server.fail_source_info();
        let saw_error = Arc::new(AtomicUsize::new(0));
        let saw = saw_error.clone();
        server.get_source_info(
            "nope",
            Box::new(move |event| {
                if matches!(event, ListEvent::Error) {
                    saw.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        assert_eq!(saw_error.load(Ordering::SeqCst), 1);
    }
}

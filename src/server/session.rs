//! Server session: connection lifecycle, the global server-access lock,
//! and the shared completion signal.
//!
//! The session is an explicitly passed capability object rather than
//! process-global state: every component that talks to the server holds
//! an `Arc<ServerSession>`, and dropping the last clone releases the
//! logical connection. Cloning the `Arc` is the balanced init/unref
//! pair the server contract requires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::ServerClient;

/// Monotonic nanosecond clock used to timestamp captured batches.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Returns the default clock: nanoseconds of monotonic time since the
/// first call in this process.
#[must_use]
pub fn monotonic_clock() -> Clock {
    static ANCHOR: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    Arc::new(|| {
        let anchor = *ANCHOR.get_or_init(Instant::now);
        anchor.elapsed().as_nanos() as u64
    })
}

/// Tuning parameters for the capture path.
///
/// The defaults are heuristics tuned for one server implementation;
/// other backends may need different values.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    /// Server-side fragment size target for record streams.
    pub fragment: Duration,
    /// How long after the first batch the startup guard keeps
    /// suppressing delivery, absorbing post-connect jitter.
    pub startup_guard: Duration,
    /// Deadline for blocking queries. Bounds the wait so a dead server
    /// cannot hang the caller.
    pub query_timeout: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            fragment: Duration::from_millis(25),
            startup_guard: Duration::from_millis(500),
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// The shared completion signal: one wakeup channel for every waiter.
///
/// Query completions and stream reads all run on the single dispatch
/// thread and share this channel; every dispatch callback signals it
/// exactly once on every exit path so a blocked query can never
/// deadlock on an unrelated callback.
struct SignalShared {
    generation: Mutex<u64>,
    condvar: Condvar,
}

/// A live logical connection to the sound server.
pub struct ServerSession {
    client: Arc<dyn ServerClient>,
    ops_lock: Mutex<()>,
    signal: Arc<SignalShared>,
    tuning: Tuning,
    clock: Clock,
}

impl ServerSession {
    /// Connects a session over the given client with default tuning.
    #[must_use]
    pub fn connect(client: Arc<dyn ServerClient>) -> Arc<Self> {
        Self::connect_with(client, Tuning::default(), monotonic_clock())
    }

    /// Connects a session with explicit tuning and clock. Tests inject a
    /// fake clock here to make timestamps deterministic.
    #[must_use]
    pub fn connect_with(client: Arc<dyn ServerClient>, tuning: Tuning, clock: Clock) -> Arc<Self> {
        Arc::new(Self {
            client,
            ops_lock: Mutex::new(()),
            signal: Arc::new(SignalShared {
                generation: Mutex::new(0),
                condvar: Condvar::new(),
            }),
            tuning,
            clock,
        })
    }

    /// Returns the underlying server client.
    #[must_use]
    pub fn client(&self) -> &dyn ServerClient {
        self.client.as_ref()
    }

    /// Acquires the global server-access lock.
    ///
    /// Every cross-thread call that creates, mutates, or releases a
    /// server-side handle must hold this guard; the server's callback
    /// dispatch is single-threaded and not reentrant-safe from
    /// arbitrary threads. Dispatch-thread callbacks themselves run
    /// without it.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.ops_lock.lock()
    }

    /// Wakes every waiter blocked on the completion signal.
    ///
    /// Dispatch-thread callbacks call this exactly once on every exit
    /// path, including errors.
    pub fn signal(&self) {
        let mut generation = self.signal.generation.lock();
        *generation = generation.wrapping_add(1);
        self.signal.condvar.notify_all();
    }

    /// Returns the tuning parameters.
    #[must_use]
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Returns the current monotonic timestamp in nanoseconds.
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        (self.clock)()
    }

    /// Creates a one-shot promise awaited via this session's signal.
    pub(crate) fn promise<T>(&self) -> Promise<T> {
        Promise {
            slot: Arc::new(Mutex::new(None)),
            signal: Arc::clone(&self.signal),
            timeout: self.tuning.query_timeout,
        }
    }
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("tuning", &self.tuning)
            .finish_non_exhaustive()
    }
}

/// One-shot slot fulfilled on the dispatch thread and awaited on the
/// calling thread, with a monotonic deadline.
///
/// Fulfilling does not wake the waiter by itself: the dispatch callback
/// is responsible for calling [`ServerSession::signal`] once after it,
/// keeping the one-signal-per-callback contract intact.
pub(crate) struct Promise<T> {
    slot: Arc<Mutex<Option<T>>>,
    signal: Arc<SignalShared>,
    timeout: Duration,
}

impl<T> Promise<T> {
    /// Returns the fulfilling half, to be captured by a callback.
    pub(crate) fn fulfiller(&self) -> Fulfiller<T> {
        Fulfiller {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Blocks until fulfilled or until the deadline passes.
    ///
    /// Returns `None` on timeout. Spurious signals from unrelated
    /// callbacks on the shared channel are tolerated by re-checking the
    /// slot.
    pub(crate) fn wait(self) -> Option<T> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(value) = self.slot.lock().take() {
                return Some(value);
            }
            let mut generation = self.signal.generation.lock();
            // Re-check with the signal lock held: a fulfiller that wrote
            // the slot before this point must still acquire this lock to
            // signal, so the wakeup cannot be lost.
            if let Some(value) = self.slot.lock().take() {
                return Some(value);
            }
            if self
                .signal
                .condvar
                .wait_until(&mut generation, deadline)
                .timed_out()
            {
                return self.slot.lock().take();
            }
        }
    }
}

/// Fulfilling half of a [`Promise`]. Cloneable so list callbacks can
/// carry it across multiple invocations; the first write wins.
pub(crate) struct Fulfiller<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Fulfiller<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Fulfiller<T> {
    /// Stores the value if the slot is still empty.
    pub(crate) fn fulfill(&self, value: T) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::mock::FakeServer;

    fn test_session() -> Arc<ServerSession> {
        ServerSession::connect_with(
            Arc::new(FakeServer::new()),
            Tuning {
                query_timeout: Duration::from_millis(50),
                ..Tuning::default()
            },
            monotonic_clock(),
        )
    }

    #[test]
    fn test_promise_fulfilled_before_wait() {
        let session = test_session();
        let promise: Promise<u32> = session.promise();
        promise.fulfiller().fulfill(7);
        session.signal();
        assert_eq!(promise.wait(), Some(7));
    }

    #[test]
    fn test_promise_times_out() {
        let session = test_session();
        let promise: Promise<u32> = session.promise();
        let started = Instant::now();
        assert_eq!(promise.wait(), None);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_promise_first_write_wins() {
        let session = test_session();
        let promise: Promise<u32> = session.promise();
        let fulfiller = promise.fulfiller();
        fulfiller.fulfill(1);
        fulfiller.fulfill(2);
        session.signal();
        assert_eq!(promise.wait(), Some(1));
    }

    #[test]
    fn test_promise_fulfilled_from_another_thread() {
        let session = ServerSession::connect(Arc::new(FakeServer::new()));
        let promise: Promise<&'static str> = session.promise();
        let fulfiller = promise.fulfiller();
        let signal_session = Arc::clone(&session);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            fulfiller.fulfill("done");
            signal_session.signal();
        });

        assert_eq!(promise.wait(), Some("done"));
        handle.join().expect("thread finished");
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = monotonic_clock();
        let a = clock();
        std::thread::sleep(Duration::from_millis(5));
        let b = clock();
        assert!(b > a);
    }
}

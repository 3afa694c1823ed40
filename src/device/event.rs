use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::SegQueue;

use super::stream::{DeviceStream, StreamOp};

/// Shared state of a device event.
///
/// Each `record` opens a new generation; the stream retires it when it
/// reaches the recording. Queries and waits always refer to the most recent
/// generation at call time, which is what makes pooled events safe to reuse
/// as soon as their holder is done with them.
pub(crate) struct EventInner {
    /// Generation of the latest `record` call.
    pub(crate) recorded: AtomicU64,
    /// Highest generation the device has retired.
    pub(crate) completed: AtomicU64,
}

/// A reusable device-side completion token.
///
/// Cloning yields another handle to the same event. A single event object is
/// not meant to be recorded from several threads at once; the pool that
/// hands events out is thread-safe.
#[derive(Clone)]
pub struct DeviceEvent {
    inner: Arc<EventInner>,
}

impl DeviceEvent {
    fn new() -> Self {
        Self {
            inner: Arc::new(EventInner {
                recorded: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<EventInner> {
        &self.inner
    }

    /// Record the event on `stream`. It completes when the stream reaches
    /// this point in its queue.
    pub fn record(&self, stream: &DeviceStream) {
        let generation = self.inner.recorded.fetch_add(1, Ordering::AcqRel) + 1;
        stream.enqueue(StreamOp::RecordEvent {
            event: Arc::clone(&self.inner),
            generation,
        });
    }

    /// Non-blocking completion query for the most recent recording.
    ///
    /// An event that was never recorded reports complete.
    pub fn query(&self) -> bool {
        let target = self.inner.recorded.load(Ordering::Acquire);
        self.inner.completed.load(Ordering::Acquire) >= target
    }

    /// Block the host until the most recent recording completes.
    pub fn synchronize(&self) {
        let mut spins = 0u32;
        while !self.query() {
            if spins < 1 << 12 {
                std::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
    }
}

/// Pool of reusable device events.
///
/// Events are created lazily and there is no upper bound; releasing returns
/// the event for reuse by later `get` calls.
pub struct EventPool {
    free: SegQueue<DeviceEvent>,
}

impl EventPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            free: SegQueue::new(),
        })
    }

    /// Take an event suitable for recording on any stream.
    pub fn get(&self) -> DeviceEvent {
        self.free.pop().unwrap_or_else(DeviceEvent::new)
    }

    /// Return an event to the pool.
    pub fn release(&self, event: DeviceEvent) {
        self.free.push(event);
    }

    /// Drop all pooled events.
    pub fn clear(&self) {
        while self.free.pop().is_some() {}
    }
}

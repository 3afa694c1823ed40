use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::collective::{CollectiveState, ErrorCell};
use crate::communicator::Communicator;
use crate::config::GantryConfig;
use crate::device::{DeviceStream, EventPool, StreamPriority, SyncFlagPool};
use crate::error::Result;
use crate::memory::PinnedPool;
use crate::progress::ProgressEngine;
use crate::request::Request;

/// The engine's runtime: internal stream pool, event and sync-flag pools,
/// pinned staging memory, and the progress thread.
///
/// Constructed once by [`Context::init`] and torn down by
/// [`Context::finalize`]; submissions after finalize are fatal. One context
/// serves one rank.
pub struct Context {
    streams: Mutex<Vec<DeviceStream>>,
    next_stream: AtomicUsize,
    external_streams: AtomicBool,
    stream_mem_ops: bool,
    events: Arc<EventPool>,
    sync_flags: Arc<SyncFlagPool>,
    pinned: Arc<PinnedPool>,
    engine: ProgressEngine,
    finalized: AtomicBool,
}

impl Context {
    /// Establish the internal stream pool, query stream-memory-op support,
    /// preallocate sync and staging memory, and start the progress thread.
    pub fn init(config: GantryConfig) -> Result<Arc<Self>> {
        let stream_mem_ops = config.use_stream_mem_ops && stream_memory_ops_available();
        let priority = if config.use_priority_stream {
            StreamPriority::Greatest
        } else {
            StreamPriority::Default
        };
        let pool_size = config.stream_pool_size.max(1);
        let streams: Vec<DeviceStream> =
            (0..pool_size).map(|_| DeviceStream::new(priority)).collect();

        let sync_flags = SyncFlagPool::new(stream_mem_ops);
        sync_flags.preallocate(config.sync_mem_prealloc);

        let pinned = PinnedPool::new();
        if config.pinned_prealloc_bytes > 0 {
            pinned.preallocate(config.pinned_prealloc_bytes, pool_size);
        }

        let engine = ProgressEngine::start(&config);
        tracing::info!(
            streams = pool_size,
            stream_mem_ops,
            priority = config.use_priority_stream,
            "gantry initialized"
        );

        Ok(Arc::new(Self {
            streams: Mutex::new(streams),
            next_stream: AtomicUsize::new(0),
            external_streams: AtomicBool::new(false),
            stream_mem_ops,
            events: EventPool::new(),
            sync_flags,
            pinned,
            engine,
            finalized: AtomicBool::new(false),
        }))
    }

    /// Drain in-flight operations, stop the progress thread, and tear down
    /// pools and streams. Internal streams installed through
    /// [`Context::replace_internal_streams`] are left alone.
    ///
    /// Idempotent; also invoked on drop.
    pub fn finalize(&self) {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return;
        }
        self.engine.finalize();
        self.sync_flags.clear();
        self.events.clear();
        self.pinned.clear();
        if !self.external_streams.load(Ordering::Acquire) {
            lock(&self.streams).clear();
        }
        tracing::info!("gantry finalized");
    }

    /// Replace the internal stream pool with externally owned streams.
    /// Finalize will not tear these down.
    pub fn replace_internal_streams(&self, mut getter: impl FnMut() -> DeviceStream) {
        let mut streams = lock(&self.streams);
        let n = streams.len();
        streams.clear();
        for _ in 0..n {
            streams.push(getter());
        }
        self.external_streams.store(true, Ordering::Release);
        tracing::info!(streams = n, "internal streams replaced by external streams");
    }

    /// Whether the device supports stream memory operations for sync-flag
    /// waits (otherwise a host-callback fallback is used).
    pub fn stream_memory_operations_supported(&self) -> bool {
        self.stream_mem_ops
    }

    /// Create a user-facing device stream.
    pub fn create_stream(&self) -> DeviceStream {
        DeviceStream::new(StreamPriority::Default)
    }

    /// Number of operations enqueued on the progress engine and not yet
    /// destroyed.
    pub fn inflight(&self) -> usize {
        self.engine.pending()
    }

    /// Next internal stream, round-robin.
    pub(crate) fn internal_stream(&self) -> DeviceStream {
        let streams = lock(&self.streams);
        let idx = self.next_stream.fetch_add(1, Ordering::Relaxed) % streams.len();
        streams[idx].clone()
    }

    pub(crate) fn ensure_live(&self) {
        assert!(
            !self.finalized.load(Ordering::Acquire),
            "operation submitted after finalize"
        );
    }

    pub(crate) fn events(&self) -> &Arc<EventPool> {
        &self.events
    }

    pub(crate) fn sync_flags(&self) -> &Arc<SyncFlagPool> {
        &self.sync_flags
    }

    pub(crate) fn pinned(&self) -> &Arc<PinnedPool> {
        &self.pinned
    }

    pub(crate) fn enqueue(&self, state: Box<CollectiveState>) {
        self.engine.enqueue(state);
    }

    /// Make `internal` wait for all work currently on the communicator's
    /// stream. The pooled event can be released as soon as the wait is
    /// enqueued: stream waits capture the recording generation at call time.
    pub(crate) fn sync_internal_stream_with_comm(
        &self,
        internal: &DeviceStream,
        comm: &Communicator,
    ) {
        let event = self.events.get();
        event.record(comm.stream());
        internal.wait_event(&event);
        self.events.release(event);
    }

    /// Record the completion event on `internal` and wrap it into a request
    /// bound to the communicator's original stream.
    pub(crate) fn setup_completion_event(
        &self,
        internal: &DeviceStream,
        comm: &Communicator,
        error: ErrorCell,
    ) -> Request {
        let event = self.events.get();
        event.record(internal);
        Request::new(
            event,
            comm.stream().clone(),
            error,
            Arc::clone(&self.events),
        )
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.finalize();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// The emulated device runtime always supports stream memory operations;
/// config can still force the host-callback fallback.
fn stream_memory_ops_available() -> bool {
    true
}

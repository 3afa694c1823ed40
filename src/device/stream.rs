use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use super::event::EventInner;
use super::sync_flag::{SYNC_READY, SyncSlot};

/// Priority class for a device stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPriority {
    Default,
    /// Greatest device-stream priority; the worker is scheduled eagerly.
    Greatest,
}

/// One operation in a stream's ordered queue.
pub(crate) enum StreamOp {
    /// Asynchronous memory copy; pointers are raw addresses that the
    /// submitter guarantees stay valid until the copy executes.
    Copy { src: u64, dst: u64, len: usize },
    /// Retire generation `generation` of the event.
    RecordEvent {
        event: Arc<EventInner>,
        generation: u64,
    },
    /// Stall until generation `generation` of the event has retired.
    WaitEvent {
        event: Arc<EventInner>,
        generation: u64,
    },
    /// Stall until the host publishes the ready value into the flag word.
    WaitFlag { slot: Arc<SyncSlot> },
    /// Host-callback insertion; runs on the stream's worker in order.
    Callback(Box<dyn FnOnce() + Send>),
}

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(0);

struct StreamInner {
    // `None` only during teardown; taken in Drop so the worker sees the
    // channel disconnect before it is joined.
    tx: Option<mpsc::Sender<StreamOp>>,
    id: u64,
    priority: StreamPriority,
    worker: Option<thread::JoinHandle<()>>,
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// An ordered queue of device work submitted by the host.
///
/// Cloning yields another handle to the same stream. The stream's worker
/// runs until the last handle is dropped.
#[derive(Clone)]
pub struct DeviceStream {
    inner: Arc<StreamInner>,
}

impl DeviceStream {
    pub fn new(priority: StreamPriority) -> Self {
        let (tx, rx) = mpsc::channel::<StreamOp>();
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let worker = thread::Builder::new()
            .name(format!("gantry-stream-{id}"))
            .spawn(move || stream_worker(rx))
            .unwrap_or_else(|e| panic!("stream worker spawn failed: {e}"));
        tracing::debug!(stream = id, ?priority, "device stream created");
        Self {
            inner: Arc::new(StreamInner {
                tx: Some(tx),
                id,
                priority,
                worker: Some(worker),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn priority(&self) -> StreamPriority {
        self.inner.priority
    }

    pub(crate) fn enqueue(&self, op: StreamOp) {
        if let Some(tx) = &self.inner.tx {
            // The worker outlives every sender; a send failure means the
            // worker died on a device fault, which is fatal anyway.
            let _ = tx.send(op);
        }
    }

    /// Enqueue an asynchronous memory copy of `len` bytes.
    ///
    /// # Safety
    /// `src` and `dst` must be valid, non-overlapping regions of at least
    /// `len` bytes and must remain valid until the copy has executed on the
    /// stream.
    pub unsafe fn copy_async(&self, src: u64, dst: u64, len: usize) {
        if len == 0 {
            return;
        }
        self.enqueue(StreamOp::Copy { src, dst, len });
    }

    /// Make this stream wait for the most recent recording of `event`.
    ///
    /// Captures the recording generation at call time; later re-recordings
    /// of the same event do not extend the wait. An event that was never
    /// recorded is already complete and the wait is a no-op.
    pub fn wait_event(&self, event: &super::DeviceEvent) {
        let generation = event.inner().recorded.load(Ordering::Acquire);
        if generation == 0 {
            return;
        }
        self.enqueue(StreamOp::WaitEvent {
            event: Arc::clone(event.inner()),
            generation,
        });
    }

    /// Insert a host callback into the stream. It runs on the stream's
    /// worker after all previously enqueued work.
    pub fn add_callback(&self, f: impl FnOnce() + Send + 'static) {
        self.enqueue(StreamOp::Callback(Box::new(f)));
    }

    /// Block the host until all work enqueued so far has executed.
    pub fn synchronize(&self) {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        self.add_callback(move || {
            let _ = done_tx.send(());
        });
        let _ = done_rx.recv();
    }
}

fn stream_worker(rx: mpsc::Receiver<StreamOp>) {
    while let Ok(op) = rx.recv() {
        match op {
            StreamOp::Copy { src, dst, len } => unsafe {
                std::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, len);
            },
            StreamOp::RecordEvent { event, generation } => {
                event.completed.fetch_max(generation, Ordering::AcqRel);
            }
            StreamOp::WaitEvent { event, generation } => {
                spin_until(|| event.completed.load(Ordering::Acquire) >= generation);
            }
            StreamOp::WaitFlag { slot } => {
                spin_until(|| slot.word.load(Ordering::Acquire) == SYNC_READY);
            }
            StreamOp::Callback(f) => f(),
        }
    }
}

/// Busy-wait with a short spin phase before yielding to the scheduler.
fn spin_until(cond: impl Fn() -> bool) {
    let mut spins = 0u32;
    while !cond() {
        if spins < 1 << 10 {
            std::hint::spin_loop();
            spins += 1;
        } else if spins < 1 << 14 {
            thread::yield_now();
            spins += 1;
        } else {
            thread::sleep(Duration::from_micros(20));
        }
    }
}

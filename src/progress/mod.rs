//! The progress engine: a single background worker that drives every
//! in-flight collective state by non-blocking polls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_queue::SegQueue;

use crate::collective::CollectiveState;
use crate::config::GantryConfig;

/// Sleep when there is nothing in flight at all.
const IDLE_SLEEP: Duration = Duration::from_micros(50);

/// Owns the progress thread and the multi-producer hand-off queue.
///
/// User threads push freshly constructed states; the engine moves them onto
/// a private in-flight list and services that list round-robin, advancing
/// each state by at most one phase per pass. It never issues a blocking
/// call: device events and transport requests are only queried. Completed
/// states are destroyed on the engine thread, which releases their staging
/// buffers, events, and sync flags.
pub(crate) struct ProgressEngine {
    queue: Arc<SegQueue<Box<CollectiveState>>>,
    /// States enqueued and not yet destroyed.
    pending: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ProgressEngine {
    pub(crate) fn start(config: &GantryConfig) -> Self {
        let queue: Arc<SegQueue<Box<CollectiveState>>> = Arc::new(SegQueue::new());
        let pending = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let affinity = config.progress_affinity;
        let worker_queue = Arc::clone(&queue);
        let worker_pending = Arc::clone(&pending);
        let worker_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("gantry-progress".into())
            .spawn(move || run(worker_queue, worker_pending, worker_shutdown, affinity))
            .unwrap_or_else(|e| panic!("progress thread spawn failed: {e}"));

        Self {
            queue,
            pending,
            shutdown,
            thread: Mutex::new(Some(handle)),
        }
    }

    /// Hand a state to the engine. The engine owns it from here until it is
    /// destroyed after its final phase.
    pub(crate) fn enqueue(&self, state: Box<CollectiveState>) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.queue.push(state);
    }

    /// Number of states enqueued and not yet destroyed.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Drain all in-flight work, then stop and join the thread.
    pub(crate) fn finalize(&self) {
        while self.pending.load(Ordering::Acquire) > 0 {
            thread::yield_now();
        }
        self.shutdown.store(true, Ordering::Release);
        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn run(
    queue: Arc<SegQueue<Box<CollectiveState>>>,
    pending: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    affinity: Option<usize>,
) {
    if let Some(core) = affinity {
        set_affinity(core);
    }
    tracing::info!("progress engine started");

    let mut in_flight: Vec<Box<CollectiveState>> = Vec::new();
    loop {
        while let Some(state) = queue.pop() {
            tracing::trace!(op = state.name(), "state accepted");
            in_flight.push(state);
        }

        let mut progressed = false;
        in_flight.retain_mut(|state| {
            if state.step() {
                progressed = true;
            }
            if state.is_complete() {
                pending.fetch_sub(1, Ordering::AcqRel);
                false
            } else {
                true
            }
        });

        if in_flight.is_empty() && queue.is_empty() {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            thread::sleep(IDLE_SLEEP);
        } else if !progressed {
            thread::yield_now();
        }
    }
    tracing::info!("progress engine stopped");
}

#[cfg(target_os = "linux")]
fn set_affinity(core: usize) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            tracing::warn!(core, "failed to pin progress thread");
        } else {
            tracing::debug!(core, "progress thread pinned");
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn set_affinity(core: usize) {
    tracing::warn!(core, "processor affinity is not supported on this platform");
}

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_queue::SegQueue;
use crossbeam_utils::CachePadded;

use super::stream::{DeviceStream, StreamOp};

pub(crate) const SYNC_NOT_READY: u32 = 0;
pub(crate) const SYNC_READY: u32 = 1;

/// One cache-line-aligned sync word, visible to both host and device.
///
/// Padding keeps CPU-side signal writes off the cache lines the device
/// polls for neighboring slots.
pub(crate) struct SyncSlot {
    pub(crate) word: CachePadded<AtomicU32>,
}

impl SyncSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            word: CachePadded::new(AtomicU32::new(SYNC_NOT_READY)),
        })
    }
}

/// A one-shot flag the CPU raises to release a waiting device stream.
///
/// `wait` enqueues a stream operation that stalls the stream until `signal`
/// publishes the ready value. The store uses release ordering and the
/// device-side poll uses acquire ordering, so the stream observes every CPU
/// write that preceded the signal. The slot is returned to its pool, reset,
/// when the flag is dropped.
pub struct SyncFlag {
    slot: Arc<SyncSlot>,
    pool: Arc<SyncFlagPool>,
    stream_mem_ops: bool,
}

impl SyncFlag {
    /// Enqueue a wait on `stream`; the stream stalls at this point until
    /// the flag is signaled.
    pub fn wait(&self, stream: &DeviceStream) {
        if self.stream_mem_ops {
            stream.enqueue(StreamOp::WaitFlag {
                slot: Arc::clone(&self.slot),
            });
        } else {
            // Host-callback fallback for devices without stream memory
            // operations: the callback blocks the stream's queue while
            // polling the word.
            let slot = Arc::clone(&self.slot);
            stream.add_callback(move || {
                let mut spins = 0u32;
                while slot.word.load(Ordering::Acquire) != SYNC_READY {
                    if spins < 1 << 10 {
                        std::hint::spin_loop();
                        spins += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
            });
        }
    }

    /// Publish ready from the CPU. Called exactly once per use.
    pub fn signal(&self) {
        let prev = self.slot.word.swap(SYNC_READY, Ordering::Release);
        debug_assert_eq!(prev, SYNC_NOT_READY, "sync flag signaled twice");
    }
}

impl Drop for SyncFlag {
    fn drop(&mut self) {
        // A stream wait may still reference the slot (early-release variants
        // drop the flag as soon as the transport finishes, possibly before
        // the stream has executed the wait). Resetting the word under a
        // pending wait would stall that stream forever, so the slot is only
        // reset and pooled once this handle is the sole owner; otherwise the
        // last stream reference frees it.
        if Arc::strong_count(&self.slot) == 1 {
            self.slot.word.store(SYNC_NOT_READY, Ordering::Release);
            self.pool.free.push(Arc::clone(&self.slot));
        }
    }
}

/// Pool of pinned sync-flag slots shared between CPU writers and device
/// stream polls.
pub struct SyncFlagPool {
    free: SegQueue<Arc<SyncSlot>>,
    stream_mem_ops: bool,
}

impl SyncFlagPool {
    pub fn new(stream_mem_ops: bool) -> Arc<Self> {
        Arc::new(Self {
            free: SegQueue::new(),
            stream_mem_ops,
        })
    }

    /// Preallocate `n` slots.
    pub fn preallocate(&self, n: usize) {
        for _ in 0..n {
            self.free.push(SyncSlot::new());
        }
    }

    /// Take a flag; allocates a fresh slot on a pool miss.
    pub fn get(self: &Arc<Self>) -> SyncFlag {
        let slot = self.free.pop().unwrap_or_else(SyncSlot::new);
        SyncFlag {
            slot,
            pool: Arc::clone(self),
            stream_mem_ops: self.stream_mem_ops,
        }
    }

    /// Drop all pooled slots.
    pub fn clear(&self) {
        while self.free.pop().is_some() {}
    }
}

//! Emulated device runtime: ordered asynchronous streams, reusable
//! completion events, device-visible sync flags, and device buffers.
//!
//! Streams are driven by worker threads and execute enqueued operations in
//! order, so host/device coordination behaves exactly as it would against a
//! real device queue: copies are asynchronous with respect to the host, an
//! event completes when the stream reaches its recording, and a flag wait
//! stalls the stream (and only the stream) until the host signals. A
//! GPU-backed runtime would replace this module without touching the
//! coordination machinery layered on top of it.

mod event;
mod memory;
mod stream;
mod sync_flag;

pub use event::{DeviceEvent, EventPool};
pub use memory::DeviceBuffer;
pub use stream::{DeviceStream, StreamPriority};
pub use sync_flag::{SyncFlag, SyncFlagPool};

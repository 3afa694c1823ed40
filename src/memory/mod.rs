//! Host-side memory management: the pinned staging-buffer pool.

mod pinned;

pub use pinned::{PinnedBuf, PinnedPool};

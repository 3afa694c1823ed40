use std::sync::Arc;

use crate::device::DeviceStream;
use crate::error::Result;
use crate::memory::{PinnedBuf, PinnedPool};
use crate::transport::{BoxedTransportRequest, TransportComm};
use crate::types::{DataType, Rank};

use super::state::{CollectiveOp, SignalVariant};

/// Host-transfer scatter from `root`. The root has no post-transport
/// device-visible output (its own block is placed during staging), so its
/// stream is released as soon as the transport finishes.
pub(crate) struct ScatterState {
    comm: Arc<dyn TransportComm>,
    host_mem: PinnedBuf,
    sendbuf: u64,
    recvbuf: u64,
    count: usize,
    dtype: DataType,
    root: Rank,
    is_root: bool,
}

impl ScatterState {
    pub(crate) fn new(
        pinned: &Arc<PinnedPool>,
        comm: Arc<dyn TransportComm>,
        sendbuf: u64,
        recvbuf: u64,
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Self {
        let is_root = comm.rank() == root;
        let slots = if is_root { comm.size() as usize } else { 1 };
        let host_mem = pinned.allocate(slots * count * dtype.size_in_bytes());
        Self {
            comm,
            host_mem,
            sendbuf,
            recvbuf,
            count,
            dtype,
            root,
            is_root,
        }
    }

    fn block_bytes(&self) -> usize {
        self.count * self.dtype.size_in_bytes()
    }
}

impl CollectiveOp for ScatterState {
    fn name(&self) -> &'static str {
        "scatter"
    }

    fn variant(&self) -> SignalVariant {
        SignalVariant::SignalNonRootEarly {
            has_output: !self.is_root,
        }
    }

    unsafe fn prepare_device(&mut self, stream: &DeviceStream) {
        if self.is_root {
            unsafe { stream.copy_async(self.sendbuf, self.host_mem.addr(), self.host_mem.len()) };
            // The root's own block goes device-to-device; the transport
            // leaves it in place.
            if self.sendbuf != self.recvbuf {
                let offset = (self.root as usize * self.block_bytes()) as u64;
                unsafe {
                    stream.copy_async(self.sendbuf + offset, self.recvbuf, self.block_bytes())
                };
            }
        }
    }

    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>> {
        let req = unsafe {
            self.comm
                .iscatter(self.host_mem.addr(), self.count, self.dtype, self.root)?
        };
        Ok(vec![req])
    }

    unsafe fn finish_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.host_mem.addr(), self.recvbuf, self.block_bytes()) };
    }
}

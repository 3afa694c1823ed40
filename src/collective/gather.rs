use std::sync::Arc;

use crate::device::DeviceStream;
use crate::error::Result;
use crate::memory::{PinnedBuf, PinnedPool};
use crate::transport::{BoxedTransportRequest, TransportComm};
use crate::types::{DataType, Rank};

use super::state::{CollectiveOp, SignalVariant};

/// Host-transfer gather to `root`. Non-root ranks have no device-visible
/// output, so their stream is released as soon as the transport finishes.
pub(crate) struct GatherState {
    comm: Arc<dyn TransportComm>,
    host_mem: PinnedBuf,
    sendbuf: u64,
    recvbuf: u64,
    count: usize,
    dtype: DataType,
    root: Rank,
    is_root: bool,
}

impl GatherState {
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

    fn slot_bytes(&self) -> usize {
        self.count * self.dtype.size_in_bytes()
    }
}

impl CollectiveOp for GatherState {
    fn name(&self) -> &'static str {
        "gather"
    }

    fn variant(&self) -> SignalVariant {
        SignalVariant::SignalNonRootEarly {
            has_output: self.is_root,
        }
    }

    unsafe fn prepare_device(&mut self, stream: &DeviceStream) {
        if self.is_root {
            let slot = self.comm.rank() as usize * self.slot_bytes();
            // In place, the root's contribution already sits in its slot of
            // the receive buffer.
            let src = if self.sendbuf == self.recvbuf {
                self.recvbuf + slot as u64
            } else {
                self.sendbuf
            };
            unsafe { stream.copy_async(src, self.host_mem.addr_at(slot), self.slot_bytes()) };
        } else {
            unsafe { stream.copy_async(self.sendbuf, self.host_mem.addr(), self.slot_bytes()) };
        }
    }

    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>> {
        let req = unsafe {
            self.comm
                .igather(self.host_mem.addr(), self.count, self.dtype, self.root)?
        };
        Ok(vec![req])
    }

    unsafe fn finish_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.host_mem.addr(), self.recvbuf, self.host_mem.len()) };
    }
}

use std::sync::Arc;

use crate::device::DeviceStream;
use crate::error::Result;
use crate::memory::{PinnedBuf, PinnedPool};
use crate::transport::{BoxedTransportRequest, TransportComm};
use crate::types::{DataType, Rank};

use super::state::{CollectiveOp, SignalVariant};

/// Host-transfer broadcast from `root` over a single buffer.
pub(crate) struct BcastState {
    comm: Arc<dyn TransportComm>,
    host_mem: PinnedBuf,
    buf: u64,
    count: usize,
    dtype: DataType,
    root: Rank,
    is_root: bool,
}

impl BcastState {
    pub(crate) fn new(
        pinned: &Arc<PinnedPool>,
        comm: Arc<dyn TransportComm>,
        buf: u64,
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Self {
        let host_mem = pinned.allocate(count * dtype.size_in_bytes());
        let is_root = comm.rank() == root;
        Self {
            comm,
            host_mem,
            buf,
            count,
            dtype,
            root,
            is_root,
        }
    }
}

impl CollectiveOp for BcastState {
    fn name(&self) -> &'static str {
        "bcast"
    }

    fn variant(&self) -> SignalVariant {
        SignalVariant::SignalAtEnd
    }

    unsafe fn prepare_device(&mut self, stream: &DeviceStream) {
        // Only the root has input to stage; elsewhere the transport fills
        // the staging buffer.
        if self.is_root {
            unsafe { stream.copy_async(self.buf, self.host_mem.addr(), self.host_mem.len()) };
        }
    }

    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>> {
        let req = unsafe {
            self.comm
                .ibcast(self.host_mem.addr(), self.count, self.dtype, self.root)?
        };
        Ok(vec![req])
    }

    unsafe fn finish_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.host_mem.addr(), self.buf, self.host_mem.len()) };
    }
}

use std::sync::Arc;

use crate::device::DeviceStream;
use crate::error::Result;
use crate::memory::{PinnedBuf, PinnedPool};
use crate::transport::{BoxedTransportRequest, TransportComm};
use crate::types::{DataType, ReduceOp};

use super::state::{CollectiveOp, SignalVariant};

/// Host-transfer reduce-scatter. `count` is the per-rank output count; the
/// staged input holds `size * count` elements and this rank's reduced block
/// lands at the front of the staging buffer.
pub(crate) struct ReduceScatterState {
    comm: Arc<dyn TransportComm>,
    host_mem: PinnedBuf,
    sendbuf: u64,
    recvbuf: u64,
    count: usize,
    dtype: DataType,
    op: ReduceOp,
}

impl ReduceScatterState {
    pub(crate) fn new(
        pinned: &Arc<PinnedPool>,
        comm: Arc<dyn TransportComm>,
        sendbuf: u64,
        recvbuf: u64,
        count: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Self {
        let host_mem = pinned.allocate(comm.size() as usize * count * dtype.size_in_bytes());
        Self {
            comm,
            host_mem,
            sendbuf,
            recvbuf,
            count,
            dtype,
            op,
        }
    }
}

impl CollectiveOp for ReduceScatterState {
    fn name(&self) -> &'static str {
        "reduce-scatter"
    }

    fn variant(&self) -> SignalVariant {
        SignalVariant::SignalAtEnd
    }

    unsafe fn prepare_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.sendbuf, self.host_mem.addr(), self.host_mem.len()) };
    }

    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>> {
        let req = unsafe {
            self.comm
                .ireduce_scatter(self.host_mem.addr(), self.count, self.dtype, self.op)?
        };
        Ok(vec![req])
    }

    unsafe fn finish_device(&mut self, stream: &DeviceStream) {
        let block = self.count * self.dtype.size_in_bytes();
        unsafe { stream.copy_async(self.host_mem.addr(), self.recvbuf, block) };
    }
}

use std::sync::Arc;

use crate::device::DeviceStream;
use crate::error::Result;
use crate::memory::{PinnedBuf, PinnedPool};
use crate::transport::{BoxedTransportRequest, TransportComm};
use crate::types::DataType;

use super::state::{CollectiveOp, SignalVariant};

/// Host-transfer all-to-all over `size * count` staged elements.
pub(crate) struct AlltoallState {
    comm: Arc<dyn TransportComm>,
    host_mem: PinnedBuf,
    sendbuf: u64,
    recvbuf: u64,
    count: usize,
    dtype: DataType,
}

impl AlltoallState {
    pub(crate) fn new(
        pinned: &Arc<PinnedPool>,
        comm: Arc<dyn TransportComm>,
        sendbuf: u64,
        recvbuf: u64,
        count: usize,
        dtype: DataType,
    ) -> Self {
        let host_mem = pinned.allocate(comm.size() as usize * count * dtype.size_in_bytes());
        Self {
            comm,
            host_mem,
            sendbuf,
            recvbuf,
            count,
            dtype,
        }
    }
}

impl CollectiveOp for AlltoallState {
    fn name(&self) -> &'static str {
        "alltoall"
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
                .ialltoall(self.host_mem.addr(), self.count, self.dtype)?
        };
        Ok(vec![req])
    }

    unsafe fn finish_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.host_mem.addr(), self.recvbuf, self.host_mem.len()) };
    }
}

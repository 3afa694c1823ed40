use std::sync::Arc;

use crate::device::DeviceStream;
use crate::error::Result;
use crate::memory::{PinnedBuf, PinnedPool};
use crate::transport::{BoxedTransportRequest, TransportComm};
use crate::types::DataType;

use super::state::{CollectiveOp, SignalVariant};

/// Host-transfer allgather. The staging buffer holds one slot per rank;
/// this rank's contribution is staged into its slot and the transport fills
/// the rest in place.
pub(crate) struct AllgatherState {
    comm: Arc<dyn TransportComm>,
    host_mem: PinnedBuf,
    sendbuf: u64,
    recvbuf: u64,
    count: usize,
    dtype: DataType,
}

impl AllgatherState {
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

    fn slot_bytes(&self) -> usize {
        self.count * self.dtype.size_in_bytes()
    }
}

impl CollectiveOp for AllgatherState {
    fn name(&self) -> &'static str {
        "allgather"
    }

    fn variant(&self) -> SignalVariant {
        SignalVariant::SignalAtEnd
    }

    unsafe fn prepare_device(&mut self, stream: &DeviceStream) {
        let slot = self.comm.rank() as usize * self.slot_bytes();
        // In place, the contribution already sits in this rank's slot of the
        // receive buffer.
        let src = if self.sendbuf == self.recvbuf {
            self.recvbuf + slot as u64
        } else {
            self.sendbuf
        };
        unsafe { stream.copy_async(src, self.host_mem.addr_at(slot), self.slot_bytes()) };
    }

    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>> {
        let req = unsafe {
            self.comm
                .iallgather(self.host_mem.addr(), self.count, self.dtype)?
        };
        Ok(vec![req])
    }

    unsafe fn finish_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.host_mem.addr(), self.recvbuf, self.host_mem.len()) };
    }
}

use std::sync::Arc;

use crate::device::DeviceStream;
use crate::error::Result;
use crate::memory::{PinnedBuf, PinnedPool};
use crate::transport::{BoxedTransportRequest, TransportComm};
use crate::types::{DataType, Rank, ReduceOp};

use super::state::{CollectiveOp, SignalVariant};

/// Host-transfer reduce to `root`. Only the root copies the result back.
pub(crate) struct ReduceState {
    comm: Arc<dyn TransportComm>,
    host_mem: PinnedBuf,
    sendbuf: u64,
    recvbuf: u64,
    count: usize,
    dtype: DataType,
    op: ReduceOp,
    root: Rank,
    is_root: bool,
}

impl ReduceState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        pinned: &Arc<PinnedPool>,
        comm: Arc<dyn TransportComm>,
        sendbuf: u64,
        recvbuf: u64,
        count: usize,
        dtype: DataType,
        op: ReduceOp,
        root: Rank,
    ) -> Self {
        let host_mem = pinned.allocate(count * dtype.size_in_bytes());
        let is_root = comm.rank() == root;
        Self {
            comm,
            host_mem,
            sendbuf,
            recvbuf,
            count,
            dtype,
            op,
            root,
            is_root,
        }
    }
}

impl CollectiveOp for ReduceState {
    fn name(&self) -> &'static str {
        "reduce"
    }

    fn variant(&self) -> SignalVariant {
        SignalVariant::SignalNonRootEarly {
            has_output: self.is_root,
        }
    }

    unsafe fn prepare_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.sendbuf, self.host_mem.addr(), self.host_mem.len()) };
    }

    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>> {
        let req = unsafe {
            self.comm.ireduce(
                self.host_mem.addr(),
                self.count,
                self.dtype,
                self.op,
                self.root,
            )?
        };
        Ok(vec![req])
    }

    unsafe fn finish_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.host_mem.addr(), self.recvbuf, self.host_mem.len()) };
    }
}

use std::sync::Arc;

use crate::device::DeviceStream;
use crate::error::Result;
use crate::memory::{PinnedBuf, PinnedPool};
use crate::transport::{BoxedTransportRequest, TransportComm};
use crate::types::{DataType, Rank};

use super::state::{CollectiveOp, SignalVariant};

/// Host-transfer send: stage and hand to the transport; the sender has no
/// device-visible output.
pub(crate) struct SendState {
    comm: Arc<dyn TransportComm>,
    host_mem: PinnedBuf,
    sendbuf: u64,
    count: usize,
    dtype: DataType,
    dst: Rank,
}

impl SendState {
    pub(crate) fn new(
        pinned: &Arc<PinnedPool>,
        comm: Arc<dyn TransportComm>,
        sendbuf: u64,
        count: usize,
        dtype: DataType,
        dst: Rank,
    ) -> Self {
        let host_mem = pinned.allocate(count * dtype.size_in_bytes());
        Self {
            comm,
            host_mem,
            sendbuf,
            count,
            dtype,
            dst,
        }
    }
}

impl CollectiveOp for SendState {
    fn name(&self) -> &'static str {
        "send"
    }

    fn variant(&self) -> SignalVariant {
        SignalVariant::SignalNonRootEarly { has_output: false }
    }

    unsafe fn prepare_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.sendbuf, self.host_mem.addr(), self.host_mem.len()) };
    }

    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>> {
        let req = unsafe {
            self.comm
                .isend(self.host_mem.addr(), self.count, self.dtype, self.dst)?
        };
        Ok(vec![req])
    }
}

/// Host-transfer receive: nothing to stage in, the payload is copied back
/// once the transport delivers it.
pub(crate) struct RecvState {
    comm: Arc<dyn TransportComm>,
    host_mem: PinnedBuf,
    recvbuf: u64,
    count: usize,
    dtype: DataType,
    src: Rank,
}

impl RecvState {
    pub(crate) fn new(
        pinned: &Arc<PinnedPool>,
        comm: Arc<dyn TransportComm>,
        recvbuf: u64,
        count: usize,
        dtype: DataType,
        src: Rank,
    ) -> Self {
        let host_mem = pinned.allocate(count * dtype.size_in_bytes());
        Self {
            comm,
            host_mem,
            recvbuf,
            count,
            dtype,
            src,
        }
    }
}

impl CollectiveOp for RecvState {
    fn name(&self) -> &'static str {
        "recv"
    }

    fn variant(&self) -> SignalVariant {
        SignalVariant::SignalAtEnd
    }

    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>> {
        let req = unsafe {
            self.comm
                .irecv(self.host_mem.addr(), self.count, self.dtype, self.src)?
        };
        Ok(vec![req])
    }

    unsafe fn finish_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.host_mem.addr(), self.recvbuf, self.host_mem.len()) };
    }
}

/// Combined send and receive driving two transport requests.
pub(crate) struct SendRecvState {
    comm: Arc<dyn TransportComm>,
    send_mem: PinnedBuf,
    recv_mem: PinnedBuf,
    sendbuf: u64,
    recvbuf: u64,
    send_count: usize,
    recv_count: usize,
    dtype: DataType,
    dst: Rank,
    src: Rank,
}

impl SendRecvState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        pinned: &Arc<PinnedPool>,
        comm: Arc<dyn TransportComm>,
        sendbuf: u64,
        send_count: usize,
        dst: Rank,
        recvbuf: u64,
        recv_count: usize,
        src: Rank,
        dtype: DataType,
    ) -> Self {
        let send_mem = pinned.allocate(send_count * dtype.size_in_bytes());
        let recv_mem = pinned.allocate(recv_count * dtype.size_in_bytes());
        Self {
            comm,
            send_mem,
            recv_mem,
            sendbuf,
            recvbuf,
            send_count,
            recv_count,
            dtype,
            dst,
            src,
        }
    }
}

impl CollectiveOp for SendRecvState {
    fn name(&self) -> &'static str {
        "sendrecv"
    }

    fn variant(&self) -> SignalVariant {
        SignalVariant::SignalAtEnd
    }

    unsafe fn prepare_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.sendbuf, self.send_mem.addr(), self.send_mem.len()) };
    }

    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>> {
        let send = unsafe {
            self.comm
                .isend(self.send_mem.addr(), self.send_count, self.dtype, self.dst)?
        };
        let recv = unsafe {
            self.comm
                .irecv(self.recv_mem.addr(), self.recv_count, self.dtype, self.src)?
        };
        Ok(vec![send, recv])
    }

    unsafe fn finish_device(&mut self, stream: &DeviceStream) {
        unsafe { stream.copy_async(self.recv_mem.addr(), self.recvbuf, self.recv_mem.len()) };
    }
}

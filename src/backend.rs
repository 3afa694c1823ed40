//! The host-transfer backend façade: blocking and non-blocking forms of
//! every collective, plus the algorithm enumerations.
//!
//! Blocking forms issue the operation on the communicator's own stream —
//! the host returns immediately, the stream carries the dependency.
//! Non-blocking forms issue on a library-internal stream that first waits
//! for the user's stream, and return a [`Request`] whose completion event is
//! recorded on the internal stream after the operation.

use std::str::FromStr;
use std::sync::Arc;

use crate::collective::{
    AllgatherState, AllreduceState, AlltoallState, BarrierState, BcastState, CollectiveOp,
    CollectiveState, ErrorCell, GatherState, RecvState, ReduceScatterState, ReduceState,
    ScatterState, SendRecvState, SendState,
};
use crate::communicator::Communicator;
use crate::context::Context;
use crate::device::DeviceStream;
use crate::error::{GantryError, Result};
use crate::request::Request;
use crate::types::{Element, Rank, ReduceOp};

/// Algorithm selection for allreduce; `Automatic` and `HostTransfer` route
/// through the same implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllreduceAlgorithm {
    #[default]
    Automatic,
    HostTransfer,
}

impl std::fmt::Display for AllreduceAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllreduceAlgorithm::Automatic => f.write_str("automatic"),
            AllreduceAlgorithm::HostTransfer => f.write_str("host-transfer"),
        }
    }
}

impl FromStr for AllreduceAlgorithm {
    type Err = GantryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "automatic" => Ok(AllreduceAlgorithm::Automatic),
            "host-transfer" => Ok(AllreduceAlgorithm::HostTransfer),
            _ => Err(GantryError::InvalidAlgorithm {
                operation: "allreduce",
                algorithm: s.to_string(),
            }),
        }
    }
}

/// Algorithm selection for every other collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectiveAlgorithm {
    #[default]
    Automatic,
}

impl std::fmt::Display for CollectiveAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectiveAlgorithm::Automatic => f.write_str("automatic"),
        }
    }
}

impl FromStr for CollectiveAlgorithm {
    type Err = GantryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "automatic" => Ok(CollectiveAlgorithm::Automatic),
            _ => Err(GantryError::InvalidAlgorithm {
                operation: "collective",
                algorithm: s.to_string(),
            }),
        }
    }
}

/// The host-transfer backend.
///
/// All buffer arguments are raw device addresses; the caller guarantees
/// they stay valid until the operation completes (for blocking forms, until
/// the stream has drained past it; for non-blocking forms, until the
/// request reports completion).
pub struct Backend {
    ctx: Arc<Context>,
}

impl Backend {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Name identifying the backend.
    pub fn name(&self) -> &'static str {
        "host-transfer"
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    fn check_rank(&self, rank: Rank, comm: &Communicator) -> Result<()> {
        if rank >= comm.size() {
            return Err(GantryError::InvalidRank {
                rank,
                size: comm.size(),
            });
        }
        Ok(())
    }

    /// Construct the state (enqueueing its device sequence on `stream`) and
    /// hand it to the progress engine.
    fn launch(
        &self,
        op: Box<dyn CollectiveOp>,
        stream: &DeviceStream,
        error: ErrorCell,
    ) {
        let state = CollectiveState::new(
            op,
            stream,
            self.ctx.events(),
            self.ctx.sync_flags(),
            error,
        );
        self.ctx.enqueue(Box::new(state));
    }

    /// Pre-sync an internal stream with the user's stream, launch there, and
    /// produce the completion request.
    fn launch_nonblocking(
        &self,
        comm: &Communicator,
        build: impl FnOnce(&Self) -> Box<dyn CollectiveOp>,
    ) -> Request {
        let internal = self.ctx.internal_stream();
        self.ctx.sync_internal_stream_with_comm(&internal, comm);
        let error = ErrorCell::default();
        self.launch(build(self), &internal, error.clone());
        self.ctx.setup_completion_event(&internal, comm, error)
    }

    // ── allreduce ────────────────────────────────────────────────────

    /// # Safety
    /// `sendbuf` and `recvbuf` must be valid device addresses for `count`
    /// elements until the operation completes.
    pub unsafe fn allreduce<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        op: ReduceOp,
        comm: &Communicator,
        algo: AllreduceAlgorithm,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ctx.ensure_live();
        match algo {
            AllreduceAlgorithm::Automatic | AllreduceAlgorithm::HostTransfer => {}
        }
        let state = AllreduceState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            sendbuf as u64,
            recvbuf as u64,
            count,
            T::DTYPE,
            op,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// In-place allreduce on a single buffer.
    ///
    /// # Safety
    /// Same contract as [`Backend::allreduce`].
    pub unsafe fn allreduce_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        op: ReduceOp,
        comm: &Communicator,
        algo: AllreduceAlgorithm,
    ) -> Result<()> {
        unsafe { self.allreduce(buf as *const T, buf, count, op, comm, algo) }
    }

    /// # Safety
    /// Buffers must stay valid until the returned request completes.
    pub unsafe fn nonblocking_allreduce<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        op: ReduceOp,
        comm: &Communicator,
        algo: AllreduceAlgorithm,
    ) -> Result<Request> {
        if count == 0 {
            return Ok(Request::null());
        }
        self.ctx.ensure_live();
        match algo {
            AllreduceAlgorithm::Automatic | AllreduceAlgorithm::HostTransfer => {}
        }
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(AllreduceState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                sendbuf as u64,
                recvbuf as u64,
                count,
                T::DTYPE,
                op,
            ))
        }))
    }

    /// # Safety
    /// Same contract as [`Backend::nonblocking_allreduce`].
    pub unsafe fn nonblocking_allreduce_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        op: ReduceOp,
        comm: &Communicator,
        algo: AllreduceAlgorithm,
    ) -> Result<Request> {
        unsafe { self.nonblocking_allreduce(buf as *const T, buf, count, op, comm, algo) }
    }

    // ── allgather ────────────────────────────────────────────────────

    /// # Safety
    /// `sendbuf` must hold `count` elements and `recvbuf` `size * count`
    /// elements until the operation completes.
    pub unsafe fn allgather<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ctx.ensure_live();
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        let state = AllgatherState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            sendbuf as u64,
            recvbuf as u64,
            count,
            T::DTYPE,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// In-place allgather: `buf` holds `size * count` elements with this
    /// rank's contribution in its slot.
    ///
    /// # Safety
    /// Same contract as [`Backend::allgather`].
    pub unsafe fn allgather_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        unsafe { self.allgather(buf as *const T, buf, count, comm, algo) }
    }

    /// # Safety
    /// Buffers must stay valid until the returned request completes.
    pub unsafe fn nonblocking_allgather<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        if count == 0 {
            return Ok(Request::null());
        }
        self.ctx.ensure_live();
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(AllgatherState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                sendbuf as u64,
                recvbuf as u64,
                count,
                T::DTYPE,
            ))
        }))
    }

    /// # Safety
    /// Same contract as [`Backend::nonblocking_allgather`].
    pub unsafe fn nonblocking_allgather_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        unsafe { self.nonblocking_allgather(buf as *const T, buf, count, comm, algo) }
    }

    // ── alltoall ─────────────────────────────────────────────────────

    /// # Safety
    /// Both buffers must hold `size * count` elements until the operation
    /// completes.
    pub unsafe fn alltoall<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ctx.ensure_live();
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        let state = AlltoallState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            sendbuf as u64,
            recvbuf as u64,
            count,
            T::DTYPE,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// # Safety
    /// Same contract as [`Backend::alltoall`].
    pub unsafe fn alltoall_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        unsafe { self.alltoall(buf as *const T, buf, count, comm, algo) }
    }

    /// # Safety
    /// Buffers must stay valid until the returned request completes.
    pub unsafe fn nonblocking_alltoall<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        if count == 0 {
            return Ok(Request::null());
        }
        self.ctx.ensure_live();
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(AlltoallState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                sendbuf as u64,
                recvbuf as u64,
                count,
                T::DTYPE,
            ))
        }))
    }

    /// # Safety
    /// Same contract as [`Backend::nonblocking_alltoall`].
    pub unsafe fn nonblocking_alltoall_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        unsafe { self.nonblocking_alltoall(buf as *const T, buf, count, comm, algo) }
    }

    // ── bcast ────────────────────────────────────────────────────────

    /// # Safety
    /// `buf` must hold `count` elements until the operation completes.
    pub unsafe fn bcast<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ctx.ensure_live();
        self.check_rank(root, comm)?;
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        let state = BcastState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            buf as u64,
            count,
            T::DTYPE,
            root,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// # Safety
    /// `buf` must stay valid until the returned request completes.
    pub unsafe fn nonblocking_bcast<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        if count == 0 {
            return Ok(Request::null());
        }
        self.ctx.ensure_live();
        self.check_rank(root, comm)?;
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(BcastState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                buf as u64,
                count,
                T::DTYPE,
                root,
            ))
        }))
    }

    // ── gather ───────────────────────────────────────────────────────

    /// # Safety
    /// `sendbuf` must hold `count` elements; at the root, `recvbuf` must
    /// hold `size * count` elements; both until the operation completes.
    pub unsafe fn gather<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ctx.ensure_live();
        self.check_rank(root, comm)?;
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        let state = GatherState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            sendbuf as u64,
            recvbuf as u64,
            count,
            T::DTYPE,
            root,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// In-place gather: at the root, `buf` holds `size * count` elements
    /// with the root's contribution in its slot.
    ///
    /// # Safety
    /// Same contract as [`Backend::gather`].
    pub unsafe fn gather_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        unsafe { self.gather(buf as *const T, buf, count, root, comm, algo) }
    }

    /// # Safety
    /// Buffers must stay valid until the returned request completes.
    pub unsafe fn nonblocking_gather<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        if count == 0 {
            return Ok(Request::null());
        }
        self.ctx.ensure_live();
        self.check_rank(root, comm)?;
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(GatherState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                sendbuf as u64,
                recvbuf as u64,
                count,
                T::DTYPE,
                root,
            ))
        }))
    }

    /// # Safety
    /// Same contract as [`Backend::nonblocking_gather`].
    pub unsafe fn nonblocking_gather_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        unsafe { self.nonblocking_gather(buf as *const T, buf, count, root, comm, algo) }
    }

    // ── reduce ───────────────────────────────────────────────────────

    /// # Safety
    /// Both buffers must hold `count` elements until the operation
    /// completes.
    pub unsafe fn reduce<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        op: ReduceOp,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ctx.ensure_live();
        self.check_rank(root, comm)?;
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        let state = ReduceState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            sendbuf as u64,
            recvbuf as u64,
            count,
            T::DTYPE,
            op,
            root,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// # Safety
    /// Same contract as [`Backend::reduce`].
    pub unsafe fn reduce_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        op: ReduceOp,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        unsafe { self.reduce(buf as *const T, buf, count, op, root, comm, algo) }
    }

    /// # Safety
    /// Buffers must stay valid until the returned request completes.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn nonblocking_reduce<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        op: ReduceOp,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        if count == 0 {
            return Ok(Request::null());
        }
        self.ctx.ensure_live();
        self.check_rank(root, comm)?;
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(ReduceState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                sendbuf as u64,
                recvbuf as u64,
                count,
                T::DTYPE,
                op,
                root,
            ))
        }))
    }

    /// # Safety
    /// Same contract as [`Backend::nonblocking_reduce`].
    pub unsafe fn nonblocking_reduce_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        op: ReduceOp,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        unsafe { self.nonblocking_reduce(buf as *const T, buf, count, op, root, comm, algo) }
    }

    // ── reduce-scatter ───────────────────────────────────────────────

    /// `count` is the per-rank output count; `sendbuf` holds `size * count`
    /// elements.
    ///
    /// # Safety
    /// Buffers must stay valid for those extents until the operation
    /// completes.
    pub unsafe fn reduce_scatter<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        op: ReduceOp,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ctx.ensure_live();
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        let state = ReduceScatterState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            sendbuf as u64,
            recvbuf as u64,
            count,
            T::DTYPE,
            op,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// In-place reduce-scatter: `buf` holds `size * count` elements; the
    /// reduced block lands at the front.
    ///
    /// # Safety
    /// Same contract as [`Backend::reduce_scatter`].
    pub unsafe fn reduce_scatter_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        op: ReduceOp,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        unsafe { self.reduce_scatter(buf as *const T, buf, count, op, comm, algo) }
    }

    /// # Safety
    /// Buffers must stay valid until the returned request completes.
    pub unsafe fn nonblocking_reduce_scatter<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        op: ReduceOp,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        if count == 0 {
            return Ok(Request::null());
        }
        self.ctx.ensure_live();
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(ReduceScatterState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                sendbuf as u64,
                recvbuf as u64,
                count,
                T::DTYPE,
                op,
            ))
        }))
    }

    /// # Safety
    /// Same contract as [`Backend::nonblocking_reduce_scatter`].
    pub unsafe fn nonblocking_reduce_scatter_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        op: ReduceOp,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        unsafe { self.nonblocking_reduce_scatter(buf as *const T, buf, count, op, comm, algo) }
    }

    // ── scatter ──────────────────────────────────────────────────────

    /// # Safety
    /// At the root, `sendbuf` must hold `size * count` elements; `recvbuf`
    /// must hold `count` elements; both until the operation completes.
    pub unsafe fn scatter<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ctx.ensure_live();
        self.check_rank(root, comm)?;
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        let state = ScatterState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            sendbuf as u64,
            recvbuf as u64,
            count,
            T::DTYPE,
            root,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// In-place scatter: at the root, `buf` holds `size * count` elements
    /// and the root's own block stays in place.
    ///
    /// # Safety
    /// Same contract as [`Backend::scatter`].
    pub unsafe fn scatter_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<()> {
        unsafe { self.scatter(buf as *const T, buf, count, root, comm, algo) }
    }

    /// # Safety
    /// Buffers must stay valid until the returned request completes.
    pub unsafe fn nonblocking_scatter<T: Element>(
        &self,
        sendbuf: *const T,
        recvbuf: *mut T,
        count: usize,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        if count == 0 {
            return Ok(Request::null());
        }
        self.ctx.ensure_live();
        self.check_rank(root, comm)?;
        match algo {
            CollectiveAlgorithm::Automatic => {}
        }
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(ScatterState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                sendbuf as u64,
                recvbuf as u64,
                count,
                T::DTYPE,
                root,
            ))
        }))
    }

    /// # Safety
    /// Same contract as [`Backend::nonblocking_scatter`].
    pub unsafe fn nonblocking_scatter_inplace<T: Element>(
        &self,
        buf: *mut T,
        count: usize,
        root: Rank,
        comm: &Communicator,
        algo: CollectiveAlgorithm,
    ) -> Result<Request> {
        unsafe { self.nonblocking_scatter(buf as *const T, buf, count, root, comm, algo) }
    }

    // ── point-to-point ───────────────────────────────────────────────

    /// # Safety
    /// `sendbuf` must hold `count` elements until the operation completes.
    pub unsafe fn send<T: Element>(
        &self,
        sendbuf: *const T,
        count: usize,
        dst: Rank,
        comm: &Communicator,
    ) -> Result<()> {
        self.ctx.ensure_live();
        self.check_rank(dst, comm)?;
        let state = SendState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            sendbuf as u64,
            count,
            T::DTYPE,
            dst,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// # Safety
    /// `sendbuf` must stay valid until the returned request completes.
    pub unsafe fn nonblocking_send<T: Element>(
        &self,
        sendbuf: *const T,
        count: usize,
        dst: Rank,
        comm: &Communicator,
    ) -> Result<Request> {
        self.ctx.ensure_live();
        self.check_rank(dst, comm)?;
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(SendState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                sendbuf as u64,
                count,
                T::DTYPE,
                dst,
            ))
        }))
    }

    /// # Safety
    /// `recvbuf` must hold `count` elements until the operation completes.
    pub unsafe fn recv<T: Element>(
        &self,
        recvbuf: *mut T,
        count: usize,
        src: Rank,
        comm: &Communicator,
    ) -> Result<()> {
        self.ctx.ensure_live();
        self.check_rank(src, comm)?;
        let state = RecvState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            recvbuf as u64,
            count,
            T::DTYPE,
            src,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// # Safety
    /// `recvbuf` must stay valid until the returned request completes.
    pub unsafe fn nonblocking_recv<T: Element>(
        &self,
        recvbuf: *mut T,
        count: usize,
        src: Rank,
        comm: &Communicator,
    ) -> Result<Request> {
        self.ctx.ensure_live();
        self.check_rank(src, comm)?;
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(RecvState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                recvbuf as u64,
                count,
                T::DTYPE,
                src,
            ))
        }))
    }

    /// # Safety
    /// `sendbuf` must hold `send_count` elements and `recvbuf` `recv_count`
    /// elements until the operation completes.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn sendrecv<T: Element>(
        &self,
        sendbuf: *const T,
        send_count: usize,
        dst: Rank,
        recvbuf: *mut T,
        recv_count: usize,
        src: Rank,
        comm: &Communicator,
    ) -> Result<()> {
        self.ctx.ensure_live();
        self.check_rank(dst, comm)?;
        self.check_rank(src, comm)?;
        let state = SendRecvState::new(
            self.ctx.pinned(),
            Arc::clone(comm.transport()),
            sendbuf as u64,
            send_count,
            dst,
            recvbuf as u64,
            recv_count,
            src,
            T::DTYPE,
        );
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    /// # Safety
    /// Buffers must stay valid until the returned request completes.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn nonblocking_sendrecv<T: Element>(
        &self,
        sendbuf: *const T,
        send_count: usize,
        dst: Rank,
        recvbuf: *mut T,
        recv_count: usize,
        src: Rank,
        comm: &Communicator,
    ) -> Result<Request> {
        self.ctx.ensure_live();
        self.check_rank(dst, comm)?;
        self.check_rank(src, comm)?;
        Ok(self.launch_nonblocking(comm, |backend| {
            Box::new(SendRecvState::new(
                backend.ctx.pinned(),
                Arc::clone(comm.transport()),
                sendbuf as u64,
                send_count,
                dst,
                recvbuf as u64,
                recv_count,
                src,
                T::DTYPE,
            ))
        }))
    }

    // ── barrier ──────────────────────────────────────────────────────

    pub fn barrier(&self, comm: &Communicator) -> Result<()> {
        self.ctx.ensure_live();
        let state = BarrierState::new(Arc::clone(comm.transport()));
        self.launch(Box::new(state), comm.stream(), ErrorCell::default());
        Ok(())
    }

    pub fn nonblocking_barrier(&self, comm: &Communicator) -> Result<Request> {
        self.ctx.ensure_live();
        Ok(self.launch_nonblocking(comm, |_| {
            Box::new(BarrierState::new(Arc::clone(comm.transport())))
        }))
    }
}

//! The host-memory message-passing transport seam.
//!
//! The engine drives its transport exclusively through non-blocking calls:
//! every primitive returns a [`TransportRequest`] that the progress thread
//! polls. All collective calls operate **in place** on a single host buffer,
//! which is how the engine invokes them — the staging buffer already holds
//! the caller's contribution in its slot when the call is issued.
//!
//! [`LocalFabric`] is the built-in in-process transport used for tests and
//! single-node runs; MPI-like transports plug in behind the same traits.

mod local;
mod reduce;

pub use local::{LocalComm, LocalFabric};

use crate::error::Result;
use crate::types::{DataType, Rank, ReduceOp};

/// A pollable handle for one in-flight transport operation.
pub trait TransportRequest: Send {
    /// Non-blocking completion query. Must never block; returning `Ok(true)`
    /// means output (if any) has been written to the caller's buffer.
    fn test(&mut self) -> Result<bool>;
}

pub type BoxedTransportRequest = Box<dyn TransportRequest>;

/// One rank's handle on a communicator of the underlying transport.
///
/// Collectives must be issued in the same order on every rank of a
/// communicator. Buffers are raw addresses because they point into staging
/// memory whose lifetime the engine manages around the returned request.
pub trait TransportComm: Send + Sync {
    /// This rank's index in the communicator.
    fn rank(&self) -> Rank;

    /// Number of participants.
    fn size(&self) -> u32;

    /// In-place allreduce over `count` elements.
    ///
    /// # Safety
    /// `buf` must be valid for `count * dtype.size_in_bytes()` bytes until
    /// the request completes.
    unsafe fn iallreduce(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Result<BoxedTransportRequest>;

    /// In-place allgather; `buf` holds `size * count` elements with this
    /// rank's contribution already in its slot.
    ///
    /// # Safety
    /// `buf` must be valid for `size * count * dtype.size_in_bytes()` bytes
    /// until the request completes.
    unsafe fn iallgather(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
    ) -> Result<BoxedTransportRequest>;

    /// In-place all-to-all; `buf` holds `size * count` elements, one block
    /// per destination.
    ///
    /// # Safety
    /// `buf` must be valid for `size * count * dtype.size_in_bytes()` bytes
    /// until the request completes.
    unsafe fn ialltoall(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
    ) -> Result<BoxedTransportRequest>;

    /// Broadcast `count` elements from `root`; `buf` is the payload at the
    /// root and the destination elsewhere.
    ///
    /// # Safety
    /// `buf` must be valid for `count * dtype.size_in_bytes()` bytes until
    /// the request completes.
    unsafe fn ibcast(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Result<BoxedTransportRequest>;

    /// Gather `count` elements per rank to `root`. At the root, `buf` holds
    /// `size * count` elements with the root's contribution already in its
    /// slot (the transport never rewrites that slot); elsewhere `buf` holds
    /// this rank's `count` elements.
    ///
    /// # Safety
    /// `buf` must be valid for the sizes above until the request completes.
    unsafe fn igather(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Result<BoxedTransportRequest>;

    /// In-place reduce of `count` elements to `root`; the result lands in
    /// the root's `buf`.
    ///
    /// # Safety
    /// `buf` must be valid for `count * dtype.size_in_bytes()` bytes until
    /// the request completes.
    unsafe fn ireduce(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        op: ReduceOp,
        root: Rank,
    ) -> Result<BoxedTransportRequest>;

    /// In-place reduce-scatter: `buf` holds `size * count` input elements;
    /// this rank's reduced block of `count` elements lands at the front.
    ///
    /// # Safety
    /// `buf` must be valid for `size * count * dtype.size_in_bytes()` bytes
    /// until the request completes.
    unsafe fn ireduce_scatter(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Result<BoxedTransportRequest>;

    /// Scatter from `root`. At the root, `buf` holds `size * count`
    /// elements and the root's own block stays in place; elsewhere this
    /// rank's block of `count` elements lands in `buf`.
    ///
    /// # Safety
    /// `buf` must be valid for the sizes above until the request completes.
    unsafe fn iscatter(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Result<BoxedTransportRequest>;

    /// Send `count` elements to `dst`. The request completes when `buf` is
    /// reusable.
    ///
    /// # Safety
    /// `buf` must be valid for `count * dtype.size_in_bytes()` bytes until
    /// the request completes.
    unsafe fn isend(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        dst: Rank,
    ) -> Result<BoxedTransportRequest>;

    /// Receive `count` elements from `src` into `buf`.
    ///
    /// # Safety
    /// `buf` must be valid for `count * dtype.size_in_bytes()` bytes until
    /// the request completes.
    unsafe fn irecv(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        src: Rank,
    ) -> Result<BoxedTransportRequest>;

    /// Barrier across the communicator.
    fn ibarrier(&self) -> Result<BoxedTransportRequest>;
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{GantryError, Result};
use crate::types::{DataType, Rank, ReduceOp};

use super::reduce::reduce_slices;
use super::{BoxedTransportRequest, TransportComm, TransportRequest};

/// In-process transport connecting `size` ranks within one process.
///
/// Collectives rendezvous on per-communicator sequence numbers: every rank's
/// n-th collective call on a communicator matches the n-th call of every
/// other rank. The last rank to arrive computes all outputs; requests
/// complete by polling a done flag and then copying this rank's output into
/// its buffer. Point-to-point messages match per directed pair, in order.
pub struct LocalFabric {
    inner: Arc<FabricInner>,
}

struct FabricInner {
    size: u32,
    next_comm_id: AtomicU64,
    colls: Mutex<HashMap<CollKey, Arc<CollSlot>>>,
    p2p: Mutex<HashMap<P2pKey, Arc<P2pSlot>>>,
}

/// (communicator id, collective sequence number)
type CollKey = (u64, u64);
/// (communicator id, src, dst, per-pair sequence number)
type P2pKey = (u64, Rank, Rank, u64);

impl LocalFabric {
    pub fn new(size: u32) -> Self {
        assert!(size > 0, "fabric needs at least one rank");
        Self {
            inner: Arc::new(FabricInner {
                size,
                next_comm_id: AtomicU64::new(0),
                colls: Mutex::new(HashMap::new()),
                p2p: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn size(&self) -> u32 {
        self.inner.size
    }

    /// Create a fresh communicator spanning all ranks; returns one
    /// [`LocalComm`] per rank, in rank order.
    pub fn world(&self) -> Vec<LocalComm> {
        let comm_id = self.inner.next_comm_id.fetch_add(1, Ordering::Relaxed);
        (0..self.inner.size)
            .map(|rank| LocalComm {
                fabric: Arc::clone(&self.inner),
                comm_id,
                rank,
                coll_seq: AtomicU64::new(0),
                send_seq: Mutex::new(HashMap::new()),
                recv_seq: Mutex::new(HashMap::new()),
            })
            .collect()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// The operation all ranks must agree on at a given sequence number.
#[derive(Debug, Clone, PartialEq)]
enum CollOp {
    Allreduce {
        count: usize,
        dtype: DataType,
        op: ReduceOp,
    },
    Allgather {
        count: usize,
        dtype: DataType,
    },
    Alltoall {
        count: usize,
        dtype: DataType,
    },
    Bcast {
        count: usize,
        dtype: DataType,
        root: Rank,
    },
    Gather {
        count: usize,
        dtype: DataType,
        root: Rank,
    },
    Reduce {
        count: usize,
        dtype: DataType,
        op: ReduceOp,
        root: Rank,
    },
    ReduceScatter {
        count: usize,
        dtype: DataType,
        op: ReduceOp,
    },
    Scatter {
        count: usize,
        dtype: DataType,
        root: Rank,
    },
    Barrier,
}

struct CollSlot {
    done: AtomicBool,
    inner: Mutex<CollInner>,
}

struct CollInner {
    op: Option<CollOp>,
    contributions: Vec<Option<Vec<u8>>>,
    arrived: u32,
    outputs: Vec<Option<Vec<u8>>>,
}

impl CollSlot {
    fn new(size: u32) -> Arc<Self> {
        Arc::new(Self {
            done: AtomicBool::new(false),
            inner: Mutex::new(CollInner {
                op: None,
                contributions: vec![None; size as usize],
                arrived: 0,
                outputs: vec![None; size as usize],
            }),
        })
    }
}

/// One rank's handle on an in-process communicator.
pub struct LocalComm {
    fabric: Arc<FabricInner>,
    comm_id: u64,
    rank: Rank,
    coll_seq: AtomicU64,
    send_seq: Mutex<HashMap<Rank, u64>>,
    recv_seq: Mutex<HashMap<Rank, u64>>,
}

impl LocalComm {
    fn check_root(&self, root: Rank) -> Result<()> {
        if root >= self.fabric.size {
            return Err(GantryError::InvalidRank {
                rank: root,
                size: self.fabric.size,
            });
        }
        Ok(())
    }

    fn issue_collective(
        &self,
        op: CollOp,
        contribution: Vec<u8>,
        out: Option<(u64, usize)>,
    ) -> Result<BoxedTransportRequest> {
        let seq = self.coll_seq.fetch_add(1, Ordering::Relaxed);
        let key = (self.comm_id, seq);
        let size = self.fabric.size;

        let slot = {
            let mut colls = lock(&self.fabric.colls);
            Arc::clone(colls.entry(key).or_insert_with(|| CollSlot::new(size)))
        };

        let all_arrived = {
            let mut inner = lock(&slot.inner);
            if let Some(existing) = &inner.op {
                if *existing != op {
                    tracing::error!(
                        comm = self.comm_id,
                        seq,
                        rank = self.rank,
                        "collective mismatch: {existing:?} vs {op:?}"
                    );
                    return Err(GantryError::CollectiveMismatch {
                        comm: self.comm_id,
                        seq,
                    });
                }
            } else {
                inner.op = Some(op);
            }
            inner.contributions[self.rank as usize] = Some(contribution);
            inner.arrived += 1;
            if inner.arrived == size {
                let op = inner.op.clone().unwrap_or(CollOp::Barrier);
                let contribs: Vec<Vec<u8>> = inner
                    .contributions
                    .iter_mut()
                    .map(|c| c.take().unwrap_or_default())
                    .collect();
                inner.outputs = compute_outputs(&op, size, contribs);
                slot.done.store(true, Ordering::Release);
                true
            } else {
                false
            }
        };

        if all_arrived {
            // Every rank has already looked the slot up; the key is dead.
            lock(&self.fabric.colls).remove(&key);
        }

        Ok(Box::new(LocalCollRequest {
            slot,
            rank: self.rank,
            out,
            fetched: false,
        }))
    }
}

fn compute_outputs(op: &CollOp, size: u32, contribs: Vec<Vec<u8>>) -> Vec<Option<Vec<u8>>> {
    let n = size as usize;
    match *op {
        CollOp::Allreduce { count, dtype, op } => {
            let acc = fold_reduce(&contribs, count, dtype, op);
            (0..n).map(|_| Some(acc.clone())).collect()
        }
        CollOp::Allgather { .. } => {
            let total: Vec<u8> = contribs.concat();
            (0..n).map(|_| Some(total.clone())).collect()
        }
        CollOp::Alltoall { count, dtype } => {
            let blk = count * dtype.size_in_bytes();
            (0..n)
                .map(|r| {
                    let mut out = Vec::with_capacity(n * blk);
                    for c in &contribs {
                        out.extend_from_slice(&c[r * blk..(r + 1) * blk]);
                    }
                    Some(out)
                })
                .collect()
        }
        CollOp::Bcast { root, .. } => {
            let payload = &contribs[root as usize];
            (0..n)
                .map(|r| {
                    if r == root as usize {
                        None
                    } else {
                        Some(payload.clone())
                    }
                })
                .collect()
        }
        CollOp::Gather { root, .. } => {
            let total: Vec<u8> = contribs.concat();
            (0..n)
                .map(|r| if r == root as usize { Some(total.clone()) } else { None })
                .collect()
        }
        CollOp::Reduce {
            count,
            dtype,
            op,
            root,
        } => {
            let acc = fold_reduce(&contribs, count, dtype, op);
            (0..n)
                .map(|r| if r == root as usize { Some(acc.clone()) } else { None })
                .collect()
        }
        CollOp::ReduceScatter { count, dtype, op } => {
            let acc = fold_reduce(&contribs, count * n, dtype, op);
            let blk = count * dtype.size_in_bytes();
            (0..n)
                .map(|r| Some(acc[r * blk..(r + 1) * blk].to_vec()))
                .collect()
        }
        CollOp::Scatter { count, dtype, root } => {
            let blk = count * dtype.size_in_bytes();
            let src = &contribs[root as usize];
            (0..n)
                .map(|r| {
                    if r == root as usize {
                        None
                    } else {
                        Some(src[r * blk..(r + 1) * blk].to_vec())
                    }
                })
                .collect()
        }
        CollOp::Barrier => vec![None; n],
    }
}

fn fold_reduce(contribs: &[Vec<u8>], count: usize, dtype: DataType, op: ReduceOp) -> Vec<u8> {
    let mut acc = contribs[0].clone();
    for c in &contribs[1..] {
        reduce_slices(&mut acc, c, count, dtype, op);
    }
    acc
}

struct LocalCollRequest {
    slot: Arc<CollSlot>,
    rank: Rank,
    out: Option<(u64, usize)>,
    fetched: bool,
}

impl TransportRequest for LocalCollRequest {
    fn test(&mut self) -> Result<bool> {
        if self.fetched {
            return Ok(true);
        }
        if !self.slot.done.load(Ordering::Acquire) {
            return Ok(false);
        }
        let inner = lock(&self.slot.inner);
        if let Some(bytes) = &inner.outputs[self.rank as usize] {
            let Some((ptr, len)) = self.out else {
                return Err(GantryError::transport(
                    "collective produced output but no destination was supplied",
                ));
            };
            if bytes.len() != len {
                return Err(GantryError::SizeMismatch {
                    expected: len,
                    actual: bytes.len(),
                });
            }
            unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, len) };
        }
        self.fetched = true;
        Ok(true)
    }
}

struct P2pSlot {
    ready: AtomicBool,
    data: Mutex<Option<Vec<u8>>>,
}

impl P2pSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(false),
            data: Mutex::new(None),
        })
    }
}

/// Already-complete request (send buffers are captured at issue).
struct ImmediateRequest;

impl TransportRequest for ImmediateRequest {
    fn test(&mut self) -> Result<bool> {
        Ok(true)
    }
}

struct LocalRecvRequest {
    slot: Arc<P2pSlot>,
    fabric: Arc<FabricInner>,
    key: P2pKey,
    out_ptr: u64,
    out_len: usize,
    done: bool,
}

impl TransportRequest for LocalRecvRequest {
    fn test(&mut self) -> Result<bool> {
        if self.done {
            return Ok(true);
        }
        if !self.slot.ready.load(Ordering::Acquire) {
            return Ok(false);
        }
        let bytes = lock(&self.slot.data).take();
        let Some(bytes) = bytes else {
            return Ok(false);
        };
        if bytes.len() != self.out_len {
            return Err(GantryError::SizeMismatch {
                expected: self.out_len,
                actual: bytes.len(),
            });
        }
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.out_ptr as *mut u8, bytes.len())
        };
        lock(&self.fabric.p2p).remove(&self.key);
        self.done = true;
        Ok(true)
    }
}

unsafe fn read_bytes(addr: u64, len: usize) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(addr as *const u8, len) }.to_vec()
}

impl TransportComm for LocalComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> u32 {
        self.fabric.size
    }

    unsafe fn iallreduce(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Result<BoxedTransportRequest> {
        let bytes = count * dtype.size_in_bytes();
        let contribution = unsafe { read_bytes(buf, bytes) };
        self.issue_collective(
            CollOp::Allreduce { count, dtype, op },
            contribution,
            Some((buf, bytes)),
        )
    }

    unsafe fn iallgather(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
    ) -> Result<BoxedTransportRequest> {
        let blk = count * dtype.size_in_bytes();
        let contribution = unsafe { read_bytes(buf + (self.rank as usize * blk) as u64, blk) };
        self.issue_collective(
            CollOp::Allgather { count, dtype },
            contribution,
            Some((buf, blk * self.fabric.size as usize)),
        )
    }

    unsafe fn ialltoall(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
    ) -> Result<BoxedTransportRequest> {
        let total = count * dtype.size_in_bytes() * self.fabric.size as usize;
        let contribution = unsafe { read_bytes(buf, total) };
        self.issue_collective(
            CollOp::Alltoall { count, dtype },
            contribution,
            Some((buf, total)),
        )
    }

    unsafe fn ibcast(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Result<BoxedTransportRequest> {
        self.check_root(root)?;
        let bytes = count * dtype.size_in_bytes();
        let is_root = self.rank == root;
        let contribution = if is_root {
            unsafe { read_bytes(buf, bytes) }
        } else {
            Vec::new()
        };
        let out = if is_root { None } else { Some((buf, bytes)) };
        self.issue_collective(CollOp::Bcast { count, dtype, root }, contribution, out)
    }

    unsafe fn igather(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Result<BoxedTransportRequest> {
        self.check_root(root)?;
        let blk = count * dtype.size_in_bytes();
        let (contribution, out) = if self.rank == root {
            // The root's contribution is already in its slot; take it from
            // there so the slot is never written twice.
            let c = unsafe { read_bytes(buf + (self.rank as usize * blk) as u64, blk) };
            (c, Some((buf, blk * self.fabric.size as usize)))
        } else {
            (unsafe { read_bytes(buf, blk) }, None)
        };
        self.issue_collective(CollOp::Gather { count, dtype, root }, contribution, out)
    }

    unsafe fn ireduce(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        op: ReduceOp,
        root: Rank,
    ) -> Result<BoxedTransportRequest> {
        self.check_root(root)?;
        let bytes = count * dtype.size_in_bytes();
        let contribution = unsafe { read_bytes(buf, bytes) };
        let out = if self.rank == root {
            Some((buf, bytes))
        } else {
            None
        };
        self.issue_collective(
            CollOp::Reduce {
                count,
                dtype,
                op,
                root,
            },
            contribution,
            out,
        )
    }

    unsafe fn ireduce_scatter(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Result<BoxedTransportRequest> {
        let blk = count * dtype.size_in_bytes();
        let total = blk * self.fabric.size as usize;
        let contribution = unsafe { read_bytes(buf, total) };
        self.issue_collective(
            CollOp::ReduceScatter { count, dtype, op },
            contribution,
            Some((buf, blk)),
        )
    }

    unsafe fn iscatter(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Result<BoxedTransportRequest> {
        self.check_root(root)?;
        let blk = count * dtype.size_in_bytes();
        let (contribution, out) = if self.rank == root {
            let c = unsafe { read_bytes(buf, blk * self.fabric.size as usize) };
            // The root's own block stays in place.
            (c, None)
        } else {
            (Vec::new(), Some((buf, blk)))
        };
        self.issue_collective(CollOp::Scatter { count, dtype, root }, contribution, out)
    }

    unsafe fn isend(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        dst: Rank,
    ) -> Result<BoxedTransportRequest> {
        self.check_root(dst)?;
        let bytes = unsafe { read_bytes(buf, count * dtype.size_in_bytes()) };
        let seq = {
            let mut seqs = lock(&self.send_seq);
            let s = seqs.entry(dst).or_insert(0);
            let v = *s;
            *s += 1;
            v
        };
        let key = (self.comm_id, self.rank, dst, seq);
        let slot = {
            let mut p2p = lock(&self.fabric.p2p);
            Arc::clone(p2p.entry(key).or_insert_with(P2pSlot::new))
        };
        *lock(&slot.data) = Some(bytes);
        slot.ready.store(true, Ordering::Release);
        Ok(Box::new(ImmediateRequest))
    }

    unsafe fn irecv(
        &self,
        buf: u64,
        count: usize,
        dtype: DataType,
        src: Rank,
    ) -> Result<BoxedTransportRequest> {
        self.check_root(src)?;
        let seq = {
            let mut seqs = lock(&self.recv_seq);
            let s = seqs.entry(src).or_insert(0);
            let v = *s;
            *s += 1;
            v
        };
        let key = (self.comm_id, src, self.rank, seq);
        let slot = {
            let mut p2p = lock(&self.fabric.p2p);
            Arc::clone(p2p.entry(key).or_insert_with(P2pSlot::new))
        };
        Ok(Box::new(LocalRecvRequest {
            slot,
            fabric: Arc::clone(&self.fabric),
            key,
            out_ptr: buf,
            out_len: count * dtype.size_in_bytes(),
            done: false,
        }))
    }

    fn ibarrier(&self) -> Result<BoxedTransportRequest> {
        self.issue_collective(CollOp::Barrier, Vec::new(), None)
    }
}

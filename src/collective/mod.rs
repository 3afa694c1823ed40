//! Per-operation collective states and the phase machine that drives them.
//!
//! The base machine ([`state::CollectiveState`]) owns the device events, the
//! sync flag, and the transport requests; each operation supplies its
//! staging copies and its transport call through the [`state::CollectiveOp`]
//! interface, plus a tag identifying where its user-visible event is
//! recorded.

mod allgather;
mod allreduce;
mod alltoall;
mod barrier;
mod broadcast;
mod gather;
mod pt2pt;
mod reduce;
mod reduce_scatter;
mod scatter;
mod state;

pub(crate) use allgather::AllgatherState;
pub(crate) use allreduce::AllreduceState;
pub(crate) use alltoall::AlltoallState;
pub(crate) use barrier::BarrierState;
pub(crate) use broadcast::BcastState;
pub(crate) use gather::GatherState;
pub(crate) use pt2pt::{RecvState, SendRecvState, SendState};
pub(crate) use reduce::ReduceState;
pub(crate) use reduce_scatter::ReduceScatterState;
pub(crate) use scatter::ScatterState;
pub(crate) use state::{CollectiveOp, CollectiveState, ErrorCell, SignalVariant};

use std::sync::Arc;

use crate::error::Result;
use crate::transport::{BoxedTransportRequest, TransportComm};

use super::state::{CollectiveOp, SignalVariant};

/// Host-transfer barrier: nothing to stage, the stream just waits for the
/// transport's barrier to finish.
pub(crate) struct BarrierState {
    comm: Arc<dyn TransportComm>,
}

impl BarrierState {
    pub(crate) fn new(comm: Arc<dyn TransportComm>) -> Self {
        Self { comm }
    }
}

impl CollectiveOp for BarrierState {
    fn name(&self) -> &'static str {
        "barrier"
    }

    fn variant(&self) -> SignalVariant {
        SignalVariant::SignalAtStart
    }

    fn start_transport(&mut self) -> Result<Vec<BoxedTransportRequest>> {
        Ok(vec![self.comm.ibarrier()?])
    }
}

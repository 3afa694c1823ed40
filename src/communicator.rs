use std::sync::Arc;

use crate::device::DeviceStream;
use crate::transport::TransportComm;
use crate::types::Rank;

/// A transport communicator paired with the device stream on which the user
/// sequences its collectives.
///
/// Collectives on one communicator must be issued in the same order on
/// every rank; within a single stream they are serialized by construction.
pub struct Communicator {
    transport: Arc<dyn TransportComm>,
    stream: DeviceStream,
}

impl Communicator {
    pub fn new(transport: Arc<dyn TransportComm>, stream: DeviceStream) -> Self {
        Self { transport, stream }
    }

    pub fn rank(&self) -> Rank {
        self.transport.rank()
    }

    pub fn size(&self) -> u32 {
        self.transport.size()
    }

    /// The device stream associated with this communicator.
    pub fn stream(&self) -> &DeviceStream {
        &self.stream
    }

    pub(crate) fn transport(&self) -> &Arc<dyn TransportComm> {
        &self.transport
    }
}

pub mod backend;
mod collective;
pub mod communicator;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod memory;
mod progress;
pub mod request;
pub mod transport;
pub mod types;

pub use backend::{AllreduceAlgorithm, Backend, CollectiveAlgorithm};
pub use communicator::Communicator;
pub use config::GantryConfig;
pub use context::Context;
pub use device::{
    DeviceBuffer, DeviceEvent, DeviceStream, EventPool, StreamPriority, SyncFlag, SyncFlagPool,
};
pub use error::{GantryError, Result};
pub use memory::{PinnedBuf, PinnedPool};
pub use request::Request;
pub use transport::{
    BoxedTransportRequest, LocalComm, LocalFabric, TransportComm, TransportRequest,
};
pub use types::{DataType, Element, Rank, ReduceOp};

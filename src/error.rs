use crate::types::{DataType, Rank};

pub type Result<T> = std::result::Result<T, GantryError>;

#[derive(Debug, thiserror::Error)]
pub enum GantryError {
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{operation}: invalid algorithm \"{algorithm}\"")]
    InvalidAlgorithm {
        operation: &'static str,
        algorithm: String,
    },

    #[error("unsupported data type {dtype} for {operation}")]
    UnsupportedDType {
        dtype: DataType,
        operation: &'static str,
    },

    #[error("invalid rank {rank}: communicator size is {size}")]
    InvalidRank { rank: Rank, size: u32 },

    #[error("collective mismatch on communicator {comm} at sequence {seq}: ranks disagree on the operation")]
    CollectiveMismatch { comm: u64, seq: u64 },

    #[error("message size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

impl GantryError {
    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }
}

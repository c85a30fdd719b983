use thiserror::Error as ThisError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported by [`BeTreeMap`](crate::BeTreeMap) and [`Config`](crate::Config).
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum Error {
    /// No live value resolves for the queried key (never inserted, or deleted).
    #[error("key does not exist")]
    KeyNotFound,

    #[error("max_node_size must be at least {min}, got {max_node_size}", min = crate::config::MIN_MAX_NODE_SIZE)]
    InvalidMaxNodeSize { max_node_size: usize },

    #[error("min_flush_size ({min_flush_size}) must not exceed a quarter of max_node_size ({max_node_size})")]
    InvalidMinFlushSize { min_flush_size: usize, max_node_size: usize },

    #[error("min_node_size ({min_node_size}) must be smaller than max_node_size ({max_node_size})")]
    InvalidMinNodeSize { min_node_size: usize, max_node_size: usize },
}

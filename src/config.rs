use crate::error::{Error, Result};

/// Default message-count threshold that triggers a node split.
pub const DEFAULT_MAX_NODE_SIZE: usize = 1 << 18;

/// Smallest accepted `max_node_size`.
///
/// Splits partition an overfull node into chunks of roughly `10 * max_node_size / 24`
/// entries; below this size the chunks no longer leave the new parent under the bound.
pub const MIN_MAX_NODE_SIZE: usize = 8;

/// Tuning parameters of a [`BeTreeMap`](crate::BeTreeMap).
///
/// All sizes are measured in node entries: buffered messages plus pivots.
///
/// # Examples
///
/// ```
/// use betree_map::{BeTreeMap, Config};
///
/// let config = Config::new(64).with_min_flush_size(16);
/// assert_eq!(config.min_node_size(), 16);
///
/// let mut map = BeTreeMap::with_config(config).unwrap();
/// map.insert(1, 10);
/// assert_eq!(map.get(&1), Some(10));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Config {
    max_node_size: usize,
    min_node_size: usize,
    min_flush_size: usize,
}

impl Config {
    /// Creates a configuration for the given split threshold.
    ///
    /// `min_node_size` defaults to a quarter and `min_flush_size` to a sixteenth of
    /// `max_node_size`.
    #[must_use]
    pub const fn new(max_node_size: usize) -> Self {
        Self {
            max_node_size,
            min_node_size: max_node_size / 4,
            min_flush_size: max_node_size / 16,
        }
    }

    /// Sets the size below which a child is considered for merging by
    /// [`BeTreeMap::compact`](crate::BeTreeMap::compact).
    #[must_use]
    pub const fn with_min_node_size(mut self, min_node_size: usize) -> Self {
        self.min_node_size = min_node_size;
        self
    }

    /// Sets the number of buffered messages a child must exceed before they are
    /// flushed down to it.
    #[must_use]
    pub const fn with_min_flush_size(mut self, min_flush_size: usize) -> Self {
        self.min_flush_size = min_flush_size;
        self
    }

    #[must_use]
    pub const fn max_node_size(&self) -> usize {
        self.max_node_size
    }

    #[must_use]
    pub const fn min_node_size(&self) -> usize {
        self.min_node_size
    }

    #[must_use]
    pub const fn min_flush_size(&self) -> usize {
        self.min_flush_size
    }

    /// Checks that the parameters keep every node below `max_node_size` after a split.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint:
    /// - [`Error::InvalidMaxNodeSize`] if `max_node_size < MIN_MAX_NODE_SIZE`;
    /// - [`Error::InvalidMinFlushSize`] if `min_flush_size > max_node_size / 4`;
    /// - [`Error::InvalidMinNodeSize`] if `min_node_size >= max_node_size`.
    pub const fn validate(&self) -> Result<()> {
        if self.max_node_size < MIN_MAX_NODE_SIZE {
            return Err(Error::InvalidMaxNodeSize {
                max_node_size: self.max_node_size,
            });
        }
        if self.min_flush_size > self.max_node_size / 4 {
            return Err(Error::InvalidMinFlushSize {
                min_flush_size: self.min_flush_size,
                max_node_size: self.max_node_size,
            });
        }
        if self.min_node_size >= self.max_node_size {
            return Err(Error::InvalidMinNodeSize {
                min_node_size: self.min_node_size,
                max_node_size: self.max_node_size,
            });
        }
        Ok(())
    }

    /// Target entries per node produced by a split (about 0.4167 of `max_node_size`).
    pub(crate) const fn split_chunk(&self) -> usize {
        10 * self.max_node_size / 24
    }

    /// Largest combined size of children coalesced into one by a merge.
    pub(crate) const fn merge_limit(&self) -> usize {
        6 * self.max_node_size / 10
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(DEFAULT_MAX_NODE_SIZE)
    }
}

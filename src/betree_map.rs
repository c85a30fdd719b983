use core::fmt;
use core::mem;
use core::ops::{Add, Bound, RangeBounds};

use log::debug;

use crate::config::{Config, DEFAULT_MAX_NODE_SIZE};
use crate::error::Result;
use crate::message::Message;
use crate::raw::{Buffer, Node};

mod iter;

pub use iter::{Iter, Messages};

/// Validates that the start bound does not exceed the end bound.
///
/// # Panics
///
/// Panics if `start > end` or if `start == end` and both bounds are `Excluded`.
fn validate_range_bounds<T, R>(range: &R)
where
    T: ?Sized + Ord,
    R: RangeBounds<T>,
{
    if let (Bound::Included(start) | Bound::Excluded(start), Bound::Included(end) | Bound::Excluded(end)) =
        (range.start_bound(), range.end_bound())
    {
        let valid =
            if matches!(range.start_bound(), Bound::Excluded(_)) && matches!(range.end_bound(), Bound::Excluded(_)) {
                start < end
            } else {
                start <= end
            };
        assert!(valid, "range start is greater than range end in BeTreeMap");
    }
}

/// An ordered map based on a [Bε-tree].
///
/// A Bε-tree is a B-tree whose internal nodes carry a buffer of pending *messages*
/// (insert, delete, update). Writes are recorded at the root and only pushed toward the
/// leaves in large batches, when a buffer fills up and one child has accumulated enough
/// messages to be worth the trip. Structural changes (splits) happen rarely and in bulk,
/// which makes writes asymptotically cheaper than in a classic B-tree while point queries
/// and ordered scans keep their usual semantics.
///
/// Because a write never looks at the existing value, the mutating operations
/// ([`insert`], [`update`], [`erase`]) return nothing. Reads resolve the messages found
/// along the way: the shallowest message for a key is the newest one.
///
/// Keys must implement [`Ord`] + [`Clone`]. Values must implement [`Clone`], [`Default`]
/// and [`Add`]; an [`update`] adds its delta to the current value, or to `V::default()`
/// when the key is absent. `Add` should be associative, since pending deltas for the same
/// key are combined before they reach the value.
///
/// # Examples
///
/// ```
/// use betree_map::BeTreeMap;
///
/// let mut stock = BeTreeMap::new();
/// stock.insert("apples", 3);
/// stock.insert("pears", 7);
///
/// // Deltas are added to the current value.
/// stock.update("apples", 2);
/// assert_eq!(stock.get(&"apples"), Some(5));
///
/// // Updating an absent key starts from `Default::default()`.
/// stock.update("plums", 4);
/// assert_eq!(stock.get(&"plums"), Some(4));
///
/// stock.erase("pears");
/// assert!(!stock.contains_key(&"pears"));
///
/// let entries: Vec<_> = stock.iter().collect();
/// assert_eq!(entries, [("apples", 5), ("plums", 4)]);
/// ```
///
/// Small nodes force the tree to grow, which is handy for experiments:
///
/// ```
/// use betree_map::{BeTreeMap, Config};
///
/// let mut map = BeTreeMap::with_config(Config::new(8).with_min_flush_size(2)).unwrap();
/// for key in 0..100 {
///     map.insert(key, key * 10);
/// }
/// assert!(map.depth() > 1);
/// assert_eq!(map.get(&42), Some(420));
/// ```
///
/// [Bε-tree]: https://en.wikipedia.org/wiki/B%CE%B5-tree
/// [`insert`]: BeTreeMap::insert
/// [`update`]: BeTreeMap::update
/// [`erase`]: BeTreeMap::erase
#[derive(Clone)]
pub struct BeTreeMap<K, V> {
    config: Config,
    root: Node<K, V>,
}

impl<K, V> BeTreeMap<K, V> {
    /// Makes a new, empty `BeTreeMap` with the default [`Config`].
    ///
    /// Does not allocate anything on its own.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::BeTreeMap;
    ///
    /// let mut map = BeTreeMap::new();
    /// map.insert(1, 1);
    /// ```
    #[must_use]
    pub const fn new() -> Self {
        Self {
            config: Config::new(DEFAULT_MAX_NODE_SIZE),
            root: Node::new(),
        }
    }

    /// Makes a new, empty `BeTreeMap` with the given tuning parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails [`Config::validate`].
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::{BeTreeMap, Config, Error};
    ///
    /// let map = BeTreeMap::<u32, u32>::with_config(Config::new(64));
    /// assert!(map.is_ok());
    ///
    /// let map = BeTreeMap::<u32, u32>::with_config(Config::new(4));
    /// assert_eq!(map.err(), Some(Error::InvalidMaxNodeSize { max_node_size: 4 }));
    /// ```
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            root: Node::new(),
        })
    }

    /// Returns the tuning parameters of this map.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the number of levels in the tree; a map whose root is a leaf has depth 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::BeTreeMap;
    ///
    /// let mut map = BeTreeMap::new();
    /// map.insert(1, 1);
    /// assert_eq!(map.depth(), 1);
    /// ```
    #[must_use]
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Clears the map, removing all entries. The configuration is kept.
    pub fn clear(&mut self) {
        self.root = Node::new();
    }
}

impl<K, V> BeTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
    /// Inserts a key-value pair, replacing any previous value for the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::BeTreeMap;
    ///
    /// let mut map = BeTreeMap::new();
    /// map.insert(37, 1);
    /// map.insert(37, 2);
    /// assert_eq!(map.get(&37), Some(2));
    /// ```
    ///
    /// # Complexity
    ///
    /// O(1) amortized node visits per buffer level; messages reach the leaves in batches.
    pub fn insert(&mut self, key: K, value: V) {
        self.upsert(key, Message::Insert(value));
    }

    /// Adds `delta` to the value of `key`, treating an absent key as `V::default()`.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::BeTreeMap;
    ///
    /// let mut counters = BeTreeMap::new();
    /// counters.update("hits", 1);
    /// counters.update("hits", 1);
    /// assert_eq!(counters.get(&"hits"), Some(2));
    /// ```
    pub fn update(&mut self, key: K, delta: V) {
        self.upsert(key, Message::Update(delta));
    }

    /// Removes `key` from the map. Erasing an absent key is not an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::BeTreeMap;
    ///
    /// let mut map = BeTreeMap::new();
    /// map.insert(1, 10);
    /// map.erase(1);
    /// assert_eq!(map.get(&1), None);
    /// ```
    pub fn erase(&mut self, key: K) {
        self.upsert(key, Message::Delete);
    }

    // Flushes a single message into the root, growing the tree by one level on a root split.
    fn upsert(&mut self, key: K, message: Message<V>) {
        let batch = Buffer::from([(key, message)]);
        if let Some(split) = self.root.flush(&self.config, batch) {
            let width = split.len();
            self.root = Node::from_pivots(split);
            debug!("root split into {width} nodes, depth now {}", self.root.depth());
        }
    }

    /// Returns the live value of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`](crate::Error::KeyNotFound) if the key was never inserted or has been erased.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::{BeTreeMap, Error};
    ///
    /// let mut map = BeTreeMap::new();
    /// map.insert(3, 30);
    /// assert_eq!(map.query(&3), Ok(30));
    ///
    /// map.erase(3);
    /// assert_eq!(map.query(&3), Err(Error::KeyNotFound));
    /// ```
    ///
    /// # Complexity
    ///
    /// One root-to-leaf path; stops early at the first buffered insert or delete for `key`.
    pub fn query(&self, key: &K) -> Result<V> {
        self.root.query(key)
    }

    /// Returns the live value of `key`, or `None` if it is absent.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.query(key).ok()
    }

    /// Returns `true` if the map holds a live value for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns `true` if the map has no live entries.
    ///
    /// Tombstones still buffered in the tree do not count as entries.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::BeTreeMap;
    ///
    /// let mut map = BeTreeMap::new();
    /// assert!(map.is_empty());
    /// map.insert(1, 1);
    /// map.erase(1);
    /// assert!(map.is_empty());
    /// ```
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.begin().peek().is_none()
    }

    /// Gets an iterator over the live entries of the map, sorted by key.
    ///
    /// Same as [`begin`](BeTreeMap::begin).
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.begin()
    }

    /// Returns a cursor positioned at the smallest live key.
    pub fn begin(&self) -> Iter<'_, K, V> {
        Iter::new(&self.root, Bound::Unbounded, Bound::Unbounded)
    }

    /// Returns a cursor positioned at the first live key greater than or equal to `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::BeTreeMap;
    ///
    /// let map = BeTreeMap::from([(1, 10), (5, 50), (9, 90)]);
    /// let mut cursor = map.lower_bound(&4);
    /// assert_eq!(cursor.next(), Some((5, 50)));
    /// assert_eq!(cursor.next(), Some((9, 90)));
    /// assert_eq!(cursor.next(), None);
    /// ```
    pub fn lower_bound(&self, key: &K) -> Iter<'_, K, V> {
        Iter::new(&self.root, Bound::Included(key), Bound::Unbounded)
    }

    /// Returns the exhausted cursor every finished scan compares equal to.
    pub fn end(&self) -> Iter<'_, K, V> {
        Iter::exhausted(&self.root)
    }

    /// Constructs an iterator over the live entries whose keys fall in `range`.
    ///
    /// # Panics
    ///
    /// Panics if range `start > end`, or if range `start == end` and both bounds are
    /// `Excluded`.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::BeTreeMap;
    ///
    /// let map: BeTreeMap<i32, i32> = (0..10).map(|k| (k, k * k)).collect();
    /// let squares: Vec<_> = map.range(3..6).map(|(_, v)| v).collect();
    /// assert_eq!(squares, [9, 16, 25]);
    /// ```
    pub fn range<R>(&self, range: R) -> Iter<'_, K, V>
    where
        R: RangeBounds<K>,
    {
        validate_range_bounds(&range);
        Iter::new(&self.root, range.start_bound(), range.end_bound().cloned())
    }

    /// Gets an iterator over the raw pending messages of the tree, one per key, in key
    /// order. Useful for inspecting what is still buffered.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::{BeTreeMap, Message};
    ///
    /// let mut map = BeTreeMap::new();
    /// map.insert(1, 10);
    /// map.update(2, 5);
    /// let messages: Vec<_> = map.messages().collect();
    /// assert_eq!(messages, [(1, Message::Insert(10)), (2, Message::Insert(5))]);
    /// ```
    pub fn messages(&self) -> Messages<'_, K, V> {
        Messages::new(&self.root)
    }

    /// Coalesces undersized nodes and returns the number of merged nodes created.
    ///
    /// Every internal node with a child smaller than [`Config::min_node_size`] merges
    /// runs of consecutive children whose combined size stays within 60% of
    /// [`Config::max_node_size`]. A root left with a single child is then replaced by
    /// that child, so the tree can lose levels. Nothing calls this automatically.
    ///
    /// # Examples
    ///
    /// ```
    /// use betree_map::{BeTreeMap, Config};
    ///
    /// let mut map = BeTreeMap::with_config(Config::new(8).with_min_flush_size(2)).unwrap();
    /// for key in 0..200 {
    ///     map.insert(key, key);
    /// }
    /// for key in 0..195 {
    ///     map.erase(key);
    /// }
    /// let depth = map.depth();
    /// map.compact();
    /// assert!(map.depth() <= depth);
    /// assert_eq!(map.iter().count(), 5);
    /// ```
    pub fn compact(&mut self) -> usize {
        let merges = self.root.compact(&self.config);
        let depth = self.root.depth();
        self.root = mem::take(&mut self.root).collapse(&self.config);
        debug!("compaction merged {merges} nodes, depth {depth} -> {}", self.root.depth());
        merges
    }
}

impl<K, V> fmt::Debug for BeTreeMap<K, V>
where
    K: Ord + Clone + fmt::Debug,
    V: Clone + Default + Add<Output = V> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> Default for BeTreeMap<K, V> {
    fn default() -> Self {
        BeTreeMap::new()
    }
}

impl<K, V> PartialEq for BeTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V> + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl<K, V> FromIterator<(K, V)> for BeTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = BeTreeMap::new();
        map.extend(iter);
        map
    }
}

impl<K, V> Extend<(K, V)> for BeTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V> IntoIterator for &'a BeTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for BeTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
    fn from(arr: [(K, V); N]) -> Self {
        arr.into_iter().collect()
    }
}

use core::fmt;
use core::iter::FusedIterator;
use core::ops::{Add, Bound};
use core::ptr;

use crate::message::Message;
use crate::raw::Node;

/// A resolving cursor over the live entries of a [`BeTreeMap`](crate::BeTreeMap).
///
/// Values are buffered on several levels of the tree at once, so the cursor walks the
/// merged, ascending stream of pending messages and resolves each key into its live value,
/// skipping deleted keys. Entries are produced by value because updates are composed on
/// the fly.
///
/// This `struct` is created by the [`iter`], [`begin`], [`lower_bound`], [`range`] and
/// [`end`] methods on [`BeTreeMap`].
///
/// Two cursors compare equal when they point into the same map at the same position, so
/// a scan is finished once it equals [`end`]:
///
/// ```
/// use betree_map::BeTreeMap;
///
/// let map = BeTreeMap::from([(1, 10), (2, 20)]);
/// let mut cursor = map.begin();
/// assert_eq!(cursor.peek(), Some((&1, &10)));
/// cursor.next();
/// cursor.next();
/// assert!(cursor == map.end());
/// ```
///
/// [`iter`]: crate::BeTreeMap::iter
/// [`begin`]: crate::BeTreeMap::begin
/// [`lower_bound`]: crate::BeTreeMap::lower_bound
/// [`range`]: crate::BeTreeMap::range
/// [`end`]: crate::BeTreeMap::end
/// [`BeTreeMap`]: crate::BeTreeMap
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V> {
    root: &'a Node<K, V>,
    // Next raw message not yet resolved.
    position: Option<(K, Message<V>)>,
    // Resolved entry the cursor points at.
    current: Option<(K, V)>,
    end: Bound<K>,
}

impl<'a, K, V> Iter<'a, K, V> {
    /// A cursor that is already exhausted.
    pub(crate) fn exhausted(root: &'a Node<K, V>) -> Self {
        Self {
            root,
            position: None,
            current: None,
            end: Bound::Unbounded,
        }
    }

    /// Returns the entry the cursor points at without advancing it.
    #[must_use]
    pub fn peek(&self) -> Option<(&K, &V)> {
        self.current.as_ref().map(|(key, value)| (key, value))
    }
}

impl<'a, K, V> Iter<'a, K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
    pub(crate) fn new(root: &'a Node<K, V>, start: Bound<&K>, end: Bound<K>) -> Self {
        let mut iter = Self {
            root,
            position: root.next_message(start),
            current: None,
            end,
        };
        iter.advance();
        iter
    }

    // Moves `current` to the next live key, consuming deleted keys on the way.
    fn advance(&mut self) {
        self.current = None;
        while let Some((key, message)) = self.position.take() {
            if self.is_past_end(&key) {
                break;
            }
            self.position = self.root.next_message(Bound::Excluded(&key));
            if let Some(value) = message.resolve(None) {
                self.current = Some((key, value));
                break;
            }
        }
    }

    fn is_past_end(&self, key: &K) -> bool {
        match &self.end {
            Bound::Included(end) => key > end,
            Bound::Excluded(end) => key >= end,
            Bound::Unbounded => false,
        }
    }
}

impl<K, V> Iterator for Iter<'_, K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.current.take()?;
        self.advance();
        Some(entry)
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
}

impl<K: PartialEq, V: PartialEq> PartialEq for Iter<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.root, other.root) && self.current == other.current && self.position == other.position
    }
}

impl<K: Clone, V: Clone> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root,
            position: self.position.clone(),
            current: self.current.clone(),
            end: self.end.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("current", &self.current).finish_non_exhaustive()
    }
}

/// An iterator over the raw buffered messages of a [`BeTreeMap`](crate::BeTreeMap), in key
/// order.
///
/// Each key appears once, carrying the composition of every message pending for it
/// across the levels of the tree. Deleted keys still show up as [`Message::Delete`] until
/// their tombstone reaches a leaf.
///
/// This `struct` is created by the [`messages`](crate::BeTreeMap::messages) method.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Messages<'a, K, V> {
    root: &'a Node<K, V>,
    last: Option<K>,
}

impl<'a, K, V> Messages<'a, K, V> {
    pub(crate) fn new(root: &'a Node<K, V>) -> Self {
        Self { root, last: None }
    }
}

impl<K, V> Iterator for Messages<'_, K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
    type Item = (K, Message<V>);

    fn next(&mut self) -> Option<Self::Item> {
        let bound = self.last.as_ref().map_or(Bound::Unbounded, Bound::Excluded);
        let (key, message) = self.root.next_message(bound)?;
        self.last = Some(key.clone());
        Some((key, message))
    }
}

impl<K, V> FusedIterator for Messages<'_, K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
}

impl<K: fmt::Debug, V> fmt::Debug for Messages<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messages").field("last", &self.last).finish_non_exhaustive()
    }
}

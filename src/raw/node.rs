use alloc::collections::BTreeMap;
use alloc::collections::btree_map::Entry;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::iter;
use core::mem;
use core::ops::{Add, Bound};

use log::trace;
use smallvec::SmallVec;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::Message;

/// Routing entries of an internal node: lower-bound key to child.
pub(crate) type Pivots<K, V> = BTreeMap<K, ChildInfo<K, V>>;
/// Pending messages of an internal node, or the materialized entries of a leaf.
pub(crate) type Buffer<K, V> = BTreeMap<K, Message<V>>;
/// Pivots produced by a split, in ascending key order.
pub(crate) type SplitPivots<K, V> = SmallVec<[(K, ChildInfo<K, V>); 4]>;

/// An owned child plus its cached size (pivots + elements).
///
/// The cached size is refreshed whenever the parent flushes into the child, so the
/// parent can make flush and merge decisions without walking the subtree.
#[derive(Clone)]
pub(crate) struct ChildInfo<K, V> {
    child: Node<K, V>,
    size: usize,
}

impl<K, V> ChildInfo<K, V> {
    pub(crate) fn new(child: Node<K, V>) -> Self {
        let size = child.size();
        Self { child, size }
    }

    fn refresh_size(&mut self) {
        self.size = self.child.size();
    }
}

// Bε-tree node: a leaf iff `pivots` is empty.
#[derive(Clone)]
pub(crate) struct Node<K, V> {
    pivots: Pivots<K, V>,
    elements: Buffer<K, V>,
}

impl<K, V> Default for Node<K, V> {
    fn default() -> Self {
        Node::new()
    }
}

impl<K, V> Node<K, V> {
    /// Creates a new empty leaf.
    pub(crate) const fn new() -> Self {
        Self {
            pivots: BTreeMap::new(),
            elements: BTreeMap::new(),
        }
    }

    /// Creates an internal node routing to the children of a split.
    pub(crate) fn from_pivots(split: SplitPivots<K, V>) -> Self
    where
        K: Ord,
    {
        Self {
            pivots: split.into_iter().collect(),
            elements: BTreeMap::new(),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.pivots.is_empty()
    }

    /// Number of entries held directly by this node.
    pub(crate) fn size(&self) -> usize {
        self.pivots.len() + self.elements.len()
    }

    /// Number of levels from this node down to its leaves.
    pub(crate) fn depth(&self) -> usize {
        match self.pivots.values().next() {
            Some(info) => 1 + info.child.depth(),
            None => 1,
        }
    }
}

impl<K, V> Node<K, V>
where
    K: Ord + Clone,
    V: Clone + Default + Add<Output = V>,
{
    /// Merges a single message into this node's buffer.
    ///
    /// Leaves materialize the result: deletes remove the entry and updates become inserts.
    /// Internal nodes keep the composed message until it is flushed down.
    pub(crate) fn apply(&mut self, key: K, message: Message<V>) {
        let leaf = self.is_leaf();
        match self.elements.entry(key) {
            Entry::Occupied(mut slot) => {
                if leaf && matches!(message, Message::Delete) {
                    slot.remove();
                } else {
                    let older = mem::replace(slot.get_mut(), Message::Delete);
                    *slot.get_mut() = older.then(message);
                }
            }
            Entry::Vacant(slot) => match message {
                Message::Delete if leaf => {}
                Message::Update(delta) if leaf => {
                    slot.insert(Message::Insert(V::default() + delta));
                }
                message => {
                    slot.insert(message);
                }
            },
        }
    }

    /// Pushes a batch of messages into this node.
    ///
    /// Returns the replacement pivots if the node had to split; the node is left empty
    /// in that case and the caller must swap in the returned children.
    pub(crate) fn flush(&mut self, config: &Config, batch: Buffer<K, V>) -> Option<SplitPivots<K, V>> {
        let smallest = batch.keys().next()?;
        trace!("flushing {} messages into a node of size {}", batch.len(), self.size());

        if !self.is_leaf() {
            self.lower_first_pivot(smallest);
        }
        for (key, message) in batch {
            self.apply(key, message);
        }
        if !self.is_leaf() {
            self.flush_max_message_set(config);
        }

        (self.size() >= config.max_node_size()).then(|| self.split(config))
    }

    // The leftmost pivot must stay a lower bound for everything routed through it.
    fn lower_first_pivot(&mut self, key: &K) {
        if let Some(first) = self.pivots.first_entry() {
            if key < first.key() {
                let (_, info) = first.remove_entry();
                self.pivots.insert(key.clone(), info);
            }
        }
    }

    /// Flushes the fullest child until this node fits or no child has enough messages.
    fn flush_max_message_set(&mut self, config: &Config) {
        while self.size() >= config.max_node_size() {
            let Some((pivot, next, count)) = self.fullest_child() else {
                break;
            };
            if count <= config.min_flush_size() {
                trace!("fullest child holds only {count} messages, leaving node to split");
                break;
            }

            let batch = self.take_buffered(&pivot, next.as_ref());
            let info = self
                .pivots
                .get_mut(&pivot)
                .expect("`Node::flush_max_message_set()` - selected pivot is missing!");
            match info.child.flush(config, batch) {
                Some(split) => self.replace_pivot(pivot, split),
                None => info.refresh_size(),
            }
        }
    }

    /// Returns the pivot whose range holds the most buffered messages, the following
    /// pivot (if any) and the message count. Ties go to the leftmost pivot.
    fn fullest_child(&self) -> Option<(K, Option<K>, usize)> {
        let mut fullest: Option<(&K, Option<&K>, usize)> = None;
        let mut keys = self.pivots.keys().peekable();
        while let Some(pivot) = keys.next() {
            let next = keys.peek().copied();
            let count = self.elements.range::<K, _>(self.buffered_range(pivot, next)).count();
            if fullest.is_none_or(|(_, _, max)| count > max) {
                fullest = Some((pivot, next, count));
            }
        }
        fullest.map(|(pivot, next, count)| (pivot.clone(), next.cloned(), count))
    }

    // Keys below the first pivot route to the leftmost child.
    fn buffered_range<'a>(&self, pivot: &'a K, next: Option<&'a K>) -> (Bound<&'a K>, Bound<&'a K>) {
        let lower = if self.pivots.first_key_value().is_some_and(|(first, _)| first == pivot) {
            Bound::Unbounded
        } else {
            Bound::Included(pivot)
        };
        (lower, next.map_or(Bound::Unbounded, Bound::Excluded))
    }

    /// Removes and returns the buffered messages routed to `pivot`.
    fn take_buffered(&mut self, pivot: &K, next: Option<&K>) -> Buffer<K, V> {
        let leftmost = self.pivots.first_key_value().is_some_and(|(first, _)| first == pivot);
        let mut taken = if leftmost {
            mem::take(&mut self.elements)
        } else {
            self.elements.split_off(pivot)
        };
        if let Some(next) = next {
            let mut rest = taken.split_off(next);
            self.elements.append(&mut rest);
        }
        taken
    }

    /// Replaces the entry for a split child with its replacement pivots. The first
    /// replacement keeps the old pivot key so routing for the range is unchanged.
    fn replace_pivot(&mut self, pivot: K, split: SplitPivots<K, V>) {
        trace!("child split into {} nodes", split.len());
        let mut split = split.into_iter();
        if let Some((_, first)) = split.next() {
            self.pivots.insert(pivot, first);
        }
        self.pivots.extend(split);
    }

    /// Partitions this overfull node into fresh children of 40%-60% of `max_node_size`
    /// and returns them keyed by their first key. The node is left empty.
    pub(crate) fn split(&mut self, config: &Config) -> SplitPivots<K, V> {
        let total = self.size();
        assert!(
            total >= config.max_node_size(),
            "`Node::split()` - node of size {total} is not overfull!"
        );
        let partitions = (total / config.split_chunk()).max(1);
        let per_partition = total.div_ceil(partitions);

        let mut pivots = mem::take(&mut self.pivots).into_iter().peekable();
        let mut elements = mem::take(&mut self.elements).into_iter().peekable();
        let mut result = SplitPivots::new();
        let mut moved = 0;

        for partition in 1..=partitions {
            let first_key = match (pivots.peek(), elements.peek()) {
                (Some((key, _)), _) | (None, Some((key, _))) => key.clone(),
                (None, None) => break,
            };
            let mut node = Node::new();
            while moved < partition * per_partition {
                if let Some((pivot, child)) = pivots.next() {
                    node.pivots.insert(pivot, child);
                    moved += 1;
                    // A pivot takes every buffered message destined for its child.
                    let next = pivots.peek().map(|(next, _)| next.clone());
                    while let Some((key, message)) =
                        elements.next_if(|(key, _)| next.as_ref().is_none_or(|next| key < next))
                    {
                        node.elements.insert(key, message);
                        moved += 1;
                    }
                } else if let Some((key, message)) = elements.next() {
                    node.elements.insert(key, message);
                    moved += 1;
                } else {
                    break;
                }
            }
            result.push((first_key, ChildInfo::new(node)));
        }

        assert!(
            pivots.next().is_none() && elements.next().is_none(),
            "`Node::split()` - entries left over after partitioning!"
        );
        trace!("split {total} entries into {} nodes", result.len());
        result
    }

    /// Combines sibling children into one node holding the union of their pivots and
    /// elements. The absorbed children are left empty.
    fn merge(children: impl IntoIterator<Item = ChildInfo<K, V>>) -> Node<K, V> {
        let mut merged = Node::new();
        let mut leaves = None;
        for mut info in children {
            let leaf = info.child.is_leaf();
            assert!(
                *leaves.get_or_insert(leaf) == leaf,
                "`Node::merge()` - cannot merge leaves with internal nodes!"
            );
            merged.pivots.append(&mut info.child.pivots);
            merged.elements.append(&mut info.child.elements);
        }
        merged
    }

    /// Coalesces runs of consecutive children whose combined cached size stays within
    /// 60% of `max_node_size`. Returns the number of merged nodes created.
    pub(crate) fn merge_small_children(&mut self, config: &Config) -> usize {
        if self.is_leaf() {
            return 0;
        }

        let limit = config.merge_limit();
        let mut merged = Pivots::new();
        let mut merges = 0;
        let mut run = Vec::new();
        let mut run_size = 0;
        for (pivot, info) in mem::take(&mut self.pivots) {
            if !run.is_empty() && run_size + info.size > limit {
                merges += usize::from(Self::close_run(&mut merged, &mut run));
                run_size = 0;
            }
            run_size += info.size;
            run.push((pivot, info));
        }
        merges += usize::from(Self::close_run(&mut merged, &mut run));

        trace!("merged small children into {merges} nodes, {} pivots remain", merged.len());
        self.pivots = merged;
        merges
    }

    fn close_run(pivots: &mut Pivots<K, V>, run: &mut Vec<(K, ChildInfo<K, V>)>) -> bool {
        let mut children = run.drain(..);
        let Some((pivot, first)) = children.next() else {
            return false;
        };
        if children.len() == 0 {
            pivots.insert(pivot, first);
            return false;
        }
        let merged = Self::merge(iter::once(first).chain(children.map(|(_, info)| info)));
        pivots.insert(pivot, ChildInfo::new(merged));
        true
    }

    /// Merges small children throughout this subtree, bottom-up.
    pub(crate) fn compact(&mut self, config: &Config) -> usize {
        if self.is_leaf() {
            return 0;
        }

        let mut merges = 0;
        for info in self.pivots.values_mut() {
            merges += info.child.compact(config);
            info.refresh_size();
        }
        if self.pivots.values().any(|info| info.size < config.min_node_size()) {
            merges += self.merge_small_children(config);
        }
        merges
    }

    /// Replaces a root with a single child by that child, pushing the root's buffer into it.
    pub(crate) fn collapse(mut self, config: &Config) -> Node<K, V> {
        while self.pivots.len() == 1 {
            let Some((_, info)) = self.pivots.pop_first() else {
                break;
            };
            let mut child = info.child;
            let buffer = mem::take(&mut self.elements);
            match child.flush(config, buffer) {
                Some(split) => return Node::from_pivots(split),
                None => self = child,
            }
        }
        self
    }

    /// Returns the child whose range covers `key`: the floor pivot, or the leftmost child
    /// for keys below every pivot.
    pub(crate) fn pivot(&self, key: &K) -> &ChildInfo<K, V> {
        self.pivots
            .range::<K, _>(..=key)
            .next_back()
            .or_else(|| self.pivots.first_key_value())
            .map(|(_, info)| info)
            .expect("`Node::pivot()` - node has no pivots!")
    }

    /// Resolves the live value of `key` along the single root-to-leaf path.
    pub(crate) fn query(&self, key: &K) -> Result<V> {
        if self.is_leaf() {
            return match self.elements.get(key) {
                Some(Message::Insert(value)) => Ok(value.clone()),
                Some(_) => panic!("`Node::query()` - leaf holds a non-insert message!"),
                None => Err(Error::KeyNotFound),
            };
        }

        match self.elements.get(key) {
            None => self.pivot(key).child.query(key),
            Some(Message::Insert(value)) => Ok(value.clone()),
            Some(Message::Delete) => Err(Error::KeyNotFound),
            Some(Message::Update(delta)) => {
                let base = match self.pivot(key).child.query(key) {
                    Ok(value) => value,
                    Err(Error::KeyNotFound) => V::default(),
                    Err(error) => return Err(error),
                };
                Ok(base + delta.clone())
            }
        }
    }

    /// Returns the smallest key past `bound` together with its message, with messages
    /// for the same key on different levels composed so the shallower (newer) wins.
    pub(crate) fn next_message(&self, bound: Bound<&K>) -> Option<(K, Message<V>)> {
        let own = self.elements.range::<K, _>((bound, Bound::Unbounded)).next();
        if self.is_leaf() {
            return own.map(|(key, message)| (key.clone(), message.clone()));
        }

        match (own, self.next_message_from_children(bound)) {
            (Some((key, message)), Some((kid_key, kid_message))) => match kid_key.cmp(key) {
                Ordering::Less => Some((kid_key, kid_message)),
                Ordering::Equal => Some((kid_key, kid_message.then(message.clone()))),
                Ordering::Greater => Some((key.clone(), message.clone())),
            },
            (Some((key, message)), None) => Some((key.clone(), message.clone())),
            (None, kids) => kids,
        }
    }

    fn next_message_from_children(&self, bound: Bound<&K>) -> Option<(K, Message<V>)> {
        let start = match bound {
            Bound::Included(key) | Bound::Excluded(key) => {
                self.pivots.range::<K, _>(..=key).next_back().map(|(pivot, _)| pivot)
            }
            Bound::Unbounded => None,
        };
        self.pivots
            .range::<K, _>((start.map_or(Bound::Unbounded, Bound::Included), Bound::Unbounded))
            .find_map(|(_, info)| info.child.next_message(bound))
    }
}

#[cfg(test)]
impl<K, V> ChildInfo<K, V> {
    pub(crate) fn child(&self) -> &Node<K, V> {
        &self.child
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
impl<K: Ord + Clone + core::fmt::Debug, V> Node<K, V> {
    pub(crate) fn pivots(&self) -> &Pivots<K, V> {
        &self.pivots
    }

    pub(crate) fn elements(&self) -> &Buffer<K, V> {
        &self.elements
    }

    /// Asserts the structural invariants of this subtree and returns its depth.
    pub(crate) fn check_invariants(&self, config: &Config) -> usize {
        assert!(
            self.size() < config.max_node_size(),
            "node of size {} reached max_node_size {}",
            self.size(),
            config.max_node_size()
        );
        if self.is_leaf() {
            assert!(self.elements.values().all(Message::is_insert), "leaf holds a non-insert message");
            return 1;
        }

        let (first, _) = self.pivots.first_key_value().expect("internal node without pivots");
        if let Some((smallest, _)) = self.elements.first_key_value() {
            assert!(first <= smallest, "buffered key {smallest:?} below first pivot {first:?}");
        }

        let mut depth = None;
        let mut keys = self.pivots.keys().peekable();
        while let Some(pivot) = keys.next() {
            let info = &self.pivots[pivot];
            assert_eq!(info.size, info.child.size(), "stale cached size under pivot {pivot:?}");
            if let Some((low, high)) = info.child.key_span() {
                assert!(pivot <= low, "child key {low:?} below its pivot {pivot:?}");
                if let Some(next) = keys.peek() {
                    assert!(high < *next, "child key {high:?} not below next pivot {next:?}");
                }
            }
            let child_depth = info.child.check_invariants(config);
            assert_eq!(*depth.get_or_insert(child_depth), child_depth, "leaves at uneven depth");
        }
        1 + depth.unwrap_or(0)
    }

    // Smallest and largest key stored anywhere in this node (pivots or elements).
    fn key_span(&self) -> Option<(&K, &K)> {
        let low = [self.pivots.keys().next(), self.elements.keys().next()].into_iter().flatten().min()?;
        let high = [self.pivots.keys().next_back(), self.elements.keys().next_back()]
            .into_iter()
            .flatten()
            .max()?;
        Some((low, high))
    }
}

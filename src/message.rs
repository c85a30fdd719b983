use core::ops::Add;

/// The kind of pending mutation a [`Message`] carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Opcode {
    Insert,
    Delete,
    Update,
}

/// A buffered mutation for a single key.
///
/// Messages are what a [`BeTreeMap`](crate::BeTreeMap) stores in its internal nodes:
/// writes are recorded as messages near the root and pushed toward the leaves in
/// batches. Leaves only ever hold [`Message::Insert`].
///
/// # Examples
///
/// ```
/// use betree_map::Message;
///
/// let older = Message::Insert(40);
/// assert_eq!(older.then(Message::Update(2)), Message::Insert(42));
/// assert_eq!(Message::Insert(1).then(Message::Delete), Message::Delete);
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Message<V> {
    /// Sets the value, replacing whatever was there.
    Insert(V),
    /// Removes the key.
    Delete,
    /// Adds a delta to the current value (or to `V::default()` if there is none).
    Update(V),
}

impl<V> Message<V> {
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Message::Insert(_) => Opcode::Insert,
            Message::Delete => Opcode::Delete,
            Message::Update(_) => Opcode::Update,
        }
    }

    /// Returns true for [`Message::Insert`].
    #[must_use]
    pub const fn is_insert(&self) -> bool {
        matches!(self, Message::Insert(_))
    }
}

impl<V: Default + Add<Output = V>> Message<V> {
    /// Composes `newer` on top of `self`, yielding the single message with the same effect
    /// as applying `self` and then `newer`.
    ///
    /// Inserts and deletes supersede whatever came before. An update folds into the older
    /// message: onto an insert it produces an insert of the sum, onto a delete an insert of
    /// `V::default() + delta`, and onto another update a combined update.
    #[must_use]
    pub fn then(self, newer: Message<V>) -> Message<V> {
        match newer {
            Message::Insert(_) | Message::Delete => newer,
            Message::Update(delta) => match self {
                Message::Insert(value) => Message::Insert(value + delta),
                Message::Delete => Message::Insert(V::default() + delta),
                Message::Update(older) => Message::Update(older + delta),
            },
        }
    }

    /// Applies this message to the live value of its key, `None` meaning absent.
    #[must_use]
    pub fn resolve(self, current: Option<V>) -> Option<V> {
        match self {
            Message::Insert(value) => Some(value),
            Message::Delete => None,
            Message::Update(delta) => Some(current.unwrap_or_default() + delta),
        }
    }
}

impl<V: Default> Default for Message<V> {
    fn default() -> Self {
        Message::Insert(V::default())
    }
}

use std::collections::BTreeMap;
use std::ops::{Add, Bound};

use betree_map::betree_map::Iter;
use betree_map::{BeTreeMap, Config, Error, Message, Opcode};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// The number of operations to perform in each proptest case.
const TEST_SIZE: usize = 4_000;

fn small_config() -> Config {
    Config::new(8).with_min_flush_size(2)
}

fn small_map<V>() -> BeTreeMap<i64, V>
where
    V: Clone + Default + Add<Output = V>,
{
    BeTreeMap::with_config(small_config()).expect("valid config")
}

/// String value whose addition is concatenation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Text(String);

impl Text {
    fn new(text: &str) -> Self {
        Text(text.to_owned())
    }
}

impl Add for Text {
    type Output = Text;

    fn add(mut self, rhs: Text) -> Text {
        self.0.push_str(&rhs.0);
        self
    }
}

/// Walks `iter` alongside `reference` starting at the same position and checks that they
/// produce identical entries and end together.
fn assert_scan_matches(map: &BeTreeMap<i64, i64>, mut iter: Iter<'_, i64, i64>, reference: Vec<(i64, i64)>) {
    for expected in reference {
        assert_eq!(iter.peek(), Some((&expected.0, &expected.1)));
        assert_eq!(iter.next(), Some(expected));
    }
    assert!(iter == map.end(), "scan did not end with the reference");
}

// ─── Example scenarios ──────────────────────────────────────────────────────

#[test]
fn sequential_inserts_are_queryable() {
    let mut map = small_map();
    for key in 0..=20 {
        map.insert(key, key * 100 + 7);
    }
    assert!(map.depth() > 1);
    for key in 0..=20 {
        assert_eq!(map.query(&key), Ok(key * 100 + 7), "query({key})");
    }
}

#[test]
fn update_composes_with_insert() {
    let mut map = small_map();
    map.insert(5, Text::new("a"));
    map.update(5, Text::new("b"));
    assert_eq!(map.query(&5), Ok(Text::new("ab")));
}

#[test]
fn update_composes_across_levels() {
    let mut map = small_map();
    map.insert(5, Text::new("a"));
    // Push the insert toward the leaves before the update arrives at the root.
    for key in 100..160 {
        map.insert(key, Text::new("x"));
    }
    map.update(5, Text::new("b"));
    map.update(5, Text::new("c"));

    assert!(map.depth() > 1);
    assert_eq!(map.query(&5), Ok(Text::new("abc")));
    assert_eq!(map.iter().next(), Some((5, Text::new("abc"))));
}

#[test]
fn update_after_erase_starts_from_default() {
    let mut map = small_map();
    map.insert(5, Text::new("a"));
    map.erase(5);
    map.update(5, Text::new("b"));
    assert_eq!(map.query(&5), Ok(Text::new("b")));
}

#[test]
fn erased_key_is_not_found() {
    let mut map = small_map();
    map.insert(3, 30);
    map.erase(3);
    assert_eq!(map.query(&3), Err(Error::KeyNotFound));
    assert_eq!(map.get(&3), None);
    assert!(map.is_empty());
}

#[test]
fn thousand_inserts_iterate_in_order() {
    let mut map = small_map();
    let mut reference = BTreeMap::new();
    for i in 0..1000i64 {
        let key = (i * 7919) % 1000;
        map.insert(key, i);
        reference.insert(key, i);
    }

    let entries: Vec<_> = map.iter().collect();
    assert_eq!(entries.len(), 1000);
    assert!(entries.windows(2).all(|pair| pair[0].0 < pair[1].0));
    assert_eq!(entries, reference.into_iter().collect::<Vec<_>>());
}

#[test]
fn lower_bound_on_absent_key_finds_next_live_key() {
    let mut map = small_map();
    for key in (0..100).step_by(10) {
        map.insert(key, key);
    }
    map.erase(50);

    assert_eq!(map.lower_bound(&41).peek(), Some((&60, &60)));
    assert_eq!(map.lower_bound(&40).peek(), Some((&40, &40)));
    assert!(map.lower_bound(&91) == map.end());

    let reference: Vec<_> = (60..100).step_by(10).map(|k| (k, k)).collect();
    assert_scan_matches(&map, map.lower_bound(&41), reference);
}

// ─── Boundaries ─────────────────────────────────────────────────────────────

#[test]
fn keys_below_smallest_pivot_route_to_leftmost_child() {
    let mut map = small_map();
    for key in 100..200 {
        map.insert(key, key);
    }
    assert!(map.depth() > 1);

    assert_eq!(map.query(&5), Err(Error::KeyNotFound));
    assert_eq!(map.lower_bound(&5).peek(), Some((&100, &100)));

    map.erase(5);
    map.update(-3, 4);
    map.insert(5, 55);
    assert_eq!(map.query(&5), Ok(55));
    assert_eq!(map.query(&-3), Ok(4));
    assert_eq!(map.iter().take(3).collect::<Vec<_>>(), [(-3, 4), (5, 55), (100, 100)]);
}

#[test]
fn empty_map_iterates_nothing() {
    let map: BeTreeMap<i64, i64> = small_map();
    assert!(map.begin() == map.end());
    assert_eq!(map.iter().count(), 0);
    assert_eq!(map.messages().count(), 0);
    assert_eq!(map.query(&0), Err(Error::KeyNotFound));
}

#[test]
fn repeated_queries_are_stable() {
    let mut map = small_map();
    for key in 0..200 {
        map.update(key % 37, 1);
    }
    for key in 0..37 {
        let first = map.query(&key);
        assert_eq!(map.query(&key), first);
        assert_eq!(first, Ok(if key < 15 { 6 } else { 5 }));
    }
}

#[test]
#[should_panic(expected = "range start is greater than range end in BeTreeMap")]
fn inverted_range_panics() {
    let map: BeTreeMap<i64, i64> = small_map();
    let _ = map.range(5..2);
}

#[test]
fn invalid_config_is_rejected() {
    let result = BeTreeMap::<i64, i64>::with_config(Config::new(16).with_min_flush_size(5));
    assert_eq!(
        result.err(),
        Some(Error::InvalidMinFlushSize {
            min_flush_size: 5,
            max_node_size: 16
        })
    );
}

#[test]
fn raw_messages_are_strictly_ascending() {
    let mut map = small_map();
    for key in 0..300 {
        map.insert(key, key);
    }
    for key in (0..300).step_by(2) {
        map.erase(key);
    }
    for key in (1..300).step_by(3) {
        map.update(key, 1000);
    }

    let messages: Vec<_> = map.messages().collect();
    assert!(messages.windows(2).all(|pair| pair[0].0 < pair[1].0));
    // Even keys stay erased unless an update revived them.
    assert!(messages.iter().all(|(key, message)| {
        let revived = key % 2 == 1 || key % 3 == 1;
        match message.opcode() {
            Opcode::Delete => !revived,
            Opcode::Insert | Opcode::Update => revived,
        }
    }));
    let live: Vec<_> = messages.into_iter().filter_map(|(key, message)| Some((key, message.resolve(None)?))).collect();
    assert_eq!(live, map.iter().collect::<Vec<_>>());
}

#[test]
fn messages_compose_buffered_update_with_leaf_value() {
    let mut map = small_map();
    for key in 0..50 {
        map.insert(key, 1);
    }
    map.update(0, 41);
    assert_eq!(map.messages().next(), Some((0, Message::Insert(42))));
}

#[test]
fn debug_lists_live_entries() {
    let mut map = small_map();
    map.insert(2, 20);
    map.insert(1, 10);
    map.insert(3, 30);
    map.erase(3);
    assert_eq!(format!("{map:?}"), "{1: 10, 2: 20}");
}

#[test]
fn equal_contents_compare_equal() {
    let mut a = small_map();
    let mut b: BeTreeMap<i64, i64> = BeTreeMap::new();
    for key in 0..100 {
        a.insert(key, key);
        b.insert(99 - key, 99 - key);
    }
    assert!(a == b);
    a.update(0, 1);
    assert!(a != b);
}

#[test]
fn compact_after_mass_erase() {
    let config = small_config().with_min_node_size(4);
    let mut map = BeTreeMap::with_config(config).expect("valid config");
    for key in 0..500 {
        map.insert(key, key);
    }
    for key in 0..490 {
        map.erase(key);
    }
    let depth = map.depth();
    map.compact();
    assert!(map.depth() <= depth);
    assert_eq!(map.iter().collect::<Vec<_>>(), (490..500).map(|k| (k, k)).collect::<Vec<_>>());

    // The map keeps working after compaction.
    for key in 0..100 {
        map.insert(key, -key);
    }
    assert_eq!(map.get(&50), Some(-50));
    assert_eq!(map.iter().count(), 110);
}

// ─── Randomized comparison against BTreeMap ─────────────────────────────────

fn key_strategy() -> impl Strategy<Value = i64> {
    // Use a range that's smaller than TEST_SIZE to ensure key collisions
    -1_000i64..1_000i64
}

fn value_strategy() -> impl Strategy<Value = i64> {
    -1_000i64..1_000i64
}

#[derive(Debug, Clone)]
enum MapOp {
    Insert(i64, i64),
    Update(i64, i64),
    Erase(i64),
    Query(i64),
    Scan(i64, usize),
}

fn map_op_strategy() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        5 => (key_strategy(), value_strategy()).prop_map(|(k, v)| MapOp::Insert(k, v)),
        3 => (key_strategy(), value_strategy()).prop_map(|(k, v)| MapOp::Update(k, v)),
        3 => key_strategy().prop_map(MapOp::Erase),
        3 => key_strategy().prop_map(MapOp::Query),
        1 => (key_strategy(), 0usize..40).prop_map(|(k, n)| MapOp::Scan(k, n)),
    ]
}

fn config_strategy() -> impl Strategy<Value = Config> {
    (8usize..64).prop_flat_map(|max| (Just(max), 0..=max / 4)).prop_map(|(max, flush)| Config::new(max).with_min_flush_size(flush))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Replays a random sequence of operations on both BeTreeMap and BTreeMap and asserts
    /// identical observable results at every step.
    #[test]
    fn map_ops_match_btreemap(
        config in config_strategy(),
        ops in proptest::collection::vec(map_op_strategy(), TEST_SIZE),
    ) {
        let mut be_map: BeTreeMap<i64, i64> = BeTreeMap::with_config(config).expect("valid config");
        let mut bt_map: BTreeMap<i64, i64> = BTreeMap::new();

        for op in &ops {
            match *op {
                MapOp::Insert(k, v) => {
                    be_map.insert(k, v);
                    bt_map.insert(k, v);
                }
                MapOp::Update(k, v) => {
                    be_map.update(k, v);
                    *bt_map.entry(k).or_default() += v;
                }
                MapOp::Erase(k) => {
                    be_map.erase(k);
                    bt_map.remove(&k);
                }
                MapOp::Query(k) => {
                    let be_result = be_map.query(&k).ok();
                    prop_assert_eq!(be_result, bt_map.get(&k).copied(), "query({})", k);
                }
                MapOp::Scan(k, n) => {
                    let be_items: Vec<_> = be_map.lower_bound(&k).take(n).collect();
                    let bt_items: Vec<_> = bt_map.range(k..).take(n).map(|(&k, &v)| (k, v)).collect();
                    prop_assert_eq!(be_items, bt_items, "lower_bound({}).take({})", k, n);
                }
            }
        }

        let be_items: Vec<_> = be_map.iter().collect();
        let bt_items: Vec<_> = bt_map.iter().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(&be_items, &bt_items, "iter() mismatch");

        be_map.compact();
        let compacted: Vec<_> = be_map.iter().collect();
        prop_assert_eq!(&compacted, &bt_items, "iter() mismatch after compact()");
    }

    /// Tests that range iteration matches BTreeMap for arbitrary bounds.
    #[test]
    fn range_matches_btreemap(
        entries in proptest::collection::vec((key_strategy(), value_strategy()), 0..2_000),
        start in key_strategy(),
        len in 0i64..500,
        inclusive in any::<bool>(),
    ) {
        let mut be_map: BeTreeMap<i64, i64> = BeTreeMap::with_config(small_config()).expect("valid config");
        let mut bt_map: BTreeMap<i64, i64> = BTreeMap::new();
        for (k, v) in entries {
            be_map.insert(k, v);
            bt_map.insert(k, v);
        }

        let end = if inclusive { Bound::Included(start + len) } else { Bound::Excluded(start + len) };
        let bounds = (Bound::Included(start), end);
        let be_items: Vec<_> = be_map.range(bounds).collect();
        let bt_items: Vec<_> = bt_map.range(bounds).map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(be_items, bt_items);
    }
}

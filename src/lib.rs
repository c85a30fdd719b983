//! An in-memory Bε-tree map for Rust.
//!
//! This crate provides [`BeTreeMap`], a sorted key-value index that defers writes as
//! buffered [`Message`]s (insert, delete, update-delta) in its internal nodes and pushes
//! them toward the leaves in large batches. Mutations cost far less restructuring than
//! in a classic B-tree, while point queries and ordered scans see every write immediately.
//!
//! # Example
//!
//! ```
//! use betree_map::{BeTreeMap, Config};
//!
//! let mut balances = BeTreeMap::with_config(Config::new(64)).unwrap();
//! balances.insert("alice", 100);
//! balances.insert("bob", 20);
//!
//! // Blind read-modify-write: the delta is buffered and composed on read.
//! balances.update("bob", 15);
//! assert_eq!(balances.get(&"bob"), Some(35));
//!
//! balances.erase("alice");
//! let entries: Vec<_> = balances.iter().collect();
//! assert_eq!(entries, [("bob", 35)]);
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **Write-optimized** - Inserts, deletes and updates never read the current value
//! - **Update messages** - Values combine with [`Add`](core::ops::Add), so counters and
//!   appends need no lookup before writing
//! - **Ordered iteration** - [`BeTreeMap::iter`], [`BeTreeMap::lower_bound`] and
//!   [`BeTreeMap::range`] resolve buffered messages on the fly
//!
//! # Implementation
//!
//! Each internal node owns a map of pivots (lower-bound key to child) and a buffer of
//! pending messages. When a node reaches [`Config::max_node_size`] entries it flushes the
//! messages destined for its fullest child, provided that child would receive more than
//! [`Config::min_flush_size`] of them; otherwise the node splits into several nodes of
//! 40%-60% of the maximum size. The tree grows by one level whenever the root splits.
//!
//! Logging goes through the [`log`] facade: flushes and splits at `trace` level, root
//! growth and compaction at `debug` level.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod config;
mod error;
mod message;
mod raw;

pub mod betree_map;

pub use betree_map::BeTreeMap;
pub use config::{Config, DEFAULT_MAX_NODE_SIZE, MIN_MAX_NODE_SIZE};
pub use error::{Error, Result};
pub use message::{Message, Opcode};

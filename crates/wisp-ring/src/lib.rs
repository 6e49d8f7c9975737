//! Consistent hashing ring for deterministic metric placement.
//!
//! This crate maps dot-delimited metric keys to owning [`Node`]s. Each node
//! is placed at multiple positions (replicas) on a `u64` ring; a key belongs
//! to the first node found scanning clockwise from the key's own position.
//!
//! The ring is pure data: building it from the same node set always yields
//! the same key → node mapping, regardless of insertion order. Membership
//! changes move only the keys adjacent to the affected positions (roughly
//! `1/N` of the keyspace), which matters because moving a key means
//! relocating a physical file on disk.

mod ring;

pub use ring::{EmptyRingError, HashRing, REPLICAS_PER_NODE};

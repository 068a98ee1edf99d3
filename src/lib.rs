//! Ring-Partitioned Key/Value Cluster Library
//!
//! This library crate defines the core modules of the ring cluster.
//! It serves as the foundation for the `ring-node` binary (`main.rs`).
//!
//! ## Architecture Modules
//! The keyspace `0..=1023` is split into contiguous ranges, one per ring member:
//!
//! - **`membership`**: the sorted member ring with predecessor/successor
//!   pointers and the range table derived from it.
//! - **`coordinator`**: the bootstrap node's ENTER/EXIT arbitration over the
//!   authoritative ring, with a request journal.
//! - **`storage`**: the per-node key/value store and the bulk transfer codec.
//! - **`node`**: line protocol, TCP server, request routing around the ring,
//!   and the join/leave flows.
//! - **`config`** and **`cli`**: config files and the interactive console.
//! - **`error`**: the error taxonomy shared by all modules and the wire.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod membership;
pub mod node;
pub mod storage;

//! Local Storage Module
//!
//! Holds the per-node key/value map and the codec used to move whole key
//! ranges between nodes when ownership changes.
//!
//! ## Core Concepts
//! - **KeyStore**: integer keys, single-token string values, insert never overwrites.
//! - **Bulk lock**: range transfers hold the store lock for the whole copy.
//! - **Transfer payload**: one line of `key:value%0A` records closed by `FIN`.

pub mod memory;
pub mod transfer;

//! Bootstrap Coordinator Module
//!
//! The rendezvous authority of the ring, hosted by node 0. It arbitrates
//! membership only: key redistribution is carried out directly between the
//! joining/leaving node and its neighbors.
//!
//! ## Request Lifecycle
//! 1. **Received**: the request is journaled under a fresh `RequestId`.
//! 2. **Validated**: id bounds, duplicates and the protected bootstrap id are checked.
//! 3. **RingUpdated**: the `MembershipRing` is changed and all pointers recomputed.
//! 4. **RangeUpdated**: the `RangeTable` commit. A refusal here undoes step 3.
//! 5. **Acked**: the reply has been written to the requester.
//!
//! ## Submodules
//! - **`coordinator`**: the state machine and the authoritative registry.
//! - **`types`**: request journal records and the ENTER admission.

pub mod coordinator;
pub mod types;

#[cfg(test)]
mod tests;

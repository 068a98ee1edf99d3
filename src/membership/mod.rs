//! Ring Membership Module
//!
//! Maintains the set of ring members and the key ranges derived from it.
//!
//! ## Core Concepts
//! - **MembershipRing**: members sorted by id; every change recomputes the
//!   predecessor/successor pointers of all members, wrapping at both ends.
//! - **RangeTable**: node `N` owns `(predecessor + 1) mod (MAX_KEY + 1)` through `N`.
//!   The bootstrap node (id 0) absorbs the tail after the highest id.
//! - **Pointers by value**: neighbors are `NodeRef` snapshots (id, host, port),
//!   never links into the ring.

pub mod range;
pub mod ring;
pub mod types;

//! Ring Node
//!
//! One process per ring participant: a TCP server answering the line protocol
//! and the client side that joins, leaves and issues key operations.
//!
//! ## Core Concepts
//! - **Node**: identity, role, neighbor pointers and the local `KeyStore`.
//!   Node 0 additionally hosts the `BootstrapCoordinator` and reads its
//!   neighbors straight from the authoritative ring.
//! - **Routing**: a key is served where its range lives; otherwise the request
//!   walks the successor chain one hop at a time and the owner's reply travels
//!   back the same way.
//! - **Transfers**: key handover on join (`SEND_KEYS`) and leave
//!   (`RECEIVE_KEYS`) use the `%0A`/`FIN` payload and delete on the sender only
//!   after the receiver confirms.

pub mod client;
pub mod connection;
pub mod handlers;
pub mod protocol;
pub mod router;
pub mod server;
pub mod state;

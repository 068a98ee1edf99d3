use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest key (and highest node id) of the ring keyspace.
pub const MAX_KEY: u32 = 1023;

/// Id of the bootstrap node. Always a member, never removable.
pub const BOOTSTRAP_ID: u32 = 0;

/// Host recorded for the bootstrap node in its own ring. Joiners replace it
/// with the address they dialled.
pub const UNKNOWN_HOST: &str = "N/A";

pub fn validate_id(id: u32) -> crate::error::RingResult<()> {
    if id > MAX_KEY {
        return Err(crate::error::RingError::InvalidId(format!(
            "Invalid node ID {}. Must be between 0 and {}",
            id, MAX_KEY
        )));
    }
    Ok(())
}

/// Value snapshot of a ring member: id plus the address it listens on.
///
/// Used for predecessor/successor pointers instead of links to other
/// descriptors, so pointers never own anything and are re-resolved against
/// the ring when needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: u32,
    pub host: String,
    pub port: u16,
}

impl NodeRef {
    pub fn new(id: u32, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }

    pub fn has_unknown_host(&self) -> bool {
        self.host == UNKNOWN_HOST
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.id, self.host, self.port)
    }
}

/// A ring member together with its derived neighbor pointers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub node: NodeRef,
    pub predecessor: NodeRef,
    pub successor: NodeRef,
}

impl NodeDescriptor {
    /// A lone member points at itself in both directions.
    pub fn solitary(node: NodeRef) -> Self {
        Self {
            predecessor: node.clone(),
            successor: node.clone(),
            node,
        }
    }

    pub fn id(&self) -> u32 {
        self.node.id
    }
}

/// `Node <id> [<host>:<port>, Pred: <id> (<host>:<port>), Succ: <id> (<host>:<port>)]`
impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node {} [{}:{}, Pred: {}, Succ: {}]",
            self.node.id, self.node.host, self.node.port, self.predecessor, self.successor
        )
    }
}

/// Inclusive span of the keyspace. `start > end` means the span wraps past
/// `MAX_KEY` back to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

impl Range {
    pub const FULL: Range = Range {
        start: 0,
        end: MAX_KEY,
    };

    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Range owned by `id` when its predecessor is `predecessor_id`:
    /// `(predecessor + 1) mod (MAX_KEY + 1)` through `id`.
    pub fn owned(id: u32, predecessor_id: u32) -> Self {
        if id == predecessor_id {
            return Range::FULL;
        }
        Range::new((predecessor_id + 1) % (MAX_KEY + 1), id)
    }

    pub fn is_wrapping(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, key: u32) -> bool {
        if self.is_wrapping() {
            key >= self.start || key <= self.end
        } else {
            key >= self.start && key <= self.end
        }
    }

    pub fn key_count(&self) -> u32 {
        if self.is_wrapping() {
            (MAX_KEY - self.start + 1) + (self.end + 1)
        } else {
            self.end - self.start + 1
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

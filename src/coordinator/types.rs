use crate::membership::types::NodeDescriptor;
use serde::{Deserialize, Serialize};

/// Identifies one ENTER/EXIT request handled by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestKind {
    Enter,
    Exit,
}

/// Progress of a membership request.
///
/// `Received -> Validated -> RingUpdated -> RangeUpdated -> Acked`, or `Failed`
/// from any step, with steps already applied undone first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Validated,
    RingUpdated,
    RangeUpdated,
    Acked,
    Failed,
}

/// Journal entry for one membership request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: RequestId,
    pub kind: RequestKind,
    pub node_id: u32,
    pub state: RequestState,
    /// Failure reason when `state` is `Failed`.
    pub detail: Option<String>,
    /// Timestamp (ms) when the request arrived.
    pub opened_at: u64,
    /// Arrival order, breaks ties between requests opened in the same millisecond.
    pub sequence: u64,
}

/// Result of a successful ENTER: the joiner's neighbors as the ring now sees them.
#[derive(Debug, Clone)]
pub struct Admission {
    pub request_id: RequestId,
    pub predecessor: NodeDescriptor,
    pub successor: NodeDescriptor,
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

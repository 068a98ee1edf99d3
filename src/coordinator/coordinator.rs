//! Join/Leave Arbitration
//!
//! The bootstrap node owns the authoritative `MembershipRing` and `RangeTable`.
//! ENTER and EXIT requests are totally ordered by one registry lock and walk a
//! small state machine; if the range commit is refused after the ring was
//! already changed, the ring change is undone before the failure is returned.

use super::types::*;
use crate::error::{RingError, RingResult};
use crate::membership::range::RangeTable;
use crate::membership::ring::MembershipRing;
use crate::membership::types::{BOOTSTRAP_ID, NodeDescriptor, NodeRef, Range, validate_id};

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

const JOURNAL_LIMIT: usize = 10_000;

struct Registry {
    ring: MembershipRing,
    ranges: RangeTable,
}

pub struct BootstrapCoordinator {
    registry: Mutex<Registry>,
    journal: DashMap<RequestId, RequestRecord>,
    sequence: AtomicU64,
}

impl BootstrapCoordinator {
    /// `bootstrap` describes the coordinator's own node; its id is forced to 0.
    pub fn new(bootstrap: NodeRef) -> Self {
        let ring = MembershipRing::new(bootstrap);
        let ranges = RangeTable::from_ring(&ring);
        Self {
            registry: Mutex::new(Registry { ring, ranges }),
            journal: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub async fn handle_enter(&self, node: NodeRef) -> RingResult<Admission> {
        let request_id = self.open(RequestKind::Enter, node.id);
        let node_id = node.id;
        tracing::info!("Processing entry of node {}", node_id);

        let mut registry = self.registry.lock().await;

        let validated = validate_id(node_id).and_then(|_| {
            if registry.ring.contains(node_id) {
                Err(RingError::DuplicateId(format!("Node {} already exists.", node_id)))
            } else {
                Ok(())
            }
        });
        if let Err(err) = validated {
            return Err(self.fail(&request_id, err));
        }
        self.advance(&request_id, RequestState::Validated);

        if let Err(err) = registry.ring.add_member(node) {
            return Err(self.fail(&request_id, err));
        }
        self.advance(&request_id, RequestState::RingUpdated);

        if let Err(err) = registry.ranges.add_node(node_id) {
            tracing::warn!("Range update for node {} refused, undoing ring update", node_id);
            if let Err(undo) = registry.ring.remove_member(node_id) {
                tracing::error!("Failed to undo ring update for node {}: {}", node_id, undo);
            }
            return Err(self.fail(&request_id, err));
        }
        self.advance(&request_id, RequestState::RangeUpdated);

        let neighbors = registry.ring.lookup(node_id).and_then(|joined| {
            let predecessor = registry.ring.lookup(joined.predecessor.id)?.clone();
            let successor = registry.ring.lookup(joined.successor.id)?.clone();
            Some((predecessor, successor))
        });
        let Some((predecessor, successor)) = neighbors else {
            return Err(self.fail(
                &request_id,
                RingError::NotFound(format!("Node {} vanished from the ring", node_id)),
            ));
        };

        tracing::info!(
            "Node {} entered: predecessor {}, successor {}",
            node_id,
            predecessor.id(),
            successor.id()
        );
        Ok(Admission {
            request_id,
            predecessor,
            successor,
        })
    }

    pub async fn handle_exit(&self, node_id: u32) -> RingResult<RequestId> {
        let request_id = self.open(RequestKind::Exit, node_id);
        tracing::info!("Processing exit for node {}", node_id);

        let mut registry = self.registry.lock().await;

        let validated = validate_id(node_id).and_then(|_| {
            if node_id == BOOTSTRAP_ID {
                Err(RingError::ProtectedId("Bootstrap node cannot be removed.".to_string()))
            } else if !registry.ring.contains(node_id) {
                Err(RingError::NotFound(format!("Node {} does not exist.", node_id)))
            } else {
                Ok(())
            }
        });
        if let Err(err) = validated {
            return Err(self.fail(&request_id, err));
        }
        self.advance(&request_id, RequestState::Validated);

        let removed = match registry.ring.remove_member(node_id) {
            Ok(removed) => removed,
            Err(err) => return Err(self.fail(&request_id, err)),
        };
        self.advance(&request_id, RequestState::RingUpdated);

        if let Err(err) = registry.ranges.remove_node(node_id) {
            tracing::warn!("Range update for node {} refused, re-adding it to the ring", node_id);
            if let Err(undo) = registry.ring.add_member(removed.node) {
                tracing::error!("Failed to re-add node {}: {}", node_id, undo);
            }
            return Err(self.fail(&request_id, err));
        }
        self.advance(&request_id, RequestState::RangeUpdated);

        tracing::info!("Node {} left the ring", node_id);
        Ok(request_id)
    }

    /// Marks a request as answered once its reply went out.
    pub fn acknowledge(&self, request_id: &RequestId) {
        self.advance(request_id, RequestState::Acked);
    }

    pub async fn lookup(&self, id: u32) -> Option<NodeDescriptor> {
        self.registry.lock().await.ring.lookup(id).cloned()
    }

    pub async fn members(&self) -> Vec<NodeDescriptor> {
        self.registry.lock().await.ring.members().cloned().collect()
    }

    pub async fn range_of(&self, id: u32) -> RingResult<Range> {
        self.registry.lock().await.ranges.range_of(id)
    }

    pub async fn ranges(&self) -> Vec<(u32, Range)> {
        self.registry.lock().await.ranges.ranges()
    }

    pub fn request(&self, id: &RequestId) -> Option<RequestRecord> {
        self.journal.get(id).map(|entry| entry.value().clone())
    }

    /// Journal entries in arrival order.
    pub fn requests(&self) -> Vec<RequestRecord> {
        let mut records: Vec<RequestRecord> = self
            .journal
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.sequence);
        records
    }

    fn open(&self, kind: RequestKind, node_id: u32) -> RequestId {
        if self.journal.len() > JOURNAL_LIMIT {
            self.journal.clear();
        }

        let id = RequestId::new();
        self.journal.insert(
            id.clone(),
            RequestRecord {
                id: id.clone(),
                kind,
                node_id,
                state: RequestState::Received,
                detail: None,
                opened_at: now_ms(),
                sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            },
        );
        id
    }

    fn advance(&self, id: &RequestId, state: RequestState) {
        if let Some(mut record) = self.journal.get_mut(id) {
            tracing::debug!(
                "Request {} ({:?} node {}): {:?} -> {:?}",
                id.0,
                record.kind,
                record.node_id,
                record.state,
                state
            );
            record.state = state;
        }
    }

    fn fail(&self, id: &RequestId, err: RingError) -> RingError {
        tracing::warn!("Request {} failed: {}", id.0, err);
        if let Some(mut record) = self.journal.get_mut(id) {
            record.state = RequestState::Failed;
            record.detail = Some(err.to_string());
        }
        err
    }

    #[cfg(test)]
    pub(crate) async fn with_range_table<R>(&self, f: impl FnOnce(&mut RangeTable) -> R) -> R {
        let mut registry = self.registry.lock().await;
        f(&mut registry.ranges)
    }
}

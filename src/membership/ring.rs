use super::types::{BOOTSTRAP_ID, NodeDescriptor, NodeRef, validate_id};
use crate::error::{RingError, RingResult};

use std::collections::BTreeMap;

/// Ordered set of ring members keyed by id.
///
/// Predecessor/successor pointers of *every* member are recomputed after each
/// successful mutation, so a snapshot of the ring is always fully linked.
/// The ring has no lock of its own: its owner (the coordinator) keeps it behind
/// a single mutex so no observer can see a half-updated pointer set.
#[derive(Debug, Clone)]
pub struct MembershipRing {
    members: BTreeMap<u32, NodeDescriptor>,
}

impl MembershipRing {
    /// Creates a ring holding only the bootstrap node.
    pub fn new(bootstrap: NodeRef) -> Self {
        let mut members = BTreeMap::new();
        let bootstrap = NodeRef {
            id: BOOTSTRAP_ID,
            ..bootstrap
        };
        members.insert(BOOTSTRAP_ID, NodeDescriptor::solitary(bootstrap));
        Self { members }
    }

    pub fn add_member(&mut self, node: NodeRef) -> RingResult<()> {
        validate_id(node.id)?;

        if self.members.contains_key(&node.id) {
            return Err(RingError::DuplicateId(format!(
                "Node {} already exists.",
                node.id
            )));
        }

        self.members.insert(node.id, NodeDescriptor::solitary(node));
        self.update_pointers();
        Ok(())
    }

    pub fn remove_member(&mut self, id: u32) -> RingResult<NodeDescriptor> {
        validate_id(id)?;

        if id == BOOTSTRAP_ID {
            return Err(RingError::ProtectedId(
                "Bootstrap node cannot be removed.".to_string(),
            ));
        }

        let removed = self
            .members
            .remove(&id)
            .ok_or_else(|| RingError::NotFound(format!("Node {} does not exist.", id)))?;
        self.update_pointers();
        Ok(removed)
    }

    pub fn lookup(&self, id: u32) -> Option<&NodeDescriptor> {
        self.members.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.members.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false: the bootstrap node cannot leave.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.members.keys().copied()
    }

    pub fn members(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.members.values()
    }

    fn update_pointers(&mut self) {
        let refs: Vec<NodeRef> = self.members.values().map(|d| d.node.clone()).collect();
        let count = refs.len();
        if count == 0 {
            return;
        }

        for (idx, descriptor) in self.members.values_mut().enumerate() {
            descriptor.predecessor = refs[(idx + count - 1) % count].clone();
            descriptor.successor = refs[(idx + 1) % count].clone();
        }
    }
}

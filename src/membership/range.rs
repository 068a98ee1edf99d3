use super::ring::MembershipRing;
use super::types::{BOOTSTRAP_ID, MAX_KEY, Range, validate_id};
use crate::error::{RingError, RingResult};

use std::collections::BTreeSet;

/// Key ranges of the ring, derived from the sorted set of member ids.
///
/// The table keeps its own id set so the coordinator can treat a range update
/// as a separate commit point from the ring update, and undo the ring change
/// when the range commit is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTable {
    ids: BTreeSet<u32>,
}

impl Default for RangeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeTable {
    pub fn new() -> Self {
        Self {
            ids: BTreeSet::from([BOOTSTRAP_ID]),
        }
    }

    pub fn from_ring(ring: &MembershipRing) -> Self {
        let mut ids: BTreeSet<u32> = ring.ids().collect();
        ids.insert(BOOTSTRAP_ID);
        Self { ids }
    }

    pub fn add_node(&mut self, id: u32) -> RingResult<()> {
        validate_id(id)?;
        if !self.ids.insert(id) {
            return Err(RingError::DuplicateId(format!("Node {} already exists.", id)));
        }
        Ok(())
    }

    pub fn remove_node(&mut self, id: u32) -> RingResult<()> {
        validate_id(id)?;
        if id == BOOTSTRAP_ID {
            return Err(RingError::ProtectedId(
                "Bootstrap node cannot be removed.".to_string(),
            ));
        }
        if !self.ids.remove(&id) {
            return Err(RingError::NotFound(format!("Node {} does not exist.", id)));
        }
        Ok(())
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    /// Range owned by member `id`.
    ///
    /// Node 0 takes the wrapping tail after the highest id. When that highest
    /// id is `MAX_KEY` the wrap start is `(MAX_KEY + 1) mod (MAX_KEY + 1) = 0`
    /// and node 0 is left with the single key 0.
    pub fn range_of(&self, id: u32) -> RingResult<Range> {
        if id > MAX_KEY || !self.ids.contains(&id) {
            return Err(RingError::NotFound(format!("Node {} is not a member.", id)));
        }

        if self.ids.len() == 1 {
            return Ok(Range::FULL);
        }

        if id == BOOTSTRAP_ID {
            let last = self.ids.last().copied().unwrap_or(BOOTSTRAP_ID);
            if last == BOOTSTRAP_ID {
                return Ok(Range::FULL);
            }
            let start = (last + 1) % (MAX_KEY + 1);
            return Ok(Range::new(start, BOOTSTRAP_ID));
        }

        let lower = self.ids.range(..id).next_back().copied().unwrap_or(BOOTSTRAP_ID);
        Ok(Range::new(lower + 1, id))
    }

    /// Every member with its range, ascending by id.
    pub fn ranges(&self) -> Vec<(u32, Range)> {
        self.ids
            .iter()
            .filter_map(|&id| self.range_of(id).ok().map(|range| (id, range)))
            .collect()
    }

    /// Member owning `key`, if the key is inside the keyspace.
    pub fn owner_of(&self, key: u32) -> Option<u32> {
        if key > MAX_KEY {
            return None;
        }
        self.ranges()
            .into_iter()
            .find(|(_, range)| range.contains(key))
            .map(|(id, _)| id)
    }

    /// True when the member ranges cover the keyspace exactly once.
    pub fn is_partition(&self) -> bool {
        let total: u32 = self.ranges().iter().map(|(_, r)| r.key_count()).sum();
        total == MAX_KEY + 1
    }
}

//! Coordinator Module Tests
//!
//! ## Test Scopes
//! - **ENTER**: neighbor assignment, duplicate and out-of-range rejection, rollback.
//! - **EXIT**: protected bootstrap id, unknown members, rollback.
//! - **Journal**: state progression recorded per request.

#[cfg(test)]
mod tests {
    use crate::coordinator::coordinator::BootstrapCoordinator;
    use crate::coordinator::types::{RequestKind, RequestState};
    use crate::error::RingError;
    use crate::membership::types::{MAX_KEY, NodeRef, Range, UNKNOWN_HOST};

    fn coordinator() -> BootstrapCoordinator {
        BootstrapCoordinator::new(NodeRef::new(0, UNKNOWN_HOST, 9000))
    }

    fn peer(id: u32) -> NodeRef {
        NodeRef::new(id, "127.0.0.1", 9000 + id as u16)
    }

    // ============================================================
    // ENTER
    // ============================================================

    #[tokio::test]
    async fn test_first_enter_gets_bootstrap_as_both_neighbors() {
        let coordinator = coordinator();

        let admission = coordinator.handle_enter(peer(1)).await.unwrap();

        assert_eq!(admission.predecessor.id(), 0);
        assert_eq!(admission.successor.id(), 0);
        assert_eq!(coordinator.range_of(1).await.unwrap(), Range::new(1, 1));
        assert_eq!(coordinator.range_of(0).await.unwrap(), Range::new(2, 0));
    }

    #[tokio::test]
    async fn test_enter_between_members() {
        let coordinator = coordinator();
        coordinator.handle_enter(peer(100)).await.unwrap();
        coordinator.handle_enter(peer(300)).await.unwrap();

        let admission = coordinator.handle_enter(peer(200)).await.unwrap();

        assert_eq!(admission.predecessor.id(), 100);
        assert_eq!(admission.successor.id(), 300);
        // Neighbor descriptors already reflect the splice.
        assert_eq!(admission.predecessor.successor.id, 200);
        assert_eq!(admission.successor.predecessor.id, 200);
    }

    #[tokio::test]
    async fn test_duplicate_enter_leaves_ring_unchanged() {
        let coordinator = coordinator();
        coordinator.handle_enter(peer(42)).await.unwrap();
        let before = coordinator.members().await;

        let result = coordinator.handle_enter(NodeRef::new(42, "10.1.1.1", 7000)).await;

        assert!(matches!(result, Err(RingError::DuplicateId(_))));
        assert_eq!(coordinator.members().await, before);
    }

    #[tokio::test]
    async fn test_enter_rejects_invalid_id() {
        let coordinator = coordinator();

        let result = coordinator.handle_enter(peer(MAX_KEY + 1)).await;

        assert!(matches!(result, Err(RingError::InvalidId(_))));
        assert_eq!(coordinator.members().await.len(), 1);
    }

    #[tokio::test]
    async fn test_enter_rolls_back_ring_when_range_commit_fails() {
        let coordinator = coordinator();
        // Desynchronize the range table so its commit refuses node 55.
        coordinator
            .with_range_table(|table| table.add_node(55))
            .await
            .unwrap();

        let result = coordinator.handle_enter(peer(55)).await;

        assert!(matches!(result, Err(RingError::DuplicateId(_))));
        assert!(coordinator.lookup(55).await.is_none());
        let bootstrap = coordinator.lookup(0).await.unwrap();
        assert_eq!(bootstrap.successor.id, 0);
        assert_eq!(bootstrap.predecessor.id, 0);

        let record = coordinator.requests().pop().unwrap();
        assert_eq!(record.state, RequestState::Failed);
    }

    // ============================================================
    // EXIT
    // ============================================================

    #[tokio::test]
    async fn test_exit_of_bootstrap_is_always_protected() {
        let coordinator = coordinator();

        for id in [7, 600] {
            assert!(matches!(
                coordinator.handle_exit(0).await,
                Err(RingError::ProtectedId(_))
            ));
            coordinator.handle_enter(peer(id)).await.unwrap();
        }
        assert!(matches!(
            coordinator.handle_exit(0).await,
            Err(RingError::ProtectedId(_))
        ));
    }

    #[tokio::test]
    async fn test_exit_unknown_member_is_not_found() {
        let coordinator = coordinator();

        assert!(matches!(
            coordinator.handle_exit(9).await,
            Err(RingError::NotFound(_))
        ));
        assert!(matches!(
            coordinator.handle_exit(MAX_KEY + 1).await,
            Err(RingError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_enter_then_exit_restores_partition() {
        let coordinator = coordinator();
        coordinator.handle_enter(peer(100)).await.unwrap();
        let ranges_before = coordinator.ranges().await;
        let members_before = coordinator.members().await;

        coordinator.handle_enter(peer(50)).await.unwrap();
        coordinator.handle_exit(50).await.unwrap();

        assert_eq!(coordinator.ranges().await, ranges_before);
        assert_eq!(coordinator.members().await, members_before);
    }

    #[tokio::test]
    async fn test_exit_rolls_back_ring_when_range_commit_fails() {
        let coordinator = coordinator();
        coordinator.handle_enter(peer(12)).await.unwrap();
        coordinator
            .with_range_table(|table| table.remove_node(12))
            .await
            .unwrap();

        let result = coordinator.handle_exit(12).await;

        assert!(matches!(result, Err(RingError::NotFound(_))));
        let restored = coordinator.lookup(12).await.unwrap();
        assert_eq!(restored.node, peer(12));
        assert_eq!(restored.predecessor.id, 0);
        assert_eq!(coordinator.lookup(0).await.unwrap().successor.id, 12);
    }

    // ============================================================
    // JOURNAL
    // ============================================================

    #[tokio::test]
    async fn test_journal_tracks_request_states() {
        let coordinator = coordinator();

        let admission = coordinator.handle_enter(peer(3)).await.unwrap();
        assert_eq!(
            coordinator.request(&admission.request_id).unwrap().state,
            RequestState::RangeUpdated
        );
        coordinator.acknowledge(&admission.request_id);
        let _ = coordinator.handle_exit(0).await;

        let records = coordinator.requests();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, RequestKind::Enter);
        assert_eq!(records[0].state, RequestState::Acked);
        assert_eq!(records[1].kind, RequestKind::Exit);
        assert_eq!(records[1].state, RequestState::Failed);
        assert!(records[1].detail.is_some());
    }
}

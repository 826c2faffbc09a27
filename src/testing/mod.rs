//! Testing infrastructure for ticket-sync.
//!
//! Provides an in-memory workspace store, canned events and stores, and
//! assertions for exercising the engine without a Notion workspace.
//!
//! # Example
//!
//! ```rust,ignore
//! use ticket_sync::testing::{fixtures, assert_status};
//!
//! let store = Arc::new(fixtures::code_review_store());
//! SyncOrchestrator::new(SyncConfig::default(), store.clone())
//!     .handle(&fixtures::pull_request("closed", "feature/GEN-42", "dev", true))
//!     .await?;
//! assert_status(&store, "abc", "In Dev");
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mocks;

pub use assertions::*;
pub use mocks::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::sync::SyncOrchestrator;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fixture_stores_round_through_orchestrator() {
        let store = Arc::new(fixtures::code_review_store());
        let report = SyncOrchestrator::new(SyncConfig::default(), store.clone())
            .handle(&fixtures::pull_request("closed", "feature/GEN-42", "dev", true))
            .await
            .unwrap();

        assert_status(&store, "abc", "In Dev");
        assert_update_count(&store, 1);
        assert_outcome(&report, "abc", &crate::migrate::ItemOutcome::Updated);
    }

    #[test]
    fn test_payload_fixtures_parse() {
        let pr = crate::event::SourceEvent::from_payload(
            "pull_request",
            &fixtures::pull_request_payload("opened", "feature/GEN-1", "dev", false),
        )
        .unwrap();
        assert_eq!(pr, fixtures::pull_request("opened", "feature/GEN-1", "dev", false));

        let push = crate::event::SourceEvent::from_payload(
            "push",
            &fixtures::push_payload("refs/heads/uat", "mel", "mel@example.com"),
        )
        .unwrap();
        assert_eq!(push, fixtures::push("refs/heads/uat", "mel", "mel@example.com"));
    }

    #[test]
    #[should_panic(expected = "Expected the run to be skipped")]
    fn test_assert_skipped_panics_on_live_run() {
        let report = crate::report::SyncReport::new(&fixtures::push("refs/heads/uat", "a", "a@b"));
        assert_skipped(&report);
    }

    #[test]
    fn test_assert_not_written() {
        let store = fixtures::uat_store();
        assert_not_written(&store, "passed");
    }
}

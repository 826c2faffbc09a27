//! Custom assertions for sync tests.

use super::mocks::MockWorkspaceStore;
use crate::migrate::ItemOutcome;
use crate::report::SyncReport;

/// Assert that an item currently has `expected` as its status.
///
/// # Panics
///
/// Panics with the actual status if it differs.
pub fn assert_status(store: &MockWorkspaceStore, item_id: &str, expected: &str) {
    let actual = store.status_of(item_id);
    assert_eq!(
        actual.as_deref(),
        Some(expected),
        "Expected item {item_id} to have status '{expected}', found {actual:?}"
    );
}

/// Assert the number of status writes attempted.
///
/// # Panics
///
/// Panics listing the writes if the count differs.
pub fn assert_update_count(store: &MockWorkspaceStore, expected: usize) {
    let updates = store.update_calls();
    assert_eq!(
        updates.len(),
        expected,
        "Expected {expected} status updates, got {}.\nUpdates: {updates:?}",
        updates.len()
    );
}

/// Assert that no status write touched `item_id`.
///
/// # Panics
///
/// Panics if an update was attempted for the item.
pub fn assert_not_written(store: &MockWorkspaceStore, item_id: &str) {
    let writes: Vec<_> = store
        .update_calls()
        .into_iter()
        .filter(|(id, _)| id == item_id)
        .collect();
    assert!(
        writes.is_empty(),
        "Expected no writes to {item_id}, got {writes:?}"
    );
}

/// Assert the recorded outcome for one item.
///
/// # Panics
///
/// Panics if the item is missing from the report or its outcome differs.
pub fn assert_outcome(report: &SyncReport, item_id: &str, expected: &ItemOutcome) {
    let result = report
        .results
        .iter()
        .find(|r| r.item_id == item_id)
        .unwrap_or_else(|| panic!("No result for {item_id} in report:\n{report}"));
    assert_eq!(
        &result.outcome, expected,
        "Unexpected outcome for {item_id}"
    );
}

/// Assert that the run was skipped.
///
/// # Panics
///
/// Panics if the report carries no skip reason.
pub fn assert_skipped(report: &SyncReport) {
    assert!(
        report.is_skipped(),
        "Expected the run to be skipped, but it was not.\n{report}"
    );
}

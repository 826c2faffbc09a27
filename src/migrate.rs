//! Bulk status migration.
//!
//! Moves every item whose status is in a candidate set to one target status.
//! Updates run one at a time in store order; a failed write is recorded
//! against its item and the remaining items are still attempted.

use crate::assignee::AssigneeSignal;
use crate::resolver::WorkItemResolver;
use crate::store::{WorkItem, WorkspaceStore};
use crate::transition::Status;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether a bulk move is narrowed to one assignee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "signal", rename_all = "snake_case")]
pub enum AssigneeScope {
    #[default]
    Unscoped,
    /// Narrowing was requested. `None` when no signal could be resolved.
    Scoped(Option<AssigneeSignal>),
}

/// What a bulk move should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub from: Vec<Status>,
    pub to: Status,
    pub assignee: AssigneeScope,
    pub feature_filter: bool,
}

impl MigrationPlan {
    pub fn new(from: Vec<Status>, to: Status) -> Self {
        Self {
            from,
            to,
            assignee: AssigneeScope::Unscoped,
            feature_filter: false,
        }
    }

    #[must_use]
    pub fn with_assignee(mut self, signal: Option<AssigneeSignal>) -> Self {
        self.assignee = AssigneeScope::Scoped(signal);
        self
    }

    #[must_use]
    pub fn with_feature_filter(mut self, enabled: bool) -> Self {
        self.feature_filter = enabled;
        self
    }
}

/// Per-item result of a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ItemOutcome {
    Updated,
    /// The item already had the target status; nothing was written.
    AlreadyInTarget,
    /// Dry run: the item would have been updated.
    WouldUpdate,
    Failed(String),
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated => f.write_str("updated"),
            Self::AlreadyInTarget => f.write_str("already in target status"),
            Self::WouldUpdate => f.write_str("would update"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub item_id: String,
    pub title: String,
    /// Status before the run.
    pub previous: Option<String>,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl ItemResult {
    pub fn new(item: &WorkItem, outcome: ItemOutcome) -> Self {
        Self {
            item_id: item.id.clone(),
            title: item.title.clone(),
            previous: item.status.clone(),
            outcome,
        }
    }
}

/// Outcome of a whole bulk move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Items the store returned.
    pub found: usize,
    /// Returned items whose status was outside the candidate set.
    pub off_set: usize,
    /// Items dropped by the feature filter.
    pub filtered_out: usize,
    pub results: Vec<ItemResult>,
    /// Why assignee narrowing was not applied, if it was requested.
    pub degraded: Option<String>,
}

impl MigrationReport {
    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Updated))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    pub fn outcome_of(&self, item_id: &str) -> Option<&ItemOutcome> {
        self.results
            .iter()
            .find(|r| r.item_id == item_id)
            .map(|r| &r.outcome)
    }
}

/// Applies [`MigrationPlan`]s.
pub struct BulkMigrationEngine<'a> {
    resolver: &'a WorkItemResolver,
    store: Arc<dyn WorkspaceStore>,
    dry_run: bool,
}

impl<'a> BulkMigrationEngine<'a> {
    pub fn new(resolver: &'a WorkItemResolver, store: Arc<dyn WorkspaceStore>) -> Self {
        Self {
            resolver,
            store,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn migrate(&self, plan: &MigrationPlan) -> MigrationReport {
        let mut report = MigrationReport::default();

        let items = match &plan.assignee {
            AssigneeScope::Unscoped => self.resolver.find_by_status_set(&plan.from).await,
            AssigneeScope::Scoped(signal) => {
                let query = self
                    .resolver
                    .find_by_status_set_and_assignee(&plan.from, signal.as_ref())
                    .await;
                report.degraded = query.degraded;
                query.items
            }
        };
        report.found = items.len();

        for item in items {
            if plan.to.matches(item.status.as_deref()) {
                debug!(item = %item.id, "already in target status");
                report
                    .results
                    .push(ItemResult::new(&item, ItemOutcome::AlreadyInTarget));
                continue;
            }
            if !item.status_in(&plan.from) {
                warn!(item = %item.id, status = ?item.status, "store returned an item outside the candidate set");
                report.off_set += 1;
                continue;
            }
            if plan.feature_filter && !item.is_feature_related() {
                debug!(item = %item.id, "not feature related");
                report.filtered_out += 1;
                continue;
            }

            let outcome = self.apply(&item, &plan.to).await;
            report.results.push(ItemResult::new(&item, outcome));
        }

        info!(
            target_status = %plan.to,
            found = report.found,
            updated = report.updated(),
            failed = report.failed(),
            "bulk move finished"
        );
        report
    }

    async fn apply(&self, item: &WorkItem, to: &Status) -> ItemOutcome {
        if self.dry_run {
            info!(item = %item.id, to = %to, "dry run: would update");
            return ItemOutcome::WouldUpdate;
        }
        match self.store.update_status(&item.id, to).await {
            Ok(()) => {
                info!(item = %item.id, from = ?item.status, to = %to, "status updated");
                ItemOutcome::Updated
            }
            Err(e) => {
                warn!(item = %item.id, error = %e, "status update failed");
                ItemOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropertyNames;
    use crate::store::PersonRef;
    use crate::testing::{MockItem, MockWorkspaceStore};

    fn uat_plan() -> MigrationPlan {
        MigrationPlan::new(
            vec!["In Dev".into(), "Failed in Dev".into(), "Ready for UAT".into()],
            "In UAT".into(),
        )
    }

    fn resolver(store: &Arc<MockWorkspaceStore>) -> WorkItemResolver {
        WorkItemResolver::new(store.clone(), PropertyNames::default())
    }

    #[tokio::test]
    async fn test_moves_only_candidate_statuses() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("1").status("In Dev"))
                .with_item(MockItem::new("2").status("Ready for UAT"))
                .with_item(MockItem::new("3").status("Passed UAT")),
        );
        let resolver = resolver(&store);
        let report = BulkMigrationEngine::new(&resolver, store.clone())
            .migrate(&uat_plan())
            .await;

        assert_eq!(report.found, 2);
        assert_eq!(report.updated(), 2);
        assert_eq!(store.status_of("1").as_deref(), Some("In UAT"));
        assert_eq!(store.status_of("2").as_deref(), Some("In UAT"));
        assert_eq!(store.status_of("3").as_deref(), Some("Passed UAT"));
    }

    #[tokio::test]
    async fn test_stray_records_are_not_touched() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_ignored_filters()
                .with_item(MockItem::new("1").status("In Dev"))
                .with_item(MockItem::new("2").status("Live in Prod"))
                .with_item(MockItem::new("3")),
        );
        let resolver = resolver(&store);
        let report = BulkMigrationEngine::new(&resolver, store.clone())
            .migrate(&uat_plan())
            .await;

        assert_eq!(report.found, 3);
        assert_eq!(report.off_set, 2);
        assert_eq!(store.update_calls(), vec![("1".into(), "In UAT".into())]);
    }

    #[tokio::test]
    async fn test_already_in_target_is_not_written() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_ignored_filters()
                .with_item(MockItem::new("1").status("In UAT")),
        );
        let resolver = resolver(&store);
        let report = BulkMigrationEngine::new(&resolver, store.clone())
            .migrate(&uat_plan())
            .await;

        assert_eq!(report.outcome_of("1"), Some(&ItemOutcome::AlreadyInTarget));
        assert!(store.update_calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_set_issues_no_updates() {
        let store = Arc::new(MockWorkspaceStore::new().with_item(MockItem::new("1").status("Live in Prod")));
        let resolver = resolver(&store);
        let report = BulkMigrationEngine::new(&resolver, store.clone())
            .migrate(&uat_plan())
            .await;

        assert_eq!(report.found, 0);
        assert!(report.results.is_empty());
        assert!(store.update_calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_items() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("1").status("In Dev"))
                .with_item(MockItem::new("2").status("In Dev"))
                .with_item(MockItem::new("3").status("In Dev"))
                .with_failing_update("2"),
        );
        let resolver = resolver(&store);
        let report = BulkMigrationEngine::new(&resolver, store.clone())
            .migrate(&uat_plan())
            .await;

        assert_eq!(store.update_calls().len(), 3);
        assert_eq!(report.updated(), 2);
        assert_eq!(report.failed(), 1);
        assert!(matches!(report.outcome_of("2"), Some(ItemOutcome::Failed(_))));
        assert_eq!(store.status_of("3").as_deref(), Some("In UAT"));
    }

    #[tokio::test]
    async fn test_feature_filter() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("1").status("In Dev").title("Add feature/login support"))
                .with_item(MockItem::new("2").status("In Dev").title("Refactor utils")),
        );
        let resolver = resolver(&store);
        let report = BulkMigrationEngine::new(&resolver, store.clone())
            .migrate(&uat_plan().with_feature_filter(true))
            .await;

        assert_eq!(report.filtered_out, 1);
        assert_eq!(store.update_calls(), vec![("1".into(), "In UAT".into())]);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = Arc::new(MockWorkspaceStore::new().with_item(MockItem::new("1").status("In Dev")));
        let resolver = resolver(&store);
        let report = BulkMigrationEngine::new(&resolver, store.clone())
            .with_dry_run(true)
            .migrate(&uat_plan())
            .await;

        assert_eq!(report.outcome_of("1"), Some(&ItemOutcome::WouldUpdate));
        assert!(store.update_calls().is_empty());
    }

    #[tokio::test]
    async fn test_assignee_scope_and_degradation() {
        let person = |id: &str| PersonRef {
            id: id.into(),
            ..PersonRef::default()
        };
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("1").status("In Dev").assignee(person("u1")))
                .with_item(MockItem::new("2").status("In Dev").assignee(person("u2"))),
        );
        let resolver = resolver(&store);
        let engine = BulkMigrationEngine::new(&resolver, store.clone()).with_dry_run(true);

        assert_eq!(uat_plan().assignee, AssigneeScope::Unscoped);
        let plan = uat_plan().with_assignee(Some(AssigneeSignal::PersonId("u1".into())));
        assert!(matches!(plan.assignee, AssigneeScope::Scoped(Some(_))));

        let scoped = engine.migrate(&plan).await;
        assert_eq!(scoped.found, 1);
        assert_eq!(scoped.degraded, None);

        let plan = uat_plan().with_assignee(None);
        assert_eq!(plan.assignee, AssigneeScope::Scoped(None));
        let unresolved = engine.migrate(&plan).await;
        assert_eq!(unresolved.found, 2);
        assert!(unresolved.degraded.is_some());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ItemOutcome::Updated.to_string(), "updated");
        assert_eq!(ItemOutcome::Failed("429".into()).to_string(), "failed: 429");
    }
}

//! Event orchestration.
//!
//! [`SyncOrchestrator`] takes one source event through classification,
//! transition lookup, work-item resolution and the status writes, and
//! returns a [`SyncReport`] describing what happened.

use crate::assignee::{AssigneeChain, AssigneeResolver};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::event::{PullRequestEvent, PushEvent, SourceEvent};
use crate::extract::{branch_from_ref, extract_request_number, CandidateId, IdentifierExtractor};
use crate::migrate::{BulkMigrationEngine, ItemOutcome, ItemResult, MigrationPlan};
use crate::report::{SkipReason, SyncReport};
use crate::resolver::WorkItemResolver;
use crate::store::{WorkItem, WorkspaceStore};
use crate::transition::{
    BranchClassifier, EventAction, NoOpReason, Status, Transition, TransitionEvent,
    TransitionTable,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one event to completion.
pub struct SyncOrchestrator {
    config: SyncConfig,
    store: Arc<dyn WorkspaceStore>,
    classifier: BranchClassifier,
    table: TransitionTable,
    resolver: WorkItemResolver,
    assignees: AssigneeChain,
    dry_run: bool,
}

impl SyncOrchestrator {
    pub fn new(config: SyncConfig, store: Arc<dyn WorkspaceStore>) -> Self {
        let classifier = BranchClassifier::new(&config.branches);
        let table = TransitionTable::new(config.statuses.clone())
            .with_assignee_scope(config.push.scope_to_pusher);
        let resolver = WorkItemResolver::new(Arc::clone(&store), config.properties.clone())
            .with_extractor(IdentifierExtractor::new(&config.branches));
        let assignees = AssigneeChain::from_config(&config.assignees, Arc::clone(&store));

        Self {
            config,
            store,
            classifier,
            table,
            resolver,
            assignees,
            dry_run: false,
        }
    }

    /// Compute everything but skip the writes.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Update`] when the status write for a single
    /// pull request item fails. Bulk write failures are recorded in the report
    /// instead.
    pub async fn handle(&self, event: &SourceEvent) -> Result<SyncReport> {
        info!(%event, dry_run = self.dry_run, "handling event");
        let report = SyncReport::new(event).with_dry_run(self.dry_run);

        let report = match event {
            SourceEvent::PullRequest(pr) => self.handle_pull_request(pr, report).await?,
            SourceEvent::Push(push) => self.handle_push(push, report).await,
            SourceEvent::Unsupported(name) => {
                info!(event = %name, "event type not handled");
                report.skipped(SkipReason::UnsupportedEvent { name: name.clone() })
            }
        };

        if let Some(skip) = &report.skip {
            info!(reason = %skip, "nothing to update");
        }
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Pull requests
    // ------------------------------------------------------------------------

    async fn handle_pull_request(
        &self,
        pr: &PullRequestEvent,
        mut report: SyncReport,
    ) -> Result<SyncReport> {
        let class = self.classifier.classify(&pr.base_branch);
        let trigger = TransitionEvent::pull_request(EventAction::parse(&pr.action), class, pr.merged);
        let transition = self.table.resolve(&trigger);
        debug!(base = %pr.base_branch, %class, ?transition, "pull request transition");
        report.transition = Some(transition.clone());

        let status = match transition {
            Transition::SetStatus { status } => status,
            Transition::NoOp(reason) => return Ok(report.skipped(SkipReason::NoOp { reason })),
            Transition::BulkMove { .. } => {
                warn!("bulk transition for a pull request; ignoring");
                return Ok(report.skipped(SkipReason::NoOp {
                    reason: NoOpReason::UnhandledAction {
                        action: pr.action.clone(),
                    },
                }));
            }
        };

        let Some(item) = self.locate(pr, &mut report).await else {
            return Ok(report);
        };
        report.found = 1;

        let outcome = self.set_single(&item, &status).await?;
        report.results.push(ItemResult::new(&item, outcome));
        Ok(report)
    }

    /// Find the pull request's work item, recording a skip when there is none.
    async fn locate(&self, pr: &PullRequestEvent, report: &mut SyncReport) -> Option<WorkItem> {
        let branch = pr.head_branch.as_str();
        let extractor = self.resolver.extractor();
        let supported = extractor.is_supported(branch);

        let mut tried = Vec::new();
        let mut identified = false;
        if supported {
            let resolution = self.resolver.resolve_branch(branch).await;
            identified = resolution
                .tried
                .iter()
                .any(|c| !matches!(c, CandidateId::Raw(_)));
            tried.extend(resolution.tried.iter().map(ToString::to_string));
            if let Some(item) = resolution.item {
                return Some(item);
            }
        }

        if self.config.lookup.branch_ref_fallback {
            if let Some(item) = self.resolver.find_by_branch_ref(branch).await {
                report.note(format!("matched by branch property '{branch}'"));
                return Some(item);
            }
            tried.push(format!("branch '{branch}'"));
        }

        if self.config.lookup.title_fallback && !pr.title.trim().is_empty() {
            if let Some(item) = self.resolver.find_by_title(&pr.title).await {
                report.note(format!("matched by title '{}'", pr.title));
                return Some(item);
            }
            tried.push(format!("title '{}'", pr.title));

            if let Some(number) = extract_request_number(&pr.title) {
                debug!(number, "trying title reference as a task id");
                if let Some(item) = self.resolver.find_by_numeric_id(number).await {
                    report.note(format!("matched by title reference #{number}"));
                    return Some(item);
                }
                tried.push(format!("title reference #{number}"));
            }
        }

        let reason = if !supported {
            SkipReason::UnsupportedBranch {
                branch: branch.to_string(),
            }
        } else if !identified {
            SkipReason::NoCandidate {
                branch: branch.to_string(),
            }
        } else {
            SkipReason::NotFound { tried }
        };
        report.skip = Some(reason);
        None
    }

    async fn set_single(&self, item: &WorkItem, status: &Status) -> Result<ItemOutcome> {
        if status.matches(item.status.as_deref()) {
            info!(item = %item.id, %status, "already in target status");
            return Ok(ItemOutcome::AlreadyInTarget);
        }
        if self.dry_run {
            info!(item = %item.id, to = %status, "dry run: would update");
            return Ok(ItemOutcome::WouldUpdate);
        }

        self.store.update_status(&item.id, status).await?;
        info!(item = %item.id, from = ?item.status, to = %status, "status updated");
        Ok(ItemOutcome::Updated)
    }

    // ------------------------------------------------------------------------
    // Pushes
    // ------------------------------------------------------------------------

    async fn handle_push(&self, push: &PushEvent, mut report: SyncReport) -> SyncReport {
        let branch = branch_from_ref(&push.git_ref);
        let class = self.classifier.classify(branch);
        let transition = self.table.resolve(&TransitionEvent::push(class));
        debug!(branch, %class, ?transition, "push transition");
        report.transition = Some(transition.clone());

        let (from, to) = match transition {
            Transition::BulkMove { from, to } => (from, to),
            Transition::NoOp(reason) => return report.skipped(SkipReason::NoOp { reason }),
            Transition::SetStatus { .. } => {
                warn!("single-item transition for a push; ignoring");
                return report.skipped(SkipReason::NoOp {
                    reason: NoOpReason::UntrackedPush,
                });
            }
        };

        let mut plan = MigrationPlan::new(from, to).with_feature_filter(self.config.push.feature_filter);
        if self.config.push.scope_to_pusher {
            let signal = self.assignees.resolve(&push.pusher).await;
            if signal.is_none() {
                report.note(format!("pusher {} matched no workspace user", push.pusher));
            }
            plan = plan.with_assignee(signal);
        }

        let migration = BulkMigrationEngine::new(&self.resolver, Arc::clone(&self.store))
            .with_dry_run(self.dry_run)
            .migrate(&plan)
            .await;
        report.absorb(migration);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::testing::{fixtures, MockItem, MockWorkspaceStore};
    use crate::transition::BranchClass;

    fn orchestrator(store: &Arc<MockWorkspaceStore>) -> SyncOrchestrator {
        SyncOrchestrator::new(SyncConfig::default(), store.clone())
    }

    #[tokio::test]
    async fn test_opened_sets_in_progress() {
        let store = Arc::new(MockWorkspaceStore::new().with_item(MockItem::new("abc").task_id(42)));
        let report = orchestrator(&store)
            .handle(&fixtures::pull_request("opened", "feature/GEN-42", "dev", false))
            .await
            .unwrap();

        assert_eq!(report.updated(), 1);
        assert_eq!(store.status_of("abc").as_deref(), Some("In Progress"));
    }

    #[tokio::test]
    async fn test_review_requested_sets_code_review() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("abc").task_id(42).status("In Progress")),
        );
        orchestrator(&store)
            .handle(&fixtures::pull_request("review_requested", "fix/GEN-42", "main", false))
            .await
            .unwrap();
        assert_eq!(store.status_of("abc").as_deref(), Some("In Code Review"));
    }

    #[tokio::test]
    async fn test_closed_without_merge_is_noop() {
        let store = Arc::new(fixtures::code_review_store());
        let report = orchestrator(&store)
            .handle(&fixtures::pull_request("closed", "feature/GEN-42", "dev", false))
            .await
            .unwrap();

        assert_eq!(
            report.skip,
            Some(SkipReason::NoOp {
                reason: NoOpReason::ClosedWithoutMerge
            })
        );
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deployment_request_is_noop() {
        let store = Arc::new(fixtures::code_review_store());
        let report = orchestrator(&store)
            .handle(&fixtures::pull_request("opened", "dev", "uat", false))
            .await
            .unwrap();
        assert_eq!(
            report.skip,
            Some(SkipReason::NoOp {
                reason: NoOpReason::DeploymentRequest {
                    target: BranchClass::Staging
                }
            })
        );
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_branch_is_skipped_without_lookup() {
        let store = Arc::new(fixtures::code_review_store());
        let report = orchestrator(&store)
            .handle(&fixtures::pull_request("opened", "wip/42", "dev", false))
            .await
            .unwrap();

        assert_eq!(
            report.skip,
            Some(SkipReason::UnsupportedBranch {
                branch: "wip/42".into()
            })
        );
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_branch_without_identifier() {
        let store = Arc::new(fixtures::code_review_store());
        let report = orchestrator(&store)
            .handle(&fixtures::pull_request("opened", "chore/bump-deps", "dev", false))
            .await
            .unwrap();
        assert_eq!(
            report.skip,
            Some(SkipReason::NoCandidate {
                branch: "chore/bump-deps".into()
            })
        );
        assert!(store.update_calls().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_lists_tried_candidates() {
        let store = Arc::new(MockWorkspaceStore::new());
        let report = orchestrator(&store)
            .handle(&fixtures::pull_request("opened", "feature/TES-76S-2", "dev", false))
            .await
            .unwrap();

        let Some(SkipReason::NotFound { tried }) = report.skip else {
            panic!("expected not found, got {:?}", report.skip);
        };
        assert_eq!(tried, vec!["TES-76S-2".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn test_title_fallback() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("t").title("Login page").status("In Progress")),
        );
        let mut config = SyncConfig::default();
        config.lookup.title_fallback = true;

        let mut event = fixtures::pull_request("review_requested", "wip/login", "dev", false);
        if let SourceEvent::PullRequest(pr) = &mut event {
            pr.title = "[WIP] Login page (#12)".into();
        }
        let report = SyncOrchestrator::new(config, store.clone())
            .handle(&event)
            .await
            .unwrap();

        assert_eq!(report.updated(), 1);
        assert!(report.notes[0].contains("title"));
        assert_eq!(store.status_of("t").as_deref(), Some("In Code Review"));
    }

    #[tokio::test]
    async fn test_title_reference_fallback() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("t").task_id(12).title("Something else").status("In Progress")),
        );
        let mut config = SyncConfig::default();
        config.lookup.title_fallback = true;

        let mut event = fixtures::pull_request("review_requested", "wip/login", "dev", false);
        if let SourceEvent::PullRequest(pr) = &mut event {
            pr.title = "Login page #12".into();
        }
        let report = SyncOrchestrator::new(config.clone(), store.clone())
            .handle(&event)
            .await
            .unwrap();

        assert_eq!(report.updated(), 1);
        assert!(report.notes[0].contains("#12"));
        assert_eq!(store.status_of("t").as_deref(), Some("In Code Review"));

        let empty = Arc::new(MockWorkspaceStore::new());
        let mut event = fixtures::pull_request("review_requested", "feature/GEN-7", "dev", false);
        if let SourceEvent::PullRequest(pr) = &mut event {
            pr.title = "Login page #12".into();
        }
        let report = SyncOrchestrator::new(config, empty)
            .handle(&event)
            .await
            .unwrap();
        let Some(SkipReason::NotFound { tried }) = report.skip else {
            panic!("expected not found, got {:?}", report.skip);
        };
        assert_eq!(tried.last().map(String::as_str), Some("title reference #12"));
    }

    #[tokio::test]
    async fn test_branch_ref_fallback() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("b").branch_ref("feature/login").status("In Progress")),
        );
        let mut config = SyncConfig::default();
        config.lookup.branch_ref_fallback = true;

        let report = SyncOrchestrator::new(config, store.clone())
            .handle(&fixtures::pull_request("review_requested", "feature/login", "dev", false))
            .await
            .unwrap();
        assert_eq!(report.updated(), 1);
        assert_eq!(store.status_of("b").as_deref(), Some("In Code Review"));
    }

    #[tokio::test]
    async fn test_single_update_failure_propagates() {
        let store = Arc::new(fixtures::code_review_store().with_failing_update("abc"));
        let err = orchestrator(&store)
            .handle(&fixtures::pull_request("closed", "feature/GEN-42", "dev", true))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Update { ref item_id, .. } if item_id == "abc"));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let store = Arc::new(fixtures::code_review_store());
        let orchestrator = orchestrator(&store);
        let event = fixtures::pull_request("closed", "feature/GEN-42", "dev", true);

        orchestrator.handle(&event).await.unwrap();
        let second = orchestrator.handle(&event).await.unwrap();

        assert_eq!(second.results[0].outcome, ItemOutcome::AlreadyInTarget);
        assert_eq!(store.update_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_pull_request() {
        let store = Arc::new(fixtures::code_review_store());
        let report = orchestrator(&store)
            .with_dry_run(true)
            .handle(&fixtures::pull_request("closed", "feature/GEN-42", "dev", true))
            .await
            .unwrap();

        assert_eq!(report.results[0].outcome, ItemOutcome::WouldUpdate);
        assert!(store.update_calls().is_empty());
    }

    #[tokio::test]
    async fn test_push_to_development_is_noop() {
        let store = Arc::new(fixtures::uat_store());
        let report = orchestrator(&store)
            .handle(&fixtures::push("refs/heads/dev", "mel", "mel@example.com"))
            .await
            .unwrap();
        assert_eq!(
            report.skip,
            Some(SkipReason::NoOp {
                reason: NoOpReason::DevelopmentPush
            })
        );
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_push_to_production() {
        let store = Arc::new(fixtures::uat_store());
        let report = orchestrator(&store)
            .handle(&fixtures::push("refs/heads/production", "ops", "ops@example.com"))
            .await
            .unwrap();

        assert_eq!(report.updated(), 1);
        assert_eq!(store.status_of("passed").as_deref(), Some("Live in Prod"));
        assert_eq!(store.status_of("in-dev").as_deref(), Some("In Dev"));
    }

    #[tokio::test]
    async fn test_scoped_push_uses_pusher() {
        let store = Arc::new(fixtures::team_uat_store());
        let mut config = SyncConfig::default();
        config.push.scope_to_pusher = true;

        let report = SyncOrchestrator::new(config, store.clone())
            .handle(&fixtures::push("refs/heads/uat", "mel", "mel@example.com"))
            .await
            .unwrap();

        assert_eq!(report.updated(), 1);
        assert_eq!(store.status_of("mel-task").as_deref(), Some("In UAT"));
        assert_eq!(store.status_of("lisa-task").as_deref(), Some("In Dev"));
    }

    #[tokio::test]
    async fn test_scoped_push_with_unknown_pusher_degrades() {
        let store = Arc::new(fixtures::team_uat_store());
        let mut config = SyncConfig::default();
        config.push.scope_to_pusher = true;

        let report = SyncOrchestrator::new(config, store.clone())
            .handle(&fixtures::push("refs/heads/uat", "ghost", "ghost@example.com"))
            .await
            .unwrap();

        assert_eq!(report.updated(), 2);
        assert!(report.notes.iter().any(|n| n.contains("matched no workspace user")));
        assert!(report.notes.iter().any(|n| n.contains("assignee narrowing skipped")));
    }

    #[tokio::test]
    async fn test_unsupported_event() {
        let store = Arc::new(MockWorkspaceStore::new());
        let report = orchestrator(&store)
            .handle(&SourceEvent::Unsupported("issues".into()))
            .await
            .unwrap();
        assert_eq!(
            report.skip,
            Some(SkipReason::UnsupportedEvent {
                name: "issues".into()
            })
        );
    }
}

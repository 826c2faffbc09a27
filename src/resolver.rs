//! Work-item resolution against the workspace store.
//!
//! The resolver turns candidate identifiers and status sets into store
//! queries. Filter shapes follow the property kinds reported by the store
//! schema, which is fetched on first use and kept for the lifetime of the
//! resolver. Store failures never escape: they are logged at `warn` and
//! surface as "no match" or an empty result.

use crate::assignee::AssigneeSignal;
use crate::config::PropertyNames;
use crate::error::{Result, SyncError};
use crate::extract::{clean_title, CandidateId, IdentifierExtractor};
use crate::store::{Filter, PropertyKind, Schema, WorkItem, WorkspaceStore};
use crate::transition::Status;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Outcome of the branch fallback chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BranchResolution {
    pub item: Option<WorkItem>,
    /// Candidates looked up, in order, up to and including the hit.
    pub tried: Vec<CandidateId>,
}

/// Result of an assignee-narrowed status query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssigneeQuery {
    pub items: Vec<WorkItem>,
    /// Set when the query fell back to status-only matching.
    pub degraded: Option<String>,
}

/// Resolves candidate identifiers to work items.
pub struct WorkItemResolver {
    store: Arc<dyn WorkspaceStore>,
    properties: PropertyNames,
    extractor: IdentifierExtractor,
    schema: OnceCell<Schema>,
}

impl WorkItemResolver {
    pub fn new(store: Arc<dyn WorkspaceStore>, properties: PropertyNames) -> Self {
        Self {
            store,
            properties,
            extractor: IdentifierExtractor::default(),
            schema: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: IdentifierExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn extractor(&self) -> &IdentifierExtractor {
        &self.extractor
    }

    // ------------------------------------------------------------------------
    // Single-item lookups
    // ------------------------------------------------------------------------

    /// Item whose identifying property equals `id`.
    pub async fn find_by_numeric_id(&self, id: u64) -> Option<WorkItem> {
        self.find_one(&self.properties.task_id, &id.to_string()).await
    }

    /// Item whose identifying property equals `key`.
    ///
    /// Against a numeric identifying property a non-numeric key resolves to
    /// nothing.
    pub async fn find_by_composite_key(&self, key: &str) -> Option<WorkItem> {
        self.find_one(&self.properties.task_id, key).await
    }

    pub async fn find_by_candidate(&self, candidate: &CandidateId) -> Option<WorkItem> {
        match candidate {
            CandidateId::Numeric(id) => self.find_by_numeric_id(*id).await,
            CandidateId::Composite(key) | CandidateId::Raw(key) => {
                self.find_by_composite_key(key).await
            }
        }
    }

    /// Walk the branch's candidate chain and stop at the first match.
    pub async fn resolve_branch(&self, branch: &str) -> BranchResolution {
        let candidates = self.extractor.fallback_candidates(branch);
        debug!(
            branch,
            candidates = ?candidates.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "candidate chain"
        );

        let mut tried = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let item = self.find_by_candidate(&candidate).await;
            tried.push(candidate);
            if item.is_some() {
                return BranchResolution { item, tried };
            }
        }
        BranchResolution { item: None, tried }
    }

    /// Item whose branch property equals `branch`.
    pub async fn find_by_branch_ref(&self, branch: &str) -> Option<WorkItem> {
        let property = self.properties.branch_ref.as_deref()?;
        self.find_one(property, branch).await
    }

    /// Item whose title equals the cleaned `title`.
    pub async fn find_by_title(&self, title: &str) -> Option<WorkItem> {
        let cleaned = clean_title(title);
        if cleaned.is_empty() {
            return None;
        }
        self.find_one(&self.properties.title, &cleaned).await
    }

    // ------------------------------------------------------------------------
    // Status-set lookups
    // ------------------------------------------------------------------------

    /// Items whose status is one of `statuses`. An empty set queries nothing.
    pub async fn find_by_status_set(&self, statuses: &[Status]) -> Vec<WorkItem> {
        if statuses.is_empty() {
            return Vec::new();
        }
        let result = async {
            let filter = self.status_filter(statuses).await?;
            self.store.query(&filter).await
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!(error = %e, "status set lookup failed");
            Vec::new()
        })
    }

    /// Items in `statuses` that are also assigned to `signal`.
    ///
    /// Falls back to [`Self::find_by_status_set`] when there is no signal,
    /// the assignee property cannot express it, or the narrowed query fails.
    pub async fn find_by_status_set_and_assignee(
        &self,
        statuses: &[Status],
        signal: Option<&AssigneeSignal>,
    ) -> AssigneeQuery {
        if statuses.is_empty() {
            return AssigneeQuery::default();
        }

        let narrowed = match signal {
            None => Err("no assignee signal".to_string()),
            Some(signal) => self.query_narrowed(statuses, signal).await,
        };

        match narrowed {
            Ok(items) => AssigneeQuery {
                items,
                degraded: None,
            },
            Err(reason) => {
                warn!(%reason, "assignee narrowing unavailable; using status only");
                AssigneeQuery {
                    items: self.find_by_status_set(statuses).await,
                    degraded: Some(reason),
                }
            }
        }
    }

    async fn query_narrowed(
        &self,
        statuses: &[Status],
        signal: &AssigneeSignal,
    ) -> std::result::Result<Vec<WorkItem>, String> {
        let property = &self.properties.assignee;
        let kind = self
            .property_kind(property)
            .await
            .map_err(|e| e.to_string())?;
        let clause = assignee_clause(property, &kind, signal)?;
        let status = self.status_filter(statuses).await.map_err(|e| e.to_string())?;

        self.store
            .query(&Filter::all(vec![status, clause]))
            .await
            .map_err(|e| format!("assignee query failed: {e}"))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn schema(&self) -> Result<&Schema> {
        self.schema
            .get_or_try_init(|| async {
                let schema = self.store.schema().await?;
                debug!(properties = schema.len(), "schema loaded");
                Ok::<_, SyncError>(schema)
            })
            .await
    }

    async fn property_kind(&self, property: &str) -> Result<PropertyKind> {
        self.schema().await?.get(property).cloned().ok_or_else(|| {
            SyncError::lookup("schema", format!("property '{property}' does not exist"))
        })
    }

    async fn status_filter(&self, statuses: &[Status]) -> Result<Filter> {
        let property = &self.properties.status;
        let kind = self.property_kind(property).await?;
        let clauses = statuses
            .iter()
            .map(|s| kind.equals(property, s.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Filter::any(clauses))
    }

    async fn find_one(&self, property: &str, value: &str) -> Option<WorkItem> {
        let result = async {
            let kind = self.property_kind(property).await?;
            let filter = kind.equals(property, value)?;
            self.store.query(&filter).await
        }
        .await;

        match result {
            Ok(items) => {
                if items.len() > 1 {
                    debug!(property, value, matches = items.len(), "several matches; taking the first");
                }
                items.into_iter().next()
            }
            Err(e) => {
                warn!(property, value, error = %e, "lookup failed");
                None
            }
        }
    }
}

/// Filter clause selecting items assigned to `signal`.
fn assignee_clause(
    property: &str,
    kind: &PropertyKind,
    signal: &AssigneeSignal,
) -> std::result::Result<Filter, String> {
    let built = match (kind, signal) {
        (PropertyKind::People, AssigneeSignal::PersonId(id)) => kind.contains(property, id),
        (PropertyKind::People, other) => {
            return Err(format!("people property '{property}' needs a person id, got {other}"));
        }
        (
            PropertyKind::RichText | PropertyKind::Title,
            AssigneeSignal::DisplayName(text) | AssigneeSignal::Email(text),
        ) => kind.contains(property, text),
        (PropertyKind::Email, AssigneeSignal::Email(email)) => kind.equals(property, email),
        (PropertyKind::RichText | PropertyKind::Title | PropertyKind::Email, other) => {
            return Err(format!(
                "{kind} property '{property}' cannot match {other}"
            ));
        }
        _ => {
            return Err(format!(
                "property '{property}' of type '{kind}' cannot filter by assignee"
            ));
        }
    };
    built.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PersonRef;
    use crate::testing::{MockItem, MockWorkspaceStore};

    fn resolver(store: &Arc<MockWorkspaceStore>) -> WorkItemResolver {
        WorkItemResolver::new(store.clone(), PropertyNames::default())
    }

    fn person(id: &str) -> PersonRef {
        PersonRef {
            id: id.to_string(),
            ..PersonRef::default()
        }
    }

    fn uat_candidates() -> Vec<Status> {
        vec!["In Dev".into(), "Failed in Dev".into(), "Ready for UAT".into()]
    }

    #[tokio::test]
    async fn test_find_by_numeric_id() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("abc").task_id(42).status("In Code Review")),
        );
        let resolver = resolver(&store);

        let item = resolver.find_by_numeric_id(42).await.unwrap();
        assert_eq!(item.id, "abc");
        assert!(resolver.find_by_numeric_id(7).await.is_none());
    }

    #[tokio::test]
    async fn test_schema_fetched_once() {
        let store = Arc::new(MockWorkspaceStore::new().with_item(MockItem::new("a").task_id(1)));
        let resolver = resolver(&store);

        resolver.find_by_numeric_id(1).await;
        resolver.find_by_numeric_id(2).await;
        resolver.find_by_status_set(&["In Dev".into()]).await;
        assert_eq!(store.schema_count(), 1);
    }

    #[tokio::test]
    async fn test_non_numeric_key_against_numeric_property_is_none() {
        let store = Arc::new(MockWorkspaceStore::new().with_item(MockItem::new("a").task_id(2)));
        let resolver = resolver(&store);

        assert!(resolver.find_by_composite_key("TES-76S-2").await.is_none());
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_composite_key_against_text_property() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_property_kind("Task ID", PropertyKind::RichText)
                .with_item(MockItem::new("a").value(
                    "Task ID",
                    crate::testing::PropertyValue::Text("GEN-5694".into()),
                )),
        );
        let resolver = resolver(&store);
        assert_eq!(resolver.find_by_composite_key("GEN-5694").await.unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_unsupported_identifier_kind_is_none() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_property_kind("Task ID", PropertyKind::Unsupported("formula".into())),
        );
        assert!(resolver(&store).find_by_numeric_id(1).await.is_none());
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_lookup_failures_become_none() {
        let failing_query = Arc::new(MockWorkspaceStore::new().with_query_error("500"));
        assert!(resolver(&failing_query).find_by_numeric_id(1).await.is_none());
        assert!(resolver(&failing_query)
            .find_by_status_set(&["In Dev".into()])
            .await
            .is_empty());

        let failing_schema = Arc::new(MockWorkspaceStore::new().with_schema_error("401"));
        assert!(resolver(&failing_schema).find_by_numeric_id(1).await.is_none());
        assert_eq!(failing_schema.query_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_branch_walks_chain() {
        let store = Arc::new(MockWorkspaceStore::new().with_item(MockItem::new("x").task_id(2)));
        let resolution = resolver(&store).resolve_branch("feature/TES-76S-2").await;

        assert_eq!(resolution.item.map(|i| i.id), Some("x".to_string()));
        assert_eq!(
            resolution.tried,
            vec![
                CandidateId::Composite("TES-76S-2".into()),
                CandidateId::Numeric(2)
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_branch_unsupported_tries_nothing() {
        let store = Arc::new(MockWorkspaceStore::new());
        let resolution = resolver(&store).resolve_branch("wip/42").await;
        assert_eq!(resolution, BranchResolution::default());
        assert_eq!(store.calls().len(), 0);
    }

    #[tokio::test]
    async fn test_find_by_branch_ref_and_title() {
        let store = Arc::new(
            MockWorkspaceStore::new().with_item(
                MockItem::new("p")
                    .title("Login page")
                    .branch_ref("feature/login"),
            ),
        );
        let resolver = resolver(&store);
        assert_eq!(resolver.find_by_branch_ref("feature/login").await.unwrap().id, "p");
        assert_eq!(resolver.find_by_title("[WIP] Login page (#12)").await.unwrap().id, "p");
        assert!(resolver.find_by_title("  ").await.is_none());
    }

    #[tokio::test]
    async fn test_branch_ref_disabled_without_property() {
        let store = Arc::new(MockWorkspaceStore::new());
        let resolver = WorkItemResolver::new(
            store.clone(),
            PropertyNames {
                branch_ref: None,
                ..PropertyNames::default()
            },
        );
        assert!(resolver.find_by_branch_ref("feature/x").await.is_none());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_set_membership() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("1").status("In Dev"))
                .with_item(MockItem::new("2").status("Ready for UAT"))
                .with_item(MockItem::new("3").status("Passed UAT")),
        );
        let items = resolver(&store).find_by_status_set(&uat_candidates()).await;
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_empty_status_set_issues_no_query() {
        let store = Arc::new(MockWorkspaceStore::new().with_item(MockItem::new("1").status("In Dev")));
        assert!(resolver(&store).find_by_status_set(&[]).await.is_empty());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_filter_follows_select_kind() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_property_kind("Status", PropertyKind::Select)
                .with_item(MockItem::new("1").status("In Dev")),
        );
        let items = resolver(&store).find_by_status_set(&["In Dev".into()]).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(
            store.calls().last(),
            Some(crate::testing::StoreCall::Query(Filter::Equals { kind: PropertyKind::Select, .. }))
        ));
    }

    #[tokio::test]
    async fn test_assignee_narrowing_by_person_id() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("1").status("In Dev").assignee(person("u1")))
                .with_item(MockItem::new("2").status("In Dev").assignee(person("u2"))),
        );
        let query = resolver(&store)
            .find_by_status_set_and_assignee(
                &uat_candidates(),
                Some(&AssigneeSignal::PersonId("u2".into())),
            )
            .await;
        assert_eq!(query.degraded, None);
        assert_eq!(query.items.len(), 1);
        assert_eq!(query.items[0].id, "2");
    }

    #[tokio::test]
    async fn test_assignee_without_signal_degrades_to_superset() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_item(MockItem::new("1").status("In Dev").assignee(person("u1")))
                .with_item(MockItem::new("2").status("In Dev").assignee(person("u2"))),
        );
        let resolver = resolver(&store);
        let narrowed = resolver
            .find_by_status_set_and_assignee(
                &uat_candidates(),
                Some(&AssigneeSignal::PersonId("u1".into())),
            )
            .await;
        let fallback = resolver
            .find_by_status_set_and_assignee(&uat_candidates(), None)
            .await;

        assert!(fallback.degraded.is_some());
        assert_eq!(fallback.items.len(), 2);
        assert!(narrowed.items.iter().all(|i| fallback.items.contains(i)));
    }

    #[tokio::test]
    async fn test_assignee_name_against_people_property_degrades() {
        let store = Arc::new(MockWorkspaceStore::new().with_item(MockItem::new("1").status("In Dev")));
        let query = resolver(&store)
            .find_by_status_set_and_assignee(
                &uat_candidates(),
                Some(&AssigneeSignal::DisplayName("Mel".into())),
            )
            .await;
        assert!(query.degraded.unwrap().contains("person id"));
        assert_eq!(query.items.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_assignee_property_degrades() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .without_property("Assignee")
                .with_item(MockItem::new("1").status("In Dev")),
        );
        let query = resolver(&store)
            .find_by_status_set_and_assignee(
                &uat_candidates(),
                Some(&AssigneeSignal::PersonId("u1".into())),
            )
            .await;
        assert!(query.degraded.unwrap().contains("Assignee"));
        assert_eq!(query.items.len(), 1);
    }

    #[tokio::test]
    async fn test_assignee_text_property_matches_display_name() {
        let store = Arc::new(
            MockWorkspaceStore::new()
                .with_property_kind("Assignee", PropertyKind::RichText)
                .with_item(
                    MockItem::new("1")
                        .status("In Dev")
                        .value("Assignee", crate::testing::PropertyValue::Text("Mel Jones".into())),
                )
                .with_item(MockItem::new("2").status("In Dev")),
        );
        let query = resolver(&store)
            .find_by_status_set_and_assignee(
                &uat_candidates(),
                Some(&AssigneeSignal::DisplayName("mel".into())),
            )
            .await;
        assert_eq!(query.degraded, None);
        assert_eq!(query.items.len(), 1);
    }

    #[test]
    fn test_assignee_clause_shapes() {
        let email = AssigneeSignal::Email("a@b.c".into());
        assert!(matches!(
            assignee_clause("Owner", &PropertyKind::Email, &email),
            Ok(Filter::Equals { .. })
        ));
        assert!(assignee_clause("Owner", &PropertyKind::Number, &email).is_err());
        assert!(assignee_clause("Owner", &PropertyKind::Email, &AssigneeSignal::PersonId("u".into())).is_err());
    }
}

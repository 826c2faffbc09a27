//! Workspace database capability.
//!
//! The engine talks to the task database only through [`WorkspaceStore`].
//! [`NotionStore`] is the production implementation; tests use
//! [`crate::testing::MockWorkspaceStore`].

pub mod filter;
pub mod notion;

pub use filter::{Filter, FilterError, FilterValue, PropertyKind};
pub use notion::NotionStore;

use crate::error::Result;
use crate::transition::Status;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

/// Reference to a person assigned to a work item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersonRef {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A task record in the workspace database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    pub id: String,
    /// Current status name; `None` when the property is empty.
    pub status: Option<String>,
    pub assignees: Vec<PersonRef>,
    pub title: String,
    pub branch_ref: Option<String>,
}

impl WorkItem {
    /// Whether the current status is one of `statuses`.
    pub fn status_in(&self, statuses: &[Status]) -> bool {
        statuses.iter().any(|s| s.matches(self.status.as_deref()))
    }

    /// Whether the title or branch reference mentions a feature branch.
    pub fn is_feature_related(&self) -> bool {
        const MARKER: &str = "feature/";
        self.title.to_lowercase().contains(MARKER)
            || self
                .branch_ref
                .as_deref()
                .is_some_and(|b| b.to_lowercase().contains(MARKER))
    }
}

/// Kind of directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonKind {
    Person,
    Bot,
}

/// An entry in the workspace user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Person {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub kind: PersonKind,
}

/// Property name to kind mapping of the task database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    properties: BTreeMap<String, PropertyKind>,
}

impl Schema {
    pub fn new(properties: BTreeMap<String, PropertyKind>) -> Self {
        Self { properties }
    }

    pub fn get(&self, property: &str) -> Option<&PropertyKind> {
        self.properties.get(property)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyKind)> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl FromIterator<(String, PropertyKind)> for Schema {
    fn from_iter<I: IntoIterator<Item = (String, PropertyKind)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Operations the engine needs from the task database.
///
/// Calls are issued one at a time; implementations need not be reentrant
/// per item but must be `Send + Sync` to live behind an `Arc`.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Items matching `filter`, in store order.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote query fails.
    async fn query(&self, filter: &Filter) -> Result<Vec<WorkItem>>;

    /// Property types of the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be retrieved.
    async fn schema(&self) -> Result<Schema>;

    /// Set the status property of one item.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Update`] if the write fails.
    async fn update_status(&self, item_id: &str, status: &Status) -> Result<()>;

    /// Users of the workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    async fn list_persons(&self) -> Result<Vec<Person>>;
}

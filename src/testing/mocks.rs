//! Mock implementation of the workspace store.
//!
//! [`MockWorkspaceStore`] keeps items in memory, evaluates [`Filter`]s the
//! way the remote database would, records every call, and can be told to
//! fail specific operations.

use crate::config::PropertyNames;
use crate::error::{Result, SyncError};
use crate::store::{
    Filter, FilterValue, Person, PersonKind, PersonRef, PropertyKind, Schema, WorkItem,
    WorkspaceStore,
};
use crate::transition::Status;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// A stored property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Number(u64),
    Text(String),
    People(Vec<PersonRef>),
}

/// An item seeded into the mock store, keyed by property name.
///
/// The builder methods write to the default property names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockItem {
    pub id: String,
    pub values: BTreeMap<String, PropertyValue>,
}

impl MockItem {
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            values: BTreeMap::new(),
        }
    }

    /// Set an arbitrary property.
    #[must_use]
    pub fn value(mut self, property: &str, value: PropertyValue) -> Self {
        self.values.insert(property.to_string(), value);
        self
    }

    #[must_use]
    pub fn task_id(self, id: u64) -> Self {
        let name = PropertyNames::default().task_id;
        self.value(&name, PropertyValue::Number(id))
    }

    #[must_use]
    pub fn status(self, status: &str) -> Self {
        let name = PropertyNames::default().status;
        self.value(&name, PropertyValue::Text(status.to_string()))
    }

    #[must_use]
    pub fn title(self, title: &str) -> Self {
        let name = PropertyNames::default().title;
        self.value(&name, PropertyValue::Text(title.to_string()))
    }

    #[must_use]
    pub fn branch_ref(self, branch: &str) -> Self {
        let name = PropertyNames::default().branch_ref.unwrap_or_default();
        self.value(&name, PropertyValue::Text(branch.to_string()))
    }

    /// Add a person to the default assignee property.
    #[must_use]
    pub fn assignee(mut self, person: PersonRef) -> Self {
        let name = PropertyNames::default().assignee;
        match self.values.get_mut(&name) {
            Some(PropertyValue::People(people)) => people.push(person),
            _ => {
                self.values.insert(name, PropertyValue::People(vec![person]));
            }
        }
        self
    }
}

/// A recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Query(Filter),
    Schema,
    Update { item_id: String, status: String },
    ListPersons,
}

/// In-memory [`WorkspaceStore`].
///
/// # Example
///
/// ```rust,ignore
/// let store = MockWorkspaceStore::new()
///     .with_item(MockItem::new("abc").task_id(42).status("In Code Review"));
///
/// store.update_status("abc", &"In Dev".into()).await?;
/// assert_eq!(store.status_of("abc").as_deref(), Some("In Dev"));
/// ```
#[derive(Debug)]
pub struct MockWorkspaceStore {
    names: PropertyNames,
    schema: Schema,
    items: Mutex<Vec<MockItem>>,
    persons: Vec<Person>,
    calls: Mutex<Vec<StoreCall>>,
    query_error: Option<String>,
    schema_error: Option<String>,
    directory_error: Option<String>,
    failing_updates: HashSet<String>,
    ignore_filters: bool,
}

impl Default for MockWorkspaceStore {
    fn default() -> Self {
        let names = PropertyNames::default();
        let mut schema = BTreeMap::new();
        schema.insert(names.task_id.clone(), PropertyKind::UniqueId);
        schema.insert(names.status.clone(), PropertyKind::Status);
        schema.insert(names.assignee.clone(), PropertyKind::People);
        schema.insert(names.title.clone(), PropertyKind::Title);
        if let Some(branch) = &names.branch_ref {
            schema.insert(branch.clone(), PropertyKind::RichText);
        }

        Self {
            names,
            schema: Schema::new(schema),
            items: Mutex::new(Vec::new()),
            persons: Vec::new(),
            calls: Mutex::new(Vec::new()),
            query_error: None,
            schema_error: None,
            directory_error: None,
            failing_updates: HashSet::new(),
            ignore_filters: false,
        }
    }
}

impl MockWorkspaceStore {
    /// Create a store with the default schema and no items.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Override the kind of one property (or add it).
    #[must_use]
    pub fn with_property_kind(self, property: &str, kind: PropertyKind) -> Self {
        let mut properties: BTreeMap<String, PropertyKind> = self
            .schema
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        properties.insert(property.to_string(), kind);
        self.with_schema(Schema::new(properties))
    }

    /// Remove a property from the schema.
    #[must_use]
    pub fn without_property(self, property: &str) -> Self {
        let schema = self
            .schema
            .iter()
            .filter(|(k, _)| k.as_str() != property)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.with_schema(schema)
    }

    #[must_use]
    pub fn with_item(self, item: MockItem) -> Self {
        lock(&self.items).push(item);
        self
    }

    #[must_use]
    pub fn with_person(mut self, id: &str, name: &str, email: &str) -> Self {
        self.persons.push(Person {
            id: id.to_string(),
            display_name: Some(name.to_string()),
            email: Some(email.to_string()),
            kind: PersonKind::Person,
        });
        self
    }

    #[must_use]
    pub fn with_bot(mut self, id: &str, name: &str) -> Self {
        self.persons.push(Person {
            id: id.to_string(),
            display_name: Some(name.to_string()),
            email: None,
            kind: PersonKind::Bot,
        });
        self
    }

    /// Make every query fail.
    #[must_use]
    pub fn with_query_error(mut self, error: &str) -> Self {
        self.query_error = Some(error.to_string());
        self
    }

    /// Make schema retrieval fail.
    #[must_use]
    pub fn with_schema_error(mut self, error: &str) -> Self {
        self.schema_error = Some(error.to_string());
        self
    }

    /// Make directory listing fail.
    #[must_use]
    pub fn with_directory_error(mut self, error: &str) -> Self {
        self.directory_error = Some(error.to_string());
        self
    }

    /// Make status writes to `item_id` fail.
    #[must_use]
    pub fn with_failing_update(mut self, item_id: &str) -> Self {
        self.failing_updates.insert(item_id.to_string());
        self
    }

    /// Return every item from every query, as a misbehaving store would.
    #[must_use]
    pub fn with_ignored_filters(mut self) -> Self {
        self.ignore_filters = true;
        self
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// `(item_id, status)` of every update attempt, failed ones included.
    pub fn update_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Update { item_id, status } => Some((item_id, status)),
                _ => None,
            })
            .collect()
    }

    pub fn query_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Query(_)))
            .count()
    }

    pub fn schema_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Schema))
            .count()
    }

    /// Current status text of an item.
    pub fn status_of(&self, item_id: &str) -> Option<String> {
        lock(&self.items)
            .iter()
            .find(|i| i.id == item_id)
            .and_then(|i| match i.values.get(&self.names.status) {
                Some(PropertyValue::Text(s)) => Some(s.clone()),
                _ => None,
            })
    }

    fn record(&self, call: StoreCall) {
        lock(&self.calls).push(call);
    }

    fn project(&self, item: &MockItem) -> WorkItem {
        let text = |name: &str| match item.values.get(name) {
            Some(PropertyValue::Text(s)) => Some(s.clone()),
            Some(PropertyValue::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        WorkItem {
            id: item.id.clone(),
            status: text(self.names.status.as_str()),
            assignees: match item.values.get(&self.names.assignee) {
                Some(PropertyValue::People(people)) => people.clone(),
                _ => Vec::new(),
            },
            title: text(self.names.title.as_str()).unwrap_or_default(),
            branch_ref: self.names.branch_ref.as_deref().and_then(text),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Evaluate a filter against stored values.
fn matches(item: &MockItem, filter: &Filter) -> bool {
    match filter {
        Filter::Equals {
            property, value, ..
        } => match (item.values.get(property), value) {
            (Some(PropertyValue::Number(n)), FilterValue::Number(m)) => n == m,
            (Some(PropertyValue::Text(s)), FilterValue::Text(t)) => s == t,
            _ => false,
        },
        Filter::Contains {
            property, value, ..
        } => match item.values.get(property) {
            Some(PropertyValue::Text(s)) => s.to_lowercase().contains(&value.to_lowercase()),
            Some(PropertyValue::People(people)) => people.iter().any(|p| &p.id == value),
            _ => false,
        },
        Filter::And(clauses) => clauses.iter().all(|c| matches(item, c)),
        Filter::Or(clauses) => clauses.iter().any(|c| matches(item, c)),
    }
}

#[async_trait]
impl WorkspaceStore for MockWorkspaceStore {
    async fn query(&self, filter: &Filter) -> Result<Vec<WorkItem>> {
        self.record(StoreCall::Query(filter.clone()));
        if let Some(error) = &self.query_error {
            return Err(SyncError::lookup("query", error.clone()));
        }
        Ok(lock(&self.items)
            .iter()
            .filter(|item| self.ignore_filters || matches(item, filter))
            .map(|item| self.project(item))
            .collect())
    }

    async fn schema(&self) -> Result<Schema> {
        self.record(StoreCall::Schema);
        match &self.schema_error {
            Some(error) => Err(SyncError::lookup("schema", error.clone())),
            None => Ok(self.schema.clone()),
        }
    }

    async fn update_status(&self, item_id: &str, status: &Status) -> Result<()> {
        self.record(StoreCall::Update {
            item_id: item_id.to_string(),
            status: status.to_string(),
        });
        if self.failing_updates.contains(item_id) {
            return Err(SyncError::update(item_id, status.as_str(), "injected failure"));
        }

        let mut items = lock(&self.items);
        let item = items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| SyncError::update(item_id, status.as_str(), "no such item"))?;
        item.values.insert(
            self.names.status.clone(),
            PropertyValue::Text(status.to_string()),
        );
        Ok(())
    }

    async fn list_persons(&self) -> Result<Vec<Person>> {
        self.record(StoreCall::ListPersons);
        match &self.directory_error {
            Some(error) => Err(SyncError::lookup("list users", error.clone())),
            None => Ok(self.persons.clone()),
        }
    }
}

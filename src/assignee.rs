//! Assignee resolution strategies.
//!
//! Maps a source-control identity (login, display name, email) to the
//! workspace identity used to narrow bulk queries. Strategies share one
//! [`AssigneeResolver`] interface and are chained in configuration order;
//! the first strategy to produce a signal wins.

use crate::config::{AssigneeConfig, SignalKind, StrategyKind};
use crate::store::{Person, PersonKind, WorkspaceStore};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Who triggered the event, as seen by source control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceIdentity {
    pub login: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl SourceIdentity {
    pub fn login(login: &str) -> Self {
        Self {
            login: Some(login.to_string()),
            ..Self::default()
        }
    }

    pub fn email(email: &str) -> Self {
        Self {
            email: Some(email.to_string()),
            ..Self::default()
        }
    }

    /// Non-empty login and name, lower-cased, in that order.
    fn handles(&self) -> Vec<String> {
        [&self.login, &self.name]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handles().is_empty() && self.email.as_deref().is_none_or(|e| e.trim().is_empty())
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.login, &self.name, &self.email]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        if parts.is_empty() {
            f.write_str("<unknown>")
        } else {
            f.write_str(&parts.join(" / "))
        }
    }
}

/// A workspace identity usable in an assignee filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AssigneeSignal {
    PersonId(String),
    DisplayName(String),
    Email(String),
}

impl fmt::Display for AssigneeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PersonId(id) => write!(f, "person {id}"),
            Self::DisplayName(name) => write!(f, "name '{name}'"),
            Self::Email(email) => write!(f, "email {email}"),
        }
    }
}

/// A strategy for mapping a source identity to a workspace identity.
#[async_trait]
pub trait AssigneeResolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Resolve an identity. `None` means this strategy found no match.
    async fn resolve(&self, identity: &SourceIdentity) -> Option<AssigneeSignal>;
}

// ============================================================================
// Directory cache
// ============================================================================

/// Workspace users, fetched at most once per run.
pub struct PersonDirectory {
    store: Arc<dyn WorkspaceStore>,
    persons: OnceCell<Vec<Person>>,
}

impl PersonDirectory {
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self {
            store,
            persons: OnceCell::new(),
        }
    }

    /// Directory entries of kind `person`. A failed listing yields no entries.
    pub async fn persons(&self) -> &[Person] {
        self.persons
            .get_or_init(|| async {
                match self.store.list_persons().await {
                    Ok(all) => all
                        .into_iter()
                        .filter(|p| p.kind == PersonKind::Person)
                        .collect(),
                    Err(e) => {
                        warn!(error = %e, "could not list workspace users");
                        Vec::new()
                    }
                }
            })
            .await
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// Exact lookup in a configured login → identity table.
///
/// Keys are compared case-insensitively; login is tried before name and email.
#[derive(Debug, Clone)]
pub struct StaticTable {
    entries: BTreeMap<String, String>,
    signal: SignalKind,
}

impl StaticTable {
    pub fn new(entries: &BTreeMap<String, String>, signal: SignalKind) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
                .collect(),
            signal,
        }
    }
}

#[async_trait]
impl AssigneeResolver for StaticTable {
    fn name(&self) -> &str {
        "static"
    }

    async fn resolve(&self, identity: &SourceIdentity) -> Option<AssigneeSignal> {
        let mut keys = identity.handles();
        keys.extend(identity.email.iter().map(|e| e.trim().to_lowercase()));

        let value = keys.iter().find_map(|k| self.entries.get(k))?.clone();
        Some(match self.signal {
            SignalKind::PersonId => AssigneeSignal::PersonId(value),
            SignalKind::DisplayName => AssigneeSignal::DisplayName(value),
            SignalKind::Email => AssigneeSignal::Email(value),
        })
    }
}

/// Where fuzzy matching draws candidate names from.
pub enum FuzzySource {
    /// A fixed allow-list of display names.
    Names(Vec<String>),
    /// Every person in the workspace directory.
    Directory(Arc<PersonDirectory>),
}

/// Substring match between the source handle and a display name.
///
/// A match is either the lower-cased handle containing the name or the name
/// containing the handle, so `mel` matches `Mel` and `lisa-dev` matches `Lisa`.
pub struct FuzzyContainment {
    source: FuzzySource,
}

impl FuzzyContainment {
    pub fn new(source: FuzzySource) -> Self {
        Self { source }
    }

    fn is_match(handle: &str, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        !name.is_empty() && (handle.contains(&name) || name.contains(handle))
    }
}

#[async_trait]
impl AssigneeResolver for FuzzyContainment {
    fn name(&self) -> &str {
        "fuzzy"
    }

    async fn resolve(&self, identity: &SourceIdentity) -> Option<AssigneeSignal> {
        let handles = identity.handles();
        if handles.is_empty() {
            return None;
        }

        match &self.source {
            FuzzySource::Names(names) => handles.iter().find_map(|handle| {
                names
                    .iter()
                    .find(|name| Self::is_match(handle, name))
                    .map(|name| AssigneeSignal::DisplayName(name.clone()))
            }),
            FuzzySource::Directory(directory) => {
                let persons = directory.persons().await;
                handles.iter().find_map(|handle| {
                    persons
                        .iter()
                        .find(|p| {
                            p.display_name
                                .as_deref()
                                .is_some_and(|name| Self::is_match(handle, name))
                        })
                        .map(|p| AssigneeSignal::PersonId(p.id.clone()))
                })
            }
        }
    }
}

/// Email equality against the workspace directory.
pub struct DirectoryLookup {
    directory: Arc<PersonDirectory>,
}

impl DirectoryLookup {
    pub fn new(directory: Arc<PersonDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AssigneeResolver for DirectoryLookup {
    fn name(&self) -> &str {
        "directory"
    }

    async fn resolve(&self, identity: &SourceIdentity) -> Option<AssigneeSignal> {
        let email = identity
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())?;

        self.directory
            .persons()
            .await
            .iter()
            .find(|p| {
                p.email
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
            })
            .map(|p| AssigneeSignal::PersonId(p.id.clone()))
    }
}

/// Tries strategies in order; first success wins.
#[derive(Default)]
pub struct AssigneeChain {
    strategies: Vec<Box<dyn AssigneeResolver>>,
}

impl AssigneeChain {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, strategy: Box<dyn AssigneeResolver>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Build the chain described by configuration.
    pub fn from_config(config: &AssigneeConfig, store: Arc<dyn WorkspaceStore>) -> Self {
        let directory = Arc::new(PersonDirectory::new(store));
        let mut chain = Self::new();
        for kind in &config.strategies {
            let strategy: Box<dyn AssigneeResolver> = match kind {
                StrategyKind::Static => Box::new(StaticTable::new(&config.table, config.table_signal)),
                StrategyKind::Fuzzy if config.fuzzy_names.is_empty() => Box::new(
                    FuzzyContainment::new(FuzzySource::Directory(Arc::clone(&directory))),
                ),
                StrategyKind::Fuzzy => Box::new(FuzzyContainment::new(FuzzySource::Names(
                    config.fuzzy_names.clone(),
                ))),
                StrategyKind::Directory => Box::new(DirectoryLookup::new(Arc::clone(&directory))),
            };
            chain = chain.with(strategy);
        }
        chain
    }
}

#[async_trait]
impl AssigneeResolver for AssigneeChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn resolve(&self, identity: &SourceIdentity) -> Option<AssigneeSignal> {
        for strategy in &self.strategies {
            if let Some(signal) = strategy.resolve(identity).await {
                debug!(strategy = strategy.name(), %identity, %signal, "assignee resolved");
                return Some(signal);
            }
        }
        debug!(%identity, "no assignee strategy matched");
        None
    }
}

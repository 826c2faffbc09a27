//! Status transition table.
//!
//! Maps a pull request or push event to the status change it implies. The
//! table is pure: the same [`TransitionEvent`] always yields the same
//! [`Transition`]. Status names come from the configured
//! [`StatusVocabulary`], never from event input.

use crate::config::{BranchConfig, StatusVocabulary};
use crate::extract::branch_from_ref;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::fmt;
use tracing::warn;

// ============================================================================
// Branch classification
// ============================================================================

/// Deployment role of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchClass {
    Development,
    Staging,
    Production,
    Untracked,
}

impl fmt::Display for BranchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
            Self::Untracked => "untracked",
        };
        f.write_str(name)
    }
}

/// Classifies branch names using the configured name sets.
///
/// Names are compared case-insensitively and may be globs (`release/*`).
#[derive(Debug, Clone)]
pub struct BranchClassifier {
    development: GlobSet,
    staging: GlobSet,
    production: GlobSet,
}

impl Default for BranchClassifier {
    fn default() -> Self {
        Self::new(&BranchConfig::default())
    }
}

impl BranchClassifier {
    pub fn new(config: &BranchConfig) -> Self {
        Self {
            development: build_set("development", &config.development),
            staging: build_set("staging", &config.staging),
            production: build_set("production", &config.production),
        }
    }

    /// Classify a branch name or a full `refs/heads/...` ref.
    pub fn classify(&self, branch: &str) -> BranchClass {
        let name = branch_from_ref(branch.trim()).to_lowercase();
        if self.production.is_match(&name) {
            BranchClass::Production
        } else if self.staging.is_match(&name) {
            BranchClass::Staging
        } else if self.development.is_match(&name) {
            BranchClass::Development
        } else {
            BranchClass::Untracked
        }
    }
}

fn build_set(class: &str, patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(&pattern.trim().to_lowercase()) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!(class, pattern, error = %e, "ignoring invalid branch pattern"),
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!(class, error = %e, "branch patterns failed to compile; class matches nothing");
        GlobSet::empty()
    })
}

// ============================================================================
// Events
// ============================================================================

/// Which kind of source-control event triggered the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    PullRequest,
    Push,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Opened,
    ReviewRequested,
    Closed,
    Merged,
    Pushed,
    Other(String),
}

impl EventAction {
    /// Parse a GitHub `action` field.
    pub fn parse(action: &str) -> Self {
        match action {
            "opened" => Self::Opened,
            "review_requested" => Self::ReviewRequested,
            "closed" => Self::Closed,
            "merged" => Self::Merged,
            "pushed" => Self::Pushed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened => f.write_str("opened"),
            Self::ReviewRequested => f.write_str("review_requested"),
            Self::Closed => f.write_str("closed"),
            Self::Merged => f.write_str("merged"),
            Self::Pushed => f.write_str("pushed"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

/// Input to the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    pub source: EventSource,
    pub action: EventAction,
    pub target_class: BranchClass,
    pub merged: bool,
}

impl TransitionEvent {
    pub fn pull_request(action: EventAction, target_class: BranchClass, merged: bool) -> Self {
        Self {
            source: EventSource::PullRequest,
            action,
            target_class,
            merged,
        }
    }

    pub fn push(target_class: BranchClass) -> Self {
        Self {
            source: EventSource::Push,
            action: EventAction::Pushed,
            target_class,
            merged: false,
        }
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// A workspace status name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Status(String);

impl Status {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a raw status value read from the store names this status.
    pub fn matches(&self, raw: Option<&str>) -> bool {
        raw == Some(self.0.as_str())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Status {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Why an event produces no status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NoOpReason {
    ClosedWithoutMerge,
    DeploymentRequest { target: BranchClass },
    UntrackedTarget,
    DevelopmentPush,
    UntrackedPush,
    UnhandledAction { action: String },
}

impl fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClosedWithoutMerge => f.write_str("pull request closed without merge"),
            Self::DeploymentRequest { target } => write!(
                f,
                "pull request targets a {target} branch; deployment requests do not change item status"
            ),
            Self::UntrackedTarget => f.write_str("pull request targets an untracked branch"),
            Self::DevelopmentPush => f.write_str(
                "direct push to a development branch; pull requests own status changes",
            ),
            Self::UntrackedPush => f.write_str("push to a branch with no configured status change"),
            Self::UnhandledAction { action } => write!(f, "unhandled action '{action}'"),
        }
    }
}

/// The status change an event implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// Move the single matching item to this status.
    SetStatus { status: Status },
    /// Move every item currently in `from` to `to`.
    BulkMove { from: Vec<Status>, to: Status },
    NoOp(NoOpReason),
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp(_))
    }
}

/// The canonical event → status mapping.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    statuses: StatusVocabulary,
    assignee_scoped: bool,
}

impl TransitionTable {
    pub fn new(statuses: StatusVocabulary) -> Self {
        Self {
            statuses,
            assignee_scoped: false,
        }
    }

    /// Production pushes scoped to one assignee also sweep up items still in UAT.
    #[must_use]
    pub fn with_assignee_scope(mut self, scoped: bool) -> Self {
        self.assignee_scoped = scoped;
        self
    }

    /// Resolve the transition for an event.
    pub fn resolve(&self, event: &TransitionEvent) -> Transition {
        match event.source {
            EventSource::PullRequest => self.resolve_pull_request(event),
            EventSource::Push => self.resolve_push(event.target_class),
        }
    }

    fn resolve_pull_request(&self, event: &TransitionEvent) -> Transition {
        let s = &self.statuses;

        if event.action == EventAction::Closed && !event.merged {
            return Transition::NoOp(NoOpReason::ClosedWithoutMerge);
        }

        match event.target_class {
            BranchClass::Staging | BranchClass::Production => {
                return Transition::NoOp(NoOpReason::DeploymentRequest {
                    target: event.target_class,
                })
            }
            BranchClass::Untracked => return Transition::NoOp(NoOpReason::UntrackedTarget),
            BranchClass::Development => {}
        }

        let status = match &event.action {
            EventAction::Opened => &s.in_progress,
            EventAction::ReviewRequested => &s.in_code_review,
            EventAction::Closed | EventAction::Merged => &s.in_dev,
            other => {
                return Transition::NoOp(NoOpReason::UnhandledAction {
                    action: other.to_string(),
                })
            }
        };

        Transition::SetStatus {
            status: Status::new(status.as_str()),
        }
    }

    fn resolve_push(&self, class: BranchClass) -> Transition {
        let s = &self.statuses;
        match class {
            BranchClass::Staging => Transition::BulkMove {
                from: vec![
                    Status::new(s.in_dev.as_str()),
                    Status::new(s.failed_in_dev.as_str()),
                    Status::new(s.ready_for_uat.as_str()),
                ],
                to: Status::new(s.in_uat.as_str()),
            },
            BranchClass::Production => {
                let mut from = Vec::with_capacity(2);
                if self.assignee_scoped {
                    from.push(Status::new(s.in_uat.as_str()));
                }
                from.push(Status::new(s.passed_uat.as_str()));
                Transition::BulkMove {
                    from,
                    to: Status::new(s.live_in_prod.as_str()),
                }
            }
            BranchClass::Development => Transition::NoOp(NoOpReason::DevelopmentPush),
            BranchClass::Untracked => Transition::NoOp(NoOpReason::UntrackedPush),
        }
    }
}

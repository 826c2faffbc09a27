//! GitHub webhook payloads.
//!
//! Only the fields the engine acts on are deserialized; everything else in
//! the payload is ignored.

use crate::assignee::SourceIdentity;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// A pull request event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: Option<u64>,
    pub title: String,
    pub head_branch: String,
    pub base_branch: String,
    pub merged: bool,
    /// Logins assigned to the request; carried into the run report.
    pub assignees: Vec<String>,
}

/// A branch push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushEvent {
    /// Full ref, e.g. `refs/heads/uat`.
    pub git_ref: String,
    pub pusher: SourceIdentity,
    pub commit_count: usize,
}

/// A trigger from source control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
pub enum SourceEvent {
    PullRequest(PullRequestEvent),
    Push(PushEvent),
    Unsupported(String),
}

// Wire shapes.

#[derive(Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Deserialize)]
struct RawRef {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Deserialize)]
struct RawPullRequest {
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    merged: Option<bool>,
    head: RawRef,
    base: RawRef,
    #[serde(default)]
    assignees: Vec<RawUser>,
}

#[derive(Deserialize)]
struct RawPullRequestPayload {
    action: String,
    #[serde(default)]
    number: Option<u64>,
    pull_request: RawPullRequest,
}

#[derive(Deserialize)]
struct RawPusher {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    pusher: Option<RawPusher>,
    #[serde(default)]
    sender: Option<RawUser>,
    #[serde(default)]
    commits: Vec<Value>,
}

impl SourceEvent {
    /// Parse a webhook payload for the named event.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Payload`] when a supported event lacks required
    /// fields.
    pub fn from_payload(event_name: &str, payload: &Value) -> Result<Self> {
        let malformed = |e: serde_json::Error| SyncError::payload(event_name, e.to_string());

        match event_name {
            "pull_request" | "pull_request_target" => {
                let raw: RawPullRequestPayload =
                    serde_json::from_value(payload.clone()).map_err(malformed)?;
                let pr = raw.pull_request;
                Ok(Self::PullRequest(PullRequestEvent {
                    action: raw.action,
                    number: raw.number.or(pr.number),
                    title: pr.title.unwrap_or_default(),
                    head_branch: pr.head.git_ref,
                    base_branch: pr.base.git_ref,
                    merged: pr.merged.unwrap_or(false),
                    assignees: pr.assignees.into_iter().map(|u| u.login).collect(),
                }))
            }
            "push" => {
                let raw: RawPushPayload = serde_json::from_value(payload.clone()).map_err(malformed)?;
                let pusher = raw.pusher.unwrap_or(RawPusher {
                    name: None,
                    email: None,
                });
                Ok(Self::Push(PushEvent {
                    git_ref: raw.git_ref,
                    pusher: SourceIdentity {
                        login: raw.sender.map(|s| s.login),
                        name: pusher.name,
                        email: pusher.email,
                    },
                    commit_count: raw.commits.len(),
                }))
            }
            other => Ok(Self::Unsupported(other.to_string())),
        }
    }

    /// Read and parse a payload file, as GitHub Actions provides it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Payload`] if the file is unreadable or malformed.
    pub fn from_file(event_name: &str, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::payload(event_name, format!("cannot read {}: {e}", path.display()))
        })?;
        let payload: Value = serde_json::from_str(&content)
            .map_err(|e| SyncError::payload(event_name, e.to_string()))?;
        Self::from_payload(event_name, &payload)
    }

    /// Event name as GitHub spells it.
    pub fn name(&self) -> &str {
        match self {
            Self::PullRequest(_) => "pull_request",
            Self::Push(_) => "push",
            Self::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for SourceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PullRequest(pr) => {
                write!(f, "pull_request {}", pr.action)?;
                if let Some(n) = pr.number {
                    write!(f, " #{n}")?;
                }
                write!(f, " {} -> {}", pr.head_branch, pr.base_branch)?;
                if pr.merged {
                    f.write_str(" (merged)")?;
                }
                if !pr.assignees.is_empty() {
                    write!(f, " assigned to {}", pr.assignees.join(", "))?;
                }
                Ok(())
            }
            Self::Push(push) => write!(
                f,
                "push {} by {} ({} commits)",
                push.git_ref, push.pusher, push.commit_count
            ),
            Self::Unsupported(name) => write!(f, "{name} (unsupported)"),
        }
    }
}

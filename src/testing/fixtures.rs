//! Canned events, payloads and stores.
//!
//! Shared by unit tests and the integration tests under `tests/`.

use super::mocks::{MockItem, MockWorkspaceStore};
use crate::assignee::SourceIdentity;
use crate::event::{PullRequestEvent, PushEvent, SourceEvent};
use crate::store::PersonRef;
use serde_json::{json, Value};

/// A GitHub `pull_request` payload. The request is number 7 and assigned to
/// `octocat`.
pub fn pull_request_payload(action: &str, head: &str, base: &str, merged: bool) -> Value {
    json!({
        "action": action,
        "number": 7,
        "pull_request": {
            "number": 7,
            "title": format!("Work on {head}"),
            "merged": merged,
            "head": { "ref": head },
            "base": { "ref": base },
            "user": { "login": "octocat" },
            "assignees": [{ "login": "octocat" }]
        },
        "sender": { "login": "octocat" }
    })
}

/// A GitHub `push` payload with one commit.
pub fn push_payload(git_ref: &str, pusher: &str, email: &str) -> Value {
    json!({
        "ref": git_ref,
        "pusher": { "name": pusher, "email": email },
        "sender": { "login": pusher },
        "commits": [{ "id": "0f1e2d", "message": "deploy" }]
    })
}

pub fn pull_request(action: &str, head: &str, base: &str, merged: bool) -> SourceEvent {
    SourceEvent::PullRequest(PullRequestEvent {
        action: action.to_string(),
        number: Some(7),
        title: format!("Work on {head}"),
        head_branch: head.to_string(),
        base_branch: base.to_string(),
        merged,
        assignees: vec!["octocat".to_string()],
    })
}

pub fn push(git_ref: &str, pusher: &str, email: &str) -> SourceEvent {
    SourceEvent::Push(PushEvent {
        git_ref: git_ref.to_string(),
        pusher: SourceIdentity {
            login: Some(pusher.to_string()),
            name: Some(pusher.to_string()),
            email: Some(email.to_string()),
        },
        commit_count: 1,
    })
}

/// One item, `abc`, task 42, in code review.
pub fn code_review_store() -> MockWorkspaceStore {
    MockWorkspaceStore::new().with_item(
        MockItem::new("abc")
            .task_id(42)
            .title("Login page")
            .status("In Code Review"),
    )
}

/// Items `in-dev`, `ready` and `passed` at the three pre-release stages.
pub fn uat_store() -> MockWorkspaceStore {
    MockWorkspaceStore::new()
        .with_item(MockItem::new("in-dev").task_id(1).status("In Dev"))
        .with_item(MockItem::new("ready").task_id(2).status("Ready for UAT"))
        .with_item(MockItem::new("passed").task_id(3).status("Passed UAT"))
}

/// Two developers, Mel and Lisa, each with one item in `In Dev`.
pub fn team_uat_store() -> MockWorkspaceStore {
    let mel = PersonRef {
        id: "u-mel".to_string(),
        name: Some("Mel".to_string()),
        email: Some("mel@example.com".to_string()),
    };
    let lisa = PersonRef {
        id: "u-lisa".to_string(),
        name: Some("Lisa".to_string()),
        email: Some("lisa@example.com".to_string()),
    };

    MockWorkspaceStore::new()
        .with_person("u-mel", "Mel", "mel@example.com")
        .with_person("u-lisa", "Lisa", "lisa@example.com")
        .with_item(MockItem::new("mel-task").task_id(10).status("In Dev").assignee(mel))
        .with_item(MockItem::new("lisa-task").task_id(11).status("In Dev").assignee(lisa))
}

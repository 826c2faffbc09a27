//! Run reports.
//!
//! Every invocation produces one [`SyncReport`], whether it updated items,
//! skipped the event, or degraded along the way.

use crate::error::Result;
use crate::event::SourceEvent;
use crate::migrate::{ItemOutcome, ItemResult, MigrationReport};
use crate::transition::{NoOpReason, Transition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Why an event led to no update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "skip", rename_all = "snake_case")]
pub enum SkipReason {
    UnsupportedEvent { name: String },
    /// The branch does not start with an approved prefix.
    UnsupportedBranch { branch: String },
    /// The branch is supported but yields no identifier.
    NoCandidate { branch: String },
    /// Every lookup missed.
    NotFound { tried: Vec<String> },
    NoOp { reason: NoOpReason },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedEvent { name } => write!(f, "event '{name}' is not handled"),
            Self::UnsupportedBranch { branch } => {
                write!(f, "unsupported branch name '{branch}'")
            }
            Self::NoCandidate { branch } => {
                write!(f, "no task identifier in branch '{branch}'")
            }
            Self::NotFound { tried } if tried.is_empty() => f.write_str("no matching task"),
            Self::NotFound { tried } => write!(f, "no task matches {}", tried.join(", ")),
            Self::NoOp { reason } => write!(f, "{reason}"),
        }
    }
}

/// Summary of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub event: String,
    pub dry_run: bool,
    pub transition: Option<Transition>,
    /// Items the lookups returned.
    pub found: usize,
    pub results: Vec<ItemResult>,
    pub skip: Option<SkipReason>,
    /// Fallbacks and degradations, in the order they happened.
    pub notes: Vec<String>,
}

impl SyncReport {
    pub fn new(event: &SourceEvent) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            event: event.to_string(),
            dry_run: false,
            transition: None,
            found: 0,
            results: Vec::new(),
            skip: None,
            notes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn skipped(mut self, reason: SkipReason) -> Self {
        self.skip = Some(reason);
        self
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Fold a bulk move into the report.
    pub fn absorb(&mut self, migration: MigrationReport) {
        self.found += migration.found;
        if let Some(reason) = migration.degraded {
            self.note(format!("assignee narrowing skipped: {reason}"));
        }
        if migration.off_set > 0 {
            self.note(format!(
                "{} returned item(s) outside the candidate statuses were left alone",
                migration.off_set
            ));
        }
        if migration.filtered_out > 0 {
            self.note(format!(
                "{} item(s) excluded as not feature related",
                migration.filtered_out
            ));
        }
        self.results.extend(migration.results);
    }

    pub fn updated(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == ItemOutcome::Updated)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Failed(_)))
            .count()
    }

    pub fn is_skipped(&self) -> bool {
        self.skip.is_some()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {} ({})", self.run_id, self.started_at.to_rfc3339())?;
        writeln!(f, "event: {}", self.event)?;
        if self.dry_run {
            writeln!(f, "mode: dry run")?;
        }
        match &self.transition {
            Some(Transition::SetStatus { status }) => writeln!(f, "transition: set '{status}'")?,
            Some(Transition::BulkMove { from, to }) => {
                let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
                writeln!(f, "transition: {} -> '{to}'", from.join(" | "))?;
            }
            Some(Transition::NoOp(_)) | None => {}
        }
        if let Some(skip) = &self.skip {
            writeln!(f, "skipped: {skip}")?;
        }
        for note in &self.notes {
            writeln!(f, "note: {note}")?;
        }
        for result in &self.results {
            let previous = result.previous.as_deref().unwrap_or("<unset>");
            writeln!(
                f,
                "  {} [{}] {}: {}",
                result.item_id, previous, result.title, result.outcome
            )?;
        }
        write!(
            f,
            "found {}, updated {}, failed {}",
            self.found,
            self.updated(),
            self.failed()
        )
    }
}

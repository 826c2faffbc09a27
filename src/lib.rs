//! ticket-sync - Notion task status driven by GitHub events
//!
//! Maps pull request and push events to status changes on tasks in a Notion
//! database: a pull request moves its own task through review, and a push to
//! a deployment branch moves every qualifying task forward in one sweep.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`extract`] - Task identifiers from branch names and titles
//! - [`transition`] - Branch classification and the event → status table
//! - [`store`] - Workspace store capability, filter algebra, Notion adapter
//! - [`resolver`] - Work-item lookups with schema-driven filters
//! - [`assignee`] - Source identity → workspace identity strategies
//! - [`migrate`] - Sequential bulk status moves with per-item outcomes
//! - [`event`] - GitHub webhook payloads
//! - [`sync`] - The orchestrator tying the above together
//! - [`report`] - Run reports
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Mock store, fixtures and assertions
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ticket_sync::{NotionCredentials, NotionStore, SourceEvent, SyncConfig, SyncOrchestrator};
//!
//! let config = SyncConfig::default();
//! let store = NotionStore::new(&NotionCredentials::from_env()?, config.notion.clone(), config.properties.clone())?;
//! let event = SourceEvent::from_file("push", "event.json".as_ref())?;
//!
//! let report = SyncOrchestrator::new(config, Arc::new(store)).handle(&event).await?;
//! println!("{report}");
//! ```

pub mod assignee;
pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod migrate;
pub mod report;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod testing;
pub mod transition;

// Re-export commonly used types
pub use error::{IntoSyncError, Result, SyncError};

pub use config::{ConfigSource, NotionCredentials, SyncConfig};
pub use event::SourceEvent;
pub use extract::{CandidateId, IdentifierExtractor};
pub use migrate::{AssigneeScope, BulkMigrationEngine, ItemOutcome, MigrationPlan, MigrationReport};
pub use report::{SkipReason, SyncReport};
pub use resolver::WorkItemResolver;
pub use store::{NotionStore, WorkItem, WorkspaceStore};
pub use sync::SyncOrchestrator;
pub use transition::{BranchClass, BranchClassifier, Status, Transition, TransitionTable};

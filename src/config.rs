//! Configuration management for ticket-sync.
//!
//! Settings live in a TOML file; credentials and the triggering event come
//! from the environment the CI runner provides.
//!
//! # Example ticket-sync.toml
//!
//! ```toml
//! [branches]
//! approved_prefixes = ["feature", "fix", "hotfix"]
//! digit_run = "last"
//! staging = ["uat", "release/*"]
//!
//! [assignees]
//! strategies = ["static", "directory"]
//!
//! [assignees.table]
//! octocat = "Mona Lisa"
//!
//! [push]
//! scope_to_pusher = true
//! ```

use crate::error::{IntoSyncError, Result, SyncError};
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// File name searched for in the working directory.
pub const CONFIG_FILE_NAME: &str = "ticket-sync.toml";

/// Environment variable holding the Notion integration token.
pub const ENV_NOTION_API_KEY: &str = "NOTION_API_KEY";

/// Environment variable holding the Notion database id.
pub const ENV_NOTION_DATABASE_ID: &str = "NOTION_DATABASE_ID";

/// Environment variable GitHub Actions sets to the triggering event name.
pub const ENV_GITHUB_EVENT_NAME: &str = "GITHUB_EVENT_NAME";

/// Environment variable GitHub Actions sets to the event payload path.
pub const ENV_GITHUB_EVENT_PATH: &str = "GITHUB_EVENT_PATH";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub branches: BranchConfig,

    #[serde(default)]
    pub statuses: StatusVocabulary,

    #[serde(default)]
    pub properties: PropertyNames,

    #[serde(default)]
    pub assignees: AssigneeConfig,

    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub lookup: LookupConfig,

    #[serde(default)]
    pub notion: NotionSettings,
}

// ============================================================================
// Branches
// ============================================================================

/// Which digit run of a branch name is taken as the numeric task id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitRunMode {
    /// `feature/TES-76S-2` yields 2.
    #[default]
    Last,
    /// `feature/TES-76S-2` yields 76.
    First,
}

/// Whether a branch must start with an approved prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixMode {
    #[default]
    Required,
    /// Any text before the first `/` is accepted, and so is a bare name.
    Any,
}

/// Branch naming rules shared by the extractor and the transition table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    #[serde(default = "default_approved_prefixes")]
    pub approved_prefixes: Vec<String>,

    #[serde(default)]
    pub digit_run: DigitRunMode,

    #[serde(default)]
    pub prefix_mode: PrefixMode,

    /// Branch names (or globs) whose requests drive individual status changes.
    #[serde(default = "default_development_branches")]
    pub development: Vec<String>,

    /// Branch names (or globs) that represent the UAT environment.
    #[serde(default = "default_staging_branches")]
    pub staging: Vec<String>,

    /// Branch names (or globs) that represent production.
    #[serde(default = "default_production_branches")]
    pub production: Vec<String>,
}

fn default_approved_prefixes() -> Vec<String> {
    [
        "feature", "fix", "hotfix", "bugfix", "chore", "docs", "style", "refactor", "test",
        "release",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_development_branches() -> Vec<String> {
    vec!["dev".into(), "development".into(), "main".into()]
}

fn default_staging_branches() -> Vec<String> {
    vec!["uat".into()]
}

fn default_production_branches() -> Vec<String> {
    vec!["production".into()]
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            approved_prefixes: default_approved_prefixes(),
            digit_run: DigitRunMode::default(),
            prefix_mode: PrefixMode::default(),
            development: default_development_branches(),
            staging: default_staging_branches(),
            production: default_production_branches(),
        }
    }
}

// ============================================================================
// Statuses
// ============================================================================

/// Literal status names written to the workspace.
///
/// These strings are part of the workspace contract and must match the
/// database options exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusVocabulary {
    #[serde(default = "default_in_progress")]
    pub in_progress: String,
    #[serde(default = "default_in_code_review")]
    pub in_code_review: String,
    #[serde(default = "default_in_dev")]
    pub in_dev: String,
    #[serde(default = "default_failed_in_dev")]
    pub failed_in_dev: String,
    #[serde(default = "default_ready_for_uat")]
    pub ready_for_uat: String,
    #[serde(default = "default_in_uat")]
    pub in_uat: String,
    #[serde(default = "default_passed_uat")]
    pub passed_uat: String,
    #[serde(default = "default_live_in_prod")]
    pub live_in_prod: String,
}

fn default_in_progress() -> String {
    "In Progress".to_string()
}
fn default_in_code_review() -> String {
    "In Code Review".to_string()
}
fn default_in_dev() -> String {
    "In Dev".to_string()
}
fn default_failed_in_dev() -> String {
    "Failed in Dev".to_string()
}
fn default_ready_for_uat() -> String {
    "Ready for UAT".to_string()
}
fn default_in_uat() -> String {
    "In UAT".to_string()
}
fn default_passed_uat() -> String {
    "Passed UAT".to_string()
}
fn default_live_in_prod() -> String {
    "Live in Prod".to_string()
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        Self {
            in_progress: default_in_progress(),
            in_code_review: default_in_code_review(),
            in_dev: default_in_dev(),
            failed_in_dev: default_failed_in_dev(),
            ready_for_uat: default_ready_for_uat(),
            in_uat: default_in_uat(),
            passed_uat: default_passed_uat(),
            live_in_prod: default_live_in_prod(),
        }
    }
}

impl StatusVocabulary {
    /// All configured names with their key, in lifecycle order.
    pub fn entries(&self) -> [(&'static str, &str); 8] {
        [
            ("in_progress", &self.in_progress),
            ("in_code_review", &self.in_code_review),
            ("in_dev", &self.in_dev),
            ("failed_in_dev", &self.failed_in_dev),
            ("ready_for_uat", &self.ready_for_uat),
            ("in_uat", &self.in_uat),
            ("passed_uat", &self.passed_uat),
            ("live_in_prod", &self.live_in_prod),
        ]
    }
}

// ============================================================================
// Properties
// ============================================================================

/// Names of the database properties the engine reads or filters on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyNames {
    #[serde(default = "default_task_id_property")]
    pub task_id: String,
    #[serde(default = "default_status_property")]
    pub status: String,
    #[serde(default = "default_assignee_property")]
    pub assignee: String,
    #[serde(default = "default_title_property")]
    pub title: String,
    /// Optional free-text property holding the branch name.
    #[serde(default = "default_branch_ref_property")]
    pub branch_ref: Option<String>,
}

fn default_task_id_property() -> String {
    "Task ID".to_string()
}
fn default_status_property() -> String {
    "Status".to_string()
}
fn default_assignee_property() -> String {
    "Assignee".to_string()
}
fn default_title_property() -> String {
    "Name".to_string()
}
fn default_branch_ref_property() -> Option<String> {
    Some("Branch Name".to_string())
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            task_id: default_task_id_property(),
            status: default_status_property(),
            assignee: default_assignee_property(),
            title: default_title_property(),
            branch_ref: default_branch_ref_property(),
        }
    }
}

// ============================================================================
// Assignees
// ============================================================================

/// One assignee matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Exact lookup in `assignees.table`.
    Static,
    /// Substring match against display names.
    Fuzzy,
    /// Email lookup against the workspace user directory.
    Directory,
}

/// What the values of the static table represent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    PersonId,
    #[default]
    DisplayName,
    Email,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssigneeConfig {
    /// Strategies tried in order; the first match wins.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,

    /// GitHub login to workspace identity.
    #[serde(default)]
    pub table: BTreeMap<String, String>,

    #[serde(default)]
    pub table_signal: SignalKind,

    /// Display names eligible for fuzzy matching. Empty means the directory.
    #[serde(default)]
    pub fuzzy_names: Vec<String>,
}

fn default_strategies() -> Vec<StrategyKind> {
    vec![StrategyKind::Directory]
}

impl Default for AssigneeConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            table: BTreeMap::new(),
            table_signal: SignalKind::default(),
            fuzzy_names: Vec::new(),
        }
    }
}

// ============================================================================
// Push and lookup behaviour
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    /// Only move items assigned to the person who pushed.
    #[serde(default)]
    pub scope_to_pusher: bool,

    /// Only move items whose title or branch mentions `feature/`.
    #[serde(default)]
    pub feature_filter: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupConfig {
    /// After the id chain misses, look the branch up in the branch property.
    #[serde(default)]
    pub branch_ref_fallback: bool,

    /// As a last resort, match on the cleaned pull request title.
    #[serde(default)]
    pub title_fallback: bool,
}

// ============================================================================
// Notion
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionSettings {
    #[serde(default = "default_notion_api_url")]
    pub api_url: String,
    #[serde(default = "default_notion_version")]
    pub version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_notion_api_url() -> String {
    "https://api.notion.com/v1".to_string()
}
fn default_notion_version() -> String {
    "2022-06-28".to_string()
}
fn default_timeout_secs() -> u64 {
    20
}
/// Largest page Notion accepts for database queries and user listing.
pub const NOTION_MAX_PAGE_SIZE: u32 = 100;

fn default_page_size() -> u32 {
    NOTION_MAX_PAGE_SIZE
}

impl Default for NotionSettings {
    fn default() -> Self {
        Self {
            api_url: default_notion_api_url(),
            version: default_notion_version(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

/// Secrets needed to reach the workspace database.
#[derive(Clone)]
pub struct NotionCredentials {
    pub api_key: String,
    pub database_id: String,
}

impl std::fmt::Debug for NotionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionCredentials")
            .field("api_key", &"<redacted>")
            .field("database_id", &self.database_id)
            .finish()
    }
}

impl NotionCredentials {
    /// Read credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MissingCredential`] when either variable is unset
    /// or blank.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| SyncError::MissingCredential {
                    name: name.to_string(),
                })
        };
        Ok(Self {
            api_key: read(ENV_NOTION_API_KEY)?,
            database_id: read(ENV_NOTION_DATABASE_ID)?,
        })
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Where a configuration was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => write!(f, "built-in defaults"),
        }
    }
}

impl SyncConfig {
    /// Candidate configuration paths, most specific first.
    pub fn search_paths(explicit: Option<&Path>, working_dir: &Path) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = explicit {
            paths.push(path.to_path_buf());
        }
        paths.push(working_dir.join(CONFIG_FILE_NAME));
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("ticket-sync").join("config.toml"));
        }
        paths
    }

    /// Load configuration from the first existing search path.
    ///
    /// An explicit path that does not exist is an error; the implicit
    /// locations fall through to defaults.
    pub fn load(explicit: Option<&Path>, working_dir: &Path) -> Result<(Self, ConfigSource)> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(SyncError::config_with_path(
                    "config file does not exist",
                    path.to_path_buf(),
                ));
            }
        }

        for path in Self::search_paths(explicit, working_dir) {
            if path.is_file() {
                let config = Self::from_file(&path)?;
                return Ok((config, ConfigSource::File(path)));
            }
        }

        Ok((Self::default(), ConfigSource::Defaults))
    }

    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::config_with_path(e.to_string(), path.to_path_buf()))?;
        Self::from_toml(&content)
            .map_err(|e| SyncError::config_with_path(e.to_string(), path.to_path_buf()))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).into_sync_config()
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).into_sync_config()
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> Result<()> {
        if self.branches.prefix_mode == PrefixMode::Required
            && self.branches.approved_prefixes.iter().all(|p| p.trim().is_empty())
        {
            return Err(invalid(
                "branches.approved_prefixes",
                "at least one prefix is required when prefix_mode = \"required\"",
            ));
        }

        let mut owner: HashMap<String, &str> = HashMap::new();
        for (class, names) in [
            ("development", &self.branches.development),
            ("staging", &self.branches.staging),
            ("production", &self.branches.production),
        ] {
            for name in names {
                Glob::new(&name.to_lowercase()).map_err(|e| {
                    invalid(&format!("branches.{class}"), &format!("'{name}': {e}"))
                })?;
                if let Some(previous) = owner.insert(name.to_lowercase(), class) {
                    if previous != class {
                        return Err(invalid(
                            &format!("branches.{class}"),
                            &format!("'{name}' is also listed under {previous}"),
                        ));
                    }
                }
            }
        }

        for (key, value) in self.statuses.entries() {
            if value.trim().is_empty() {
                return Err(invalid(&format!("statuses.{key}"), "status name is empty"));
            }
        }

        if !(1..=NOTION_MAX_PAGE_SIZE).contains(&self.notion.page_size) {
            return Err(invalid(
                "notion.page_size",
                &format!("must be between 1 and {NOTION_MAX_PAGE_SIZE}"),
            ));
        }

        if self.push.scope_to_pusher && self.assignees.strategies.is_empty() {
            return Err(invalid(
                "assignees.strategies",
                "push.scope_to_pusher needs at least one strategy",
            ));
        }

        if self.assignees.strategies.contains(&StrategyKind::Static)
            && self.assignees.table.is_empty()
        {
            return Err(invalid(
                "assignees.table",
                "the static strategy is enabled but the table is empty",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> SyncError {
    SyncError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_workspace_vocabulary() {
        let config = SyncConfig::default();
        assert_eq!(config.statuses.in_progress, "In Progress");
        assert_eq!(config.statuses.live_in_prod, "Live in Prod");
        assert_eq!(config.properties.task_id, "Task ID");
        assert_eq!(config.branches.digit_run, DigitRunMode::Last);
        assert_eq!(config.branches.approved_prefixes.len(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml(
            r#"
            [branches]
            digit_run = "first"
            staging = ["uat", "release/*"]

            [push]
            scope_to_pusher = true
            "#,
        )
        .unwrap();

        assert_eq!(config.branches.digit_run, DigitRunMode::First);
        assert_eq!(config.branches.staging, vec!["uat", "release/*"]);
        assert_eq!(config.branches.production, vec!["production"]);
        assert!(config.push.scope_to_pusher);
        assert_eq!(config.statuses.in_uat, "In UAT");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = SyncConfig::from_toml("[branches\n").unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    #[test]
    fn test_validate_rejects_overlapping_classes() {
        let mut config = SyncConfig::default();
        config.branches.staging.push("Main".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("also listed under development"));
    }

    #[test]
    fn test_validate_rejects_empty_status() {
        let mut config = SyncConfig::default();
        config.statuses.in_uat = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_static_strategy_without_table() {
        let mut config = SyncConfig::default();
        config.assignees.strategies = vec![StrategyKind::Static];
        assert!(config.validate().is_err());
        config.assignees.table.insert("octocat".into(), "Mona".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bounds_page_size() {
        let mut config = SyncConfig::default();
        config.notion.page_size = 101;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("notion.page_size"));
        config.notion.page_size = 0;
        assert!(config.validate().is_err());
        config.notion.page_size = 25;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_prefixes_in_required_mode() {
        let mut config = SyncConfig::default();
        config.branches.approved_prefixes.clear();
        assert!(config.validate().is_err());
        config.branches.prefix_mode = PrefixMode::Any;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_credentials_from_lookup() {
        let creds = NotionCredentials::from_lookup(|name| match name {
            ENV_NOTION_API_KEY => Some(" secret ".into()),
            ENV_NOTION_DATABASE_ID => Some("db".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(creds.api_key, "secret");
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn test_credentials_missing_is_fatal() {
        let err = NotionCredentials::from_lookup(|name| match name {
            ENV_NOTION_API_KEY => Some("secret".into()),
            _ => Some("   ".into()),
        })
        .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains(ENV_NOTION_DATABASE_ID));
    }

    #[test]
    fn test_load_prefers_working_dir_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[statuses]\nin_dev = \"Merged\"\n",
        )
        .unwrap();

        let (config, source) = SyncConfig::load(None, temp.path()).unwrap();
        assert_eq!(config.statuses.in_dev, "Merged");
        assert_eq!(source, ConfigSource::File(temp.path().join(CONFIG_FILE_NAME)));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(SyncConfig::load(Some(&missing), temp.path()).is_err());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = SyncConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = SyncConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.statuses.ready_for_uat, "Ready for UAT");
    }
}

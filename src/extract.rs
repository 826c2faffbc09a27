//! Identifier extraction from branch names and pull request titles.
//!
//! Branch names are matched against the configured approved prefixes
//! (`feature/`, `fix/`, ...). Everything after the prefix is the remainder the
//! numeric and composite rules run over. A branch without an approved prefix
//! yields nothing; callers report that as an unsupported branch name.

use crate::config::{BranchConfig, DigitRunMode, PrefixMode};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("digit run regex is valid"));

static LEADING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[[^\]]*\]\s*").expect("leading tag regex is valid"));

static TRAILING_PAREN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^()]*\)\s*$").expect("trailing paren regex is valid"));

static TRAILING_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*#[0-9]+\s*$").expect("trailing ref regex is valid"));

static REQUEST_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([0-9]+)").expect("request ref regex is valid"));

/// Ordered composite-key rules applied to the branch remainder. First match wins.
static COMPOSITE_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^([A-Za-z]+-[A-Za-z0-9]+-[0-9]+)$",
        r"^([A-Za-z]+-[0-9]+)$",
        r"^([0-9]+)$",
        r"^(.+)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("composite rule regex is valid"))
    .collect()
});

/// A candidate work-item identifier derived from a branch or title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CandidateId {
    /// A bare task number, e.g. `5694`.
    Numeric(u64),
    /// Text that may embed a project prefix, e.g. `TES-76S-2`.
    Composite(String),
    /// Unparsed branch or title text.
    Raw(String),
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Composite(s) => write!(f, "{s}"),
            Self::Raw(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Extracts candidate identifiers according to the branch configuration.
#[derive(Debug, Clone)]
pub struct IdentifierExtractor {
    prefixed: Option<Regex>,
    prefix_mode: PrefixMode,
    digit_run: DigitRunMode,
}

impl Default for IdentifierExtractor {
    fn default() -> Self {
        Self::new(&BranchConfig::default())
    }
}

impl IdentifierExtractor {
    /// Build an extractor for the given branch rules.
    pub fn new(config: &BranchConfig) -> Self {
        let alternatives: Vec<String> = config
            .approved_prefixes
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(regex::escape)
            .collect();

        // Escaped literals always form a valid pattern.
        let prefixed = (!alternatives.is_empty())
            .then(|| Regex::new(&format!(r"(?i)^(?:{})/(.+)$", alternatives.join("|"))).ok())
            .flatten();

        Self {
            prefixed,
            prefix_mode: config.prefix_mode,
            digit_run: config.digit_run,
        }
    }

    /// The part of a branch name after its approved prefix.
    pub fn branch_remainder<'a>(&self, branch: &'a str) -> Option<&'a str> {
        let branch = branch.trim();
        if let Some(rest) = self
            .prefixed
            .as_ref()
            .and_then(|re| re.captures(branch))
            .and_then(|caps| caps.get(1))
        {
            return Some(rest.as_str());
        }

        match self.prefix_mode {
            PrefixMode::Required => None,
            PrefixMode::Any => {
                let rest = branch.split_once('/').map_or(branch, |(_, rest)| rest);
                (!rest.is_empty()).then_some(rest)
            }
        }
    }

    /// Whether the branch name is one the extractor accepts at all.
    pub fn is_supported(&self, branch: &str) -> bool {
        self.branch_remainder(branch).is_some()
    }

    /// Numeric task id from a branch name.
    ///
    /// `feature/TES-76S-2` → 2, `feature/GEN-5694` → 5694, `wip/42` → none.
    pub fn extract_numeric_id(&self, branch: &str) -> Option<u64> {
        let rest = self.branch_remainder(branch)?;
        let mut runs = DIGIT_RUN.find_iter(rest);
        let run = match self.digit_run {
            DigitRunMode::Last => runs.last(),
            DigitRunMode::First => runs.next(),
        }?;

        match run.as_str().parse() {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(branch, run = run.as_str(), error = %e, "digit run does not fit a task id");
                None
            }
        }
    }

    /// Composite key from a branch name, e.g. `TES-76S-2` from `feature/TES-76S-2`.
    pub fn extract_composite_key(&self, branch: &str) -> Option<String> {
        let rest = self.branch_remainder(branch)?;
        COMPOSITE_RULES
            .iter()
            .find_map(|rule| rule.captures(rest))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Ordered lookup chain for a branch: full composite key, numeric id, then
    /// the trailing numeric segment of the composite key. Duplicates are dropped.
    ///
    /// A remainder that fits no key shape is kept as [`CandidateId::Raw`].
    pub fn fallback_candidates(&self, branch: &str) -> Vec<CandidateId> {
        let composite = self.extract_composite_key(branch);
        let mut chain = Vec::with_capacity(3);

        if let Some(key) = &composite {
            let structured = COMPOSITE_RULES[..COMPOSITE_RULES.len() - 1]
                .iter()
                .any(|rule| rule.is_match(key));
            chain.push(match key.parse::<u64>() {
                Ok(n) => CandidateId::Numeric(n),
                Err(_) if structured => CandidateId::Composite(key.clone()),
                Err(_) => CandidateId::Raw(key.clone()),
            });
        }

        if let Some(id) = self.extract_numeric_id(branch) {
            chain.push(CandidateId::Numeric(id));
        }

        if let Some(segment) = composite
            .as_deref()
            .filter(|key| key.contains('-'))
            .and_then(|key| key.rsplit('-').next())
            .filter(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()))
        {
            if let Ok(n) = segment.parse() {
                chain.push(CandidateId::Numeric(n));
            }
        }

        let mut seen = Vec::with_capacity(chain.len());
        chain.retain(|candidate| {
            if seen.contains(candidate) {
                false
            } else {
                seen.push(candidate.clone());
                true
            }
        });
        chain
    }
}

/// Strip decoration from a pull request title for title-based matching.
///
/// Removes a leading `[TAG]`, then trailing `(...)` and `#123` suffixes in
/// any order until none remain.
pub fn clean_title(title: &str) -> String {
    let mut title = LEADING_TAG.replace(title, "").trim().to_string();
    loop {
        let stripped = TRAILING_REF.replace(&title, "");
        let stripped = TRAILING_PAREN.replace(&stripped, "").trim().to_string();
        if stripped == title {
            return title;
        }
        title = stripped;
    }
}

/// The last `#<number>` reference in a title.
pub fn extract_request_number(title: &str) -> Option<u64> {
    REQUEST_REF
        .captures_iter(title)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Strip `refs/heads/` from a push ref.
pub fn branch_from_ref(git_ref: &str) -> &str {
    git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref)
}

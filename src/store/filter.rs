//! Filter expressions and the property kinds that build them.
//!
//! Each [`PropertyKind`] owns the filter shapes it supports. A kind without a
//! shape for a given use yields [`FilterError::Unsupported`], which callers
//! treat like a failed lookup.

use crate::error::SyncError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Type of a database property, as reported by the schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum PropertyKind {
    Number,
    /// Auto-increment id (Notion `unique_id`).
    UniqueId,
    RichText,
    Title,
    Select,
    Status,
    People,
    Email,
    /// Any type the engine has no filter mapping for.
    Unsupported(String),
}

impl PropertyKind {
    /// Map a Notion property type name.
    pub fn from_notion_type(name: &str) -> Self {
        match name {
            "number" => Self::Number,
            "unique_id" => Self::UniqueId,
            "rich_text" => Self::RichText,
            "title" => Self::Title,
            "select" => Self::Select,
            "status" => Self::Status,
            "people" => Self::People,
            "email" => Self::Email,
            other => Self::Unsupported(other.to_string()),
        }
    }

    /// The Notion type name.
    pub fn notion_type(&self) -> &str {
        match self {
            Self::Number => "number",
            Self::UniqueId => "unique_id",
            Self::RichText => "rich_text",
            Self::Title => "title",
            Self::Select => "select",
            Self::Status => "status",
            Self::People => "people",
            Self::Email => "email",
            Self::Unsupported(name) => name,
        }
    }

    /// Equality filter on a property of this kind.
    ///
    /// Numeric kinds reject values that do not parse as an unsigned integer
    /// instead of coercing them.
    pub fn equals(&self, property: &str, value: &str) -> Result<Filter, FilterError> {
        let value = match self {
            Self::Number | Self::UniqueId => {
                let n = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| FilterError::NonNumeric {
                        property: property.to_string(),
                        value: value.to_string(),
                    })?;
                FilterValue::Number(n)
            }
            Self::RichText | Self::Title | Self::Select | Self::Status | Self::Email => {
                FilterValue::Text(value.to_string())
            }
            Self::People | Self::Unsupported(_) => {
                return Err(self.unsupported(property, "equality"));
            }
        };

        Ok(Filter::Equals {
            property: property.to_string(),
            kind: self.clone(),
            value,
        })
    }

    /// Containment filter. For people properties the value is a person id.
    pub fn contains(&self, property: &str, value: &str) -> Result<Filter, FilterError> {
        match self {
            Self::RichText | Self::Title | Self::People | Self::Email => Ok(Filter::Contains {
                property: property.to_string(),
                kind: self.clone(),
                value: value.to_string(),
            }),
            _ => Err(self.unsupported(property, "containment")),
        }
    }

    fn unsupported(&self, property: &str, usage: &str) -> FilterError {
        FilterError::Unsupported {
            property: property.to_string(),
            kind: self.notion_type().to_string(),
            usage: usage.to_string(),
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.notion_type())
    }
}

/// Why a filter could not be built.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("property '{property}' is numeric; '{value}' is not a number")]
    NonNumeric { property: String, value: String },

    #[error("property '{property}' of type '{kind}' does not support {usage}")]
    Unsupported {
        property: String,
        kind: String,
        usage: String,
    },
}

impl From<FilterError> for SyncError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::Unsupported {
                property,
                kind,
                usage,
            } => SyncError::UnsupportedPropertyType {
                property,
                kind,
                usage,
            },
            other @ FilterError::NonNumeric { .. } => {
                SyncError::lookup("filter construction", other.to_string())
            }
        }
    }
}

/// Right-hand side of an equality clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(u64),
    Text(String),
}

/// A query filter over database properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Equals {
        property: String,
        kind: PropertyKind,
        value: FilterValue,
    },
    Contains {
        property: String,
        kind: PropertyKind,
        value: String,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Disjunction; a single clause is returned unwrapped.
    pub fn any(mut clauses: Vec<Filter>) -> Filter {
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Filter::Or(clauses)
        }
    }

    /// Conjunction; a single clause is returned unwrapped.
    pub fn all(mut clauses: Vec<Filter>) -> Filter {
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Filter::And(clauses)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_notion_type() {
        assert_eq!(PropertyKind::from_notion_type("unique_id"), PropertyKind::UniqueId);
        assert_eq!(PropertyKind::from_notion_type("status"), PropertyKind::Status);
        assert_eq!(
            PropertyKind::from_notion_type("formula"),
            PropertyKind::Unsupported("formula".into())
        );
        assert_eq!(PropertyKind::Unsupported("rollup".into()).to_string(), "rollup");
    }

    #[test]
    fn test_numeric_equality_parses() {
        let filter = PropertyKind::UniqueId.equals("Task ID", "42").unwrap();
        assert_eq!(
            filter,
            Filter::Equals {
                property: "Task ID".into(),
                kind: PropertyKind::UniqueId,
                value: FilterValue::Number(42),
            }
        );
    }

    #[test]
    fn test_numeric_equality_rejects_text() {
        let err = PropertyKind::Number.equals("Task ID", "TES-76S-2").unwrap_err();
        assert!(matches!(err, FilterError::NonNumeric { .. }));
        assert!(err.to_string().contains("TES-76S-2"));
    }

    #[test]
    fn test_text_equality_keeps_value() {
        let filter = PropertyKind::RichText.equals("Ticket", "GEN-1").unwrap();
        assert!(matches!(
            filter,
            Filter::Equals { value: FilterValue::Text(ref v), .. } if v == "GEN-1"
        ));
    }

    #[test]
    fn test_people_supports_contains_only() {
        assert!(PropertyKind::People.contains("Assignee", "user-1").is_ok());
        let err = PropertyKind::People.equals("Assignee", "user-1").unwrap_err();
        assert!(matches!(err, FilterError::Unsupported { .. }));
    }

    #[test]
    fn test_unsupported_kind_maps_to_sync_error() {
        let err = PropertyKind::Unsupported("formula".into())
            .equals("Task ID", "1")
            .unwrap_err();
        let sync: SyncError = err.into();
        assert!(matches!(sync, SyncError::UnsupportedPropertyType { ref kind, .. } if kind == "formula"));
        assert!(sync.is_recoverable());
    }

    #[test]
    fn test_combinators_unwrap_single_clause() {
        let clause = PropertyKind::Status.equals("Status", "In Dev").unwrap();
        assert_eq!(Filter::any(vec![clause.clone()]), clause);
        assert!(matches!(
            Filter::any(vec![clause.clone(), clause.clone()]),
            Filter::Or(ref v) if v.len() == 2
        ));
        assert!(matches!(Filter::all(vec![clause.clone(), clause]), Filter::And(_)));
    }
}

//! Query language understood by every index backend
//!
//! A query is a whitespace separated list of clauses that must all match.
//! Double quotes group a phrase. A clause is either free text, matched
//! case-insensitively against name and content, or `Field:value` for one of
//! the known [`Field`]s. `Size` and `Mtime` take an optional comparison
//! prefix (`<`, `<=`, `>`, `>=`, `=`); `Name`, `Path` and `MimeType` accept
//! `*` wildcards.

use crate::index::error::{IndexError, IndexResult};
use crate::models::{make_relative_path, ResourceType};
use chrono::NaiveDate;
use std::ops::Bound;
use strum::{Display, EnumString};

/// Queryable document fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Field {
    #[strum(serialize = "ID")]
    Id,
    Name,
    Path,
    Content,
    Size,
    Mtime,
    MimeType,
    Type,
    Tags,
}

/// Comparison operator of a range clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Comparison {
    fn split(value: &str) -> (Self, &str) {
        if let Some(rest) = value.strip_prefix("<=") {
            (Comparison::Le, rest)
        } else if let Some(rest) = value.strip_prefix(">=") {
            (Comparison::Ge, rest)
        } else if let Some(rest) = value.strip_prefix('<') {
            (Comparison::Lt, rest)
        } else if let Some(rest) = value.strip_prefix('>') {
            (Comparison::Gt, rest)
        } else if let Some(rest) = value.strip_prefix('=') {
            (Comparison::Eq, rest)
        } else {
            (Comparison::Eq, value)
        }
    }

    pub fn holds(self, actual: u64, expected: u64) -> bool {
        match self {
            Comparison::Lt => actual < expected,
            Comparison::Le => actual <= expected,
            Comparison::Gt => actual > expected,
            Comparison::Ge => actual >= expected,
            Comparison::Eq => actual == expected,
        }
    }

    pub fn bounds(self, value: u64) -> (Bound<u64>, Bound<u64>) {
        match self {
            Comparison::Lt => (Bound::Unbounded, Bound::Excluded(value)),
            Comparison::Le => (Bound::Unbounded, Bound::Included(value)),
            Comparison::Gt => (Bound::Excluded(value), Bound::Unbounded),
            Comparison::Ge => (Bound::Included(value), Bound::Unbounded),
            Comparison::Eq => (Bound::Included(value), Bound::Included(value)),
        }
    }
}

/// A single required clause
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Free text, lowercased; may be a multi-word phrase
    Text(String),

    /// Wildcard match on Name, MimeType (lowercased) or Path (case preserved)
    Pattern { field: Field, pattern: String },

    /// Exact ID, or token match on Content/Tags (lowercased)
    Term { field: Field, value: String },

    /// Numeric comparison on Size or Mtime (unix seconds)
    Range {
        field: Field,
        op: Comparison,
        value: u64,
    },

    /// Resource type filter
    Kind(ResourceType),
}

impl Clause {
    /// Clauses that only filter and never contribute to the score
    pub fn is_filter(&self) -> bool {
        matches!(
            self,
            Clause::Range { .. }
                | Clause::Kind(_)
                | Clause::Term { field: Field::Id, .. }
                | Clause::Pattern {
                    field: Field::Path | Field::MimeType,
                    ..
                }
        )
    }
}

/// A parsed query: the conjunction of its clauses
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpr {
    pub clauses: Vec<Clause>,
}

/// Rewrite known field names to their canonical spelling.
///
/// Everything else, including comparison operators and quoting, passes
/// through unchanged: `name:foo size:<10` becomes `Name:foo Size:<10`.
pub fn normalize(query: &str) -> String {
    let (tokens, _) = split_raw(query);
    tokens
        .iter()
        .map(|token| normalize_token(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a query into its clauses
pub fn parse(query: &str) -> IndexResult<QueryExpr> {
    let (tokens, balanced) = split_raw(query);
    if !balanced {
        return Err(IndexError::InvalidQuery(format!(
            "unterminated quote in '{}'",
            query
        )));
    }

    let clauses = tokens
        .iter()
        .map(|token| parse_clause(token))
        .collect::<IndexResult<Vec<_>>>()?;

    if clauses.is_empty() {
        return Err(IndexError::InvalidQuery("empty query".to_string()));
    }

    Ok(QueryExpr { clauses })
}

/// Translate a `*` wildcard pattern into an unanchored regex body
pub fn wildcard_to_regex(pattern: &str) -> String {
    regex::escape(pattern).replace(r"\*", ".*")
}

/// Split on whitespace outside of double quotes; quotes are kept.
/// The flag is false when a quote was left open.
fn split_raw(query: &str) -> (Vec<String>, bool) {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in query.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    (tokens, !in_quotes)
}

fn normalize_token(token: &str) -> String {
    match token.split_once(':') {
        Some((name, rest)) => match name.parse::<Field>() {
            Ok(field) => format!("{}:{}", field, rest),
            Err(_) => token.to_string(),
        },
        None => token.to_string(),
    }
}

fn unquote(value: &str) -> String {
    value.replace('"', "")
}

fn parse_clause(token: &str) -> IndexResult<Clause> {
    if let Some((name, raw_value)) = token.split_once(':') {
        if let Ok(field) = name.parse::<Field>() {
            let value = unquote(raw_value);
            if value.trim().is_empty() {
                return Err(IndexError::InvalidQuery(format!(
                    "missing value for field {}",
                    field
                )));
            }
            return field_clause(field, &value);
        }
    }

    let text = unquote(token).trim().to_lowercase();
    if text.is_empty() {
        return Err(IndexError::InvalidQuery("empty phrase".to_string()));
    }
    Ok(Clause::Text(text))
}

fn field_clause(field: Field, value: &str) -> IndexResult<Clause> {
    match field {
        Field::Id => Ok(Clause::Term {
            field,
            value: value.to_string(),
        }),
        Field::Name | Field::MimeType => Ok(Clause::Pattern {
            field,
            pattern: value.to_lowercase(),
        }),
        Field::Path => {
            let pattern = if value.starts_with('*') {
                value.to_string()
            } else {
                make_relative_path(value)
            };
            Ok(Clause::Pattern { field, pattern })
        }
        Field::Content | Field::Tags => Ok(Clause::Term {
            field,
            value: value.to_lowercase(),
        }),
        Field::Size => {
            let (op, number) = Comparison::split(value);
            let value = number.trim().parse::<u64>().map_err(|_| {
                IndexError::InvalidQuery(format!("invalid size '{}'", number))
            })?;
            Ok(Clause::Range { field, op, value })
        }
        Field::Mtime => {
            let (op, raw) = Comparison::split(value);
            let value = parse_timestamp(raw.trim())?;
            Ok(Clause::Range { field, op, value })
        }
        Field::Type => value
            .parse::<ResourceType>()
            .map(Clause::Kind)
            .map_err(|_| IndexError::InvalidQuery(format!("invalid type '{}'", value))),
    }
}

/// Unix seconds or a `YYYY-MM-DD` date (midnight UTC)
fn parse_timestamp(raw: &str) -> IndexResult<u64> {
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(secs);
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc().timestamp())
        .and_then(|secs| u64::try_from(secs).ok())
        .ok_or_else(|| IndexError::InvalidQuery(format!("invalid mtime '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_field_names() {
        assert_eq!(normalize("name:foo size:<10"), "Name:foo Size:<10");
        assert_eq!(normalize("MIMETYPE:application/pdf"), "MimeType:application/pdf");
        assert_eq!(normalize("id:abc"), "ID:abc");
        assert_eq!(normalize("Size:<10"), "Size:<10");
    }

    #[test]
    fn test_normalize_leaves_free_text_alone() {
        assert_eq!(normalize("  Foo   bar "), "Foo bar");
        assert_eq!(normalize("unknown:field"), "unknown:field");
    }

    #[test]
    fn test_parse_free_text() {
        let expr = parse("Foo").unwrap();
        assert_eq!(expr.clauses, vec![Clause::Text("foo".to_string())]);
    }

    #[test]
    fn test_parse_phrase() {
        let expr = parse("\"quarterly report\" Name:\"my file*\"").unwrap();
        assert_eq!(
            expr.clauses,
            vec![
                Clause::Text("quarterly report".to_string()),
                Clause::Pattern {
                    field: Field::Name,
                    pattern: "my file*".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_ranges() {
        let expr = parse("Size:<10 Mtime:>=2024-01-01").unwrap();
        assert_eq!(
            expr.clauses[0],
            Clause::Range {
                field: Field::Size,
                op: Comparison::Lt,
                value: 10
            }
        );
        assert_eq!(
            expr.clauses[1],
            Clause::Range {
                field: Field::Mtime,
                op: Comparison::Ge,
                value: 1_704_067_200
            }
        );
        assert!(expr.clauses.iter().all(Clause::is_filter));
    }

    #[test]
    fn test_parse_type_and_path() {
        let expr = parse("type:Folder path:/docs/*").unwrap();
        assert_eq!(expr.clauses[0], Clause::Kind(ResourceType::Folder));
        assert_eq!(
            expr.clauses[1],
            Clause::Pattern {
                field: Field::Path,
                pattern: "./docs/*".to_string()
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse(""), Err(IndexError::InvalidQuery(_))));
        assert!(matches!(parse("\"open"), Err(IndexError::InvalidQuery(_))));
        assert!(matches!(parse("Size:big"), Err(IndexError::InvalidQuery(_))));
        assert!(matches!(parse("Name:"), Err(IndexError::InvalidQuery(_))));
        assert!(matches!(parse("Type:symlink"), Err(IndexError::InvalidQuery(_))));
        assert!(matches!(parse("Mtime:yesterday"), Err(IndexError::InvalidQuery(_))));
    }

    #[test]
    fn test_comparison() {
        assert!(Comparison::Lt.holds(9, 10));
        assert!(!Comparison::Lt.holds(10, 10));
        assert!(Comparison::Ge.holds(10, 10));
        assert_eq!(Comparison::Eq.bounds(3), (Bound::Included(3), Bound::Included(3)));
    }

    #[test]
    fn test_wildcard_to_regex() {
        assert_eq!(wildcard_to_regex("*.pdf"), r".*\.pdf");
        assert_eq!(wildcard_to_regex("foo"), "foo");
    }
}

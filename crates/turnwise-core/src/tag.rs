//! Rule tag parsing.
//!
//! Tags are colon-delimited:
//!
//! - `single_turn:<category>:<name>`
//! - `multi_turn:<class>:<category>:<name>` with `<class>` one of `FIRST_N`, `N_th`
//! - `multi_turn:<class>:<name>` (legacy form, category looked up in the catalog)
//!
//! Both multi-turn forms resolve to the same catalog entry and the same
//! [`ParsedRule`]. An unresolvable tag is always an error.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::{Applicability, Catalog, RuleDefinition};

/// Errors from tag parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("Rule tag '{tag}' has {parts} segment(s), expected 3 or 4")]
    WrongPartCount { tag: String, parts: usize },

    #[error("Unknown rule kind '{kind}' in '{tag}', expected single_turn or multi_turn")]
    UnknownKind { tag: String, kind: String },

    #[error("Unknown rule class '{class}' in '{tag}', expected FIRST_N or N_th")]
    UnknownClass { tag: String, class: String },

    #[error("Empty segment in rule tag '{tag}'")]
    EmptySegment { tag: String },

    #[error("Rule '{tag}' is not in the catalog")]
    UnknownRule { tag: String },
}

/// Canonical identifier of a rule.
///
/// Displays and serializes as the canonical tag string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleTag {
    applicability: Applicability,
    category: String,
    name: String,
}

impl RuleTag {
    pub fn new(applicability: Applicability, category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            applicability,
            category: category.into(),
            name: name.into(),
        }
    }

    pub fn applicability(&self) -> Applicability {
        self.applicability
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.applicability {
            Applicability::Single => write!(f, "single_turn:{}:{}", self.category, self.name),
            class => write!(f, "multi_turn:{}:{}:{}", class, self.category, self.name),
        }
    }
}

/// Parses canonical tags only; legacy tags need a catalog, see [`parse`].
impl FromStr for RuleTag {
    type Err = TagError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let parts = split(tag)?;
        match (parts[0], parts.len()) {
            ("single_turn", 3) => Ok(RuleTag::new(Applicability::Single, parts[1], parts[2])),
            ("multi_turn", 4) => {
                let class = parse_class(tag, parts[1])?;
                Ok(RuleTag::new(class, parts[2], parts[3]))
            }
            ("single_turn", n) | ("multi_turn", n) => Err(TagError::WrongPartCount {
                tag: tag.to_string(),
                parts: n,
            }),
            (kind, _) => Err(TagError::UnknownKind {
                tag: tag.to_string(),
                kind: kind.to_string(),
            }),
        }
    }
}

impl Serialize for RuleTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RuleTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Run-time N for a rule: a literal, or resolved from the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNSpec", into = "RawNSpec")]
pub enum NSpec {
    /// Fixed turn count/position
    Literal(u32),

    /// First turn where the precondition holds, plus `offset`
    Auto { offset: i32 },
}

impl NSpec {
    pub fn auto() -> Self {
        NSpec::Auto { offset: 0 }
    }

    pub fn literal(&self) -> Option<u32> {
        match self {
            NSpec::Literal(n) => Some(*n),
            NSpec::Auto { .. } => None,
        }
    }
}

/// Wire forms of N: `3`, `"auto"`, `{value: "auto", offset: 1}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawNSpec {
    Literal(i64),
    Token(String),
    Structured {
        value: String,
        #[serde(default)]
        offset: i32,
    },
}

impl TryFrom<RawNSpec> for NSpec {
    type Error = String;

    fn try_from(raw: RawNSpec) -> Result<Self, Self::Error> {
        match raw {
            RawNSpec::Literal(n) => u32::try_from(n)
                .map(NSpec::Literal)
                .map_err(|_| format!("N must be a non-negative integer, got {}", n)),
            RawNSpec::Token(token) if token == "auto" => Ok(NSpec::auto()),
            RawNSpec::Structured { value, offset } if value == "auto" => Ok(NSpec::Auto { offset }),
            RawNSpec::Token(other) | RawNSpec::Structured { value: other, .. } => {
                Err(format!("expected an integer or \"auto\", got \"{}\"", other))
            }
        }
    }
}

impl From<NSpec> for RawNSpec {
    fn from(spec: NSpec) -> Self {
        match spec {
            NSpec::Literal(n) => RawNSpec::Literal(i64::from(n)),
            NSpec::Auto { offset: 0 } => RawNSpec::Token("auto".to_string()),
            NSpec::Auto { offset } => RawNSpec::Structured {
                value: "auto".to_string(),
                offset,
            },
        }
    }
}

/// An entry of a case's `rule_list`: a bare tag or `{rule, N}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSpec {
    Tag(String),
    WithN {
        rule: String,
        #[serde(rename = "N", default, skip_serializing_if = "Option::is_none")]
        n: Option<NSpec>,
    },
}

impl RuleSpec {
    pub fn tag(&self) -> &str {
        match self {
            RuleSpec::Tag(tag) => tag,
            RuleSpec::WithN { rule, .. } => rule,
        }
    }

    pub fn n(&self) -> Option<NSpec> {
        match self {
            RuleSpec::Tag(_) => None,
            RuleSpec::WithN { n, .. } => *n,
        }
    }

    /// Resolve against a catalog, carrying the N along.
    pub fn parse(&self, catalog: &Catalog) -> Result<ParsedRule, TagError> {
        Ok(parse(self.tag(), catalog)?.with_n(self.n()))
    }
}

/// A tag resolved against the catalog, plus its run-time N.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRule {
    pub tag: RuleTag,
    pub rule: Arc<RuleDefinition>,
    pub n: Option<NSpec>,
}

impl ParsedRule {
    pub fn with_n(mut self, n: Option<NSpec>) -> Self {
        self.n = n;
        self
    }

    pub fn applicability(&self) -> Applicability {
        self.rule.applicability
    }
}

/// Parse a rule tag and resolve it against the catalog.
///
/// # Arguments
///
/// * `tag` - Canonical or legacy tag string
/// * `catalog` - Catalog to resolve against
///
/// # Returns
///
/// The resolved rule with no N attached, or the first [`TagError`] found.
pub fn parse(tag: &str, catalog: &Catalog) -> Result<ParsedRule, TagError> {
    let parts = split(tag)?;

    let rule = match (parts[0], parts.len()) {
        ("multi_turn", 3) => {
            let class = parse_class(tag, parts[1])?;
            catalog.resolve_legacy(class, parts[2])
        }
        _ => {
            let canonical: RuleTag = tag.parse()?;
            catalog.lookup(&canonical)
        }
    }
    .ok_or_else(|| TagError::UnknownRule {
        tag: tag.to_string(),
    })?;

    Ok(ParsedRule {
        tag: rule.tag(),
        rule: Arc::clone(rule),
        n: None,
    })
}

fn split(tag: &str) -> Result<Vec<&str>, TagError> {
    let parts: Vec<&str> = tag.split(':').collect();

    if !(3..=4).contains(&parts.len()) {
        return Err(TagError::WrongPartCount {
            tag: tag.to_string(),
            parts: parts.len(),
        });
    }

    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(TagError::EmptySegment {
            tag: tag.to_string(),
        });
    }

    Ok(parts)
}

fn parse_class(tag: &str, class: &str) -> Result<Applicability, TagError> {
    Applicability::from_class(class).ok_or_else(|| TagError::UnknownClass {
        tag: tag.to_string(),
        class: class.to_string(),
    })
}

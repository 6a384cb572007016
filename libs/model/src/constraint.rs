//! Placement constraints and their evaluation against offers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Attribute, AttributeValue, ModelError, ResourceOffer};

/// Left-hand side that targets the offer's hostname instead of an attribute.
pub const HOSTNAME_KEY: &str = "hostname";

/// Keyword separating the two halves of a `LIKE` constraint string.
const LIKE_KEYWORD: &str = " LIKE ";

/// Wire tag for each constraint kind. The numeric values are part of the
/// state blob format and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    None = 0,
    Like = 1,
}

impl ConstraintKind {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Like),
            _ => None,
        }
    }
}

/// A placement predicate over an offer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Constraint {
    #[default]
    None,
    Like(LikeConstraint),
}

impl Constraint {
    /// Parses `"<attribute> LIKE <regex>"`.
    ///
    /// Exactly one clause is accepted and the regex is compiled here, so a
    /// bad pattern is rejected before any task is created.
    pub fn parse(input: &str) -> Result<Self, ModelError> {
        let parts: Vec<&str> = input.split(LIKE_KEYWORD).collect();
        if parts.len() != 2 {
            return Err(ModelError::InvalidConstraint {
                input: input.to_string(),
                reason: "expected exactly one '<attribute> LIKE <regex>' clause".to_string(),
            });
        }
        Ok(Self::Like(LikeConstraint::new(parts[0], parts[1])?))
    }

    /// Parses an optional constraint string; `None` means unconstrained.
    pub fn parse_optional(input: Option<&str>) -> Result<Self, ModelError> {
        match input {
            Some(s) => Self::parse(s),
            None => Ok(Self::None),
        }
    }

    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::None => ConstraintKind::None,
            Self::Like(_) => ConstraintKind::Like,
        }
    }

    /// True if the offer satisfies this constraint.
    pub fn matches(&self, offer: &ResourceOffer) -> bool {
        match self {
            Self::None => true,
            Self::Like(like) => like.matches(offer),
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Like(like) => write!(f, "{}{}{}", like.lhs, LIKE_KEYWORD, like.source),
        }
    }
}

/// `<lhs> LIKE <pattern>`: the hostname or the named attribute must fully
/// match the pattern.
///
/// Equality compares the left-hand side and the pattern source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LikeConstraintBody", into = "LikeConstraintBody")]
pub struct LikeConstraint {
    lhs: String,
    source: String,
    pattern: Regex,
}

/// Structured-text body of a `LIKE` constraint in the state blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LikeConstraintBody {
    lhs: String,
    pattern: String,
}

impl LikeConstraint {
    pub fn new(lhs: impl Into<String>, pattern: impl Into<String>) -> Result<Self, ModelError> {
        let lhs = lhs.into();
        let source = pattern.into();

        if lhs.is_empty() {
            return Err(ModelError::InvalidConstraint {
                input: format!("{lhs}{LIKE_KEYWORD}{source}"),
                reason: "attribute name cannot be empty".to_string(),
            });
        }

        let anchored = format!("^(?:{source})$");
        let pattern = Regex::new(&anchored).map_err(|e| ModelError::InvalidPattern {
            pattern: source.clone(),
            source: e,
        })?;

        Ok(Self {
            lhs,
            source,
            pattern,
        })
    }

    pub fn lhs(&self) -> &str {
        &self.lhs
    }

    /// The pattern as written, without the full-match anchors.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn is_on_hostname(&self) -> bool {
        self.lhs.eq_ignore_ascii_case(HOSTNAME_KEY)
    }

    pub fn matches(&self, offer: &ResourceOffer) -> bool {
        if self.is_on_hostname() {
            self.matches_hostname(&offer.hostname)
        } else {
            self.matches_attributes(&offer.attributes)
        }
    }

    pub fn matches_hostname(&self, hostname: &str) -> bool {
        self.is_on_hostname() && self.pattern.is_match(hostname)
    }

    /// The first attribute whose name matches decides the outcome.
    pub fn matches_attributes(&self, attributes: &[Attribute]) -> bool {
        if self.is_on_hostname() {
            return false;
        }
        let Some(attr) = attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(&self.lhs))
        else {
            return false;
        };

        match &attr.value {
            AttributeValue::Text(text) => self.pattern.is_match(text),
            AttributeValue::Scalar(value) => self.pattern.is_match(&format!("{value:?}")),
            other => {
                warn!(
                    attribute = %attr.name,
                    kind = other.kind(),
                    "LIKE constraint does not support this attribute kind"
                );
                false
            }
        }
    }
}

impl PartialEq for LikeConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.lhs == other.lhs && self.source == other.source
    }
}

impl Eq for LikeConstraint {}

impl TryFrom<LikeConstraintBody> for LikeConstraint {
    type Error = ModelError;

    fn try_from(body: LikeConstraintBody) -> Result<Self, Self::Error> {
        Self::new(body.lhs, body.pattern)
    }
}

impl From<LikeConstraint> for LikeConstraintBody {
    fn from(like: LikeConstraint) -> Self {
        Self {
            lhs: like.lhs,
            pattern: like.source,
        }
    }
}

//! Resource offers as delivered by the offer source.

use flex_id::{AgentId, FrameworkId, OfferId};
use serde::{Deserialize, Serialize};

/// Name of the CPU scalar resource.
pub const RESOURCE_CPUS: &str = "cpus";

/// Name of the memory scalar resource (MB).
pub const RESOURCE_MEM: &str = "mem";

/// Name of the port range resource.
pub const RESOURCE_PORTS: &str = "ports";

/// The role carried by unreserved resources.
pub const DEFAULT_ROLE: &str = "*";

/// An inclusive range of values, `[begin, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueRange {
    pub begin: u64,
    pub end: u64,
}

impl ValueRange {
    pub fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    /// A range holding exactly one value.
    pub fn single(value: u64) -> Self {
        Self {
            begin: value,
            end: value,
        }
    }

    pub fn contains(&self, value: u64) -> bool {
        value >= self.begin && value <= self.end
    }

    /// Number of values in the range. Inverted ranges are empty; the full
    /// `[0, u64::MAX]` range saturates at `u64::MAX`.
    pub fn len(&self) -> u64 {
        if self.end < self.begin {
            0
        } else {
            (self.end - self.begin).saturating_add(1)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for ValueRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}-{}]", self.begin, self.end)
    }
}

/// The value carried by a resource entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceValue {
    Scalar(f64),
    Ranges(Vec<ValueRange>),
}

/// One named resource entry of an offer, or one fragment of a launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub value: ResourceValue,
    /// Reservation role, `None` for unreserved resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Resource {
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Scalar(value),
            role: None,
        }
    }

    pub fn ranges(name: impl Into<String>, ranges: Vec<ValueRange>) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Ranges(ranges),
            role: None,
        }
    }

    /// Tags the resource with a reservation role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// The scalar value, if this is a scalar entry.
    pub fn as_scalar(&self) -> Option<f64> {
        match &self.value {
            ResourceValue::Scalar(v) => Some(*v),
            ResourceValue::Ranges(_) => None,
        }
    }

    /// The ranges, if this is a range entry.
    pub fn as_ranges(&self) -> Option<&[ValueRange]> {
        match &self.value {
            ResourceValue::Ranges(r) => Some(r),
            ResourceValue::Scalar(_) => None,
        }
    }

    /// True if the entry is reserved for some role other than the default.
    pub fn is_reserved(&self) -> bool {
        self.role.as_deref().is_some_and(|r| r != DEFAULT_ROLE)
    }
}

/// The value of an agent attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    Scalar(f64),
    Ranges(Vec<ValueRange>),
    Set(Vec<String>),
}

impl AttributeValue {
    /// Short name of the value kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Scalar(_) => "scalar",
            Self::Ranges(_) => "ranges",
            Self::Set(_) => "set",
        }
    }
}

/// A named attribute advertised by the agent behind an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: AttributeValue::Text(value.into()),
        }
    }

    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: AttributeValue::Scalar(value),
        }
    }
}

/// A time-bounded grant of one host's resources.
///
/// Offers are never persisted. They are either accepted through a launch,
/// cached for elastic sharing, or declined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOffer {
    pub id: OfferId,
    pub hostname: String,
    pub agent_id: AgentId,
    pub framework_id: FrameworkId,
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl ResourceOffer {
    /// True if any resource in the offer is reserved for a non-default role.
    pub fn has_reserved_resources(&self) -> bool {
        self.resources.iter().any(Resource::is_reserved)
    }

    /// Sum of every scalar entry with the given name, across roles.
    pub fn scalar_total(&self, name: &str) -> f64 {
        self.resources
            .iter()
            .filter(|r| r.name == name)
            .filter_map(Resource::as_scalar)
            .sum()
    }
}

//! Capability registry: reverse-domain-keyed families of versioned
//! capability declarations, and the polymorphic `extends` field.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A capability family keyed by a reverse-domain name (e.g.
/// `dev.ucp.shopping.checkout`), mapping to its list of versioned entries.
pub type CapabilityRegistry = BTreeMap<String, Vec<Capability>>;

/// A payment-handler family keyed by a reverse-domain name, mapping to
/// its list of advertised handlers (§3.2 Glossary: "Handler").
pub type HandlerRegistry = BTreeMap<String, Vec<Handler>>;

/// A single advertised payment-handler entry within a handler family.
/// Opaque to the gateway beyond its `id` and `version` (§4.1 step 6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Handler {
    /// Handler id, unique within its family (e.g. `"stripe"`).
    pub id: String,
    /// Handler version string; either semver or `YYYY-MM-DD`.
    pub version: String,
}

/// A single versioned capability declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Capability {
    /// `YYYY-MM-DD` date string, lexicographically comparable.
    pub version: String,
    /// Optional URL to the capability's human-readable spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    /// Optional URL to the capability's machine schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Parent capability name(s), if this entry extends others.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<Extends>,
}

impl Capability {
    /// Create a capability declaration with no `spec`/`schema`/`extends`.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            spec: None,
            schema: None,
            extends: None,
        }
    }

    /// Whether this capability declares at least one parent.
    #[must_use]
    pub fn is_extension(&self) -> bool {
        self.extends.as_ref().is_some_and(Extends::is_extension)
    }

    /// Parent family names this capability extends, if any.
    #[must_use]
    pub fn parents(&self) -> Vec<String> {
        self.extends
            .as_ref()
            .map(Extends::parents)
            .unwrap_or_default()
    }
}

/// Polymorphic `extends` field: either a single parent family name, or a
/// list of parent family names. Serialization round-trips the same shape
/// the value arrived in — a `Single` never serializes as a one-element
/// array and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Extends {
    /// A single parent capability family name.
    Single(String),
    /// Multiple parent capability family names.
    Multi(Vec<String>),
}

impl Extends {
    /// Parent family names, regardless of the on-wire shape.
    #[must_use]
    pub fn parents(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Multi(v) => v.clone(),
        }
    }

    /// An `extends` value is only meaningful if it lists at least one
    /// parent; an empty `Multi([])` is treated as "not an extension".
    #[must_use]
    pub fn is_extension(&self) -> bool {
        match self {
            Self::Single(s) => !s.is_empty(),
            Self::Multi(v) => !v.is_empty(),
        }
    }
}

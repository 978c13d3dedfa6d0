//! Tracked identifier type.
//!
//! Identifiers are vehicle plates as read by the capture pipeline. They are
//! normalized (trimmed, upper-cased) on construction so that the same plate
//! read as "ab-12-cd " and "AB-12-CD" maps to a single movement history.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized tracked identifier (vehicle plate).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Create a normalized identifier.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Identifier(raw.as_ref().trim().to_uppercase())
    }

    /// Re-normalize an identifier that bypassed `new` (e.g. deserialized).
    pub fn normalized(&self) -> Self {
        Identifier::new(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::new(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier::new(s)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

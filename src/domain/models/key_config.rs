//! Context key declarations used by steps and workflows.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Data flowing between steps, keyed by context key name.
pub type WorkflowContext = HashMap<String, serde_json::Value>;

/// A named context key with an optionality flag.
///
/// Identity is the `name` alone: two configs with the same name compare equal
/// and hash the same regardless of `optional`, so a key can only be declared
/// once per set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
}

impl KeyConfig {
    /// Create a required key.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    /// Create an optional key.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }

    pub fn is_required(&self) -> bool {
        !self.optional
    }
}

impl PartialEq for KeyConfig {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for KeyConfig {}

impl Hash for KeyConfig {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "{}?", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl From<&str> for KeyConfig {
    fn from(name: &str) -> Self {
        Self::required(name)
    }
}

impl From<String> for KeyConfig {
    fn from(name: String) -> Self {
        Self::required(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_is_name_only() {
        assert_eq!(KeyConfig::required("a"), KeyConfig::optional("a"));
        assert_ne!(KeyConfig::required("a"), KeyConfig::required("b"));

        let mut keys = HashSet::new();
        keys.insert(KeyConfig::required("a"));
        keys.insert(KeyConfig::optional("a"));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_from_str_is_required() {
        let key: KeyConfig = "node_id".into();
        assert!(key.is_required());
        assert_eq!(key.to_string(), "node_id");
        assert_eq!(KeyConfig::optional("x").to_string(), "x?");
    }

    #[test]
    fn test_deserialize_defaults_to_required() {
        let key: KeyConfig = serde_json::from_str(r#"{"name": "node_id"}"#).unwrap();
        assert!(!key.optional);
    }
}

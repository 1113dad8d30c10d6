//! Declarative datastore configuration.
//!
//! The configuration is the boundary a factory constructs adapters from;
//! loading files and wiring instances together stays outside this crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Construction parameters for one datastore instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Adapter kind, e.g. `"memory"`.
    pub kind: String,
    /// Instance name; recorded in relation edges and error values.
    pub name: String,
    /// Adapter-specific settings (addresses, credentials, tuning).
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl DatastoreConfig {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        DatastoreConfig {
            kind: kind.into(),
            name: name.into(),
            settings: BTreeMap::new(),
        }
    }

    /// Configuration for the in-memory reference adapter.
    pub fn memory(name: impl Into<String>) -> Self {
        Self::new(crate::memory::MemoryDatastore::KIND, name)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_settings() {
        let cfg: DatastoreConfig = serde_json::from_str(
            r#"{"kind": "memory", "name": "main", "settings": {"capacity": 64}}"#,
        )
        .unwrap();
        assert_eq!(cfg.kind, "memory");
        assert_eq!(cfg.name, "main");
        assert_eq!(cfg.settings["capacity"], serde_json::json!(64));
    }

    #[test]
    fn test_settings_default_to_empty() {
        let cfg: DatastoreConfig =
            serde_json::from_str(r#"{"kind": "memory", "name": "main"}"#).unwrap();
        assert!(cfg.settings.is_empty());
    }
}

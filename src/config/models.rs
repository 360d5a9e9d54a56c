//! Configuration data structures for restplate.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. Every field has a
//! default so that a minimal config only names what it changes.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::request::{DEFAULT_SUCCESS_CODES, DEFAULT_TIMEOUT_MS};

/// Service root used when no root rule matches
fn default_root() -> String {
    "http://localhost".to_string()
}

/// Route templates starting with `prefix` are sent to `root`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RootRule {
    pub prefix: String,
    pub root: String,
}

/// Client-wide request defaults
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Root used when no rule in `roots` matches
    pub default_root: String,
    /// Ordered dynamic roots; the first matching prefix wins
    pub roots: Vec<RootRule>,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Retries after a timed out attempt
    pub max_retries: u32,
    /// Statuses treated as success
    pub success_codes: Vec<u16>,
    /// Headers added to every request that does not set them itself
    pub default_headers: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_root: default_root(),
            roots: Vec::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: 0,
            success_codes: DEFAULT_SUCCESS_CODES.to_vec(),
            default_headers: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for ClientConfig to allow for cleaner configuration creation
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn default_root(mut self, root: impl Into<String>) -> Self {
        self.config.default_root = root.into();
        self
    }

    /// Append a root rule; rules are matched in insertion order
    pub fn root(mut self, prefix: impl Into<String>, root: impl Into<String>) -> Self {
        self.config.roots.push(RootRule {
            prefix: prefix.into(),
            root: root.into(),
        });
        self
    }

    pub fn timeout_ms(mut self, millis: u64) -> Self {
        self.config.timeout_ms = millis;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn success_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.config.success_codes = codes.into_iter().collect();
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.default_root, "http://localhost");
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.success_codes, [200, 201, 202, 203, 204]);
        assert!(config.roots.is_empty());
    }

    #[test]
    fn test_builder_keeps_rule_order() {
        let config = ClientConfig::builder()
            .default_root("https://api.test")
            .root("/files", "https://cdn.test")
            .root("/", "https://other.test")
            .max_retries(2)
            .default_header("accept", "application/json")
            .build();
        assert_eq!(config.roots[0].prefix, "/files");
        assert_eq!(config.roots[1].root, "https://other.test");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.default_headers["accept"], "application/json");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "default_root": "https://api.test", "max_retries": 1 }"#)
                .unwrap();
        assert_eq!(config.default_root, "https://api.test");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.timeout_ms, 30_000);
    }
}

//! Weaver configuration. Hosts hand the weaver a TOML block like
//!
//! ```toml
//! marker-type = "MyCompany.CachedAttribute"
//! duplicate-annotations = "first-wins"
//! verify = true
//! ```
//!
//! Everything is optional; the defaults match the shipped marker type,
//! reject duplicate annotations, and verify woven bodies.

use serde::Deserialize;

use crate::runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Duplicate annotations of one kind on a method fail the pass.
    Reject,
    /// Keep the first annotation of each kind and warn about the rest.
    FirstWins,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct WeaverConfig {
    /// Full name of the marker base type; defaults to the shipped one.
    pub marker_type: Option<String>,
    pub duplicate_annotations: DuplicatePolicy,
    /// Run structural verification on every woven body.
    pub verify: bool,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        WeaverConfig {
            marker_type: None,
            duplicate_annotations: DuplicatePolicy::Reject,
            verify: true,
        }
    }
}

impl WeaverConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn marker(&self) -> &str {
        self.marker_type.as_deref().unwrap_or(runtime::MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WeaverConfig::default();
        assert_eq!(config.marker(), runtime::MARKER);
        assert_eq!(config.duplicate_annotations, DuplicatePolicy::Reject);
        assert!(config.verify);
    }

    #[test]
    fn parses_toml_block() {
        let config = WeaverConfig::from_toml(
            r#"
            marker-type = "MyCompany.CachedAttribute"
            duplicate-annotations = "first-wins"
            verify = false
            "#,
        )
        .unwrap();
        assert_eq!(config.marker(), "MyCompany.CachedAttribute");
        assert_eq!(config.duplicate_annotations, DuplicatePolicy::FirstWins);
        assert!(!config.verify);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(WeaverConfig::from_toml("no-such-option = 1").is_err());
    }
}

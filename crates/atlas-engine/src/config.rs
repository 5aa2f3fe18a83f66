use std::path::Path;
use std::time::Duration;

use atlas_store::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, AtlasResult};
use crate::flags::CacheFlag;

/// Settings shared by every document type of an [`crate::Atlas`].
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Cache flag used by reads that do not set one.
    pub default_cache_flag: CacheFlag,
    /// Deadline for source calls that do not set one. `None` waits forever.
    pub source_timeout_ms: Option<u64>,
    /// Compiled predicates kept per document type before the cache resets.
    pub compiled_predicate_capacity: usize,
    /// Per-key mutation locks per document type.
    pub key_lock_stripes: usize,
    /// Buffer size of broadcast channels returned by `Atlas::events`.
    pub event_channel_capacity: usize,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            default_cache_flag: CacheFlag::Default,
            source_timeout_ms: None,
            compiled_predicate_capacity: 1024,
            key_lock_stripes: 64,
            event_channel_capacity: 1024,
        }
    }
}

impl AtlasConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> AtlasResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| AtlasError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> AtlasResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AtlasError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> AtlasResult<()> {
        if self.compiled_predicate_capacity == 0 {
            return Err(AtlasError::Config(
                "compiled_predicate_capacity must be at least 1".into(),
            ));
        }
        if self.key_lock_stripes == 0 {
            return Err(AtlasError::Config("key_lock_stripes must be at least 1".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(AtlasError::Config(
                "event_channel_capacity must be at least 1".into(),
            ));
        }
        if self.source_timeout_ms == Some(0) {
            return Err(AtlasError::Config("source_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// The default source timeout, if one is set.
    pub fn source_timeout(&self) -> Option<Duration> {
        self.source_timeout_ms.map(Duration::from_millis)
    }

    /// Store settings derived from this config.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            key_lock_stripes: self.key_lock_stripes,
            compiled_predicate_capacity: self.compiled_predicate_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = AtlasConfig::default();
        assert_eq!(c.default_cache_flag, CacheFlag::Default);
        assert_eq!(c.source_timeout(), None);
        assert_eq!(c.store_config(), StoreConfig::default());
        c.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = AtlasConfig::from_toml_str(
            r#"
            default_cache_flag = "only_cache"
            source_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(c.default_cache_flag, CacheFlag::OnlyCache);
        assert_eq!(c.source_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(c.key_lock_stripes, 64);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        for text in [
            "key_lock_stripes = 0",
            "compiled_predicate_capacity = 0",
            "event_channel_capacity = 0",
            "source_timeout_ms = 0",
        ] {
            assert!(
                matches!(AtlasConfig::from_toml_str(text), Err(AtlasError::Config(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(matches!(
            AtlasConfig::from_toml_str("default_cache_flag = \"sometimes\""),
            Err(AtlasError::Config(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "event_channel_capacity = 16").unwrap();
        let c = AtlasConfig::load(file.path()).unwrap();
        assert_eq!(c.event_channel_capacity, 16);

        let missing = file.path().with_extension("missing");
        assert!(matches!(AtlasConfig::load(&missing), Err(AtlasError::Config(_))));
    }
}

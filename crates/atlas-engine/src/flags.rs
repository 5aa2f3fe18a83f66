use std::time::Duration;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// How a read may use the in-memory copy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheFlag {
    /// Keyed lookups first; memory if the type is preloaded, else the source.
    #[default]
    Default,
    /// Answer from memory only, even if the type was never preloaded.
    OnlyCache,
    /// Always ask the source, skipping the keyed lookup.
    BypassCache,
}

bitflags! {
    /// Hints passed through to the source.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ExecutionFlags: u32 {
        /// Return rows a declarative source filter would hide, marked as not
        /// cacheable so stale cached copies are removed.
        const BYPASS_FILTER = 0b0000_0001;
    }
}

/// Per-read options. Unset fields fall back to the [`crate::AtlasConfig`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub cache: Option<CacheFlag>,
    pub flags: ExecutionFlags,
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    /// Options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `flag` instead of the configured default cache flag.
    pub fn cache(mut self, flag: CacheFlag) -> Self {
        self.cache = Some(flag);
        self
    }

    /// Shorthand for `cache(CacheFlag::OnlyCache)`.
    pub fn only_cache(self) -> Self {
        self.cache(CacheFlag::OnlyCache)
    }

    /// Shorthand for `cache(CacheFlag::BypassCache)`.
    pub fn bypass_cache(self) -> Self {
        self.cache(CacheFlag::BypassCache)
    }

    /// Add `flags` to the execution flags passed to the source.
    pub fn flags(mut self, flags: ExecutionFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Override the configured source timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Options for reads issued while navigating a relation.
    ///
    /// Only the timeout carries over. Cache and execution flags reset to
    /// their defaults so a reconciling parent read does not widen what its
    /// relations return.
    pub(crate) fn for_relation(self) -> Self {
        Self {
            timeout: self.timeout,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let o = QueryOptions::new()
            .bypass_cache()
            .flags(ExecutionFlags::BYPASS_FILTER)
            .timeout(Duration::from_millis(5));
        assert_eq!(o.cache, Some(CacheFlag::BypassCache));
        assert!(o.flags.contains(ExecutionFlags::BYPASS_FILTER));
        assert_eq!(o.timeout, Some(Duration::from_millis(5)));
    }

    #[test]
    fn defaults_are_empty() {
        let o = QueryOptions::default();
        assert_eq!(o.cache, None);
        assert!(o.flags.is_empty());
        assert_eq!(CacheFlag::default(), CacheFlag::Default);
    }

    #[test]
    fn relation_options_keep_only_the_timeout() {
        let o = QueryOptions::new()
            .bypass_cache()
            .flags(ExecutionFlags::BYPASS_FILTER)
            .timeout(Duration::from_millis(5))
            .for_relation();
        assert_eq!(o, QueryOptions::new().timeout(Duration::from_millis(5)));
    }
}

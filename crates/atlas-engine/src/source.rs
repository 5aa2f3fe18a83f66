use async_trait::async_trait;
use atlas_query::Predicate;
use atlas_types::Document;

use crate::error::SourceResult;
use crate::flags::ExecutionFlags;

/// One document returned by a source.
///
/// A record that is not cacheable is current truth for this read but must
/// not stay in memory: the engine deletes any cached copy instead of storing
/// it.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceRecord<D> {
    pub cacheable: bool,
    pub document: D,
}

impl<D> SourceRecord<D> {
    /// A record the engine may keep in memory.
    pub fn cached(document: D) -> Self {
        Self {
            cacheable: true,
            document,
        }
    }

    /// A record that must not stay in memory.
    pub fn transient(document: D) -> Self {
        Self {
            cacheable: false,
            document,
        }
    }
}

/// Adapter to the backing store a document type is mirrored from.
///
/// Called with the normalized predicate of a read (or `None` for everything)
/// and the read's execution flags. Errors are handed to the caller as-is; the
/// engine never retries.
#[async_trait]
pub trait Source<D: Document>: Send + Sync {
    async fn fetch(
        &self,
        predicate: Option<&Predicate>,
        flags: ExecutionFlags,
    ) -> SourceResult<Vec<SourceRecord<D>>>;

    /// Whether any of this source's records may be kept in memory.
    ///
    /// Sources that return `false` cannot be preloaded.
    fn supports_caching(&self) -> bool {
        true
    }

    /// Release the source's resources. Called once by `Atlas::dispose`.
    fn dispose(&self) {}
}

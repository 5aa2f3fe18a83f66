use std::any::type_name;

use atlas_query::Query;
use atlas_types::Document;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::atlas::Atlas;
use crate::error::{AtlasError, AtlasResult};
use crate::source::SourceRecord;

/// A change notification from the backing store.
#[derive(Clone, Debug)]
pub enum Change<D> {
    /// The document was created or modified.
    Upsert(D),
    /// The document was removed.
    Delete(D),
    /// A record to reconcile, cached or transient.
    Record(SourceRecord<D>),
    /// Something the matching documents depend on changed; re-emit `Updated`.
    Touch(Query),
}

impl Atlas {
    /// Apply one change notification to the cache.
    pub fn apply_change<D: Document>(&self, change: Change<D>) -> AtlasResult<()> {
        match change {
            Change::Upsert(document) => {
                self.update_document(document)?;
            }
            Change::Delete(document) => {
                self.delete_document(&document)?;
            }
            Change::Record(record) => {
                self.apply(record)?;
            }
            Change::Touch(query) => {
                self.trigger_update::<D>(query)?;
            }
        }
        Ok(())
    }

    /// Apply every change received on `changes` on a background task.
    ///
    /// The task ends when every sender is dropped or the atlas is disposed,
    /// and yields the number of changes applied. Changes that fail to apply
    /// are logged and skipped.
    pub fn spawn_change_feed<D: Document>(
        &self,
        mut changes: mpsc::Receiver<Change<D>>,
    ) -> JoinHandle<usize> {
        let atlas = self.clone();
        tokio::spawn(async move {
            let mut applied = 0;
            while let Some(change) = changes.recv().await {
                match atlas.apply_change(change) {
                    Ok(()) => applied += 1,
                    Err(AtlasError::Disposed) => {
                        debug!(document = type_name::<D>(), applied, "change feed stopped: atlas disposed");
                        return applied;
                    }
                    Err(e) => warn!(document = type_name::<D>(), error = %e, "change failed to apply"),
                }
            }
            debug!(document = type_name::<D>(), applied, "change feed closed");
            applied
        })
    }
}

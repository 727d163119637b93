//! Undo/redo drivers.
//!
//! Each driver moves one record between the history stacks, turns it into a
//! `Replay` plan and executes the plan through the hub with
//! `Origin::Replay`, so the replay itself is never recorded.
//!
//! Replay is best-effort: the stack transition happens before the I/O and is
//! not rolled back if the replay fails. A failed undo therefore leaves the
//! record on the redo stack; redoing it re-applies the forward state, which
//! is the state the object already has.

use tracing::{error, info};

use super::sync::{CreateParams, Origin, SyncError, SyncHub};
use crate::history::{HistoryRecord, Replay};

impl SyncHub {
    /// Reverse the newest recorded action. `Ok(None)` when nothing to undo.
    ///
    /// # Errors
    ///
    /// `Replay` if the reversing mutation fails.
    pub async fn undo(&self) -> Result<Option<HistoryRecord>, SyncError> {
        let Some(record) = self.inner.history().undo() else {
            return Ok(None);
        };
        self.replay(&record, record.inverse(), "undo").await?;
        Ok(Some(record))
    }

    /// Re-apply the newest undone action. `Ok(None)` when nothing to redo.
    ///
    /// # Errors
    ///
    /// `Replay` if the re-applying mutation fails.
    pub async fn redo(&self) -> Result<Option<HistoryRecord>, SyncError> {
        let Some(record) = self.inner.history().redo() else {
            return Ok(None);
        };
        self.replay(&record, record.forward(), "redo").await?;
        Ok(Some(record))
    }

    async fn replay(&self, record: &HistoryRecord, plan: Replay, direction: &'static str) -> Result<(), SyncError> {
        let result = match plan {
            Replay::Delete(id) => self.delete(id, Origin::Replay).await,
            Replay::Recreate(object) => self
                .create(CreateParams::from_object(&object), Origin::Replay)
                .await
                .map(|_| ()),
            Replay::Apply(id, patch) => {
                self.update(id, patch, Origin::Replay)
                    .settled()
                    .await
            }
            Replay::Nothing => Ok(()),
        };

        match result {
            Ok(()) => {
                info!(direction, kind = %record.kind, object_id = %record.object_id, "history replayed");
                Ok(())
            }
            Err(e) => {
                error!(direction, kind = %record.kind, object_id = %record.object_id, error = %e, "history replay failed");
                Err(SyncError::Replay { kind: record.kind, object_id: record.object_id, source: Box::new(e) })
            }
        }
    }
}

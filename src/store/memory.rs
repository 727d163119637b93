//! In-memory object store.
//!
//! Objects live in per-canvas hash maps behind a `std::sync::Mutex`. Each
//! canvas owns a `watch` channel whose value is replaced after every write,
//! so subscribers always observe the latest full list and never a backlog.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use super::{ObjectStore, StoreError, duplicate_input};
use crate::model::{CanvasId, CanvasObject, NewObject, ObjectId, ObjectPatch, UserId, now_ms};

#[derive(Default)]
struct CanvasEntry {
    objects: HashMap<ObjectId, CanvasObject>,
    watch: Option<watch::Sender<Vec<CanvasObject>>>,
}

impl CanvasEntry {
    fn sorted(&self) -> Vec<CanvasObject> {
        let mut objects: Vec<CanvasObject> = self.objects.values().cloned().collect();
        objects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        objects
    }

    fn notify(&self) {
        if let Some(tx) = &self.watch {
            tx.send_replace(self.sorted());
        }
    }
}

/// Object store backed by process memory. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    canvases: Arc<Mutex<HashMap<CanvasId, CanvasEntry>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_canvas<R>(&self, canvas_id: CanvasId, f: impl FnOnce(&mut CanvasEntry) -> R) -> R {
        let mut canvases = self.canvases.lock().unwrap_or_else(PoisonError::into_inner);
        f(canvases.entry(canvas_id).or_default())
    }

    fn insert(&self, canvas_id: CanvasId, input: NewObject) -> CanvasObject {
        let id = input.id.unwrap_or_else(Uuid::new_v4);
        let object = input.into_object(id, now_ms());
        self.with_canvas(canvas_id, |entry| {
            entry.objects.insert(id, object.clone());
            entry.notify();
        });
        object
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create(&self, canvas_id: CanvasId, object: NewObject) -> Result<CanvasObject, StoreError> {
        Ok(self.insert(canvas_id, object))
    }

    async fn update(&self, canvas_id: CanvasId, id: ObjectId, patch: &ObjectPatch) -> Result<(), StoreError> {
        let mut patch = patch.durable();
        patch.updated_at = Some(now_ms());
        self.with_canvas(canvas_id, |entry| {
            let Some(object) = entry.objects.get_mut(&id) else {
                return Err(StoreError::NotFound(id));
            };
            object.apply(&patch);
            entry.notify();
            Ok(())
        })
    }

    async fn delete(&self, canvas_id: CanvasId, id: ObjectId) -> Result<(), StoreError> {
        self.with_canvas(canvas_id, |entry| {
            if entry.objects.remove(&id).is_some() {
                entry.notify();
            }
        });
        Ok(())
    }

    async fn list(&self, canvas_id: CanvasId) -> Result<Vec<CanvasObject>, StoreError> {
        Ok(self.with_canvas(canvas_id, |entry| entry.sorted()))
    }

    async fn get(&self, canvas_id: CanvasId, id: ObjectId) -> Result<Option<CanvasObject>, StoreError> {
        Ok(self.with_canvas(canvas_id, |entry| entry.objects.get(&id).cloned()))
    }

    async fn duplicate(&self, canvas_id: CanvasId, id: ObjectId, created_by: UserId) -> Result<CanvasObject, StoreError> {
        let source = self
            .with_canvas(canvas_id, |entry| entry.objects.get(&id).cloned())
            .ok_or(StoreError::NotFound(id))?;
        Ok(self.insert(canvas_id, duplicate_input(&source, created_by)))
    }

    async fn subscribe_to_all(&self, canvas_id: CanvasId) -> Result<watch::Receiver<Vec<CanvasObject>>, StoreError> {
        Ok(self.with_canvas(canvas_id, |entry| match &entry.watch {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(entry.sorted());
                entry.watch = Some(tx);
                rx
            }
        }))
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;

//! Keyed pool of loaded speech models.
//!
//! Loading a model is expensive, so models stay resident between calls. A
//! lease gives exclusive use of one model instance; models are only unloaded
//! when no lease on them is outstanding.

use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ModelSize, TranscribeError};

/// Loads a model for a given size
#[async_trait]
pub trait ModelLoader: Send + Sync {
    type Model: Send + 'static;

    async fn load(&self, size: ModelSize) -> Result<Self::Model, TranscribeError>;
}

struct Resident<M> {
    size: ModelSize,
    model: Arc<Mutex<M>>,
}

pub struct ModelPool<L: ModelLoader> {
    loader: L,
    capacity: usize,
    /// Least recently used first
    resident: Mutex<Vec<Resident<L::Model>>>,
}

/// Exclusive access to a resident model; released on drop
pub struct ModelLease<M> {
    size: ModelSize,
    guard: OwnedMutexGuard<M>,
}

impl<M> ModelLease<M> {
    pub fn size(&self) -> ModelSize {
        self.size
    }
}

impl<M> Deref for ModelLease<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.guard
    }
}

impl<M> DerefMut for ModelLease<M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.guard
    }
}

impl<L: ModelLoader> ModelPool<L> {
    /// `capacity` is the number of models kept resident, at least one
    pub fn new(loader: L, capacity: usize) -> Self {
        Self {
            loader,
            capacity: capacity.max(1),
            resident: Mutex::new(Vec::new()),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Get exclusive use of the model for `size`, loading it if needed.
    ///
    /// Waits while another caller holds a lease on the same model.
    pub async fn acquire(&self, size: ModelSize) -> Result<ModelLease<L::Model>, TranscribeError> {
        let model = {
            let mut resident = self.resident.lock().await;

            if let Some(pos) = resident.iter().position(|r| r.size == size) {
                let entry = resident.remove(pos);
                let model = entry.model.clone();
                resident.push(entry);
                model
            } else {
                tracing::info!(model = %size, "Loading speech model");
                let loaded = self.loader.load(size).await?;
                // A failed load leaves the resident set untouched
                Self::evict_idle(&mut resident, self.capacity - 1);

                let model = Arc::new(Mutex::new(loaded));
                resident.push(Resident {
                    size,
                    model: model.clone(),
                });

                if resident.len() > self.capacity {
                    tracing::warn!(
                        resident = resident.len(),
                        capacity = self.capacity,
                        "All resident models are in use, pool temporarily over capacity"
                    );
                }
                model
            }
        };

        let guard = model.lock_owned().await;
        Ok(ModelLease { size, guard })
    }

    /// Sizes currently loaded, least recently used first
    pub async fn resident_models(&self) -> Vec<ModelSize> {
        self.resident.lock().await.iter().map(|r| r.size).collect()
    }

    fn evict_idle(resident: &mut Vec<Resident<L::Model>>, keep: usize) {
        while resident.len() > keep {
            // The pool's own handle is the only reference to an idle model
            let Some(pos) = resident
                .iter()
                .position(|r| Arc::strong_count(&r.model) == 1)
            else {
                break;
            };
            let evicted = resident.remove(pos);
            tracing::info!(model = %evicted.size, "Unloading speech model");
        }
    }
}

//! The background thread that owns the storage connection

use std::sync::Arc;

use crossbeam::channel::Receiver;
use tokio::sync::watch;

use super::snapshot::Snapshot;
use crate::preferences::{Preferences, PreferencesStore};
use crate::reflection::Axis;
use crate::rename::RenameQueue;
use crate::storage::SqliteStore;
use crate::Result;

pub(crate) type Task = Box<dyn FnOnce(&mut Worker) + Send>;

pub(crate) enum Job {
    Run(Task),
    Shutdown,
}

pub(crate) struct Worker {
    pub(crate) storage: SqliteStore,
    renames: Arc<RenameQueue>,
    publisher: watch::Sender<Arc<Snapshot>>,
    preferences: Option<Box<dyn PreferencesStore>>,
    active_axis: Option<String>,
    generation: u64,
}

impl Worker {
    pub(crate) fn new(
        storage: SqliteStore,
        renames: Arc<RenameQueue>,
        publisher: watch::Sender<Arc<Snapshot>>,
        preferences: Option<Box<dyn PreferencesStore>>,
    ) -> Self {
        let active_axis = preferences
            .as_ref()
            .and_then(|p| p.load())
            .and_then(|p| p.active_axis);
        Self {
            storage,
            renames,
            publisher,
            preferences,
            active_axis,
            generation: 0,
        }
    }

    /// Process jobs in arrival order until shutdown or until every sender is gone
    pub(crate) fn run(mut self, jobs: Receiver<Job>) {
        tracing::debug!("Store worker started");
        for job in jobs {
            match job {
                Job::Run(task) => task(&mut self),
                Job::Shutdown => break,
            }
        }
        tracing::debug!("Store worker stopped after {} publication(s)", self.generation);
    }

    /// Re-read everything and publish. Returns the new generation.
    pub(crate) fn refresh(&mut self, requested: Option<&str>) -> Result<u64> {
        let current = self.active_axis.clone();
        let storage = &self.storage;
        let mut snapshot =
            storage.atomically(|| Snapshot::read(storage, requested, current.as_deref()))?;

        self.generation += 1;
        snapshot.generation = self.generation;

        let active = snapshot.axis_name().map(str::to_string);
        if active != self.active_axis {
            self.active_axis = active;
            self.save_preferences();
        }

        tracing::debug!(
            "Published generation {} ({} reflection(s) on {:?})",
            snapshot.generation,
            snapshot.reflections.len(),
            self.active_axis
        );
        self.publisher.send_replace(Arc::new(snapshot));
        Ok(self.generation)
    }

    /// Drain renames, run `op`, then refresh. The snapshot is refreshed even
    /// when the drain or `op` fails, and the first error wins.
    pub(crate) fn apply<T>(&mut self, op: impl FnOnce(&SqliteStore) -> Result<T>) -> Result<T> {
        let result = self
            .renames
            .drain(&self.storage)
            .and_then(|_| op(&self.storage));
        self.finish(result)
    }

    /// Drain renames only, then refresh
    pub(crate) fn flush(&mut self) -> Result<usize> {
        let result = self.renames.drain(&self.storage);
        self.finish(result)
    }

    /// `update_axis`, keeping the active axis when it is the one renamed
    pub(crate) fn update_axis(&mut self, axis: Axis) -> Result<()> {
        let active = self.active_axis.as_deref();
        let result = self.renames.drain(&self.storage).and_then(|_| {
            let was_active = self
                .storage
                .fetch_axis(axis.id)?
                .is_some_and(|old| Some(old.name.as_str()) == active);
            self.storage.update_axis(&axis)?;
            Ok(was_active)
        });
        if let Ok(true) = result {
            self.active_axis = Some(axis.name);
            self.save_preferences();
        }
        self.finish(result.map(|_| ()))
    }

    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        match (result, self.refresh(None)) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), refreshed) => {
                if let Err(refresh) = refreshed {
                    tracing::warn!("Refresh after failed operation also failed: {}", refresh);
                }
                Err(e)
            }
        }
    }

    fn save_preferences(&self) {
        let Some(store) = &self.preferences else {
            return;
        };
        let preferences = Preferences {
            active_axis: self.active_axis.clone(),
        };
        if let Err(e) = store.save(&preferences) {
            tracing::warn!("Could not save preferences: {}", e);
        }
    }
}

//! Synchronized in-memory view of the storage layer
//!
//! A `Store` owns one background worker thread, which owns the
//! `SqliteStore`. Every public call hands a job to the worker and returns a
//! `Pending` future at once. Mutations run as drain renames, apply, re-read,
//! publish; their future resolves only after the post-mutation snapshot is
//! visible through `snapshot()`.
//!
//! Published snapshots are immutable `Arc<Snapshot>` values swapped whole,
//! so a reader never sees fields from two different reads.

mod snapshot;
mod worker;

pub use snapshot::Snapshot;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;

use crossbeam::channel::{self, Sender};
use serde::Serialize;
use tokio::sync::{oneshot, watch};

use crate::codec;
use crate::preferences::PreferencesStore;
use crate::reflection::{Axis, Reflection};
use crate::rename::{Rename, RenameQueue};
use crate::storage::{DbStats, SqliteStore};
use crate::{Error, Result};
use worker::{Job, Worker};

/// Result of a `sync` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncOutcome {
    /// A new snapshot was published
    Published { generation: u64 },
    /// Another sync was already in flight; nothing was read
    Rejected,
}

/// Completion of a background store operation.
///
/// Resolves to `Error::StoreClosed` if the worker went away first.
#[must_use = "the outcome of the operation is only reported through this Pending"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    fn ready(value: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(value);
        Self { rx }
    }

    /// Block the current thread until the operation completes.
    /// Must not be called from inside an async runtime.
    pub fn blocking_wait(self) -> Result<T> {
        self.rx.blocking_recv().unwrap_or(Err(Error::StoreClosed))
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::StoreClosed)))
    }
}

/// Clears the single-flight flag when the sync job finishes or is dropped
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Synchronized store handle. Dropping it stops the worker after the jobs
/// already queued have run.
pub struct Store {
    jobs: Sender<Job>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    renames: Arc<RenameQueue>,
    syncing: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Store {
    /// Move `storage` onto a new worker thread. The active axis is loaded
    /// from `preferences`; nothing is published until the first `sync` or
    /// mutation.
    pub fn spawn(
        storage: SqliteStore,
        preferences: Option<Box<dyn PreferencesStore>>,
    ) -> Result<Self> {
        let (jobs, rx) = channel::unbounded();
        let (publisher, snapshots) = watch::channel(Arc::new(Snapshot::default()));
        let renames = Arc::new(RenameQueue::new());

        let worker = Worker::new(storage, renames.clone(), publisher, preferences);
        let handle = thread::Builder::new()
            .name("flowlog-store".to_string())
            .spawn(move || worker.run(rx))?;

        Ok(Self {
            jobs,
            snapshots,
            renames,
            syncing: Arc::new(AtomicBool::new(false)),
            worker: Some(handle),
        })
    }

    fn submit<T, F>(&self, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Worker) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = Job::Run(Box::new(move |worker| {
            let _ = tx.send(f(worker));
        }));
        if self.jobs.send(job).is_err() {
            // the job and its reply sender were dropped, so `rx` reports closed
            tracing::warn!("Store worker is gone; dropping job");
        }
        Pending { rx }
    }

    fn mutate<T, F>(&self, op: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStore) -> Result<T> + Send + 'static,
    {
        self.submit(move |worker| worker.apply(op))
    }

    // ========== Reads ==========

    /// Re-read storage for `axis` (or the active axis) and publish.
    ///
    /// Single-flight: while a sync is in flight, further calls are rejected
    /// immediately and resolve to `SyncOutcome::Rejected`.
    pub fn sync(&self, axis: Option<&str>) -> Pending<SyncOutcome> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Sync already in flight; rejecting sync({:?})", axis);
            return Pending::ready(Ok(SyncOutcome::Rejected));
        }

        let guard = InFlight(self.syncing.clone());
        let axis = axis.map(str::to_string);
        self.submit(move |worker| {
            let result = worker.refresh(axis.as_deref());
            drop(guard);
            result.map(|generation| SyncOutcome::Published { generation })
        })
    }

    /// Read one reflection in the background
    pub fn fetch_reflection(&self, id: i64) -> Pending<Option<Reflection>> {
        self.submit(move |worker| worker.storage.fetch_reflection(id))
    }

    /// Row counts and schema version
    pub fn stats(&self) -> Pending<DbStats> {
        self.submit(|worker| worker.storage.stats())
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every publication
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.clone()
    }

    // ========== Reflection mutations ==========

    /// Insert a reflection. Resolves to its new id.
    pub fn add_reflection(&self, reflection: Reflection) -> Pending<i64> {
        self.mutate(move |storage| storage.insert_reflection(&reflection))
    }

    pub fn update_reflection(&self, reflection: Reflection) -> Pending<()> {
        self.mutate(move |storage| storage.update_reflection(&reflection))
    }

    /// Delete by id. Resolves to the number actually deleted.
    pub fn delete_reflections(&self, ids: Vec<i64>) -> Pending<usize> {
        self.mutate(move |storage| storage.delete_reflections(&ids))
    }

    // ========== Axis mutations ==========

    pub fn add_axis(&self, name: impl Into<String>, is_hidden: bool) -> Pending<Axis> {
        let name = name.into();
        self.mutate(move |storage| storage.insert_axis(&name, is_hidden))
    }

    /// Rename and/or hide an axis, matched by id
    pub fn update_axis(&self, axis: Axis) -> Pending<()> {
        self.submit(move |worker| worker.update_axis(axis))
    }

    /// Delete axes by name, all or nothing. Axes that still hold
    /// reflections cannot be deleted.
    pub fn delete_axes(&self, names: Vec<String>) -> Pending<usize> {
        self.mutate(move |storage| storage.delete_axes_by_name(&names))
    }

    /// Move every reflection of `from` into `into` and delete `from`.
    /// Resolves to the number of reflections moved.
    pub fn merge_axis(&self, from: impl Into<String>, into: impl Into<String>) -> Pending<usize> {
        let (from, into) = (from.into(), into.into());
        self.mutate(move |storage| {
            let source = storage
                .fetch_axis_by_name(&from)?
                .ok_or_else(|| Error::AxisNotFound(from.clone()))?;
            let target = storage
                .fetch_axis_by_name(&into)?
                .ok_or_else(|| Error::AxisNotFound(into.clone()))?;
            storage.merge_axis(source.id, target.id)
        })
    }

    // ========== Renames ==========

    /// Queue a rename of every reflection called `from`. Applied before the
    /// next mutation.
    pub fn rename_activity(&self, from: impl Into<String>, to: impl Into<String>) {
        self.renames.enqueue(Rename::activity(from, to));
    }

    /// Queue a rename of tag `from` everywhere
    pub fn rename_tag(&self, from: impl Into<String>, to: impl Into<String>) {
        self.renames.enqueue(Rename::tag(from, to));
    }

    /// Renames not yet applied, in submission order
    pub fn pending_renames(&self) -> Vec<Rename> {
        self.renames.pending()
    }

    /// Apply queued renames now and publish. Resolves to the number applied.
    pub fn flush_renames(&self) -> Pending<usize> {
        self.submit(|worker| worker.flush())
    }

    // ========== Import/Export ==========

    /// Export every reflection as text
    pub fn export(&self) -> Pending<String> {
        self.submit(|worker| codec::export(&worker.storage))
    }

    /// Import an export in one transaction. Resolves to the number imported.
    pub fn import(&self, source: String) -> Pending<usize> {
        self.mutate(move |storage| codec::import(storage, &source))
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Store worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::{MemoryPreferences, Preferences};
    use std::sync::mpsc;

    fn spawn() -> Store {
        Store::spawn(SqliteStore::open_in_memory().unwrap(), None).unwrap()
    }

    /// Park the worker until the returned sender fires
    fn block_worker(store: &Store) -> (mpsc::Sender<()>, Pending<()>) {
        let (release, wait) = mpsc::channel::<()>();
        let parked = store.submit(move |_| {
            let _ = wait.recv();
            Ok(())
        });
        (release, parked)
    }

    #[test]
    fn test_second_sync_rejected_while_first_in_flight() {
        let store = spawn();
        let (release, parked) = block_worker(&store);

        let first = store.sync(None);
        let second = store.sync(None);
        assert_eq!(second.blocking_wait().unwrap(), SyncOutcome::Rejected);

        release.send(()).unwrap();
        parked.blocking_wait().unwrap();
        assert_eq!(
            first.blocking_wait().unwrap(),
            SyncOutcome::Published { generation: 1 }
        );
        assert_eq!(store.snapshot().generation, 1);

        // the guard is released once the first sync completes
        assert_eq!(
            store.sync(None).blocking_wait().unwrap(),
            SyncOutcome::Published { generation: 2 }
        );
    }

    #[test]
    fn test_failed_sync_releases_guard() {
        let store = spawn();
        assert!(matches!(
            store.sync(Some("Nope")).blocking_wait(),
            Err(Error::AxisNotFound(_))
        ));
        assert!(matches!(
            store.sync(None).blocking_wait(),
            Ok(SyncOutcome::Published { .. })
        ));
    }

    #[test]
    fn test_mutation_resolves_after_publication() {
        let store = spawn();
        let id = store
            .add_reflection(Reflection::new("Run", "Default", 70, 20, 1))
            .blocking_wait()
            .unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.axis_name(), Some("Default"));
        assert_eq!(snap.reflections.iter().filter_map(|r| r.id).collect::<Vec<_>>(), vec![id]);
        assert_eq!(snap.activity_names, vec!["Run"]);
    }

    #[test]
    fn test_failed_mutation_still_publishes_drained_renames() {
        let store = spawn();
        store
            .add_reflection(Reflection::new("Jog", "Default", 50, 0, 1))
            .blocking_wait()
            .unwrap();

        store.rename_activity("Jog", "Run");
        let err = store
            .update_reflection(Reflection::new("x", "Default", 1, 1, 1).with_id(99))
            .blocking_wait()
            .unwrap_err();
        assert!(matches!(err, Error::ReflectionNotFound(99)));
        assert!(store.pending_renames().is_empty());
        assert_eq!(store.snapshot().activity_names, vec!["Run"]);
    }

    #[test]
    fn test_active_axis_saved_and_followed_on_rename() {
        let prefs = Arc::new(MemoryPreferences::new(Some(Preferences {
            active_axis: Some("Work".into()),
        })));

        struct Shared(Arc<MemoryPreferences>);
        impl PreferencesStore for Shared {
            fn load(&self) -> Option<Preferences> {
                self.0.load()
            }
            fn save(&self, preferences: &Preferences) -> Result<()> {
                self.0.save(preferences)
            }
        }

        let storage = SqliteStore::open_in_memory().unwrap();
        storage.insert_axis("Work", false).unwrap();
        let store = Store::spawn(storage, Some(Box::new(Shared(prefs.clone())))).unwrap();

        store.sync(None).blocking_wait().unwrap();
        assert_eq!(store.snapshot().axis_name(), Some("Work"));

        let mut work = store.snapshot().axis.clone().unwrap();
        work.name = "Job".into();
        store.update_axis(work).blocking_wait().unwrap();
        assert_eq!(store.snapshot().axis_name(), Some("Job"));
        assert_eq!(prefs.load().unwrap().active_axis.as_deref(), Some("Job"));

        store.sync(Some("Default")).blocking_wait().unwrap();
        assert_eq!(prefs.load().unwrap().active_axis.as_deref(), Some("Default"));
    }

    #[test]
    fn test_closed_channel_maps_to_store_closed() {
        let (tx, rx) = oneshot::channel::<Result<()>>();
        drop(tx);
        assert!(matches!(Pending { rx }.blocking_wait(), Err(Error::StoreClosed)));
    }
}

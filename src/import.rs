//! Import of a discovered file list into the collection.
//!
//! `begin_import` resolves the policy, mutates the store on the calling
//! thread and then hands the newly added images to a single background
//! worker that warms the thumbnail cache. The worker only talks back through
//! the handle's progress channel.

use crate::collection::{CollectionStore, ImageId};
use crate::thumbnail::{SizeClass, ThumbnailCache};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPolicy {
    /// Start a new set; existing ratings are dropped.
    Replace,
    /// Add to the current set, keeping ratings.
    Merge,
    /// Let the user decide through a `MergePrompt`.
    Ask,
}

/// Answer to the "add / new set / cancel" question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeChoice {
    Add,
    NewSet,
    Cancel,
}

/// Confirmation dialog collaborator for `ImportPolicy::Ask`.
pub trait MergePrompt {
    /// `current` images are loaded and `incoming` were just discovered.
    fn ask_merge_policy(&mut self, current: usize, incoming: usize) -> MergeChoice;
}

impl<F> MergePrompt for F
where
    F: FnMut(usize, usize) -> MergeChoice,
{
    fn ask_merge_policy(&mut self, current: usize, incoming: usize) -> MergeChoice {
        self(current, incoming)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Scanning,
    Populating,
    Cancelled,
}

/// Snapshot of a population run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
    pub soft_failures: u64,
}

impl Progress {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportEvent {
    /// Sent after each file.
    Progress(Progress),
    /// Final event of a run that processed every file.
    Done(Progress),
    /// Final event of a run stopped by a newer import or `cancel`.
    Cancelled(Progress),
}

impl ImportEvent {
    pub fn progress(&self) -> Progress {
        match self {
            ImportEvent::Progress(p) | ImportEvent::Done(p) | ImportEvent::Cancelled(p) => *p,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ImportEvent::Progress(_))
    }
}

/// What `begin_import` did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Replaced { added: usize },
    Merged { added: usize },
    /// The prompt answered Cancel; nothing changed.
    Cancelled,
    /// No files were offered; nothing changed.
    Empty,
}

impl ImportOutcome {
    pub fn changed_store(&self) -> bool {
        matches!(self, ImportOutcome::Replaced { .. } | ImportOutcome::Merged { .. })
    }
}

/// Caller's view of one import: the synchronous outcome plus the progress
/// stream of its population run, if one was started.
#[derive(Debug)]
pub struct ImportHandle {
    outcome: ImportOutcome,
    events: Option<Receiver<ImportEvent>>,
}

impl ImportHandle {
    fn without_population(outcome: ImportOutcome) -> Self {
        Self {
            outcome,
            events: None,
        }
    }

    pub fn outcome(&self) -> ImportOutcome {
        self.outcome
    }

    pub fn has_population(&self) -> bool {
        self.events.is_some()
    }

    pub fn try_recv(&self) -> Option<ImportEvent> {
        self.events.as_ref().and_then(|rx| rx.try_recv().ok())
    }

    /// Every event already delivered, without blocking.
    pub fn drain(&self) -> Vec<ImportEvent> {
        match &self.events {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Block until the run finishes. Returns the terminal event, or `None`
    /// if there was no population run.
    pub fn wait(&self) -> Option<ImportEvent> {
        let rx = self.events.as_ref()?;
        rx.iter().find(ImportEvent::is_terminal)
    }
}

struct Worker {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn stop(self) {
        self.cancel.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("population worker panicked");
        }
    }
}

/// Owns the single population worker and the import state machine.
pub struct ImportCoordinator {
    cache: Arc<ThumbnailCache>,
    default_size: SizeClass,
    state: ImportState,
    worker: Option<Worker>,
}

impl ImportCoordinator {
    pub fn new(cache: Arc<ThumbnailCache>, default_size: SizeClass) -> Self {
        Self {
            cache,
            default_size,
            state: ImportState::Idle,
            worker: None,
        }
    }

    /// Size class that population decodes at.
    pub fn set_default_size(&mut self, size: SizeClass) {
        self.default_size = size;
    }

    pub fn default_size(&self) -> SizeClass {
        self.default_size
    }

    pub fn state(&mut self) -> ImportState {
        if self.state == ImportState::Populating
            && self.worker.as_ref().is_some_and(|w| w.handle.is_finished())
        {
            self.reap();
            self.transition(ImportState::Idle);
        }
        self.state
    }

    fn transition(&mut self, next: ImportState) {
        if self.state != next {
            debug!("import: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }

    /// A population was started and not cancelled. It may have finished
    /// since the last `state` call.
    pub fn is_populating(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.cancel.load(Ordering::Acquire))
    }

    fn worker_active(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.handle.is_finished())
    }

    /// Ask the running population to stop at its next file boundary.
    /// Does not wait; the worker is joined on the next import or on drop.
    pub fn cancel(&mut self) {
        if let Some(worker) = &self.worker {
            worker.cancel.store(true, Ordering::Release);
            info!("import population cancelled");
            self.transition(ImportState::Cancelled);
            self.transition(ImportState::Idle);
        }
    }

    /// Cancel and wait for the worker to acknowledge. Nothing is written to
    /// the cache by this run once this returns.
    pub fn cancel_and_wait(&mut self) {
        if self.worker.is_some() {
            self.cancel();
            self.reap();
        }
    }

    /// Resolve `files` against `store` under `policy` and start populating
    /// the cache for whatever was newly added.
    ///
    /// An empty `files` list is a no-op: no prompt, no mutation, and any
    /// running population keeps going.
    pub fn begin_import(
        &mut self,
        store: &mut CollectionStore,
        files: Vec<ImageId>,
        policy: ImportPolicy,
        prompt: &mut dyn MergePrompt,
    ) -> ImportHandle {
        if files.is_empty() {
            debug!("import: empty file list, nothing to do");
            return ImportHandle::without_population(ImportOutcome::Empty);
        }

        let previous = self.state;
        self.transition(ImportState::Scanning);

        let resolved = match policy {
            ImportPolicy::Ask if store.is_empty() => Some(ImportPolicy::Replace),
            ImportPolicy::Ask => match prompt.ask_merge_policy(store.len(), files.len()) {
                MergeChoice::Add => Some(ImportPolicy::Merge),
                MergeChoice::NewSet => Some(ImportPolicy::Replace),
                MergeChoice::Cancel => None,
            },
            other => Some(other),
        };

        let Some(resolved) = resolved else {
            info!("import of {} files cancelled at prompt", files.len());
            self.transition(ImportState::Cancelled);
            let resume = if previous == ImportState::Populating && self.worker_active() {
                ImportState::Populating
            } else {
                ImportState::Idle
            };
            self.transition(resume);
            return ImportHandle::without_population(ImportOutcome::Cancelled);
        };

        // At most one worker: the old run acknowledges cancellation before
        // the store changes or a new run starts.
        if let Some(worker) = self.worker.take() {
            debug!("import: stopping previous population");
            worker.stop();
        }

        let (outcome, added) = match resolved {
            ImportPolicy::Merge => {
                let added = store.merge(files);
                (ImportOutcome::Merged { added: added.len() }, added)
            }
            _ => {
                let added = store.replace_all(files);
                (ImportOutcome::Replaced { added: added.len() }, added)
            }
        };
        info!("import: {:?}, collection now {} images", outcome, store.len());

        let events = self.spawn_population(added);
        ImportHandle {
            outcome,
            events: Some(events),
        }
    }

    /// Re-run population for `ids` at the current default size, replacing
    /// any running worker. Used when the thumbnail size class changes while
    /// a population is in flight. `outcome` is carried over from the import
    /// that started the interrupted run.
    pub fn repopulate(&mut self, ids: Vec<ImageId>, outcome: ImportOutcome) -> ImportHandle {
        if let Some(worker) = self.worker.take() {
            debug!("import: stopping population for restart");
            worker.stop();
        }
        info!("import: repopulating {} images at {}", ids.len(), self.default_size);
        ImportHandle {
            outcome,
            events: Some(self.spawn_population(ids)),
        }
    }

    /// Start the worker for whichever of `ids` is not cached yet.
    /// Any previous worker must already be stopped.
    fn spawn_population(&mut self, ids: Vec<ImageId>) -> Receiver<ImportEvent> {
        let size = self.default_size;
        let pending: Vec<ImageId> = ids
            .into_iter()
            .filter(|id| !self.cache.contains(id, size))
            .collect();

        let (tx, rx) = mpsc::channel::<ImportEvent>();

        if pending.is_empty() {
            let _ = tx.send(ImportEvent::Done(Progress::default()));
            self.transition(ImportState::Idle);
        } else {
            let cancel = Arc::new(AtomicBool::new(false));
            let worker_cancel = Arc::clone(&cancel);
            let cache = Arc::clone(&self.cache);
            let handle = thread::spawn(move || {
                populate(pending, &cache, size, &worker_cancel, &tx);
            });
            self.worker = Some(Worker { cancel, handle });
            self.transition(ImportState::Populating);
        }
        rx
    }
}

impl Drop for ImportCoordinator {
    fn drop(&mut self) {
        self.reap();
    }
}

/// Background population loop. Cancellation is checked at every file
/// boundary; a decode already in progress is allowed to finish.
fn populate(
    ids: Vec<ImageId>,
    cache: &ThumbnailCache,
    size: SizeClass,
    cancel: &AtomicBool,
    tx: &Sender<ImportEvent>,
) {
    let mut progress = Progress {
        completed: 0,
        total: ids.len() as u64,
        soft_failures: 0,
    };

    for id in &ids {
        if cancel.load(Ordering::Acquire) {
            let _ = tx.send(ImportEvent::Cancelled(progress));
            return;
        }

        if cache.get_or_decode(id, size).is_err() {
            progress.soft_failures += 1;
        }
        progress.completed += 1;

        if cancel.load(Ordering::Acquire) {
            let _ = tx.send(ImportEvent::Cancelled(progress));
            return;
        }
        // Nobody listening is fine; the cache is still being warmed.
        let _ = tx.send(ImportEvent::Progress(progress));
    }

    debug!(
        "population done: {} files, {} failed",
        progress.completed, progress.soft_failures
    );
    let _ = tx.send(ImportEvent::Done(progress));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Rating;
    use crate::thumbnail::{CacheLimits, DecodeError, Decoder, RasterImage};
    use std::path::Path;
    use std::sync::Mutex;

    const SIZE: SizeClass = SizeClass::DEFAULT_THUMBNAIL;

    fn tiny() -> RasterImage {
        RasterImage::new(2, 2)
    }

    /// Decodes everything except paths containing "bad".
    fn cache() -> Arc<ThumbnailCache> {
        let decoder: Arc<dyn Decoder> =
            Arc::new(|path: &Path, _: SizeClass| -> Result<RasterImage, DecodeError> {
                if path.to_string_lossy().contains("bad") {
                    Err(DecodeError::Decode {
                        path: path.to_path_buf(),
                        message: "bad data".to_string(),
                    })
                } else {
                    Ok(tiny())
                }
            });
        Arc::new(ThumbnailCache::new(decoder, CacheLimits::default()))
    }

    fn ids(paths: &[&str]) -> Vec<ImageId> {
        paths.iter().map(|p| ImageId::new(*p)).collect()
    }

    fn never_asked() -> impl FnMut(usize, usize) -> MergeChoice {
        |_: usize, _: usize| -> MergeChoice { panic!("prompt must not be shown") }
    }

    fn rated_store() -> CollectionStore {
        let mut store = CollectionStore::new();
        store.replace_all(ids(&["/old/a.jpg", "/old/b.jpg"]));
        store
            .rate(&ImageId::new("/old/a.jpg"), Rating::new(4).unwrap())
            .unwrap();
        store
    }

    #[test]
    fn test_replace_clears_ratings_and_populates_everything() {
        let mut store = rated_store();
        let mut coordinator = ImportCoordinator::new(cache(), SIZE);

        let handle = coordinator.begin_import(
            &mut store,
            ids(&["/new/2.jpg", "/new/1.jpg"]),
            ImportPolicy::Replace,
            &mut never_asked(),
        );

        assert_eq!(handle.outcome(), ImportOutcome::Replaced { added: 2 });
        assert_eq!(store.ids(), ids(&["/new/1.jpg", "/new/2.jpg"]).as_slice());
        assert_eq!(store.rated_count(), 0);

        let done = handle.wait().unwrap();
        assert_eq!(
            done,
            ImportEvent::Done(Progress { completed: 2, total: 2, soft_failures: 0 })
        );
    }

    #[test]
    fn test_merge_keeps_ratings_and_populates_only_new_ids() {
        let mut store = rated_store();
        let mut coordinator = ImportCoordinator::new(cache(), SIZE);

        let handle = coordinator.begin_import(
            &mut store,
            ids(&["/old/a.jpg", "/new/c.jpg"]),
            ImportPolicy::Merge,
            &mut never_asked(),
        );

        assert_eq!(handle.outcome(), ImportOutcome::Merged { added: 1 });
        assert_eq!(store.len(), 3);
        assert_eq!(store.rating_of(&ImageId::new("/old/a.jpg")), 4);
        assert_eq!(handle.wait().unwrap().progress().total, 1);
    }

    #[test]
    fn test_ask_cancel_leaves_store_untouched() {
        let mut store = rated_store();
        let revision = store.revision();
        let mut coordinator = ImportCoordinator::new(cache(), SIZE);
        let mut asked = Vec::new();

        let handle = coordinator.begin_import(
            &mut store,
            ids(&["/new/c.jpg"]),
            ImportPolicy::Ask,
            &mut |current: usize, incoming: usize| {
                asked.push((current, incoming));
                MergeChoice::Cancel
            },
        );

        assert_eq!(asked, vec![(2, 1)]);
        assert_eq!(handle.outcome(), ImportOutcome::Cancelled);
        assert!(!handle.has_population());
        assert!(handle.wait().is_none());
        assert_eq!(store.revision(), revision);
        assert_eq!(store.ids(), ids(&["/old/a.jpg", "/old/b.jpg"]).as_slice());
        assert_eq!(store.rating_of(&ImageId::new("/old/a.jpg")), 4);
        assert_eq!(coordinator.state(), ImportState::Idle);
    }

    #[test]
    fn test_ask_resolves_to_merge_or_replace() {
        let mut coordinator = ImportCoordinator::new(cache(), SIZE);

        let mut store = rated_store();
        let handle = coordinator.begin_import(
            &mut store,
            ids(&["/new/c.jpg"]),
            ImportPolicy::Ask,
            &mut |_: usize, _: usize| MergeChoice::Add,
        );
        assert_eq!(handle.outcome(), ImportOutcome::Merged { added: 1 });
        assert_eq!(store.rated_count(), 1);

        let handle = coordinator.begin_import(
            &mut store,
            ids(&["/new/d.jpg"]),
            ImportPolicy::Ask,
            &mut |_: usize, _: usize| MergeChoice::NewSet,
        );
        assert_eq!(handle.outcome(), ImportOutcome::Replaced { added: 1 });
        assert_eq!(store.rated_count(), 0);
    }

    #[test]
    fn test_ask_on_empty_store_does_not_prompt() {
        let mut store = CollectionStore::new();
        let mut coordinator = ImportCoordinator::new(cache(), SIZE);

        let handle = coordinator.begin_import(
            &mut store,
            ids(&["/new/a.jpg"]),
            ImportPolicy::Ask,
            &mut never_asked(),
        );
        assert_eq!(handle.outcome(), ImportOutcome::Replaced { added: 1 });
    }

    #[test]
    fn test_empty_file_list_is_a_no_op() {
        let mut store = rated_store();
        let revision = store.revision();
        let mut coordinator = ImportCoordinator::new(cache(), SIZE);

        for policy in [ImportPolicy::Replace, ImportPolicy::Merge, ImportPolicy::Ask] {
            let handle =
                coordinator.begin_import(&mut store, Vec::new(), policy, &mut never_asked());
            assert_eq!(handle.outcome(), ImportOutcome::Empty);
            assert!(handle.try_recv().is_none());
        }
        assert_eq!(store.revision(), revision);
        assert_eq!(store.rated_count(), 1);
    }

    #[test]
    fn test_soft_failures_are_counted_and_membership_kept() {
        let mut store = CollectionStore::new();
        let mut coordinator = ImportCoordinator::new(cache(), SIZE);

        let handle = coordinator.begin_import(
            &mut store,
            ids(&["/p/1.jpg", "/p/bad.jpg", "/p/3.jpg"]),
            ImportPolicy::Replace,
            &mut never_asked(),
        );

        assert_eq!(
            handle.wait(),
            Some(ImportEvent::Done(Progress { completed: 3, total: 3, soft_failures: 1 }))
        );
        assert!(store.contains(&ImageId::new("/p/bad.jpg")));
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_with_done() {
        let mut store = CollectionStore::new();
        let mut coordinator = ImportCoordinator::new(cache(), SIZE);
        let files: Vec<ImageId> = (0..15).map(|i| ImageId::new(format!("/p/{:02}.jpg", i))).collect();

        let handle = coordinator.begin_import(&mut store, files, ImportPolicy::Replace, &mut never_asked());
        let mut last = 0;
        let mut terminal = None;
        for event in handle.events.as_ref().unwrap().iter() {
            let completed = event.progress().completed;
            assert!(completed >= last, "progress went backwards");
            last = completed;
            if event.is_terminal() {
                terminal = Some(event);
                break;
            }
        }
        assert!(matches!(terminal, Some(ImportEvent::Done(p)) if p.completed == 15));
    }

    #[test]
    fn test_already_cached_ids_are_not_populated() {
        let cache = cache();
        let mut store = CollectionStore::new();
        cache.get_or_decode(&ImageId::new("/p/warm.jpg"), SIZE).unwrap();
        let mut coordinator = ImportCoordinator::new(Arc::clone(&cache), SIZE);

        let handle = coordinator.begin_import(
            &mut store,
            ids(&["/p/warm.jpg", "/p/cold.jpg"]),
            ImportPolicy::Replace,
            &mut never_asked(),
        );

        assert_eq!(handle.outcome(), ImportOutcome::Replaced { added: 2 });
        assert_eq!(handle.wait().unwrap().progress().total, 1);
    }

    #[test]
    fn test_new_import_cancels_running_population() {
        // Decodes of /first/* block on the gate; every decode is logged.
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let log: Arc<Mutex<Vec<String>>> = Arc::default();

        let decoder: Arc<dyn Decoder> = {
            let started_tx = Mutex::new(started_tx);
            let gate_rx = Mutex::new(gate_rx);
            let log = Arc::clone(&log);
            Arc::new(move |path: &Path, _: SizeClass| -> Result<RasterImage, DecodeError> {
                let path = path.to_string_lossy().into_owned();
                if path.starts_with("/first/") {
                    let _ = started_tx.lock().unwrap().send(());
                    let _ = gate_rx.lock().unwrap().recv();
                }
                log.lock().unwrap().push(path);
                Ok(tiny())
            })
        };
        let cache = Arc::new(ThumbnailCache::new(decoder, CacheLimits::default()));
        let mut coordinator = ImportCoordinator::new(cache, SIZE);
        let mut store = CollectionStore::new();

        let first: Vec<ImageId> = (0..5).map(|i| ImageId::new(format!("/first/{}.jpg", i))).collect();
        let first_handle =
            coordinator.begin_import(&mut store, first, ImportPolicy::Replace, &mut never_asked());
        assert_eq!(coordinator.state(), ImportState::Populating);

        // Worker is now inside the first decode.
        started_rx.recv().unwrap();
        coordinator.cancel();
        gate_tx.send(()).unwrap();

        let second: Vec<ImageId> = (0..3).map(|i| ImageId::new(format!("/second/{}.jpg", i))).collect();
        let second_handle =
            coordinator.begin_import(&mut store, second, ImportPolicy::Merge, &mut never_asked());

        let old_events = first_handle.drain();
        assert_eq!(
            old_events,
            vec![ImportEvent::Cancelled(Progress { completed: 1, total: 5, soft_failures: 0 })],
            "the in-flight file finishes, nothing is reported after cancellation"
        );
        assert!(first_handle.try_recv().is_none());

        let done = second_handle.wait().unwrap();
        assert_eq!(done, ImportEvent::Done(Progress { completed: 3, total: 3, soft_failures: 0 }));

        let log = log.lock().unwrap();
        let first_second = log.iter().position(|p| p.starts_with("/second/")).unwrap();
        assert!(
            log[first_second..].iter().all(|p| p.starts_with("/second/")),
            "cancelled run decoded after the new run started: {:?}",
            log
        );
        assert_eq!(log.iter().filter(|p| p.starts_with("/first/")).count(), 1);
        assert_eq!(store.len(), 8);
    }

    #[test]
    fn test_new_import_alone_stops_blocked_population() {
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let log: Arc<Mutex<Vec<String>>> = Arc::default();

        let decoder: Arc<dyn Decoder> = {
            let started_tx = Mutex::new(started_tx);
            let gate_rx = Mutex::new(gate_rx);
            let log = Arc::clone(&log);
            Arc::new(move |path: &Path, _: SizeClass| -> Result<RasterImage, DecodeError> {
                let path = path.to_string_lossy().into_owned();
                if path.starts_with("/first/") {
                    let _ = started_tx.lock().unwrap().send(());
                    let _ = gate_rx.lock().unwrap().recv();
                }
                log.lock().unwrap().push(path);
                Ok(tiny())
            })
        };
        let cache = Arc::new(ThumbnailCache::new(decoder, CacheLimits::default()));
        let mut coordinator = ImportCoordinator::new(cache, SIZE);
        let mut store = CollectionStore::new();

        let first: Vec<ImageId> = (0..5).map(|i| ImageId::new(format!("/first/{}.jpg", i))).collect();
        let first_handle =
            coordinator.begin_import(&mut store, first, ImportPolicy::Replace, &mut never_asked());
        started_rx.recv().unwrap();

        // Open the gate only once the next import has raised the cancel
        // flag, so the blocked decode is the last one of the first run.
        let flag = Arc::clone(&coordinator.worker.as_ref().unwrap().cancel);
        let releaser = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                thread::sleep(std::time::Duration::from_millis(1));
            }
            gate_tx.send(()).unwrap();
        });

        let second: Vec<ImageId> = (0..3).map(|i| ImageId::new(format!("/second/{}.jpg", i))).collect();
        let second_handle =
            coordinator.begin_import(&mut store, second, ImportPolicy::Merge, &mut never_asked());
        releaser.join().unwrap();

        assert_eq!(
            first_handle.drain(),
            vec![ImportEvent::Cancelled(Progress { completed: 1, total: 5, soft_failures: 0 })]
        );
        assert_eq!(
            second_handle.wait(),
            Some(ImportEvent::Done(Progress { completed: 3, total: 3, soft_failures: 0 }))
        );

        let log = log.lock().unwrap();
        assert_eq!(log.first().map(String::as_str), Some("/first/0.jpg"));
        assert!(log[1..].iter().all(|p| p.starts_with("/second/")), "{:?}", log);
        assert_eq!(log.len(), 4);
        assert_eq!(store.len(), 8);
    }

    #[test]
    fn test_repopulate_restarts_at_new_size() {
        let mut store = CollectionStore::new();
        let cache = cache();
        let mut coordinator = ImportCoordinator::new(Arc::clone(&cache), SIZE);
        let handle = coordinator.begin_import(
            &mut store,
            ids(&["/p/a.jpg", "/p/b.jpg"]),
            ImportPolicy::Replace,
            &mut never_asked(),
        );
        handle.wait().unwrap();

        let bigger = SizeClass::new(120);
        coordinator.set_default_size(bigger);
        cache.get_or_decode(&ImageId::new("/p/a.jpg"), bigger).unwrap();

        let outcome = ImportOutcome::Replaced { added: 2 };
        let handle = coordinator.repopulate(store.ids().to_vec(), outcome);
        assert_eq!(handle.outcome(), outcome);
        assert_eq!(
            handle.wait(),
            Some(ImportEvent::Done(Progress { completed: 1, total: 1, soft_failures: 0 }))
        );
        assert!(cache.contains(&ImageId::new("/p/b.jpg"), bigger));
    }

    #[test]
    fn test_state_returns_to_idle_after_population() {
        let mut store = CollectionStore::new();
        let mut coordinator = ImportCoordinator::new(cache(), SIZE);

        let handle = coordinator.begin_import(
            &mut store,
            ids(&["/p/a.jpg"]),
            ImportPolicy::Replace,
            &mut never_asked(),
        );
        handle.wait().unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while coordinator.state() != ImportState::Idle && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(2));
        }
        assert_eq!(coordinator.state(), ImportState::Idle);
    }
}

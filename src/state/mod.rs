// Conversion service module
//
// This module provides the ConversionService which owns the one FileQueue and
// the one conversion run behind a single lock, and emits change events for any
// UI layer listening.

use crate::metrics::Metrics;
use crate::models::ConversionParams;
use crate::services::{
    ConversionError, ConversionRun, ConversionStage, ConversionStateMachine, EntryId, EntryState,
    FileQueue, IngestError, TaskHandle,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::broadcast;

/// Change events emitted when the queue or the run changes
///
/// These let a UI refresh its status fields and open or close dialogues
/// without polling the service.
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceEvent {
    /// A new file was accepted into the queue
    FileQueued { id: EntryId },

    /// An entry was promoted and needs a conversion dialogue
    AttentionRequired { id: EntryId },

    /// The conversion stage changed
    StageChanged { stage: ConversionStage },

    /// Entry counts changed
    QueueChanged {
        pending: usize,
        active: usize,
        held: usize,
        deleted: usize,
    },

    /// A run produced its output file
    ConversionFinished { output: Utf8PathBuf, notify: bool },

    /// A run could not be started or continued
    ConversionFailed { reason: String },

    /// The user abandoned the run
    ConversionCancelled,
}

/// Point-in-time view of the service, used for change detection and status
/// displays.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ServiceSnapshot {
    pub stage: ConversionStage,
    pub output_file: Option<Utf8PathBuf>,
    pub pending: usize,
    pub active: usize,
    pub held: usize,
    pub deleted: usize,
    pub discarded: usize,
    pub more_pending: bool,
}

struct ServiceInner {
    queue: FileQueue,
    machine: ConversionStateMachine,
    run_started: Option<Instant>,
}

impl ServiceInner {
    fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            stage: self.machine.stage(),
            output_file: self.machine.run().output_file.clone(),
            pending: self.queue.count_in(EntryState::PendingAttention),
            active: self.queue.count_in(EntryState::BeingProcessed),
            held: self.queue.count_in(EntryState::HeldInQueue),
            deleted: self.queue.count_in(EntryState::Deleted),
            discarded: self.queue.count_in(EntryState::Discarded),
            more_pending: self.queue.has_more_pending(),
        }
    }
}

/// The single owner of the job queue and the active conversion run
///
/// All mutations go through one mutex, so callers on any thread see the same
/// sequence of states the poll-driven design assumes. Cloning shares the same
/// queue and run.
///
/// # Usage
///
/// - `queue_*` methods manage entries
/// - `conversion_*` methods start, resume and cancel the pipeline
/// - [`subscribe()`](Self::subscribe) for listening to [`ServiceEvent`]s
pub struct ConversionService {
    inner: Arc<Mutex<ServiceInner>>,

    /// Broadcast channel for emitting service events
    event_tx: broadcast::Sender<ServiceEvent>,

    metrics: Arc<Metrics>,

    /// Whether completed runs ask the UI to tell the user
    completion_popup: bool,
}

impl ConversionService {
    /// Create a service around a queue and a stopped state machine
    ///
    /// # Returns
    /// A new ConversionService with a broadcast channel buffer of 100 events
    pub fn new(queue: FileQueue, machine: ConversionStateMachine) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(Mutex::new(ServiceInner {
                queue,
                machine,
                run_started: None,
            })),
            event_tx,
            metrics: Arc::new(Metrics::new()),
            completion_popup: true,
        }
    }

    pub fn with_completion_popup(mut self, enabled: bool) -> Self {
        self.completion_popup = enabled;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.event_tx.subscribe()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn lock(&self) -> MutexGuard<'_, ServiceInner> {
        self.inner.lock().expect("conversion service lock poisoned")
    }

    fn emit(&self, event: ServiceEvent) {
        // Ignore send errors - it's OK if no one is listening
        let _ = self.event_tx.send(event);
    }

    /// Apply a mutation and emit the events it caused
    fn update<F, R>(&self, update_fn: F) -> R
    where
        F: FnOnce(&mut ServiceInner) -> R,
    {
        let mut inner = self.lock();
        let old = inner.snapshot();

        let result = update_fn(&mut *inner);

        let new = inner.snapshot();
        for change in detect_changes(&old, &new) {
            self.emit(change);
        }

        result
    }

    pub fn snapshot(&self) -> ServiceSnapshot {
        self.lock().snapshot()
    }

    /// Execute a function with read access to the queue and the run
    ///
    /// # Example
    /// ```ignore
    /// let held = service.read(|queue, _| queue.held_entries().count());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&FileQueue, &ConversionRun) -> R,
    {
        let inner = self.lock();
        f(&inner.queue, inner.machine.run())
    }

    pub fn stage(&self) -> ConversionStage {
        self.lock().machine.stage()
    }

    /// True when no run is active and no entry is waiting on a dialogue.
    pub fn is_idle(&self) -> bool {
        let inner = self.lock();
        !inner.machine.is_running() && inner.queue.count_in(EntryState::BeingProcessed) == 0
    }

    pub fn has_more_pending(&self) -> bool {
        self.lock().queue.has_more_pending()
    }

    // Queue operations

    pub fn queue_ingest(&self, path: &Utf8Path) -> Result<EntryId, IngestError> {
        let result = self.update(|inner| inner.queue.enqueue(path));
        self.metrics.record_ingest(result.is_ok());

        match &result {
            Ok(id) => self.emit(ServiceEvent::FileQueued { id: *id }),
            Err(e) => tracing::warn!("Unable to queue {}: {}", path, e),
        }
        result
    }

    pub fn queue_promote_next(&self) -> Option<EntryId> {
        let promoted = self.update(|inner| inner.queue.promote_next_pending());
        if let Some(id) = promoted {
            self.emit(ServiceEvent::AttentionRequired { id });
        }
        promoted
    }

    pub fn queue_promote_all_held(&self) -> bool {
        self.update(|inner| inner.queue.promote_all_held_included())
    }

    pub fn queue_defer_active(&self, label: &str) {
        self.update(|inner| inner.queue.defer_active_to_held(label));
        tracing::info!("Deferred active jobs to the queue as '{}'", label);
    }

    pub fn queue_reclaim_terminal(&self) -> usize {
        let removed = self.update(|inner| inner.queue.reclaim_terminal());
        self.metrics.record_reclaimed(removed);
        removed
    }

    pub fn queue_reclaim_deleted(&self) -> usize {
        let removed = self.update(|inner| inner.queue.reclaim_deleted());
        self.metrics.record_reclaimed(removed);
        removed
    }

    pub fn queue_reorder(&self, order: &[EntryId]) {
        self.update(|inner| inner.queue.reorder(order));
    }

    pub fn queue_set_include(&self, id: EntryId, include: bool) -> bool {
        self.update(|inner| inner.queue.set_include(id, include))
    }

    pub fn queue_toggle_deleted(&self, id: EntryId) -> Option<EntryState> {
        self.update(|inner| inner.queue.toggle_deleted(id))
    }

    // Conversion operations

    /// Start a run over the active entries
    ///
    /// Any spawn failure reclaims the active entries, whichever stage it
    /// happened in.
    pub fn conversion_start(&self, params: ConversionParams) -> Result<(), ConversionError> {
        let result = self.update(|inner| {
            let result = inner.machine.advance(&mut inner.queue, Some(params));
            match &result {
                Ok(_) => {
                    inner.run_started = Some(Instant::now());
                }
                Err(ConversionError::SpawnFailed { .. }) => {
                    let removed = inner.queue.reclaim_terminal();
                    self.metrics.record_reclaimed(removed);
                }
                Err(_) => {}
            }
            result
        });

        match result {
            Ok(_) => {
                self.metrics.record_started();
                Ok(())
            }
            Err(ConversionError::AlreadyRunning) => Err(ConversionError::AlreadyRunning),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Tell the service that a task exited
    ///
    /// # Returns
    /// `true` while the run is still going
    pub fn conversion_on_task_exit(&self, handle: TaskHandle) -> bool {
        let (result, finished) = self.update(|inner| {
            let tracked = inner.machine.is_running() && inner.machine.run().task == Some(handle);
            let output = inner.machine.run().output_file.clone();
            let before = inner.queue.len();

            let result = inner.machine.on_task_exit(&mut inner.queue, handle);

            let mut finished = None;
            match &result {
                Ok(false) if tracked => {
                    let removed = before.saturating_sub(inner.queue.len());
                    self.metrics.record_reclaimed(removed);
                    let elapsed = inner
                        .run_started
                        .take()
                        .map(|t| t.elapsed())
                        .unwrap_or_default();
                    finished = output.map(|o| (o, elapsed));
                }
                Err(ConversionError::SpawnFailed { .. }) => {
                    inner.run_started = None;
                    let removed = inner.queue.reclaim_terminal();
                    self.metrics.record_reclaimed(removed);
                }
                _ => {}
            }
            (result, finished)
        });

        match result {
            Ok(running) => {
                if let Some((output, elapsed)) = finished {
                    self.metrics.record_completed(elapsed);
                    self.emit(ServiceEvent::ConversionFinished {
                        output,
                        notify: self.completion_popup,
                    });
                }
                running
            }
            Err(e) => {
                self.fail(&e);
                false
            }
        }
    }

    /// Abandon the run, if any, and reclaim the active entries
    pub fn conversion_cancel(&self) {
        let was_running = self.update(|inner| {
            let running = inner.machine.is_running();
            let before = inner.queue.len();
            inner.machine.cancel(&mut inner.queue);
            inner.run_started = None;
            self.metrics
                .record_reclaimed(before.saturating_sub(inner.queue.len()));
            running
        });

        if was_running {
            self.metrics.record_cancelled();
            self.emit(ServiceEvent::ConversionCancelled);
            tracing::info!("Conversion cancelled");
        }
    }

    /// Cancel any run and delete every queued file
    pub fn shutdown(&self) {
        self.conversion_cancel();
        let removed = self.update(|inner| inner.queue.remove_all());
        tracing::info!("Queue cleared at shutdown ({} entries)", removed);
    }

    fn fail(&self, error: &ConversionError) {
        tracing::error!("Conversion failed: {}", error);
        self.metrics.record_failed();
        self.emit(ServiceEvent::ConversionFailed {
            reason: error.to_string(),
        });
    }
}

/// Detect what changed between two snapshots and generate events
fn detect_changes(old: &ServiceSnapshot, new: &ServiceSnapshot) -> Vec<ServiceEvent> {
    let mut changes = Vec::new();

    if old.stage != new.stage {
        changes.push(ServiceEvent::StageChanged { stage: new.stage });
    }

    if old.pending != new.pending
        || old.active != new.active
        || old.held != new.held
        || old.deleted != new.deleted
    {
        changes.push(ServiceEvent::QueueChanged {
            pending: new.pending,
            active: new.active,
            held: new.held,
            deleted: new.deleted,
        });
    }

    changes
}

// Make ConversionService cloneable for sharing across threads
impl Clone for ConversionService {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            event_tx: self.event_tx.clone(),
            metrics: Arc::clone(&self.metrics),
            completion_popup: self.completion_popup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::launcher::MockTaskLauncher;
    use crate::services::PipelineSettings;
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    fn service_with(launcher: MockTaskLauncher) -> (ConversionService, TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let queue = FileQueue::new(root.join("q")).unwrap();
        let machine = ConversionStateMachine::new(
            PipelineSettings {
                ghostscript: Utf8PathBuf::from("gs"),
                work_dir: root.join("w"),
            },
            Box::new(launcher),
        );
        (ConversionService::new(queue, machine), dir, root)
    }

    fn ok_launcher() -> MockTaskLauncher {
        let mut launcher = MockTaskLauncher::new();
        launcher
            .expect_launch()
            .returning(|_, _| Ok(TaskHandle::from_raw(7)));
        launcher
    }

    fn ingest(service: &ConversionService, root: &Utf8Path, name: &str) -> EntryId {
        let path = root.join(name);
        fs::write(&path, "%!PS\n").unwrap();
        service.queue_ingest(&path).unwrap()
    }

    #[test]
    fn test_new_service_is_idle() {
        let (service, _dir, _root) = service_with(MockTaskLauncher::new());
        let snapshot = service.snapshot();

        assert_eq!(snapshot.stage, ConversionStage::Stopped);
        assert_eq!(snapshot.pending, 0);
        assert!(service.is_idle());
    }

    #[test]
    fn test_ingest_emits_events() {
        let (service, _dir, root) = service_with(MockTaskLauncher::new());
        let mut rx = service.subscribe();

        let id = ingest(&service, &root, "a.ps");

        assert!(matches!(
            rx.try_recv().unwrap(),
            ServiceEvent::QueueChanged { pending: 1, .. }
        ));
        assert_eq!(rx.try_recv().unwrap(), ServiceEvent::FileQueued { id });
        assert_eq!(service.metrics().files_ingested.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_promote_makes_service_busy() {
        let (service, _dir, root) = service_with(MockTaskLauncher::new());
        let a = ingest(&service, &root, "a.ps");
        ingest(&service, &root, "b.ps");

        assert_eq!(service.queue_promote_next(), Some(a));
        assert!(service.has_more_pending());
        assert!(!service.is_idle());
    }

    #[test]
    fn test_full_run_emits_finished() {
        let (service, _dir, root) = service_with(ok_launcher());
        ingest(&service, &root, "a.ps");
        service.queue_promote_next();
        let mut rx = service.subscribe();

        let output = root.join("out.pdf");
        service
            .conversion_start(ConversionParams::new(&output))
            .unwrap();
        assert_eq!(service.stage(), ConversionStage::RunningConvert);

        assert!(!service.conversion_on_task_exit(TaskHandle::from_raw(7)));
        assert!(service.is_idle());

        let events: Vec<ServiceEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.contains(&ServiceEvent::ConversionFinished {
            output,
            notify: true
        }));
    }

    #[test]
    fn test_spawn_failure_reclaims_entries() {
        let mut launcher = MockTaskLauncher::new();
        launcher
            .expect_launch()
            .returning(|_, _| Err(io::Error::new(io::ErrorKind::NotFound, "no gs")));
        let (service, _dir, root) = service_with(launcher);
        ingest(&service, &root, "a.ps");
        service.queue_promote_next();

        let err = service
            .conversion_start(ConversionParams::new(root.join("out.pdf")))
            .unwrap_err();

        assert!(matches!(err, ConversionError::SpawnFailed { .. }));
        assert_eq!(service.read(|queue, _| queue.len()), 0);
        assert!(service.is_idle());
    }

    #[test]
    fn test_spawn_failure_after_preprocess_reclaims_entries() {
        let mut launcher = MockTaskLauncher::new();
        let mut calls = 0;
        launcher.expect_launch().returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(TaskHandle::from_raw(1))
            } else {
                Err(io::Error::new(io::ErrorKind::NotFound, "no gs"))
            }
        });
        let (service, _dir, root) = service_with(launcher);
        ingest(&service, &root, "a.ps");
        service.queue_promote_next();

        service
            .conversion_start(ConversionParams::new(root.join("out.pdf")).with_preprocess(true))
            .unwrap();
        assert!(!service.conversion_on_task_exit(TaskHandle::from_raw(1)));

        assert_eq!(service.stage(), ConversionStage::Stopped);
        assert_eq!(service.read(|queue, _| queue.len()), 0);
    }

    #[test]
    fn test_cancel_when_stopped_is_quiet() {
        let (service, _dir, _root) = service_with(MockTaskLauncher::new());
        let mut rx = service.subscribe();

        service.conversion_cancel();
        service.conversion_cancel();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_shutdown_clears_queue() {
        let (service, _dir, root) = service_with(MockTaskLauncher::new());
        ingest(&service, &root, "a.ps");
        ingest(&service, &root, "b.ps");

        service.shutdown();
        assert_eq!(service.read(|queue, _| queue.len()), 0);
    }

    #[test]
    fn test_clone_shares_state() {
        let (service, _dir, root) = service_with(MockTaskLauncher::new());
        let other = service.clone();

        ingest(&service, &root, "a.ps");
        assert_eq!(other.snapshot().pending, 1);
    }
}

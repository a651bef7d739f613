//! Integration tests for IngestPoller
//!
//! These tests verify:
//! - Drop-file polling ignores missing and empty staging files
//! - Picked-up staging files are queued and removed
//! - Transferred files are queued and left in place

use camino::{Utf8Path, Utf8PathBuf};
use printpdf::ConversionService;
use printpdf::services::{
    ConversionStateMachine, FileQueue, IngestError, IngestPoller, PipelineSettings, TaskHandle,
    TaskLauncher,
};
use std::fs;
use std::io;
use tempfile::TempDir;

struct NeverLaunched;

impl TaskLauncher for NeverLaunched {
    fn launch(&mut self, _program: &Utf8Path, _param_file: &Utf8Path) -> io::Result<TaskHandle> {
        Err(io::Error::other("not expected in ingest tests"))
    }
}

fn create_fixture() -> (TempDir, Utf8PathBuf, ConversionService, IngestPoller) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let queue = FileQueue::new(root.join("Queue")).unwrap();
    let machine = ConversionStateMachine::new(
        PipelineSettings {
            ghostscript: Utf8PathBuf::from("gs"),
            work_dir: root.join("Work"),
        },
        Box::new(NeverLaunched),
    );
    let service = ConversionService::new(queue, machine);
    let poller = IngestPoller::new(root.join("Drop/PrintJob.ps")).unwrap();
    (temp_dir, root, service, poller)
}

#[test]
fn test_poller_creates_drop_directory() {
    let (_temp_dir, root, _service, poller) = create_fixture();

    assert!(root.join("Drop").is_dir());
    assert_eq!(poller.drop_file(), root.join("Drop/PrintJob.ps").as_path());
}

#[test]
fn test_poll_without_drop_file() {
    let (_temp_dir, _root, service, poller) = create_fixture();

    assert!(!poller.poll_for_dropped_file(&service));
    assert_eq!(service.snapshot().pending, 0);
}

#[test]
fn test_poll_ignores_empty_drop_file() {
    let (_temp_dir, _root, service, poller) = create_fixture();
    fs::write(poller.drop_file(), "").unwrap();

    assert!(!poller.poll_for_dropped_file(&service));
    assert!(poller.drop_file().exists());
    assert_eq!(service.snapshot().pending, 0);
}

#[test]
fn test_poll_queues_and_removes_drop_file() {
    let (_temp_dir, _root, service, poller) = create_fixture();
    fs::write(poller.drop_file(), "%!PS\nshowpage\n").unwrap();

    assert!(poller.poll_for_dropped_file(&service));
    assert!(!poller.drop_file().exists());
    assert_eq!(service.snapshot().pending, 1);
    assert!(service.has_more_pending());

    // Nothing left to pick up on the next tick.
    assert!(!poller.poll_for_dropped_file(&service));
}

#[test]
fn test_transfer_leaves_source_in_place() {
    let (_temp_dir, root, service, poller) = create_fixture();
    let source = root.join("from-editor.ps");
    fs::write(&source, "%!PS\n").unwrap();

    let id = poller.receive_transferred_file(&service, &source).unwrap();

    assert!(source.exists());
    let queued = service.read(|queue, _| queue.path_of(id)).unwrap();
    assert_eq!(fs::read_to_string(queued).unwrap(), "%!PS\n");
}

#[test]
fn test_transfer_of_missing_file_fails() {
    let (_temp_dir, root, service, poller) = create_fixture();

    let err = poller
        .receive_transferred_file(&service, &root.join("gone.ps"))
        .unwrap_err();

    assert!(matches!(err, IngestError::OpenFailed { .. }));
    assert_eq!(
        service
            .metrics()
            .ingest_failures
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

// Conversion dialogue seam
//
// When an entry is promoted the UI is asked what to do with it. The answer
// comes back as a value instead of a stored callback, and the caller applies
// it to the service.

use crate::models::UserConfig;
use crate::services::{ConversionError, QueueEntry};
use crate::state::ConversionService;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;

/// What the user chose in the conversion dialogue
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueOutcome {
    /// Convert the active entries with these parameters
    Convert(crate::models::ConversionParams),

    /// Keep the active entries in the queue for a later run
    Defer { label: String },

    /// Throw the active entries away
    Cancel,
}

/// Asks the user how to handle the entries just bound to a run.
pub trait ConversionPrompt {
    fn request(&mut self, active: &[QueueEntry]) -> DialogueOutcome;
}

/// Apply a dialogue outcome to the service.
pub fn apply_outcome(
    service: &ConversionService,
    outcome: DialogueOutcome,
) -> Result<(), ConversionError> {
    match outcome {
        DialogueOutcome::Convert(params) => service.conversion_start(params),
        DialogueOutcome::Defer { label } => {
            service.queue_defer_active(&label);
            Ok(())
        }
        DialogueOutcome::Cancel => {
            service.queue_reclaim_terminal();
            Ok(())
        }
    }
}

/// Headless prompt answering from the user configuration.
///
/// With `Queue Jobs` set, fresh jobs are deferred to the queue; held jobs
/// coming back for conversion, and every job otherwise, are converted into the
/// output directory.
pub struct AutoPrompt {
    config: UserConfig,
    output_dir: Utf8PathBuf,
    /// Matches runs of characters not wanted in output file names
    unsafe_chars: Regex,
    jobs_seen: u32,
}

impl AutoPrompt {
    pub fn new(config: UserConfig) -> Result<Self> {
        let output_dir = Utf8PathBuf::from(&config.settings.output_dir);
        if !output_dir.exists() {
            fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create output directory: {}", output_dir))?;
        }

        Ok(Self {
            config,
            output_dir,
            unsafe_chars: Regex::new(r"[^A-Za-z0-9._-]+").expect("Invalid filename regex"),
            jobs_seen: 0,
        })
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Turn a label into a safe file stem.
    pub fn sanitise(&self, label: &str) -> String {
        let cleaned = self.unsafe_chars.replace_all(label.trim(), "_");
        cleaned.trim_matches('_').to_string()
    }

    /// Pick an output file in the output directory that does not exist yet.
    fn output_for(&self, stem: &str) -> Utf8PathBuf {
        let mut candidate = self.output_dir.join(format!("{}.pdf", stem));
        let mut suffix = 1;
        while candidate.exists() {
            candidate = self.output_dir.join(format!("{}-{}.pdf", stem, suffix));
            suffix += 1;
        }
        candidate
    }
}

impl ConversionPrompt for AutoPrompt {
    fn request(&mut self, active: &[QueueEntry]) -> DialogueOutcome {
        self.jobs_seen += 1;
        let from_queue = active.iter().any(|e| !e.display_name.is_empty());

        if self.config.settings.queue_jobs && !from_queue {
            return DialogueOutcome::Defer {
                label: format!("Print job {}", self.jobs_seen),
            };
        }

        let title = &self.config.defaults.docinfo.title;
        let label = if !title.is_empty() {
            title.clone()
        } else if let Some(entry) = active.iter().find(|e| !e.display_name.is_empty()) {
            entry.display_name.clone()
        } else {
            active
                .first()
                .map(|e| format!("PrintJob-{}", e.token))
                .unwrap_or_else(|| "PrintJob".to_string())
        };

        let mut stem = self.sanitise(&label);
        if stem.is_empty() {
            stem = "PrintJob".to_string();
        }

        let output = self.output_for(&stem);
        tracing::info!("Converting {} job(s) to {}", active.len(), output);
        DialogueOutcome::Convert(self.config.conversion_params(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{EntryState, FileQueue};
    use tempfile::TempDir;

    fn prompt_in(dir: &TempDir, queue_jobs: bool) -> AutoPrompt {
        let mut config = UserConfig::default();
        config.settings.output_dir = dir.path().join("out").to_str().unwrap().to_string();
        config.settings.queue_jobs = queue_jobs;
        AutoPrompt::new(config).unwrap()
    }

    fn active_entries(dir: &TempDir, display_name: &str) -> Vec<QueueEntry> {
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let mut queue = FileQueue::new(root.join("q")).unwrap();
        let source = root.join("job.ps");
        fs::write(&source, "%!PS\n").unwrap();
        queue.enqueue(&source).unwrap();
        queue.promote_next_pending();
        let mut entries: Vec<QueueEntry> = queue
            .entries()
            .filter(|e| e.state == EntryState::BeingProcessed)
            .cloned()
            .collect();
        entries[0].display_name = display_name.to_string();
        entries
    }

    #[test]
    fn test_sanitise() {
        let dir = TempDir::new().unwrap();
        let prompt = prompt_in(&dir, false);

        assert_eq!(prompt.sanitise("Annual Report (2024)"), "Annual_Report_2024");
        assert_eq!(prompt.sanitise("../etc/passwd"), ".._etc_passwd");
        assert_eq!(prompt.sanitise("  "), "");
    }

    #[test]
    fn test_converts_by_default() {
        let dir = TempDir::new().unwrap();
        let mut prompt = prompt_in(&dir, false);
        let active = active_entries(&dir, "");

        match prompt.request(&active) {
            DialogueOutcome::Convert(params) => {
                assert!(params.output_file.starts_with(prompt.output_dir()));
                assert_eq!(params.output_file.extension(), Some("pdf"));
            }
            other => panic!("Expected Convert, got: {:?}", other),
        }
    }

    #[test]
    fn test_queue_jobs_defers_fresh_entries() {
        let dir = TempDir::new().unwrap();
        let mut prompt = prompt_in(&dir, true);

        let fresh = active_entries(&dir, "");
        assert!(matches!(
            prompt.request(&fresh),
            DialogueOutcome::Defer { .. }
        ));

        let held = active_entries(&dir, "Quarterly");
        match prompt.request(&held) {
            DialogueOutcome::Convert(params) => {
                assert_eq!(params.output_file.file_name(), Some("Quarterly.pdf"));
            }
            other => panic!("Expected Convert, got: {:?}", other),
        }
    }

    #[test]
    fn test_output_names_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let prompt = prompt_in(&dir, false);

        let first = prompt.output_for("Doc");
        fs::write(&first, "pdf").unwrap();
        let second = prompt.output_for("Doc");

        assert_ne!(first, second);
        assert_eq!(second.file_name(), Some("Doc-1.pdf"));
    }
}

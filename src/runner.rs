//! Headless front end driving the conversion service.
//!
//! The [`Runner`] plays the part of a desktop event loop: on each poll tick it
//! looks for a dropped print job, then, when the service is idle, promotes the
//! next pending entry and asks its [`ConversionPrompt`] what to do with it.
//! Child-process exits arrive over a channel and are forwarded to the service
//! as they happen.

use crate::models::UserConfig;
use crate::services::{
    ConversionStateMachine, EntryState, FileQueue, IngestPoller, PipelineSettings, QueueEntry,
    TaskExit, TaskLauncher,
};
use crate::state::ConversionService;
use crate::ui::{ConversionPrompt, apply_outcome};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Build a service from the user configuration.
///
/// Creates the queue and work directories if they are missing.
pub fn build_service(
    config: &UserConfig,
    launcher: Box<dyn TaskLauncher>,
) -> Result<ConversionService> {
    let settings = &config.settings;

    let queue = FileQueue::new(&settings.queue_dir)
        .with_context(|| format!("Failed to create queue directory: {}", settings.queue_dir))?;

    let work_dir = Utf8PathBuf::from(&settings.work_dir);
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create work directory: {}", work_dir))?;

    let machine = ConversionStateMachine::new(
        PipelineSettings {
            ghostscript: Utf8PathBuf::from(&settings.ghostscript_exe),
            work_dir,
        },
        launcher,
    );

    Ok(ConversionService::new(queue, machine).with_completion_popup(settings.completion_popup))
}

pub struct Runner {
    service: ConversionService,
    poller: IngestPoller,
    prompt: Box<dyn ConversionPrompt>,
    poll_delay: Duration,
}

impl Runner {
    pub fn new(
        service: ConversionService,
        poller: IngestPoller,
        prompt: Box<dyn ConversionPrompt>,
        poll_delay: Duration,
    ) -> Self {
        Self {
            service,
            poller,
            prompt,
            poll_delay,
        }
    }

    pub fn service(&self) -> &ConversionService {
        &self.service
    }

    /// One poll cycle.
    ///
    /// # Returns
    /// `true` if a file was picked up or an entry was handed to the prompt
    pub fn tick(&mut self) -> bool {
        let mut activity = self.poller.poll_for_dropped_file(&self.service);

        if !self.service.is_idle() || !self.service.has_more_pending() {
            return activity;
        }

        if let Some(id) = self.service.queue_promote_next() {
            tracing::debug!("Asking about {}", id);
            let active: Vec<QueueEntry> = self.service.read(|queue, _| {
                queue
                    .entries()
                    .filter(|e| e.state == EntryState::BeingProcessed)
                    .cloned()
                    .collect()
            });

            let outcome = self.prompt.request(&active);
            if let Err(e) = apply_outcome(&self.service, outcome) {
                tracing::error!("Could not act on {}: {}", id, e);
            }
            activity = true;
        }

        activity
    }

    /// Forward a child exit to the service.
    pub fn handle_task_exit(&self, exit: TaskExit) -> bool {
        match exit.code {
            Some(0) => tracing::debug!("{} exited cleanly", exit.handle),
            Some(code) => tracing::warn!("{} exited with code {}", exit.handle, code),
            None => tracing::warn!("{} was terminated by a signal", exit.handle),
        }
        self.service.conversion_on_task_exit(exit.handle)
    }

    /// Run until `shutdown` resolves, then cancel any run and clear the queue.
    pub async fn run<S>(mut self, mut exit_rx: mpsc::UnboundedReceiver<TaskExit>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.poll_delay);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            "Watching {} every {}ms",
            self.poller.drop_file(),
            self.poll_delay.as_millis()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                Some(exit) = exit_rx.recv() => {
                    self.handle_task_exit(exit);
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
            }
        }

        self.service.shutdown();
        self.service.metrics().log_summary();
    }
}

//! Child-process launching for the conversion pipeline.
//!
//! The state machine only sees [`TaskLauncher`]: it hands over a program and a
//! parameter file and gets back an opaque [`TaskHandle`]. Termination is
//! reported separately, as a [`TaskExit`], by whatever environment owns the
//! process.

use camino::Utf8Path;
use std::fmt;
use std::io;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;

/// Opaque identifier of a launched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {}", self.0)
    }
}

/// Notification that a launched task has terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskExit {
    pub handle: TaskHandle,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
}

/// Starts the external tool with a parameter file as its only argument.
#[cfg_attr(test, mockall::automock)]
pub trait TaskLauncher: Send {
    fn launch(&mut self, program: &Utf8Path, param_file: &Utf8Path) -> io::Result<TaskHandle>;
}

/// The command line actually spawned for a parameter file.
pub fn command_line(program: &Utf8Path, param_file: &Utf8Path) -> String {
    format!("{} @{}", program, param_file)
}

/// Launches real processes on a tokio runtime.
///
/// Each child is awaited on its own task; when it exits a [`TaskExit`] is sent
/// on the channel given to [`ProcessLauncher::new`]. Children are never killed
/// when their handle is disowned.
pub struct ProcessLauncher {
    runtime: tokio::runtime::Handle,
    exit_tx: mpsc::UnboundedSender<TaskExit>,
    next_handle: u64,
}

impl ProcessLauncher {
    pub fn new(runtime: tokio::runtime::Handle, exit_tx: mpsc::UnboundedSender<TaskExit>) -> Self {
        Self {
            runtime,
            exit_tx,
            next_handle: 1,
        }
    }
}

impl TaskLauncher for ProcessLauncher {
    fn launch(&mut self, program: &Utf8Path, param_file: &Utf8Path) -> io::Result<TaskHandle> {
        // tokio::process needs the runtime's reactor to register the child.
        let _guard = self.runtime.enter();

        let mut child = Command::new(program.as_std_path())
            .arg(format!("@{}", param_file))
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()?;

        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;

        tracing::info!(
            "Launched {} as {} (pid {:?})",
            command_line(program, param_file),
            handle,
            child.id()
        );

        let exit_tx = self.exit_tx.clone();
        self.runtime.spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!("Failed to wait for {}: {}", handle, e);
                    None
                }
            };
            // The receiver is gone only during shutdown.
            let _ = exit_tx.send(TaskExit { handle, code });
        });

        Ok(handle)
    }
}

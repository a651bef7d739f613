//! Services module - The conversion core.
//!
//! This module contains the business logic for turning queued PostScript print
//! jobs into PDF files with Ghostscript. The services have no dependency on any
//! UI layer; collaborators drive them through [`crate::state::ConversionService`].
//!
//! # Components
//!
//! - [`FileQueue`]: Ordered job entries with lifecycle states and the on-disk
//!   copies backing them
//! - [`ConversionStateMachine`]: The PS2PS/PS2PDF pipeline, advanced once per
//!   observed child-process exit
//! - [`params`]: Pure builders turning parameter snapshots into command-line
//!   fragments, plus the single-line [`ParameterFile`]
//! - [`pdfmark`]: The optional PDFMark side file for document info and bookmarks
//! - [`TaskLauncher`]: The seam through which the external tool is started,
//!   with [`ProcessLauncher`] as the tokio-backed implementation
//! - [`IngestPoller`]: Drop-file polling and inter-application transfers
//!
//! # Ghostscript Integration
//!
//! The tool is never given a literal argument list. Each stage writes its flags
//! and input files to a parameter file and launches `gs @<file>`, which keeps
//! the real command line inside the 255-character limit.

pub mod conversion;
pub mod ingest;
pub mod launcher;
pub mod params;
pub mod pdfmark;
pub mod queue;

pub use conversion::{
    ConversionError, ConversionRun, ConversionStage, ConversionStateMachine, PipelineSettings,
    Tool,
};
pub use ingest::IngestPoller;
pub use launcher::{ProcessLauncher, TaskExit, TaskHandle, TaskLauncher};
pub use params::ParameterFile;
pub use queue::{EntryId, EntryState, FileQueue, IngestError, QueueEntry};

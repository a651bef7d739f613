//! Data models for the PrintPDF application.
//!
//! This module contains the serialisable data structures shared by the core and
//! its collaborators:
//! - [`UserConfig`]: Tool paths, queue locations and defaults loaded from `PrintPDF Config.yaml`
//! - [`ConversionParams`]: The parameter bundle captured when a conversion run starts
//! - The per-domain parameter snapshots ([`VersionParams`], [`OptimizationParams`],
//!   [`EncryptionParams`], [`PaperParams`], [`DocInfoParams`], [`BookmarkParams`])
//!
//! # Architecture Note
//!
//! The snapshots are plain values. The UI layer owns its copies and the
//! conversion state machine clones the bundle into the active run, so edits made
//! while a conversion is running never affect it.

pub mod config;
pub mod params;

pub use config::{ConversionDefaults, PrintPdfSettings, UserConfig};
pub use params::{
    AutoRotate, Bookmark, BookmarkParams, ConversionParams, CustomOptimization, DocInfoParams,
    Downsample, EncryptionParams, EncryptionStrength, OptimizationParams, OptimizationPreset,
    PaperParams, PaperSize, PdfVersion, VersionParams,
};

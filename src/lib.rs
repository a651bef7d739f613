// PrintPDF - Queue PostScript print jobs and convert them to PDF with Ghostscript
//
// This is the library crate containing the conversion core and its data structures.
// The binary crate (main.rs) provides the headless entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod runner;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{ConversionParams, UserConfig};
pub use runner::{Runner, build_service};
pub use state::{ConversionService, ServiceEvent, ServiceSnapshot};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

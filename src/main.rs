//! PrintPDF - Queue PostScript print jobs and convert them to PDF
//!
//! Main entry point for the headless application.
//!
//! # Overview
//!
//! This binary wires the conversion core to a poll loop. It initializes:
//! - Configuration loading ([`ConfigManager`])
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime (child processes are awaited on its workers)
//! - The conversion service, the drop-file poller and an [`AutoPrompt`]
//!
//! # Execution Flow
//!
//! 1. Load `PrintPDF Data/PrintPDF Config.yaml` (defaults if missing)
//! 2. Initialize logging → logs/printpdf.<date>
//! 3. Create the tokio runtime and the process launcher
//! 4. Queue any files named on the command line
//! 5. Poll the drop file until Ctrl-C, then cancel any run and clear the queue
//!
//! # Usage
//!
//! ```text
//! printpdf [FILE.ps ...]
//! ```

use anyhow::Result;
use camino::Utf8Path;
use printpdf::services::{IngestPoller, ProcessLauncher};
use printpdf::ui::AutoPrompt;
use printpdf::{APP_NAME, ConfigManager, Runner, VERSION, build_service};
use std::time::Duration;
use tokio::sync::mpsc;

fn main() -> Result<()> {
    let config_manager = ConfigManager::new("PrintPDF Data")?;
    let user_config = config_manager.load_user_config()?;
    let settings = &user_config.settings;

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = printpdf::logging::setup_logging_with_console(
        "logs",
        "printpdf",
        settings.debug_mode,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    config_manager.ensure_directories(&user_config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("printpdf-worker")
        .build()?;

    let (exit_tx, exit_rx) = mpsc::unbounded_channel();
    let launcher = ProcessLauncher::new(runtime.handle().clone(), exit_tx);
    let service = build_service(&user_config, Box::new(launcher))?;

    let poller = IngestPoller::new(&settings.drop_file)?;
    for arg in std::env::args().skip(1) {
        if let Err(e) = poller.receive_transferred_file(&service, Utf8Path::new(&arg)) {
            tracing::error!("Could not queue {}: {}", arg, e);
        }
    }

    let prompt = AutoPrompt::new(user_config.clone())?;
    let runner = Runner::new(
        service,
        poller,
        Box::new(prompt),
        Duration::from_millis(settings.poll_delay_ms.max(1)),
    );

    runtime.block_on(runner.run(exit_rx, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    }));

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");
    Ok(())
}

//! The two-stage Ghostscript pipeline, driven one step at a time.
//!
//! A run is started with parameters and then resumed each time the tracked
//! child process exits. Nothing here waits: every call performs one transition
//! and returns.
//!
//! ```text
//! Stopped --start--> Starting --(no preprocess)--> RunningConvert --exit--> Stopped
//!                        |
//!                        +--(preprocess)--> RunningPreprocess --exit--> RunningConvert
//! ```

use crate::models::ConversionParams;
use crate::services::launcher::{TaskHandle, TaskLauncher, command_line};
use crate::services::params::{self, ParameterFile};
use crate::services::pdfmark;
use crate::services::queue::FileQueue;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io;
use thiserror::Error;

/// Longest command line the tool may be launched with.
pub const MAX_COMMAND_LINE: usize = 255;

const PARAM_FILE_NAME: &str = "GSParams";
const PDFMARK_FILE_NAME: &str = "PDFMark";

/// Which pipeline stage a tool launch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// PostScript-to-PostScript normalisation.
    Ps2Ps,
    /// PostScript-to-PDF conversion.
    Ps2Pdf,
}

impl Tool {
    pub fn device(&self) -> &'static str {
        match self {
            Tool::Ps2Ps => "ps2write",
            Tool::Ps2Pdf => "pdfwrite",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tool::Ps2Ps => write!(f, "ps2ps"),
            Tool::Ps2Pdf => write!(f, "ps2pdf"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionStage {
    #[default]
    Stopped,
    Starting,
    RunningPreprocess,
    RunningConvert,
}

/// Errors that can occur while starting or advancing a conversion
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Unable to create output file {path}: {source}")]
    OutputCreateFailed {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to launch {tool}: {source}")]
    SpawnFailed {
        tool: Tool,
        #[source]
        source: io::Error,
    },

    #[error("A conversion is already running")]
    AlreadyRunning,
}

/// State of the single active conversion.
///
/// The parameters are captured by [`ConversionStateMachine::advance`] and do
/// not change for the rest of the run.
#[derive(Debug, Clone, Default)]
pub struct ConversionRun {
    pub stage: ConversionStage,
    pub output_file: Option<Utf8PathBuf>,
    pub pdfmark_user_file: Option<Utf8PathBuf>,
    pub preprocess_requested: bool,
    pub task: Option<TaskHandle>,
    params: Option<ConversionParams>,
    intermediate_token: Option<String>,
}

impl ConversionRun {
    pub fn is_running(&self) -> bool {
        self.stage != ConversionStage::Stopped
    }
}

/// Fixed locations the pipeline works with.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// The Ghostscript executable.
    pub ghostscript: Utf8PathBuf,
    /// Directory for the parameter file and the PDFMark side file.
    pub work_dir: Utf8PathBuf,
}

impl PipelineSettings {
    pub fn param_file(&self) -> Utf8PathBuf {
        self.work_dir.join(PARAM_FILE_NAME)
    }

    pub fn pdfmark_file(&self) -> Utf8PathBuf {
        self.work_dir.join(PDFMARK_FILE_NAME)
    }
}

pub struct ConversionStateMachine {
    run: ConversionRun,
    settings: PipelineSettings,
    launcher: Box<dyn TaskLauncher>,
}

impl std::fmt::Debug for ConversionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionStateMachine")
            .field("run", &self.run)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ConversionStateMachine {
    pub fn new(settings: PipelineSettings, launcher: Box<dyn TaskLauncher>) -> Self {
        Self {
            run: ConversionRun::default(),
            settings,
            launcher,
        }
    }

    pub fn run(&self) -> &ConversionRun {
        &self.run
    }

    pub fn stage(&self) -> ConversionStage {
        self.run.stage
    }

    pub fn is_running(&self) -> bool {
        self.run.is_running()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Start a run (`params` given, stopped) or resume one (`params` omitted,
    /// after the tracked task exited).
    ///
    /// # Returns
    /// `Ok(true)` while the run is still going, `Ok(false)` once stopped
    ///
    /// # Errors
    /// - `AlreadyRunning` if parameters are supplied mid-run; the run is untouched
    /// - `OutputCreateFailed` if the destination cannot be created; the active
    ///   entries are reclaimed
    /// - `SpawnFailed` if a parameter file cannot be written or the tool cannot
    ///   be launched; the active entries are left for the caller
    pub fn advance(
        &mut self,
        queue: &mut FileQueue,
        params: Option<ConversionParams>,
    ) -> Result<bool, ConversionError> {
        match (self.run.stage, params) {
            (ConversionStage::Stopped, Some(params)) => self.begin(queue, params),
            (ConversionStage::Stopped, None) => Ok(false),
            (_, Some(_)) => {
                tracing::warn!("Conversion start rejected: stage is {:?}", self.run.stage);
                Err(ConversionError::AlreadyRunning)
            }
            (ConversionStage::RunningPreprocess, None) => self.preprocess_finished(queue),
            (ConversionStage::RunningConvert, None) => {
                self.convert_finished(queue);
                Ok(false)
            }
            (ConversionStage::Starting, None) => {
                // Starting never outlives a call to begin().
                tracing::warn!("Found conversion stuck in Starting; resetting");
                self.reset();
                Ok(false)
            }
        }
    }

    /// Feed a task termination to the machine.
    ///
    /// Exits of tasks other than the tracked one are ignored.
    pub fn on_task_exit(
        &mut self,
        queue: &mut FileQueue,
        handle: TaskHandle,
    ) -> Result<bool, ConversionError> {
        if !self.is_running() || self.run.task != Some(handle) {
            tracing::debug!("Ignoring exit of untracked {}", handle);
            return Ok(self.is_running());
        }

        self.run.task = None;
        self.advance(queue, None)
    }

    /// Abandon the run and reclaim the active entries.
    ///
    /// A running child is disowned, not killed.
    pub fn cancel(&mut self, queue: &mut FileQueue) {
        if let Some(task) = self.run.task {
            tracing::info!("Cancelling conversion; disowning {}", task);
        }
        // The intermediate file is not a queue entry until preprocessing ends.
        if let Some(token) = self.run.intermediate_token.take() {
            let intermediate = queue.path_for_token(&token);
            if let Err(e) = fs::remove_file(&intermediate) {
                tracing::warn!("Failed to remove intermediate {}: {}", intermediate, e);
            }
        }
        self.reset();
        queue.reclaim_terminal();
    }

    fn reset(&mut self) {
        self.run = ConversionRun::default();
    }

    fn begin(
        &mut self,
        queue: &mut FileQueue,
        params: ConversionParams,
    ) -> Result<bool, ConversionError> {
        self.run = ConversionRun {
            stage: ConversionStage::Starting,
            output_file: Some(params.output_file.clone()),
            pdfmark_user_file: params.pdfmark_user_file.clone(),
            preprocess_requested: params.preprocess,
            task: None,
            params: Some(params),
            intermediate_token: None,
        };

        let output = params_output(&self.run);
        if let Err(e) = File::create(&output) {
            tracing::error!("Unable to create output file {}: {}", output, e);
            self.reset();
            queue.reclaim_terminal();
            return Err(ConversionError::OutputCreateFailed {
                path: output,
                source: e,
            });
        }

        tracing::info!(
            "Conversion started: {} input(s) -> {} (preprocess: {})",
            queue.active_paths().len(),
            output,
            self.run.preprocess_requested
        );

        if let Err(e) = self.launch_first_stage(queue) {
            discard_output(&output);
            return Err(e);
        }
        Ok(true)
    }

    fn launch_first_stage(&mut self, queue: &mut FileQueue) -> Result<(), ConversionError> {
        if self.run.preprocess_requested {
            let token = queue.allocate_token();
            let intermediate = queue.path_for_token(&token);
            // Claim the name now so a concurrent enqueue cannot pick it.
            if let Err(e) = File::create(&intermediate) {
                self.reset();
                return Err(ConversionError::SpawnFailed {
                    tool: Tool::Ps2Ps,
                    source: e,
                });
            }
            self.run.intermediate_token = Some(token);

            let mut file = ParameterFile::for_device(Tool::Ps2Ps.device(), &intermediate);
            for input in queue.active_paths() {
                file.push_path(&input);
            }

            if let Err(e) = self.launch(Tool::Ps2Ps, &file) {
                let _ = fs::remove_file(&intermediate);
                return Err(e);
            }
            self.run.stage = ConversionStage::RunningPreprocess;
            Ok(())
        } else {
            self.launch_convert(queue)
        }
    }

    fn preprocess_finished(&mut self, queue: &mut FileQueue) -> Result<bool, ConversionError> {
        let Some(token) = self.run.intermediate_token.take() else {
            tracing::warn!("Preprocess finished without an intermediate file; resetting");
            self.reset();
            return Ok(false);
        };

        let id = queue.discard_active_and_append(token);
        tracing::info!("Preprocess finished; converting intermediate {}", id);

        let output = params_output(&self.run);
        if let Err(e) = self.launch_convert(queue) {
            discard_output(&output);
            return Err(e);
        }
        Ok(true)
    }

    fn launch_convert(&mut self, queue: &FileQueue) -> Result<(), ConversionError> {
        let file = self.convert_parameters(queue).map_err(|e| {
            self.reset();
            ConversionError::SpawnFailed {
                tool: Tool::Ps2Pdf,
                source: e,
            }
        })?;

        self.launch(Tool::Ps2Pdf, &file)?;
        self.run.stage = ConversionStage::RunningConvert;
        Ok(())
    }

    /// Parameter file for the convert stage, writing the PDFMark side file
    /// first if the run has document info or bookmarks.
    fn convert_parameters(&self, queue: &FileQueue) -> io::Result<ParameterFile> {
        let output = params_output(&self.run);
        let mut file = ParameterFile::for_device(Tool::Ps2Pdf.device(), &output);

        if let Some(params) = &self.run.params {
            file.extend(params::version_args(&params.version))
                .extend(params::optimization_args(&params.optimization))
                .extend(params::encryption_args(&params.encryption))
                .extend(params::paper_args(&params.paper));
        }

        for input in queue.active_paths() {
            file.push_path(&input);
        }

        if let Some(params) = self.run.params.as_ref().filter(|p| p.has_pdfmark_content()) {
            let side_file = self.settings.pdfmark_file();
            pdfmark::write_side_file(&side_file, &params.docinfo, &params.bookmarks)
                .map_err(io::Error::other)?;
            file.push_path(&side_file);
        }

        if let Some(user_file) = &self.run.pdfmark_user_file {
            if user_file.exists() {
                file.push_path(user_file);
            } else {
                tracing::warn!("PDFMark user file {} not found; skipping", user_file);
            }
        }

        Ok(file)
    }

    /// Write the parameter file and start the tool.
    ///
    /// On failure the run is reset to `Stopped`.
    fn launch(&mut self, tool: Tool, file: &ParameterFile) -> Result<(), ConversionError> {
        let result = self.try_launch(file);
        match result {
            Ok(handle) => {
                self.run.task = Some(handle);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Unable to launch {}: {}", tool, e);
                self.reset();
                Err(ConversionError::SpawnFailed { tool, source: e })
            }
        }
    }

    fn try_launch(&mut self, file: &ParameterFile) -> io::Result<TaskHandle> {
        let param_path = self.settings.param_file();
        let line = command_line(&self.settings.ghostscript, &param_path);
        if line.len() > MAX_COMMAND_LINE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("command line too long ({} characters)", line.len()),
            ));
        }

        if !self.settings.work_dir.exists() {
            fs::create_dir_all(&self.settings.work_dir)?;
        }
        file.write_to(&param_path).map_err(io::Error::other)?;

        self.launcher.launch(&self.settings.ghostscript, &param_path)
    }

    fn convert_finished(&mut self, queue: &mut FileQueue) {
        let output = params_output(&self.run);
        mark_output(&output);

        let reclaimed = queue.reclaim_terminal();
        tracing::info!(
            "Conversion finished: {} ({} queue entries reclaimed)",
            output,
            reclaimed
        );
        self.reset();
    }
}

fn params_output(run: &ConversionRun) -> Utf8PathBuf {
    run.output_file.clone().unwrap_or_default()
}

/// Remove the placeholder output of a run that never got going.
fn discard_output(output: &Utf8Path) {
    if let Err(e) = fs::remove_file(output) {
        tracing::warn!("Failed to remove unused output {}: {}", output, e);
    }
}

/// Check the finished output and log what was produced.
fn mark_output(output: &Utf8Path) {
    match fs::metadata(output) {
        Ok(meta) if meta.len() > 0 => {
            tracing::info!("Wrote {} ({} bytes)", output, meta.len());
        }
        Ok(_) => tracing::warn!("Output {} is empty", output),
        Err(e) => tracing::warn!("Output {} is missing: {}", output, e),
    }
}

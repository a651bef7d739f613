use crate::models::params::{
    BookmarkParams, ConversionParams, DocInfoParams, EncryptionParams, OptimizationParams,
    PaperParams, VersionParams,
};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// User configuration from PrintPDF Config.yaml
///
/// Contains tool paths, queue locations and the default conversion settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "PrintPDF_Settings")]
    pub settings: PrintPdfSettings,

    #[serde(rename = "Conversion_Defaults", default)]
    pub defaults: ConversionDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintPdfSettings {
    #[serde(rename = "Ghostscript EXE", default = "default_ghostscript")]
    pub ghostscript_exe: String,

    #[serde(rename = "Queue Directory", default = "default_queue_dir")]
    pub queue_dir: String,

    #[serde(rename = "Work Directory", default = "default_work_dir")]
    pub work_dir: String,

    #[serde(rename = "Drop File", default = "default_drop_file")]
    pub drop_file: String,

    #[serde(rename = "Output Directory", default = "default_output_dir")]
    pub output_dir: String,

    #[serde(rename = "Poll Delay", default = "default_poll_delay")]
    pub poll_delay_ms: u64,

    #[serde(rename = "Preprocess", default)]
    pub preprocess: bool,

    #[serde(rename = "Queue Jobs", default)]
    pub queue_jobs: bool,

    #[serde(rename = "Completion Popup", default = "default_completion_popup")]
    pub completion_popup: bool,

    #[serde(rename = "PDFMark User File", default)]
    pub pdfmark_user_file: String,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for PrintPdfSettings {
    fn default() -> Self {
        Self {
            ghostscript_exe: default_ghostscript(),
            queue_dir: default_queue_dir(),
            work_dir: default_work_dir(),
            drop_file: default_drop_file(),
            output_dir: default_output_dir(),
            poll_delay_ms: default_poll_delay(),
            preprocess: false,
            queue_jobs: false,
            completion_popup: default_completion_popup(),
            pdfmark_user_file: String::new(),
            debug_mode: false,
        }
    }
}

impl PrintPdfSettings {
    /// The optional user PDFMark file, `None` when unset.
    pub fn pdfmark_user_file(&self) -> Option<Utf8PathBuf> {
        if self.pdfmark_user_file.is_empty() {
            None
        } else {
            Some(Utf8PathBuf::from(&self.pdfmark_user_file))
        }
    }
}

/// Default parameter snapshots handed to each conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionDefaults {
    #[serde(rename = "Version", default)]
    pub version: VersionParams,

    #[serde(rename = "Optimization", default)]
    pub optimization: OptimizationParams,

    #[serde(rename = "Encryption", default)]
    pub encryption: EncryptionParams,

    #[serde(rename = "Paper", default)]
    pub paper: PaperParams,

    #[serde(rename = "Document Info", default)]
    pub docinfo: DocInfoParams,

    #[serde(rename = "Bookmarks", default)]
    pub bookmarks: BookmarkParams,
}

impl UserConfig {
    /// Build the parameters for a run writing to `output_file`.
    pub fn conversion_params(&self, output_file: &Utf8Path) -> ConversionParams {
        let defaults = &self.defaults;
        ConversionParams {
            output_file: output_file.to_path_buf(),
            preprocess: self.settings.preprocess,
            pdfmark_user_file: self.settings.pdfmark_user_file(),
            version: defaults.version.clone(),
            optimization: defaults.optimization.clone(),
            encryption: defaults.encryption.clone(),
            paper: defaults.paper.clone(),
            docinfo: defaults.docinfo.clone(),
            bookmarks: defaults.bookmarks.clone(),
        }
    }
}

fn default_ghostscript() -> String {
    "gs".to_string()
}

fn default_queue_dir() -> String {
    "PrintPDF Data/Queue".to_string()
}

fn default_work_dir() -> String {
    "PrintPDF Data/Work".to_string()
}

fn default_drop_file() -> String {
    "PrintPDF Data/Drop/PrintJob.ps".to_string()
}

fn default_output_dir() -> String {
    "PrintPDF Data/Output".to_string()
}

fn default_poll_delay() -> u64 {
    500
}

fn default_completion_popup() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = PrintPdfSettings::default();
        assert_eq!(settings.ghostscript_exe, "gs");
        assert_eq!(settings.poll_delay_ms, 500);
        assert!(settings.completion_popup);
        assert!(!settings.preprocess);
        assert!(settings.pdfmark_user_file().is_none());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
PrintPDF_Settings:
  Ghostscript EXE: "/usr/local/bin/gs"
  Preprocess: true
"#;
        let config: UserConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.settings.ghostscript_exe, "/usr/local/bin/gs");
        assert!(config.settings.preprocess);
        assert_eq!(config.settings.poll_delay_ms, 500);
        assert_eq!(config.settings.queue_dir, "PrintPDF Data/Queue");
    }

    #[test]
    fn test_conversion_params_from_config() {
        let mut config = UserConfig::default();
        config.settings.preprocess = true;
        config.settings.pdfmark_user_file = "/tmp/marks.ps".to_string();
        config.defaults.docinfo.title = "Report".to_string();

        let params = config.conversion_params(Utf8Path::new("/tmp/out.pdf"));
        assert_eq!(params.output_file, Utf8PathBuf::from("/tmp/out.pdf"));
        assert!(params.preprocess);
        assert_eq!(
            params.pdfmark_user_file,
            Some(Utf8PathBuf::from("/tmp/marks.ps"))
        );
        assert_eq!(params.docinfo.title, "Report");
    }
}

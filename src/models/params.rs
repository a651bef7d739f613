use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// PDF compatibility level written by the convert stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PdfVersion {
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "1.3")]
    V1_3,
    #[default]
    #[serde(rename = "1.4")]
    V1_4,
    #[serde(rename = "1.5")]
    V1_5,
    #[serde(rename = "1.6")]
    V1_6,
    #[serde(rename = "1.7")]
    V1_7,
}

impl PdfVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfVersion::V1_2 => "1.2",
            PdfVersion::V1_3 => "1.3",
            PdfVersion::V1_4 => "1.4",
            PdfVersion::V1_5 => "1.5",
            PdfVersion::V1_6 => "1.6",
            PdfVersion::V1_7 => "1.7",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionParams {
    #[serde(rename = "Compatibility Level", default)]
    pub level: PdfVersion,
}

/// Named Ghostscript distiller presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OptimizationPreset {
    #[default]
    Default,
    Screen,
    Ebook,
    Printer,
    Prepress,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AutoRotate {
    None,
    All,
    #[default]
    PageByPage,
}

/// Downsampling switch and target resolution for one image class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downsample {
    pub enabled: bool,
    pub resolution: u32,
}

impl Downsample {
    pub const fn new(enabled: bool, resolution: u32) -> Self {
        Self {
            enabled,
            resolution,
        }
    }
}

/// Settings used when the preset is [`OptimizationPreset::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOptimization {
    #[serde(rename = "Colour Images")]
    pub colour: Downsample,

    #[serde(rename = "Grey Images")]
    pub grey: Downsample,

    #[serde(rename = "Mono Images")]
    pub mono: Downsample,

    #[serde(rename = "Compress Pages")]
    pub compress_pages: bool,

    #[serde(rename = "Auto Rotate")]
    pub auto_rotate: AutoRotate,
}

impl Default for CustomOptimization {
    fn default() -> Self {
        Self {
            colour: Downsample::new(false, 72),
            grey: Downsample::new(false, 72),
            mono: Downsample::new(false, 300),
            compress_pages: true,
            auto_rotate: AutoRotate::PageByPage,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationParams {
    #[serde(rename = "Preset", default)]
    pub preset: OptimizationPreset,

    #[serde(rename = "Custom", default)]
    pub custom: CustomOptimization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EncryptionStrength {
    /// 40-bit RC4, security handler revision 2.
    #[default]
    Weak40,
    /// 128-bit RC4, security handler revision 3.
    Strong128,
}

/// Document security settings.
///
/// No encryption is applied unless at least one password is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionParams {
    #[serde(rename = "Owner Password", default)]
    pub owner_password: String,

    #[serde(rename = "User Password", default)]
    pub user_password: String,

    #[serde(rename = "Strength", default)]
    pub strength: EncryptionStrength,

    #[serde(rename = "Allow Print", default = "default_true")]
    pub allow_print: bool,

    #[serde(rename = "Allow Modify", default = "default_true")]
    pub allow_modify: bool,

    #[serde(rename = "Allow Copy", default = "default_true")]
    pub allow_copy: bool,

    #[serde(rename = "Allow Annotate", default = "default_true")]
    pub allow_annotate: bool,

    // Revision 3 only
    #[serde(rename = "Allow Forms", default = "default_true")]
    pub allow_forms: bool,

    #[serde(rename = "Allow Extract", default = "default_true")]
    pub allow_extract: bool,

    #[serde(rename = "Allow Assemble", default = "default_true")]
    pub allow_assemble: bool,

    #[serde(rename = "Allow Full Print", default = "default_true")]
    pub allow_full_print: bool,
}

impl Default for EncryptionParams {
    fn default() -> Self {
        Self {
            owner_password: String::new(),
            user_password: String::new(),
            strength: EncryptionStrength::Weak40,
            allow_print: true,
            allow_modify: true,
            allow_copy: true,
            allow_annotate: true,
            allow_forms: true,
            allow_extract: true,
            allow_assemble: true,
            allow_full_print: true,
        }
    }
}

impl EncryptionParams {
    pub fn is_enabled(&self) -> bool {
        !self.owner_password.is_empty() || !self.user_password.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum PaperSize {
    /// Leave the media size to the PostScript job.
    #[default]
    Default,
    /// A Ghostscript paper name such as `a4` or `letter`.
    Named(String),
    /// Width and height in PostScript points.
    Custom { width: f64, height: f64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperParams {
    #[serde(rename = "Size", default)]
    pub size: PaperSize,
}

/// Document information dictionary entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocInfoParams {
    #[serde(rename = "Title", default)]
    pub title: String,

    #[serde(rename = "Author", default)]
    pub author: String,

    #[serde(rename = "Subject", default)]
    pub subject: String,

    #[serde(rename = "Keywords", default)]
    pub keywords: String,
}

impl DocInfoParams {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.author.is_empty()
            && self.subject.is_empty()
            && self.keywords.is_empty()
    }
}

/// A single outline entry. Nesting is expressed by `level`, with 0 at the top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub title: String,
    pub page: u32,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub expanded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkParams {
    #[serde(rename = "Entries", default)]
    pub entries: Vec<Bookmark>,
}

impl BookmarkParams {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a conversion run needs, captured when the run starts.
///
/// The caller keeps its own copy; the state machine holds this one for the
/// duration of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionParams {
    pub output_file: Utf8PathBuf,
    pub preprocess: bool,
    pub pdfmark_user_file: Option<Utf8PathBuf>,
    pub version: VersionParams,
    pub optimization: OptimizationParams,
    pub encryption: EncryptionParams,
    pub paper: PaperParams,
    pub docinfo: DocInfoParams,
    pub bookmarks: BookmarkParams,
}

impl ConversionParams {
    /// Parameters with every snapshot at its default.
    pub fn new(output_file: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_file: output_file.into(),
            preprocess: false,
            pdfmark_user_file: None,
            version: VersionParams::default(),
            optimization: OptimizationParams::default(),
            encryption: EncryptionParams::default(),
            paper: PaperParams::default(),
            docinfo: DocInfoParams::default(),
            bookmarks: BookmarkParams::default(),
        }
    }

    pub fn with_preprocess(mut self, preprocess: bool) -> Self {
        self.preprocess = preprocess;
        self
    }

    /// True when a PDFMark side file has to be generated for this run.
    pub fn has_pdfmark_content(&self) -> bool {
        !self.docinfo.is_empty() || !self.bookmarks.is_empty()
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_disabled_without_passwords() {
        let params = EncryptionParams::default();
        assert!(!params.is_enabled());

        let params = EncryptionParams {
            user_password: "secret".to_string(),
            ..Default::default()
        };
        assert!(params.is_enabled());
    }

    #[test]
    fn test_pdfmark_content_detection() {
        let mut params = ConversionParams::new("/tmp/out.pdf");
        assert!(!params.has_pdfmark_content());

        params.docinfo.author = "A. Writer".to_string();
        assert!(params.has_pdfmark_content());

        params.docinfo = DocInfoParams::default();
        params.bookmarks.entries.push(Bookmark {
            title: "Intro".to_string(),
            page: 1,
            level: 0,
            expanded: true,
        });
        assert!(params.has_pdfmark_content());
    }

    #[test]
    fn test_version_yaml_names() {
        let parsed: VersionParams =
            serde_yaml_ng::from_str("Compatibility Level: '1.3'\n").unwrap();
        assert_eq!(parsed.level, PdfVersion::V1_3);
    }
}

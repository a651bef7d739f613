//! Command-line fragments for Ghostscript, built from the parameter snapshots.
//!
//! Every function here is pure. The fragments are collected into a
//! [`ParameterFile`] which is written out as a single line and handed to the
//! tool as `@file`, keeping the real command line short.

use crate::models::{
    AutoRotate, Downsample, EncryptionParams, EncryptionStrength, OptimizationParams,
    OptimizationPreset, PaperParams, PaperSize, VersionParams,
};
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;

/// Flags common to both pipeline stages.
const COMMON_FLAGS: [&str; 4] = ["-dNOPAUSE", "-dBATCH", "-dSAFER", "-q"];

/// Permission bits that must be set for revision 2 handlers (bits 7-32).
const PERMISSIONS_RESERVED_R2: i32 = 0xFFFF_FFC0_u32 as i32;

/// Permission bits that must be set for revision 3 handlers (bits 7-8, 13-32).
const PERMISSIONS_RESERVED_R3: i32 = 0xFFFF_F0C0_u32 as i32;

pub fn version_args(params: &VersionParams) -> Vec<String> {
    vec![format!("-dCompatibilityLevel={}", params.level.as_str())]
}

pub fn optimization_args(params: &OptimizationParams) -> Vec<String> {
    let preset = match params.preset {
        OptimizationPreset::Default => "default",
        OptimizationPreset::Screen => "screen",
        OptimizationPreset::Ebook => "ebook",
        OptimizationPreset::Printer => "printer",
        OptimizationPreset::Prepress => "prepress",
        OptimizationPreset::Custom => return custom_optimization_args(params),
    };

    vec![format!("-dPDFSETTINGS=/{}", preset)]
}

fn custom_optimization_args(params: &OptimizationParams) -> Vec<String> {
    let custom = &params.custom;
    let mut args = Vec::new();

    downsample_args(&mut args, "Color", &custom.colour);
    downsample_args(&mut args, "Gray", &custom.grey);
    downsample_args(&mut args, "Mono", &custom.mono);

    args.push(format!("-dCompressPages={}", custom.compress_pages));

    let rotate = match custom.auto_rotate {
        AutoRotate::None => "/None",
        AutoRotate::All => "/All",
        AutoRotate::PageByPage => "/PageByPage",
    };
    args.push(format!("-dAutoRotatePages={}", rotate));

    args
}

fn downsample_args(args: &mut Vec<String>, class: &str, setting: &Downsample) {
    args.push(format!("-dDownsample{}Images={}", class, setting.enabled));
    if setting.enabled {
        args.push(format!("-d{}ImageResolution={}", class, setting.resolution));
    }
}

/// Encryption flags, or nothing when no password is set.
pub fn encryption_args(params: &EncryptionParams) -> Vec<String> {
    if !params.is_enabled() {
        return Vec::new();
    }

    let (revision, key_length) = match params.strength {
        EncryptionStrength::Weak40 => (2, 40),
        EncryptionStrength::Strong128 => (3, 128),
    };

    vec![
        format!("-sOwnerPassword={}", params.owner_password),
        format!("-sUserPassword={}", params.user_password),
        format!("-dEncryptionR={}", revision),
        format!("-dKeyLength={}", key_length),
        format!("-dPermissions={}", permissions_value(params)),
    ]
}

/// The signed `/P` value for the encryption dictionary.
pub fn permissions_value(params: &EncryptionParams) -> i32 {
    let mut value = match params.strength {
        EncryptionStrength::Weak40 => PERMISSIONS_RESERVED_R2,
        EncryptionStrength::Strong128 => PERMISSIONS_RESERVED_R3,
    };

    let mut allow = |bit: u32, allowed: bool| {
        if allowed {
            value |= 1 << (bit - 1);
        }
    };

    allow(3, params.allow_print);
    allow(4, params.allow_modify);
    allow(5, params.allow_copy);
    allow(6, params.allow_annotate);

    if params.strength == EncryptionStrength::Strong128 {
        allow(9, params.allow_forms);
        allow(10, params.allow_extract);
        allow(11, params.allow_assemble);
        allow(12, params.allow_full_print);
    }

    value
}

pub fn paper_args(params: &PaperParams) -> Vec<String> {
    match &params.size {
        PaperSize::Default => Vec::new(),
        PaperSize::Named(name) => vec![
            format!("-sPAPERSIZE={}", name.to_lowercase()),
            "-dFIXEDMEDIA".to_string(),
        ],
        PaperSize::Custom { width, height } => vec![
            format!("-dDEVICEWIDTHPOINTS={}", width.round() as i64),
            format!("-dDEVICEHEIGHTPOINTS={}", height.round() as i64),
            "-dFIXEDMEDIA".to_string(),
        ],
    }
}

/// Quote an argument for the tool's `@file` reader if it contains whitespace.
pub fn quote_arg(arg: &str) -> String {
    if arg.chars().any(char::is_whitespace) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

/// An ordered argument list destined for a parameter file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterFile {
    args: Vec<String>,
}

impl ParameterFile {
    /// Start a parameter file for the given output device.
    pub fn for_device(device: &str, output: &Utf8Path) -> Self {
        let mut args: Vec<String> = COMMON_FLAGS.iter().map(|s| s.to_string()).collect();
        args.push(format!("-sDEVICE={}", device));
        args.push(format!("-sOutputFile={}", output));
        Self { args }
    }

    pub fn extend<I>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = String>,
    {
        self.args.extend(args);
        self
    }

    pub fn push_path(&mut self, path: &Utf8Path) -> &mut Self {
        self.args.push(path.to_string());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// All arguments on one line, quoted where needed.
    pub fn render(&self) -> String {
        self.args
            .iter()
            .map(|arg| quote_arg(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Write the rendered line, replacing any previous parameter file.
    pub fn write_to(&self, path: &Utf8Path) -> Result<()> {
        fs::write(path, self.render())
            .with_context(|| format!("Failed to write parameter file: {}", path))?;
        tracing::debug!("Wrote {} arguments to {}", self.args.len(), path);
        Ok(())
    }
}

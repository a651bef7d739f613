//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Configuration loading and saving
//! - Default configuration generation
//! - Partial files filling in defaults
//! - Building conversion parameters from the stored defaults

use camino::{Utf8Path, Utf8PathBuf};
use printpdf::ConfigManager;
use printpdf::models::{EncryptionStrength, OptimizationPreset, PdfVersion};
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
}

#[test]
fn test_load_default_user_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = manager.load_user_config().unwrap();
    let settings = &config.settings;

    assert_eq!(settings.ghostscript_exe, "gs");
    assert_eq!(settings.queue_dir, "PrintPDF Data/Queue");
    assert_eq!(settings.work_dir, "PrintPDF Data/Work");
    assert_eq!(settings.drop_file, "PrintPDF Data/Drop/PrintJob.ps");
    assert_eq!(settings.output_dir, "PrintPDF Data/Output");
    assert_eq!(settings.poll_delay_ms, 500);
    assert!(!settings.preprocess);
    assert!(!settings.queue_jobs);
    assert!(settings.completion_popup);
    assert!(settings.pdfmark_user_file().is_none());
    assert!(!settings.debug_mode);
}

#[test]
fn test_partial_user_config_fills_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let yaml = r#"
PrintPDF_Settings:
  Ghostscript EXE: /usr/local/bin/gs
  Preprocess: true
  PDFMark User File: marks.ps
"#;
    fs::write(config_path.join("PrintPDF Config.yaml"), yaml).unwrap();

    let config = manager.load_user_config().unwrap();

    assert_eq!(config.settings.ghostscript_exe, "/usr/local/bin/gs");
    assert!(config.settings.preprocess);
    assert_eq!(config.settings.poll_delay_ms, 500);
    assert_eq!(
        config.settings.pdfmark_user_file().as_deref(),
        Some(Utf8Path::new("marks.ps"))
    );
    assert_eq!(config.defaults.version.level, PdfVersion::default());
}

#[test]
fn test_save_and_load_round_trip_keeps_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut config = manager.load_user_config().unwrap();
    config.settings.poll_delay_ms = 250;
    config.defaults.optimization.preset = OptimizationPreset::Ebook;
    config.defaults.encryption.owner_password = "owner".to_string();
    config.defaults.encryption.strength = EncryptionStrength::Strong128;
    manager.save_user_config(&config).unwrap();

    let loaded = manager.load_user_config().unwrap();

    assert_eq!(loaded.settings.poll_delay_ms, 250);
    assert_eq!(loaded.defaults.optimization.preset, OptimizationPreset::Ebook);
    assert_eq!(loaded.defaults.encryption.owner_password, "owner");
    assert_eq!(loaded.defaults.encryption.strength, EncryptionStrength::Strong128);
}

#[test]
fn test_conversion_params_from_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut config = manager.load_user_config().unwrap();
    config.settings.preprocess = true;
    config.defaults.docinfo.author = "Accounts".to_string();

    let output = config_path.join("out.pdf");
    let params = config.conversion_params(&output);

    assert_eq!(params.output_file, output);
    assert!(params.preprocess);
    assert_eq!(params.docinfo.author, "Accounts");
    assert!(params.has_pdfmark_content());
}

//! Integration tests for multi-format document loading.
//!
//! Covers the library loaders (PDF pages, DOCX paragraphs, gated PPTX
//! slides, unsupported types) and the `docchat extract` command, which runs
//! the same pipeline without network access.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use docchat::extract::{load_documents, load_file, LoadError, LoadOptions};
use docchat::models::UploadedFile;
use tempfile::TempDir;

use common::{minimal_docx, minimal_pdf, minimal_pptx};

fn docchat_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docchat"))
}

fn presentations(enabled: bool) -> LoadOptions {
    LoadOptions {
        enable_presentations: enabled,
    }
}

#[test]
fn pdf_yields_one_segment_per_page() {
    let file = UploadedFile::new("sky.pdf", minimal_pdf("The sky is blue."));
    let segments = load_file(&file, LoadOptions::default()).unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].source, "sky.pdf");
    assert_eq!(segments[0].page, Some(1));
    assert!(
        segments[0].text.contains("sky is blue"),
        "unexpected PDF text: {:?}",
        segments[0].text
    );
}

#[test]
fn docx_yields_single_segment() {
    let file = UploadedFile::new(
        "notes.docx",
        minimal_docx(&["Office test phrase.", "Second paragraph."]),
    );
    let segments = load_file(&file, LoadOptions::default()).unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].page, None);
    assert_eq!(
        segments[0].text,
        "Office test phrase.\n\nSecond paragraph."
    );
}

#[test]
fn pptx_disabled_by_default() {
    let file = UploadedFile::new("deck.pptx", minimal_pptx(&["Slide one"]));
    let err = load_file(&file, LoadOptions::default()).unwrap_err();
    assert!(matches!(err, LoadError::PresentationsDisabled));
    assert!(err.to_string().contains("disabled"));
}

#[test]
fn pptx_slides_in_order_when_enabled() {
    let file = UploadedFile::new(
        "deck.pptx",
        minimal_pptx(&["Intro", "Findings", "Next steps"]),
    );
    let segments = load_file(&file, presentations(true)).unwrap();
    let pages: Vec<Option<u32>> = segments.iter().map(|s| s.page).collect();
    let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(pages, vec![Some(1), Some(2), Some(3)]);
    assert_eq!(texts, vec!["Intro", "Findings", "Next steps"]);
}

#[test]
fn empty_docx_is_reported_empty() {
    let file = UploadedFile::new("blank.docx", minimal_docx(&[]));
    let err = load_file(&file, LoadOptions::default()).unwrap_err();
    assert!(matches!(err, LoadError::Empty));
}

#[test]
fn batch_continues_past_bad_files() {
    let files = vec![
        UploadedFile::new("deck.pptx", minimal_pptx(&["Hidden"])),
        UploadedFile::new("bad.pdf", b"not a valid pdf".to_vec()),
        UploadedFile::new("good.docx", minimal_docx(&["Kept."])),
        UploadedFile::new("readme.txt", b"plain text".to_vec()),
    ];
    let report = load_documents(&files, LoadOptions::default());

    assert_eq!(report.segments.len(), 1);
    assert_eq!(report.segments[0].source, "good.docx");

    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(skipped, vec!["deck.pptx", "bad.pdf", "readme.txt"]);
    assert!(report.skipped[0].reason.contains("presentation support is disabled"));
}

// ============ docchat extract ============

fn setup_env(enable_presentations: bool) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("files")).unwrap();

    let config = format!(
        r#"[storage]
upload_dir = "{}/uploads"

[loader]
enable_presentations = {}

[chunking]
max_tokens = 50
overlap_tokens = 10

[llm]
api_key_env = "DOCCHAT_TEST_UNSET_KEY"
"#,
        root.display(),
        enable_presentations
    );
    let config_path = root.join("docchat.toml");
    fs::write(&config_path, config).unwrap();
    (tmp, config_path)
}

fn run_docchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(docchat_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("DOCCHAT_TEST_UNSET_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docchat: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn extract_command_lists_segments_and_skips() {
    let (tmp, config_path) = setup_env(false);
    let files = tmp.path().join("files");
    let long_paragraph = "Revenue grew in every region this quarter. ".repeat(20);
    fs::write(
        files.join("report.docx"),
        minimal_docx(&[long_paragraph.trim(), "Closing remarks."]),
    )
    .unwrap();
    fs::write(files.join("deck.pptx"), minimal_pptx(&["Hidden"])).unwrap();
    fs::write(files.join("notes.txt"), "plain").unwrap();

    let report = files.join("report.docx");
    let deck = files.join("deck.pptx");
    let notes = files.join("notes.txt");
    let (stdout, stderr, success) = run_docchat(
        &config_path,
        &[
            "extract",
            report.to_str().unwrap(),
            deck.to_str().unwrap(),
            notes.to_str().unwrap(),
        ],
    );
    assert!(success, "extract failed: stdout={}, stderr={}", stdout, stderr);

    let report_line = stdout
        .lines()
        .find(|l| l.starts_with("report.docx:"))
        .unwrap_or_else(|| panic!("no report line in: {}", stdout));
    assert!(report_line.contains("1 segments"), "{}", report_line);
    assert!(!report_line.contains(" 1 chunks"), "expected several chunks: {}", report_line);

    assert!(stdout.contains("deck.pptx: skipped (presentation support is disabled"));
    assert!(stdout.contains("notes.txt: skipped (unsupported file type 'txt'"));
}

#[test]
fn extract_command_reads_slides_when_enabled() {
    let (tmp, config_path) = setup_env(true);
    let deck = tmp.path().join("files").join("deck.pptx");
    fs::write(&deck, minimal_pptx(&["Intro", "Findings"])).unwrap();

    let (stdout, _, success) = run_docchat(&config_path, &["extract", deck.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("deck.pptx: 2 segments, 2 chunks"), "{}", stdout);
    assert!(stdout.contains("page 2"), "{}", stdout);
}

#[test]
fn ask_without_credential_fails_cleanly() {
    let (tmp, config_path) = setup_env(false);
    let doc = tmp.path().join("files").join("a.docx");
    fs::write(&doc, minimal_docx(&["Anything."])).unwrap();

    let (_, stderr, success) = run_docchat(
        &config_path,
        &["ask", doc.to_str().unwrap(), "--question", "What?"],
    );
    assert!(!success);
    assert!(stderr.contains("No API key"), "{}", stderr);
    assert!(stderr.contains("DOCCHAT_TEST_UNSET_KEY"), "{}", stderr);
}

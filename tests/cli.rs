//! Binary-level tests for the `docgpt` CLI.
//!
//! These run the compiled binary with a scratch cache directory and no API
//! key; nothing here talks to the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docgpt_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("docgpt");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let cache_dir = tmp.path().join("cache");
    let config_path = tmp.path().join("docgpt.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[cache]
dir = "{}"

[embedding]
provider = "disabled"
"#,
            cache_dir.display()
        ),
    )
    .unwrap();
    (tmp, config_path)
}

fn run_docgpt(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(docgpt_binary())
        .current_dir(config_path.parent().unwrap())
        .arg("--config")
        .arg(config_path)
        .arg("--progress")
        .arg("off")
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .output()
        .expect("failed to run docgpt");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

/// Sixty lines of fifty GPT-2 tokens each: "hello" + 48 × " hello" + "\n".
fn three_thousand_token_text() -> String {
    let line = format!("hello{}\n", " hello".repeat(48));
    line.repeat(60)
}

fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[test]
fn test_ingest_dry_run_chunks_txt() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("long.txt");
    fs::write(&file, three_thousand_token_text()).unwrap();

    let (stdout, stderr, success) =
        run_docgpt(&config, &["ingest", file.to_str().unwrap(), "--dry-run"]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("format: txt"));
    assert!(stdout.contains("chunks: 6"), "unexpected output: {}", stdout);

    let stored = tmp.path().join("cache/files/long.txt");
    assert_eq!(fs::read(stored).unwrap(), fs::read(&file).unwrap());
}

#[test]
fn test_ingest_dry_run_docx() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("memo.docx");
    fs::write(&file, minimal_docx(&["First paragraph.", "Second paragraph."])).unwrap();

    let (stdout, stderr, success) =
        run_docgpt(&config, &["ingest", file.to_str().unwrap(), "--dry-run"]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("format: docx"));
    assert!(stdout.contains("chunks: 1"));
}

#[test]
fn test_ingest_unsupported_format_fails() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("readme.md");
    fs::write(&file, "# Title\n").unwrap();

    let (_stdout, stderr, success) =
        run_docgpt(&config, &["ingest", file.to_str().unwrap(), "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("unsupported file type"), "stderr: {}", stderr);
    assert!(!tmp.path().join("cache/files/readme.md").exists());
}

#[test]
fn test_ingest_empty_document_fails() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("blank.txt");
    fs::write(&file, "\n\n   \n").unwrap();

    let (_stdout, _stderr, success) =
        run_docgpt(&config, &["ingest", file.to_str().unwrap(), "--dry-run"]);
    assert!(!success);
}

#[test]
fn test_ingest_with_disabled_embeddings_fails() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("notes.txt");
    fs::write(&file, "some text\n").unwrap();

    let (_stdout, stderr, success) = run_docgpt(&config, &["ingest", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);
}

#[test]
fn test_ask_without_api_key_fails() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("docgpt.toml");
    fs::write(
        &config,
        format!("[cache]\ndir = \"{}\"\n", tmp.path().join("cache").display()),
    )
    .unwrap();
    let file = tmp.path().join("notes.txt");
    fs::write(&file, "some text\n").unwrap();

    let (stdout, stderr, success) =
        run_docgpt(&config, &["ask", file.to_str().unwrap(), "What is this?"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("API key"), "stderr: {}", stderr);
}

#[test]
fn test_cache_stats_and_clear() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("a.txt");
    fs::write(&file, "alpha\nbeta\n").unwrap();
    let (_, stderr, success) = run_docgpt(&config, &["ingest", file.to_str().unwrap(), "--dry-run"]);
    assert!(success, "{}", stderr);

    let (stdout, _, success) = run_docgpt(&config, &["cache", "stats"]);
    assert!(success);
    assert!(stdout.contains("Files:       1"), "stats: {}", stdout);

    let (stdout, _, success) = run_docgpt(&config, &["cache", "clear", "--file", "a.txt"]);
    assert!(success);
    assert!(stdout.contains("Cleared cached data for a.txt"));
    assert!(!tmp.path().join("cache/files/a.txt").exists());

    let (stdout, _, success) = run_docgpt(&config, &["cache", "clear"]);
    assert!(success);
    assert!(stdout.contains("Cleared"));
    assert!(!tmp.path().join("cache/files").exists());

    let (stdout, _, success) = run_docgpt(&config, &["cache", "clear"]);
    assert!(success);
    assert!(stdout.contains("Nothing to clear"));
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let (stdout, stderr, success) =
        run_docgpt(&tmp.path().join("absent.toml"), &["cache", "clear", "--file", "x.txt"]);
    assert!(success, "{}", stderr);
    assert!(stdout.contains("Nothing to clear"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[chunking]\nchunk_size = 100\nchunk_overlap = 200\n").unwrap();
    let (_, stderr, success) = run_docgpt(&config, &["cache", "stats"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"));
}

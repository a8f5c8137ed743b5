//! Integration tests for all CLI commands
//!
//! Each test runs the binary with an isolated home and working directory so
//! no real `.manudoc.toml` is picked up.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to create a CLI command rooted in `dir`
fn cli(dir: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_manudoc"));
    cmd.current_dir(dir.path()).env("HOME", dir.path()).env_remove("RUST_LOG");
    cmd
}

fn write_payload(dir: &TempDir, payload: &serde_json::Value) -> PathBuf {
    let path = dir.path().join("payload.json");
    fs::write(&path, serde_json::to_string(payload).unwrap()).unwrap();
    path
}

fn payload() -> serde_json::Value {
    serde_json::json!({
        "title": "Effect of vitamin D on fracture healing",
        "authors": "Lee, Ann",
        "affiliations": ["cairo university"],
        "receive_date": "2024-01-15",
        "accept_date": "2024-02-20",
        "introduction": "Fractures are common [1].",
        "tables": [[["a", "b"], ["1", "2"]]],
        "figures": [{"caption": "Broken", "data": "bm90IGFuIGltYWdl"}]
    })
}

// ============ GENERATE COMMAND TESTS ============

#[test]
fn test_generate_help() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["generate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generate a manuscript document"));
}

#[test]
fn test_generate_appends_extension() {
    let dir = TempDir::new().unwrap();
    let payload = write_payload(&dir, &payload());
    cli(&dir)
        .arg("generate")
        .arg("--payload")
        .arg(&payload)
        .args(["--output", "out/paper"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated"))
        .stderr(predicate::str::contains("figure 1 skipped"));

    let output = dir.path().join("out/paper.docx");
    assert!(output.exists());
    assert!(fs::read(output).unwrap().starts_with(b"PK"));
}

#[test]
fn test_generate_from_stdin_json_report() {
    let dir = TempDir::new().unwrap();
    let assert = cli(&dir)
        .args(["generate", "--payload", "-", "--output", "paper.docx", "--json"])
        .write_stdin(serde_json::to_string(&payload()).unwrap())
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["output_path"], "paper.docx");
    assert_eq!(report["warnings"][0]["kind"], "figure");
    assert_eq!(report["warnings"][0]["index"], 1);
}

#[test]
fn test_generate_missing_title_fails() {
    let dir = TempDir::new().unwrap();
    let mut value = payload();
    value["title"] = serde_json::json!("");
    let payload = write_payload(&dir, &value);
    cli(&dir)
        .arg("generate")
        .arg("-p")
        .arg(&payload)
        .args(["-o", "paper.docx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("research_title"));
    assert!(!dir.path().join("paper.docx").exists());
}

#[test]
fn test_generate_strict_figures_fails() {
    let dir = TempDir::new().unwrap();
    let payload = write_payload(&dir, &payload());
    cli(&dir)
        .arg("generate")
        .arg("-p")
        .arg(&payload)
        .args(["-o", "paper.docx", "--strict-figures"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("figure 1 skipped"));
    assert!(!dir.path().join("paper.docx").exists());
}

#[test]
fn test_generate_timestamped_uses_project_config() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".manudoc.toml"), "output_prefix = \"journal\"\n").unwrap();
    let payload = write_payload(&dir, &payload());
    cli(&dir)
        .arg("generate")
        .arg("-p")
        .arg(&payload)
        .args(["--timestamped", "-o", "out"])
        .assert()
        .success();

    let names: Vec<String> = fs::read_dir(dir.path().join("out"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("journal_") && names[0].ends_with(".docx"), "{names:?}");
}

#[test]
fn test_generate_missing_template_fails() {
    let dir = TempDir::new().unwrap();
    let payload = write_payload(&dir, &payload());
    cli(&dir)
        .arg("generate")
        .arg("-p")
        .arg(&payload)
        .args(["-o", "paper.docx", "--template", "absent.docx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Template not found"));
}

#[test]
fn test_generate_bad_config_fails() {
    let dir = TempDir::new().unwrap();
    let payload = write_payload(&dir, &payload());
    let config = dir.path().join("bad.toml");
    fs::write(&config, "strict_figures = \"sometimes\"").unwrap();
    cli(&dir)
        .arg("generate")
        .arg("-p")
        .arg(&payload)
        .args(["-o", "paper.docx", "--config"])
        .arg(&config)
        .assert()
        .failure();
}

// ============ PLACEHOLDERS COMMAND TESTS ============

#[test]
fn test_placeholders_lists_bundled_tokens() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .arg("placeholders")
        .assert()
        .success()
        .stdout(predicate::str::contains("{{research_title}}"))
        .stdout(predicate::str::contains("{{tables}}"))
        .stdout(predicate::str::contains("{{header_name}}"));
}

#[test]
fn test_placeholders_json() {
    let dir = TempDir::new().unwrap();
    let assert = cli(&dir).args(["placeholders", "--json"]).assert().success();
    let names: Vec<String> = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(names.first().map(String::as_str), Some("research_type"));
    assert!(names.contains(&"figures".to_string()));
}

// ============ EXPORT-TEMPLATE COMMAND TESTS ============

#[test]
fn test_export_template_then_use_it() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["export-template", "journal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("journal.docx"));

    let exported = dir.path().join("journal.docx");
    let archive = zip::ZipArchive::new(fs::File::open(&exported).unwrap()).unwrap();
    assert!(archive.file_names().any(|n| n == "word/document.xml"));

    cli(&dir)
        .args(["placeholders", "--template", "journal.docx"])
        .assert()
        .success()
        .stdout(predicate::str::contains("{{abstract}}"));
}

// ============ SCRAPE COMMAND TESTS ============

const SUBMISSION_PAGE: &str = r#"<html><body>
<fieldset><table>
  <tr><td>Manuscript Code</td><td>IJMA-2403-1187</td></tr>
  <tr><td>Title</td><td id="td_manu_ttl">Early mobilisation after knee arthroplasty</td></tr>
  <tr><td>Article Type</td><td>Original Article</td></tr>
  <tr><td>Receive Date</td><td>2024-01-15 09:41:07</td></tr>
  <tr><td>Accept Date</td><td>2024-03-02</td></tr>
</table></fieldset>
<table>
  <tr><td>Omar Hassan</td><td>omar@example.org</td><td>Egypt</td><td>1</td><td>Yes</td><td>Faculty of Medicine, Al-Azhar University</td></tr>
</table>
</body></html>"#;

#[test]
fn test_scrape_then_generate() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("page.html"), SUBMISSION_PAGE).unwrap();
    cli(&dir)
        .args(["scrape", "page.html", "-o", "payload.json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("payload.json"));

    let payload: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("payload.json")).unwrap()).unwrap();
    assert_eq!(payload["code"], "IJMA-2403-1187");
    assert_eq!(payload["date_received"], "2024-01-15");
    assert_eq!(payload["authors"][0], "Omar Hassan");

    cli(&dir)
        .args(["generate", "-p", "payload.json", "-o", "out.docx"])
        .assert()
        .success();
    assert!(dir.path().join("out.docx").exists());
}

#[test]
fn test_scrape_to_stdout() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("page.html"), SUBMISSION_PAGE).unwrap();
    cli(&dir)
        .args(["scrape", "page.html"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"research_title\": \"Early mobilisation after knee arthroplasty\""));
}

#[test]
fn test_scrape_page_without_fields_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("page.html"), "<html><body>Session expired</body></html>").unwrap();
    cli(&dir)
        .args(["scrape", "page.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No manuscript title or authors"));
    assert!(!dir.path().join("payload.json").exists());
}

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn ragdb(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ragdb"))
        .current_dir(cwd)
        .env_remove("RUST_ENV")
        .env("RUST_LOG", "warn")
        .arg("--fake")
        .args(args)
        .output()
        .expect("run ragdb")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn ingest_query_and_status() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("rent.md"), "Rent is payable monthly in advance. Late payment incurs a fee.").unwrap();
    fs::write(docs.join("notice.md"), "Tenant must give notice.").unwrap();

    let out = ragdb(tmp.path(), &["ingest", "docs", "--chunk-size", "40", "--overlap", "10"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).contains("Indexed 3 chunks"));

    let out = ragdb(tmp.path(), &["query", "Tenant must give notice.", "--top-n", "2", "--json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let response: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let results = response["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["chunk"], "Tenant must give notice.");
    assert!(results[0]["score"].as_f64().unwrap() >= 0.99);

    let out = ragdb(tmp.path(), &["status"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("Chunks:      3"));
    assert!(text.contains("fake:d384"));
}

#[test]
fn empty_corpus_exits_cleanly() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("docs")).unwrap();
    let out = ragdb(tmp.path(), &["ingest", "docs"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("No valid chunks found"));
}

#[test]
fn failures_exit_non_zero() {
    let tmp = TempDir::new().unwrap();
    assert!(!ragdb(tmp.path(), &["ingest", "missing"]).status.success());
    assert!(!ragdb(tmp.path(), &["query", "anything"]).status.success(), "no index yet");
    assert!(!ragdb(tmp.path(), &["ingest", "missing", "--chunk-size", "10", "--overlap", "10"]).status.success());
}

#[test]
fn status_logs_a_corrupt_index() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("notice.md"), "Tenant must give notice.").unwrap();
    assert!(ragdb(tmp.path(), &["ingest", "docs"]).status.success());

    let vectors = tmp.path().join("index").join("vectors.bin");
    let bytes = fs::read(&vectors).unwrap();
    fs::write(&vectors, &bytes[..bytes.len() / 2]).unwrap();

    let out = ragdb(tmp.path(), &["status"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("index failed validation"), "{stderr}");
}

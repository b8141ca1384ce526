use std::fs;
use std::io::Write;
use tempfile::TempDir;

use ragdb_core::source::{load_document, MarkdownSource};
use ragdb_core::{Chunker, DocumentSource};

#[test]
fn discover_and_chunk_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let file_path = dir.join("a.md");
    let mut f = fs::File::create(&file_path).unwrap();
    writeln!(f, "Short text").unwrap();

    let source = MarkdownSource;
    let files = source.discover(dir).expect("discover");
    assert_eq!(files, vec![file_path]);

    let doc = load_document(&source, &files[0]).expect("load");
    let chunks = Chunker::new(1000, 200).unwrap().split(&doc.content);
    assert_eq!(chunks, vec!["Short text"], "one small paragraph becomes one chunk");
}

#[test]
fn long_document_chunks_cover_every_paragraph() {
    let tmp = TempDir::new().unwrap();
    let paragraphs: Vec<String> =
        (0..40).map(|i| format!("Paragraph {i} talks about clause {i} of the lease.")).collect();
    let body = paragraphs.join("\n\n");
    fs::write(tmp.path().join("lease.md"), &body).unwrap();

    let source = MarkdownSource;
    let files = source.discover(tmp.path()).unwrap();
    let doc = load_document(&source, &files[0]).unwrap();
    let chunks = Chunker::new(300, 60).unwrap().split(&doc.content);

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.chars().count() <= 300));
    for p in &paragraphs {
        assert!(chunks.iter().any(|c| c.contains(p.as_str())), "paragraph '{p}' lost");
    }
}

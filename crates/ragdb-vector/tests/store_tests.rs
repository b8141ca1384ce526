use std::fs;

use ragdb_core::types::{chunk_id, DocumentChunk};
use ragdb_core::{normalize, Error, VectorIndex};
use ragdb_vector::store::{CHUNKS_FILE, VECTORS_FILE};
use ragdb_vector::{FlatIndex, IndexStore};
use tempfile::TempDir;

fn sample() -> (FlatIndex, Vec<DocumentChunk>) {
    let raw = [[1.0, 0.2, 0.0], [0.0, 1.0, 0.3], [0.5, 0.5, 0.5], [0.1, 0.0, 1.0]];
    let mut index = FlatIndex::new(3).unwrap();
    let vectors: Vec<Vec<f32>> = raw.iter().map(|v| normalize(v).unwrap()).collect();
    index.add(&vectors).unwrap();
    let chunks = (0..raw.len())
        .map(|i| DocumentChunk {
            id: chunk_id(i),
            doc_id: format!("doc{}", i / 2),
            doc_path: format!("/corpus/doc{}.md", i / 2),
            content: format!("chunk body number {i}"),
            chunk_index: i % 2,
            total_chunks: 2,
        })
        .collect();
    (index, chunks)
}

#[test]
fn save_then_load_preserves_search_and_chunks() {
    let tmp = TempDir::new().unwrap();
    let store = IndexStore::new(tmp.path().join("index"));
    let (index, chunks) = sample();

    let manifest = store.save(&index, &chunks, "fake:d3").unwrap();
    assert!(store.exists());
    assert_eq!(manifest.count, 4);
    assert_eq!(store.manifest().unwrap(), manifest);

    let loaded = store.load(3).unwrap();
    assert_eq!(loaded.chunks, chunks);
    assert_eq!(loaded.manifest.embedder_id, "fake:d3");

    let queries = [
        normalize(&[1.0, 0.0, 0.0]).unwrap(),
        normalize(&[0.2, 0.9, 0.1]).unwrap(),
        normalize(&[0.0, 0.0, 1.0]).unwrap(),
    ];
    for query in &queries {
        let before = index.search(query, 4).unwrap();
        let after = loaded.index.search(query, 4).unwrap();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.id, b.id);
            assert!((a.score - b.score).abs() < 1e-6);
        }
    }
}

#[test]
fn empty_index_round_trips() {
    let tmp = TempDir::new().unwrap();
    let store = IndexStore::new(tmp.path());
    store.save(&FlatIndex::new(5).unwrap(), &[], "fake:d5").unwrap();
    let loaded = store.load(5).unwrap();
    assert!(loaded.index.is_empty());
    assert!(loaded.chunks.is_empty());
}

#[test]
fn dimension_disagreement_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let store = IndexStore::new(tmp.path());
    let (index, chunks) = sample();
    store.save(&index, &chunks, "fake:d3").unwrap();
    assert!(matches!(store.load(384), Err(Error::CorruptIndex(_))));
}

#[test]
fn count_disagreement_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let store = IndexStore::new(tmp.path());
    let (index, chunks) = sample();
    store.save(&index, &chunks, "fake:d3").unwrap();

    // Swap in a chunk file from a different build.
    let shorter = serde_json::to_vec(&chunks[..3]).unwrap();
    fs::write(tmp.path().join(CHUNKS_FILE), shorter).unwrap();
    assert!(matches!(store.load(3), Err(Error::CorruptIndex(_))));
}

#[test]
fn truncated_or_missing_files_are_corrupt() {
    let tmp = TempDir::new().unwrap();
    let store = IndexStore::new(tmp.path());
    let (index, chunks) = sample();
    store.save(&index, &chunks, "fake:d3").unwrap();

    let bytes = fs::read(tmp.path().join(VECTORS_FILE)).unwrap();
    fs::write(tmp.path().join(VECTORS_FILE), &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(store.load(3), Err(Error::CorruptIndex(_))));

    store.save(&index, &chunks, "fake:d3").unwrap();
    fs::remove_file(tmp.path().join(CHUNKS_FILE)).unwrap();
    assert!(matches!(store.load(3), Err(Error::CorruptIndex(_))));
}

#[test]
fn zero_dimension_header_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let store = IndexStore::new(tmp.path());
    let (index, chunks) = sample();
    store.save(&index, &chunks, "fake:d3").unwrap();

    // bincode layout: u32 version, u64 length + embedder id bytes, u64 dim.
    let path = tmp.path().join(VECTORS_FILE);
    let mut bytes = fs::read(&path).unwrap();
    let dim_at = 4 + 8 + "fake:d3".len();
    assert_eq!(bytes[dim_at..dim_at + 8], 3u64.to_le_bytes());
    bytes[dim_at..dim_at + 8].copy_from_slice(&0u64.to_le_bytes());
    fs::write(&path, bytes).unwrap();

    let err = store.verify().unwrap_err();
    assert!(matches!(err, Error::CorruptIndex(_)), "got {err:?}");
    assert!(!err.is_precondition());
}

#[test]
fn save_rejects_mismatched_inputs() {
    let tmp = TempDir::new().unwrap();
    let store = IndexStore::new(tmp.path());
    let (index, chunks) = sample();
    assert!(matches!(store.save(&index, &chunks[..2], "fake:d3"), Err(Error::InvalidArgument(_))));
    assert!(!store.exists());
}

#[test]
fn clear_removes_a_previous_build() {
    let tmp = TempDir::new().unwrap();
    let store = IndexStore::new(tmp.path());
    let (index, chunks) = sample();
    store.save(&index, &chunks, "fake:d3").unwrap();
    store.clear().unwrap();
    assert!(!store.exists());
    assert!(matches!(store.load(3), Err(Error::NotFound(_))));
    store.clear().unwrap();
}

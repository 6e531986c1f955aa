use std::fs;

use psyche_core::{Chunk, ChunkConfig, Chunker, Document, HashEmbedder, PsycheError};
use psyche_index::{IndexMeta, IndexStore};

fn chunk(id: &str, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        source: "test".to_string(),
        text: text.to_string(),
    }
}

fn sample_chunks() -> Vec<Chunk> {
    vec![
        chunk("novel.txt#chunk0000", "Heathcliff stormed across the moors in a rage"),
        chunk("novel.txt#chunk0001", "Catherine sat by the window and wept quietly"),
        chunk("novel.txt#chunk0002", "Nelly kept the household accounts in order"),
    ]
}

#[test]
fn identical_query_returns_its_chunk_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::open(dir.path()).unwrap();
    let embedder = HashEmbedder::default();
    let report = store.build("character", &sample_chunks(), &embedder).unwrap();
    assert_eq!(report.vectors, 3);
    assert_eq!(report.dim, 384);

    let hits = store
        .search(
            "character",
            "Catherine sat by the window and wept quietly",
            &embedder,
            3,
        )
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "novel.txt#chunk0001");
    assert!((hits[0].score - 1.0).abs() < 1e-4, "score={}", hits[0].score);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(hits.iter().all(|h| (-1.0001..=1.0001).contains(&h.score)));
}

#[test]
fn never_built_index_searches_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::open(dir.path()).unwrap();
    let hits = store
        .search("psych", "attachment", &HashEmbedder::default(), 5)
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn top_k_larger_than_index_returns_what_exists() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::open(dir.path()).unwrap();
    let embedder = HashEmbedder::default();
    store.build("character", &sample_chunks(), &embedder).unwrap();
    let hits = store.search("character", "moors", &embedder, 50).unwrap();
    assert_eq!(hits.len(), 3);
}

#[test]
fn unbounded_top_k_returns_every_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::open(dir.path()).unwrap();
    let embedder = HashEmbedder::default();
    store.build("character", &sample_chunks()[..1], &embedder).unwrap();
    let hits = store
        .search("character", "Ahab", &embedder, usize::MAX)
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn metadata_file_is_positionally_aligned_json() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::open(dir.path()).unwrap();
    store
        .build("character", &sample_chunks(), &HashEmbedder::default())
        .unwrap();
    let raw = fs::read_to_string(dir.path().join("character.meta.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["ids"][2], "novel.txt#chunk0002");
    assert_eq!(
        value["texts"][0],
        "Heathcliff stormed across the moors in a rage"
    );
    assert!(dir.path().join("character.index").exists());
}

#[test]
fn rebuild_replaces_previous_contents() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::open(dir.path()).unwrap();
    let embedder = HashEmbedder::default();
    store.build("character", &sample_chunks(), &embedder).unwrap();
    store
        .build(
            "character",
            &[chunk("other.txt#chunk0000", "a completely different passage")],
            &embedder,
        )
        .unwrap();
    let (index, meta) = store.load("character").unwrap().unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(meta.ids, vec!["other.txt#chunk0000"]);
}

#[test]
fn empty_build_persists_an_empty_index() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::open(dir.path()).unwrap();
    let embedder = HashEmbedder::default();
    let report = store.build("psych", &[], &embedder).unwrap();
    assert_eq!(report.vectors, 0);
    assert!(store.exists("psych").unwrap());
    assert!(store.search("psych", "coping", &embedder, 4).unwrap().is_empty());
}

#[test]
fn mismatched_metadata_is_reported_as_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::open(dir.path()).unwrap();
    let embedder = HashEmbedder::default();
    store.build("character", &sample_chunks(), &embedder).unwrap();
    let meta = IndexMeta {
        ids: vec!["only-one".to_string()],
        texts: vec!["only one".to_string()],
    };
    fs::write(
        dir.path().join("character.meta.json"),
        serde_json::to_vec(&meta).unwrap(),
    )
    .unwrap();
    let err = store
        .search("character", "rage", &embedder, 2)
        .unwrap_err();
    assert!(matches!(err, PsycheError::CorruptIndex { .. }));
}

#[test]
fn separate_roots_do_not_share_indices() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let embedder = HashEmbedder::default();
    let chunker = Chunker::new(ChunkConfig::default()).unwrap();
    let chunks = chunker.chunk_document(&Document::new("a.txt", "Some text about Ishmael"));
    IndexStore::open(first.path())
        .unwrap()
        .build("character", &chunks, &embedder)
        .unwrap();
    let other = IndexStore::open(second.path()).unwrap();
    assert!(other
        .search("character", "Ishmael", &embedder, 3)
        .unwrap()
        .is_empty());
}

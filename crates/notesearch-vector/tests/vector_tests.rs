use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

use notesearch_core::types::Chunk;
use notesearch_core::Error;
use notesearch_vector::{IndexStats, VectorIndex};

fn unit(v: &[f32]) -> Vec<f32> {
    let n = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / n).collect()
}

fn corpus() -> (Vec<Vec<f32>>, Vec<Chunk>) {
    let vectors = vec![
        unit(&[1.0, 0.0, 0.0]),
        unit(&[1.0, 1.0, 0.0]),
        unit(&[0.0, 1.0, 0.0]),
        unit(&[0.0, 0.0, 1.0]),
        unit(&[1.0, 1.0, 1.0]),
    ];
    let metas = (0..vectors.len())
        .map(|i| Chunk::new("notes/doc.md", i, format!("chunk body {i}")))
        .collect();
    (vectors, metas)
}

#[test]
fn reload_from_disk_gives_identical_results() {
    let tmp = TempDir::new().unwrap();
    let (vectors, metas) = corpus();
    let built = VectorIndex::open(tmp.path());
    built.build(vectors, metas).unwrap();

    let reopened = VectorIndex::open(tmp.path());
    assert!(!reopened.is_loaded());
    for query in [unit(&[1.0, 0.2, 0.0]), unit(&[0.0, 0.3, 1.0]), unit(&[1.0, 1.0, 1.0])] {
        for k in 1..=6 {
            assert_eq!(built.search(&query, k).unwrap(), reopened.search(&query, k).unwrap());
        }
    }
    assert!(reopened.is_loaded());
}

#[test]
fn results_are_sorted_and_carry_metadata() {
    let tmp = TempDir::new().unwrap();
    let (vectors, metas) = corpus();
    let idx = VectorIndex::open(tmp.path());
    idx.build(vectors, metas).unwrap();

    let hits = idx.search(&unit(&[1.0, 0.0, 0.0]), 5).unwrap();
    assert_eq!(hits[0].meta.id, "notes/doc.md#chunk0");
    assert_eq!(hits[0].meta.text, "chunk body 0");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    for pair in hits.windows(2) {
        assert!(pair[0].score > pair[1].score || (pair[0].score == pair[1].score && pair[0].position < pair[1].position));
    }
    // chunk2 and chunk3 both score 0 against the query; lower position first.
    let tail: Vec<usize> = hits[3..].iter().map(|h| h.position).collect();
    assert_eq!(tail, vec![2, 3]);
}

#[test]
fn rebuild_replaces_previous_generation() {
    let tmp = TempDir::new().unwrap();
    let (vectors, metas) = corpus();
    let idx = VectorIndex::open(tmp.path());
    idx.build(vectors, metas).unwrap();
    idx.build(vec![vec![0.0, 1.0]], vec![Chunk::new("other.txt", 0, "only".into())]).unwrap();

    assert_eq!(idx.stats().unwrap(), Some(IndexStats { count: 1, dim: 2 }));
    let reopened = VectorIndex::open(tmp.path());
    let hits = reopened.search(&[0.0, 1.0], 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].meta.source, "other.txt");
    assert!(matches!(reopened.search(&[1.0, 0.0, 0.0], 1), Err(Error::DimensionMismatch { expected: 2, actual: 3 })));
}

#[test]
fn invalid_builds_do_not_touch_disk() {
    let tmp = TempDir::new().unwrap();
    let idx = VectorIndex::open(tmp.path().join("idx"));
    assert!(matches!(idx.build(vec![], vec![]), Err(Error::InvalidInput(_))));
    assert!(matches!(
        idx.build(vec![vec![1.0]], vec![]),
        Err(Error::InvalidInput(_))
    ));
    assert!(!tmp.path().join("idx").exists());
}

#[test]
fn concurrent_first_searches_share_one_load() {
    let tmp = TempDir::new().unwrap();
    let (vectors, metas) = corpus();
    VectorIndex::open(tmp.path()).build(vectors, metas).unwrap();

    let idx = Arc::new(VectorIndex::open(tmp.path()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let idx = Arc::clone(&idx);
            thread::spawn(move || idx.search(&unit(&[0.0, 0.0, 1.0]), 2).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for r in &results {
        assert_eq!(r, &results[0]);
        assert_eq!(r[0].meta.id, "notes/doc.md#chunk3");
    }
}

#[test]
fn searches_during_rebuild_see_a_whole_generation() {
    let tmp = TempDir::new().unwrap();
    let idx = Arc::new(VectorIndex::open(tmp.path()));
    idx.build(vec![vec![1.0, 0.0]; 3], (0..3).map(|i| Chunk::new("old.md", i, "old".into())).collect()).unwrap();

    let writer = {
        let idx = Arc::clone(&idx);
        thread::spawn(move || {
            for round in 0..10 {
                let n = 2 + round % 3;
                idx.build(vec![vec![1.0, 0.0]; n], (0..n).map(|i| Chunk::new("new.md", i, "new".into())).collect()).unwrap();
            }
        })
    };
    for _ in 0..200 {
        let hits = idx.search(&[1.0, 0.0], 20).unwrap();
        let first = &hits[0].meta.source;
        assert!(hits.iter().all(|h| &h.meta.source == first), "mixed generations");
    }
    writer.join().unwrap();
}

#[test]
fn unreadable_pair_is_a_storage_error_not_missing() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("vectors.bin")).unwrap();

    let idx = VectorIndex::open(tmp.path());
    assert!(matches!(idx.search(&[1.0], 1), Err(Error::Storage { .. })));
    assert!(matches!(idx.stats(), Err(Error::Storage { .. })));
    assert!(!idx.is_loaded());
}

//! Integration tests for reel-store
//!
//! These tests exercise the registry under concurrent access and the
//! streamer against real files.

use futures::StreamExt;
use reel_domain::{ArtifactId, ArtifactStore};
use reel_store::{ChunkStream, MemoryStore};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const PER_THREAD: usize = 200;

fn register(store: &MemoryStore, tag: usize) -> ArtifactId {
    store
        .register(
            PathBuf::from(format!("temp/{tag}_out.mp4")),
            "processed.mp4".to_string(),
            format!("{tag}.mp4"),
            tag as u64,
        )
        .unwrap()
}

#[test]
fn test_concurrent_registrations_are_unique_and_complete() {
    let store = Arc::new(MemoryStore::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..PER_THREAD)
                    .map(|i| register(&store, t * PER_THREAD + i))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: Vec<ArtifactId> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(unique.len(), THREADS * PER_THREAD, "No duplicate ids");
    assert_eq!(store.count().unwrap(), THREADS * PER_THREAD, "No lost registrations");

    for id in &ids {
        assert!(store.lookup(*id).unwrap().is_some());
    }
}

#[test]
fn test_racing_remove_and_lookup_see_whole_records() {
    let store = Arc::new(MemoryStore::new());
    let ids: Vec<_> = (0..500).map(|i| register(&store, i)).collect();
    let ids = Arc::new(ids);
    let barrier = Arc::new(Barrier::new(3));

    let remover = {
        let (store, ids, barrier) = (Arc::clone(&store), Arc::clone(&ids), Arc::clone(&barrier));
        thread::spawn(move || {
            barrier.wait();
            ids.iter()
                .filter(|id| store.remove(**id).unwrap().is_some())
                .count()
        })
    };

    // Two contenders remove the same ids; each record goes to exactly one
    let contender = {
        let (store, ids, barrier) = (Arc::clone(&store), Arc::clone(&ids), Arc::clone(&barrier));
        thread::spawn(move || {
            barrier.wait();
            ids.iter()
                .rev()
                .filter(|id| store.remove(**id).unwrap().is_some())
                .count()
        })
    };

    let reader = {
        let (store, ids, barrier) = (Arc::clone(&store), Arc::clone(&ids), Arc::clone(&barrier));
        thread::spawn(move || {
            barrier.wait();
            for id in ids.iter() {
                if let Some(record) = store.lookup(*id).unwrap() {
                    assert_eq!(record.id, *id);
                    assert_eq!(record.original_filename, format!("{}.mp4", record.size_bytes));
                }
            }
        })
    };

    let removed = remover.join().unwrap() + contender.join().unwrap();
    reader.join().unwrap();

    assert_eq!(removed, 500, "Every record removed exactly once");
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_list_is_consistent_snapshot_during_writes() {
    let store = Arc::new(MemoryStore::new());

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..1_000 {
                let id = register(&store, i);
                if i % 2 == 0 {
                    store.remove(id).unwrap();
                }
            }
        })
    };

    for _ in 0..100 {
        let snapshot = store.list().unwrap();
        let unique: HashSet<_> = snapshot.iter().map(|r| r.id).collect();
        assert_eq!(unique.len(), snapshot.len());
    }

    writer.join().unwrap();
    assert_eq!(store.count().unwrap(), 500);
}

#[tokio::test]
async fn test_stream_registered_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abc_clip_out.mp4");
    let data: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::write(&path, &data).unwrap();

    let store = MemoryStore::new();
    let id = store
        .register(path.clone(), "processed.mp4".into(), "clip.mp4".into(), data.len() as u64)
        .unwrap();

    let record = store.lookup(id).unwrap().unwrap();
    let mut stream = ChunkStream::open(&record.path, reel_store::DEFAULT_CHUNK_SIZE)
        .await
        .unwrap();
    assert_eq!(stream.file_size(), record.size_bytes);

    let mut received = Vec::with_capacity(data.len());
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        assert!(chunk.len() <= reel_store::DEFAULT_CHUNK_SIZE);
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, data);
}

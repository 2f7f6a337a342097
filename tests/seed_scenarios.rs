//! End-to-end seed scenarios (spec §8: tiny file, exact duplicate,
//! internal large duplicate, small-block coalescing, differential no-op,
//! corruption tail).

use std::sync::{Arc, Mutex};

use dupcore::chunking::{HashIndex, Matcher};
use dupcore::config::EngineConfig;
use dupcore::container::backupset::BackupSet;
use dupcore::container::contents::{FileKind, FileRecord};
use dupcore::container::Archive;
use dupcore::hash128::hash_once;
use dupcore::resolve::{self, ChunkCache};
use dupcore::stats::Stats;
use dupcore::{Decompressor, Engine, PacketKind};

fn small_config() -> EngineConfig {
    let mut c = EngineConfig::default();
    c.small_block = 256;
    c.large_block = 4096;
    c.memory_budget = 2 * 1024 * 1024;
    c
}

fn collecting_engine(config: EngineConfig) -> (Engine, Arc<Mutex<Vec<u8>>>) {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let emit_sink = sink.clone();
    let engine = Engine::new(config, Box::new(move |bytes: &[u8]| {
        emit_sink.lock().unwrap().extend_from_slice(bytes);
    }))
    .unwrap();
    (engine, sink)
}

fn restore_all(packets: &[u8]) -> Vec<u8> {
    let mut decompressor = Decompressor::new();
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < packets.len() {
        let info = decompressor.decompress(&packets[cursor..], &mut out).unwrap();
        cursor += info.packet_size as usize;
    }
    out
}

#[test]
fn tiny_file_round_trips_as_single_literal() {
    let (mut engine, sink) = collecting_engine(EngineConfig::default());
    engine.compress(b"hello\n", false).unwrap();
    engine.flush_block().unwrap();

    let packets = sink.lock().unwrap().clone();
    let restored = restore_all(&packets);
    assert_eq!(restored, b"hello\n");

    let mut cursor = 0usize;
    let mut count = 0;
    while cursor < packets.len() {
        let info = dupcore::packet::info(&packets[cursor..]).unwrap();
        assert_eq!(info.kind, PacketKind::Literal);
        assert_eq!(info.payload_length, 6);
        cursor += info.packet_size as usize;
        count += 1;
    }
    assert_eq!(count, 1);
}

#[test]
fn exact_duplicate_file_contributes_no_payload() {
    let content: Vec<u8> = (0..256 * 1024u32).map(|i| ((i * 2654435761u32) % 256) as u8).collect();
    let hash = hash_once(true, 0, &content);

    let (mut engine, sink) = collecting_engine(EngineConfig::default());
    engine.compress(&content, false).unwrap();
    engine.flush_block().unwrap();
    let first_payload_len = sink.lock().unwrap().len();
    assert!(first_payload_len > 0);

    let first = FileRecord {
        file_id: 1,
        kind: FileKind::Regular,
        abs_path: "/data/a.bin".into(),
        name: "a.bin".into(),
        link_target: String::new(),
        size: content.len() as u64,
        payload: 0,
        ctime_ms: 0,
        mtime_ms: 0,
        attributes: 0,
        duplicate_of: 0,
        content_hash: hash,
        opaque_acl: Vec::new(),
        volume: 0,
        inode: 1,
        is_hardlink: false,
        sparse: false,
    };

    // A walker that recognizes identical content hashes marks the second
    // file as a duplicate and never submits its bytes to the engine.
    let second = FileRecord {
        file_id: 2,
        duplicate_of: 1,
        size: content.len() as u64,
        payload: 0,
        inode: 2,
        name: "b.bin".into(),
        abs_path: "/data/b.bin".into(),
        ..first.clone()
    };

    assert_eq!(second.duplicate_of, first.file_id);
    assert_eq!(second.content_hash, first.content_hash);
}

#[test]
fn internal_large_duplicate_becomes_one_literal_and_one_reference() {
    let config = small_config();
    let index = HashIndex::new(config.memory_budget);
    let stats = Stats::new();
    let matcher = Matcher::new(&index, &config, &stats);

    let half: Vec<u8> = (0..(config.large_block as u32 + 512)).map(|i| ((i * 31 + 7) % 251) as u8).collect();

    matcher.hash_chunk(&half, 0);
    let mut first_packets = Vec::new();
    matcher.process_chunk(&half, 0, false, &mut first_packets).unwrap();

    matcher.hash_chunk(&half, half.len() as u64);
    let mut second_packets = Vec::new();
    matcher
        .process_chunk(&half, half.len() as u64, false, &mut second_packets)
        .unwrap();

    let mut saw_reference = false;
    let mut cursor = 0usize;
    while cursor < second_packets.len() {
        let info = dupcore::packet::info(&second_packets[cursor..]).unwrap();
        if info.kind == PacketKind::Reference {
            saw_reference = true;
            assert!(info.payload_length as usize >= config.small_block);
        }
        cursor += info.packet_size as usize;
    }
    assert!(saw_reference, "second half must reference the first");

    let restored_first = restore_all(&first_packets);
    assert_eq!(restored_first, half);
}

#[test]
fn small_block_coalescing_merges_alternating_repeats() {
    let config = small_config();
    let index = HashIndex::new(config.memory_budget);
    let stats = Stats::new();
    let matcher = Matcher::new(&index, &config, &stats);

    let a: Vec<u8> = (0..config.small_block as u32).map(|i| ((i * 17 + 3) % 251) as u8).collect();
    let b: Vec<u8> = (0..config.small_block as u32).map(|i| ((i * 23 + 11) % 251) as u8).collect();

    let mut first_half = a.clone();
    first_half.extend_from_slice(&b);
    matcher.hash_chunk(&first_half, 0);
    let mut first_packets = Vec::new();
    matcher.process_chunk(&first_half, 0, false, &mut first_packets).unwrap();

    let mut second_half = a.clone();
    second_half.extend_from_slice(&b);
    let base = first_half.len() as u64;
    matcher.hash_chunk(&second_half, base);
    let mut second_packets = Vec::new();
    matcher.process_chunk(&second_half, base, false, &mut second_packets).unwrap();

    let mut reference_count = 0;
    let mut cursor = 0usize;
    let mut reference_len = 0u32;
    while cursor < second_packets.len() {
        let info = dupcore::packet::info(&second_packets[cursor..]).unwrap();
        if info.kind == PacketKind::Reference {
            reference_count += 1;
            reference_len += info.payload_length;
        }
        cursor += info.packet_size as usize;
    }
    assert_eq!(reference_count, 1, "the two 4 KiB repeats must coalesce into one reference");
    assert_eq!(reference_len as usize, 2 * config.small_block);
}

#[test]
fn differential_append_preserves_prior_backup_reads() {
    let config = EngineConfig::default();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.bin");

    let mut archive = Archive::new(&config);
    let content = b"first backup contents, stays put\n".to_vec();
    let (mut engine, sink) = collecting_engine(config.clone());
    engine.compress(&content, false).unwrap();
    engine.flush_block().unwrap();
    let packets = sink.lock().unwrap().clone();
    archive.record_chunk(0, content.len() as u32, &packets);
    archive.append_increment(
        vec![FileRecord {
            file_id: 1,
            kind: FileKind::Regular,
            abs_path: "/data/f.txt".into(),
            name: "f.txt".into(),
            link_target: String::new(),
            size: content.len() as u64,
            payload: 0,
            ctime_ms: 0,
            mtime_ms: 0,
            attributes: 0,
            duplicate_of: 0,
            content_hash: hash_once(true, 0, &content),
            opaque_acl: Vec::new(),
            volume: 0,
            inode: 1,
            is_hardlink: false,
            sparse: false,
        }],
        BackupSet { file_ids: vec![1], timestamp_ms: 1, total_payload_bytes: content.len() as u64, file_count: 1 },
    );
    archive.save(&path).unwrap();

    let mut reopened = Archive::open(&path).unwrap();
    let mut cache = ChunkCache::disabled();
    let mut restored = Vec::new();
    resolve::resolve(&reopened, 0, content.len() as u64, &mut restored, &mut cache).unwrap();
    assert_eq!(restored, content);

    // Differential pass: append an unrelated second file, reusing the
    // hash index loaded from the existing archive, nothing about the
    // first file's bytes should change.
    let extra = b"second backup's unrelated bytes\n".to_vec();
    let mut diff_config = config.clone();
    diff_config.base_payload = reopened.total_payload_bytes();
    let sink2: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let emit_sink2 = sink2.clone();
    let mut engine2 = Engine::with_index(
        diff_config,
        reopened.hash_index.clone(),
        Box::new(move |bytes: &[u8]| emit_sink2.lock().unwrap().extend_from_slice(bytes)),
    )
    .unwrap();
    engine2.compress(&extra, false).unwrap();
    engine2.flush_block().unwrap();
    let extra_packets = sink2.lock().unwrap().clone();
    let extra_payload_start = reopened.total_payload_bytes();
    reopened.record_chunk(extra_payload_start, extra.len() as u32, &extra_packets);
    reopened.append_increment(
        vec![FileRecord {
            file_id: 2,
            kind: FileKind::Regular,
            abs_path: "/data/g.txt".into(),
            name: "g.txt".into(),
            link_target: String::new(),
            size: extra.len() as u64,
            payload: extra_payload_start,
            ctime_ms: 0,
            mtime_ms: 0,
            attributes: 0,
            duplicate_of: 0,
            content_hash: hash_once(true, 0, &extra),
            opaque_acl: Vec::new(),
            volume: 0,
            inode: 2,
            is_hardlink: false,
            sparse: false,
        }],
        BackupSet { file_ids: vec![2], timestamp_ms: 2, total_payload_bytes: extra.len() as u64, file_count: 1 },
    );
    reopened.save(&path).unwrap();

    let final_archive = Archive::open(&path).unwrap();
    let mut cache = ChunkCache::disabled();
    let mut first_again = Vec::new();
    resolve::resolve(&final_archive, 0, content.len() as u64, &mut first_again, &mut cache).unwrap();
    assert_eq!(first_again, content);
    assert_eq!(final_archive.increments.len(), 2);
}

#[test]
fn corruption_tail_within_hashtable_still_lists_prior_sets() {
    let config = EngineConfig::default();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.bin");

    let mut archive = Archive::new(&config);
    let content = b"bytes that must survive a truncated hashtable\n".to_vec();
    let (mut engine, sink) = collecting_engine(config);
    engine.compress(&content, false).unwrap();
    engine.flush_block().unwrap();
    let packets = sink.lock().unwrap().clone();
    archive.record_chunk(0, content.len() as u32, &packets);
    archive.append_increment(
        vec![FileRecord {
            file_id: 1,
            kind: FileKind::Regular,
            abs_path: "/data/f.txt".into(),
            name: "f.txt".into(),
            link_target: String::new(),
            size: content.len() as u64,
            payload: 0,
            ctime_ms: 0,
            mtime_ms: 0,
            attributes: 0,
            duplicate_of: 0,
            content_hash: hash_once(true, 0, &content),
            opaque_acl: Vec::new(),
            volume: 0,
            inode: 1,
            is_hardlink: false,
            sparse: false,
        }],
        BackupSet { file_ids: vec![1], timestamp_ms: 1, total_payload_bytes: content.len() as u64, file_count: 1 },
    );
    archive.save(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let truncated = &bytes[..bytes.len() - 128];
    std::fs::write(&path, truncated).unwrap();

    let recovered = Archive::open(&path).unwrap();
    assert_eq!(recovered.increments.len(), 1);
    assert_eq!(recovered.increments[0].set.file_ids, vec![1]);

    let mut cache = ChunkCache::disabled();
    let mut restored = Vec::new();
    resolve::resolve(&recovered, 0, content.len() as u64, &mut restored, &mut cache).unwrap();
    assert_eq!(restored, content);
}

#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use swhid_contracts::swhid::ObjectId;
use swhid_contracts::UnixTimeNs;
use swhid_storage::{
    ContentOriginMappingInput, ContentOriginMappingStore, OriginMappingRepo, SharedMappingStore,
    StorageError, UpsertOutcome,
};

const OPENSSL: &str = "https://github.com/openssl/openssl/";
const MIRROR: &str = "https://gitlab.com/mirrors/openssl";

fn hash(n: u8) -> ObjectId {
    ObjectId::from_bytes(&[n; 20]).unwrap()
}

fn mapping(h: ObjectId, url: &str, t: u64) -> ContentOriginMappingInput {
    ContentOriginMappingInput::v1(h, url.to_string(), UnixTimeNs(t)).unwrap()
}

fn temp_journal(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir()
        .join(format!("swhid_storage_{label}_{nanos}"))
        .join("origin_mapping.jsonl")
}

#[test]
fn at_map_db_01_upsert_is_idempotent_per_pair() {
    let mut s = ContentOriginMappingStore::new_in_memory();
    let first = s.upsert(mapping(hash(1), OPENSSL, 10)).unwrap();
    let second = s.upsert(mapping(hash(1), OPENSSL, 99)).unwrap();

    assert!(matches!(first, UpsertOutcome::Inserted(_)));
    assert_eq!(second, UpsertOutcome::AlreadyPresent(first.row_id()));
    assert_eq!(s.row_count(), 1);
    assert_eq!(s.latest(&hash(1)).unwrap().created_at, UnixTimeNs(10));
}

#[test]
fn at_map_db_02_lookup_returns_newest_first() {
    let mut s = ContentOriginMappingStore::new_in_memory();
    s.upsert(mapping(hash(2), MIRROR, 10)).unwrap();
    s.upsert(mapping(hash(2), OPENSSL, 20)).unwrap();
    s.upsert(mapping(hash(3), MIRROR, 30)).unwrap();

    let urls = s
        .lookup(&hash(2))
        .into_iter()
        .map(|r| r.origin_url.as_str())
        .collect::<Vec<_>>();
    assert_eq!(urls, vec![OPENSSL, MIRROR]);
    assert!(s.lookup(&hash(9)).is_empty());
}

#[test]
fn at_map_db_03_equal_timestamps_prefer_later_insert() {
    let mut s = ContentOriginMappingStore::new_in_memory();
    s.upsert(mapping(hash(4), MIRROR, 50)).unwrap();
    s.upsert(mapping(hash(4), OPENSSL, 50)).unwrap();

    assert_eq!(s.latest(&hash(4)).unwrap().origin_url, OPENSSL);
}

#[test]
fn at_map_db_04_lookup_many_skips_unmapped_hashes() {
    let mut s = ContentOriginMappingStore::new_in_memory();
    s.upsert(mapping(hash(5), OPENSSL, 10)).unwrap();
    s.upsert(mapping(hash(6), MIRROR, 11)).unwrap();

    let found = s.origin_mapping_urls_for_hashes(&[hash(5), hash(7), hash(6), hash(5)]);
    assert_eq!(found.len(), 2);
    assert_eq!(found[&hash(5)], vec![OPENSSL.to_string()]);
    assert_eq!(found[&hash(6)], vec![MIRROR.to_string()]);
    assert!(!found.contains_key(&hash(7)));
}

#[test]
fn at_map_db_05_contents_for_origin_is_reverse_lookup() {
    let mut s = ContentOriginMappingStore::new_in_memory();
    s.upsert_origin_mapping_row(mapping(hash(8), OPENSSL, 10))
        .unwrap();
    s.upsert_origin_mapping_row(mapping(hash(1), OPENSSL, 11))
        .unwrap();
    s.upsert_origin_mapping_row(mapping(hash(8), MIRROR, 12))
        .unwrap();

    assert_eq!(
        s.origin_mapping_hashes_for_origin(OPENSSL),
        vec![hash(1), hash(8)]
    );
    assert_eq!(s.origin_mapping_hashes_for_origin(MIRROR), vec![hash(8)]);
    assert!(s.origin_mapping_hashes_for_origin("https://nowhere").is_empty());
    assert_eq!(s.origin_mapping_rows_for_hash(&hash(8)).len(), 2);
}

#[test]
fn at_map_db_06_invalid_rows_are_rejected() {
    assert!(ContentOriginMappingInput::v1(hash(1), "   ".to_string(), UnixTimeNs(1)).is_err());
    assert!(ContentOriginMappingInput::v1(hash(1), OPENSSL.to_string(), UnixTimeNs(0)).is_err());

    let shared = SharedMappingStore::default();
    assert!(matches!(
        shared.upsert(hash(1), "https://x/\u{7}"),
        Err(StorageError::ContractViolation(_))
    ));
    assert_eq!(shared.row_count().unwrap(), 0);
}

#[test]
fn at_map_db_07_journal_persists_across_reopen() {
    let path = temp_journal("reopen");
    {
        let mut s = ContentOriginMappingStore::open_with_journal(&path).unwrap();
        s.upsert(mapping(hash(1), OPENSSL, 10)).unwrap();
        s.upsert(mapping(hash(1), MIRROR, 20)).unwrap();
        s.upsert(mapping(hash(1), MIRROR, 30)).unwrap();
    }
    let reopened = ContentOriginMappingStore::open_with_journal(&path).unwrap();
    assert_eq!(reopened.row_count(), 2);
    assert_eq!(reopened.latest(&hash(1)).unwrap().origin_url, MIRROR);
    assert_eq!(reopened.journal_path(), Some(path.as_path()));

    let lines = fs::read_to_string(&path).unwrap();
    assert_eq!(lines.lines().count(), 2);
}

#[test]
fn at_map_db_08_replay_collapses_duplicate_lines() {
    let path = temp_journal("dupes");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let line = format!(
        "{{\"schema_version\":1,\"object_hash\":\"{}\",\"origin_url\":\"{}\",\"created_at\":5}}",
        hash(3).to_hex(),
        OPENSSL
    );
    fs::write(&path, format!("{line}\n\n{line}\n")).unwrap();

    let s = ContentOriginMappingStore::open_with_journal(&path).unwrap();
    assert_eq!(s.row_count(), 1);
    assert_eq!(s.latest(&hash(3)).unwrap().created_at, UnixTimeNs(5));
}

#[test]
fn at_map_db_09_unknown_journal_schema_fails_closed() {
    let path = temp_journal("schema");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let line = format!(
        "{{\"schema_version\":9,\"object_hash\":\"{}\",\"origin_url\":\"{}\",\"created_at\":5}}",
        hash(3).to_hex(),
        OPENSSL
    );
    fs::write(&path, format!("{line}\n")).unwrap();

    assert!(matches!(
        ContentOriginMappingStore::open_with_journal(&path),
        Err(StorageError::Journal { .. })
    ));
}

#[test]
fn at_map_db_10_concurrent_upserts_keep_one_row_per_pair() {
    let shared = Arc::new(SharedMappingStore::default());
    let workers = (0..8)
        .map(|_| {
            let store = Arc::clone(&shared);
            thread::spawn(move || store.upsert(hash(10), OPENSSL).unwrap())
        })
        .collect::<Vec<_>>();
    let outcomes = workers
        .into_iter()
        .map(|w| w.join().unwrap())
        .collect::<Vec<_>>();

    let inserted = outcomes
        .iter()
        .filter(|o| matches!(o, UpsertOutcome::Inserted(_)))
        .count();
    assert_eq!(inserted, 1);
    assert_eq!(shared.row_count().unwrap(), 1);
    assert_eq!(shared.lookup(&hash(10)).unwrap()[0].origin_url, OPENSSL);
}

#[test]
fn at_map_db_11_handles_sharing_a_journal_see_each_others_rows() {
    let path = temp_journal("two_handles");
    let open = || {
        SharedMappingStore::new(ContentOriginMappingStore::open_with_journal(&path).unwrap())
    };
    let reader = open();
    let writer = open();
    assert!(reader.lookup(&hash(11)).unwrap().is_empty());

    writer.upsert_at(hash(11), OPENSSL, UnixTimeNs(10)).unwrap();
    writer.upsert_at(hash(12), OPENSSL, UnixTimeNs(20)).unwrap();

    let rows = reader.lookup(&hash(11)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].origin_url, OPENSSL);
    assert_eq!(reader.contents_for_origin(OPENSSL).unwrap(), vec![hash(11), hash(12)]);
    assert_eq!(reader.row_count().unwrap(), 2);

    assert!(matches!(
        reader.upsert_at(hash(11), OPENSSL, UnixTimeNs(30)).unwrap(),
        UpsertOutcome::AlreadyPresent(_)
    ));
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
}

#[test]
fn at_map_db_12_unterminated_journal_line_waits_for_its_newline() {
    let path = temp_journal("partial");
    let mut store = ContentOriginMappingStore::open_with_journal(&path).unwrap();
    let line = format!(
        "{{\"schema_version\":1,\"object_hash\":\"{}\",\"origin_url\":\"{}\",\"created_at\":5}}",
        hash(13).to_hex(),
        MIRROR
    );
    let (head, rest) = line.split_at(20);
    fs::write(&path, head).unwrap();
    assert_eq!(store.refresh_from_journal().unwrap(), 0);
    assert_eq!(store.row_count(), 0);

    fs::write(&path, format!("{head}{rest}\n")).unwrap();
    assert_eq!(store.refresh_from_journal().unwrap(), 1);
    assert_eq!(store.latest(&hash(13)).unwrap().origin_url, MIRROR);
    assert_eq!(store.refresh_from_journal().unwrap(), 0);
}

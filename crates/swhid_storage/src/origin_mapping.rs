#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use swhid_contracts::attribution::validate_origin_url;
use swhid_contracts::swhid::ObjectId;
use swhid_contracts::{ContractViolation, UnixTimeNs, Validate};
use tracing::{debug, info, warn};

const TABLE: &str = "content_origin_mapping";
const JOURNAL_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{table} unavailable: {reason}")]
    Unavailable { table: &'static str, reason: String },
    #[error("{table} journal '{}': {reason}", .path.display())]
    Journal {
        table: &'static str,
        path: PathBuf,
        reason: String,
    },
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentOriginMappingInput {
    pub object_hash: ObjectId,
    pub origin_url: String,
    pub created_at: UnixTimeNs,
}

impl ContentOriginMappingInput {
    pub fn v1(
        object_hash: ObjectId,
        origin_url: String,
        created_at: UnixTimeNs,
    ) -> Result<Self, ContractViolation> {
        let i = Self {
            object_hash,
            origin_url,
            created_at,
        };
        i.validate()?;
        Ok(i)
    }
}

impl Validate for ContentOriginMappingInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_origin_url("content_origin_mapping.origin_url", &self.origin_url)?;
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "content_origin_mapping.created_at",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentOriginMappingRow {
    pub row_id: u64,
    pub object_hash: ObjectId,
    pub origin_url: String,
    pub created_at: UnixTimeNs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(u64),
    AlreadyPresent(u64),
}

impl UpsertOutcome {
    pub fn row_id(self) -> u64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::AlreadyPresent(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MappingJournalEntry {
    schema_version: u8,
    object_hash: ObjectId,
    origin_url: String,
    created_at: UnixTimeNs,
}

/// Content hash to origin URL table. `(object_hash, origin_url)` is unique;
/// rows are never mutated or deleted once inserted.
#[derive(Debug, Clone)]
pub struct ContentOriginMappingStore {
    rows: BTreeMap<u64, ContentOriginMappingRow>,
    unique_index: BTreeMap<(ObjectId, String), u64>,
    hash_index: BTreeMap<ObjectId, Vec<u64>>,
    origin_index: BTreeMap<String, BTreeSet<ObjectId>>,
    next_row_id: u64,
    journal_path: Option<PathBuf>,
    journal_offset: u64,
    journal_lines: usize,
}

impl Default for ContentOriginMappingStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl ContentOriginMappingStore {
    pub fn new_in_memory() -> Self {
        Self {
            rows: BTreeMap::new(),
            unique_index: BTreeMap::new(),
            hash_index: BTreeMap::new(),
            origin_index: BTreeMap::new(),
            next_row_id: 1,
            journal_path: None,
            journal_offset: 0,
            journal_lines: 0,
        }
    }

    /// Opens a journal-backed store, creating the file if needed and
    /// replaying existing lines through the uniqueness constraint.
    pub fn open_with_journal(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| journal_error(&path, err.to_string()))?;
        }
        if !path.exists() {
            File::create(&path).map_err(|err| journal_error(&path, err.to_string()))?;
        }

        let mut store = Self::new_in_memory();
        store.journal_path = Some(path);
        let (applied, duplicates) = store.replay_journal_tail()?;
        info!(
            table = TABLE,
            rows = applied,
            duplicates,
            "origin mapping journal replayed"
        );
        Ok(store)
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal_path.as_deref()
    }

    /// Applies journal lines appended since the last replay, including lines
    /// written by other processes sharing the file. Returns the number of
    /// new rows.
    pub fn refresh_from_journal(&mut self) -> Result<usize, StorageError> {
        let (applied, duplicates) = self.replay_journal_tail()?;
        if applied > 0 {
            debug!(table = TABLE, rows = applied, duplicates, "origin mapping journal caught up");
        }
        Ok(applied)
    }

    pub fn upsert(
        &mut self,
        input: ContentOriginMappingInput,
    ) -> Result<UpsertOutcome, StorageError> {
        input.validate()?;
        if let Some(existing) = self.row_id_for(&input.object_hash, &input.origin_url) {
            return Ok(UpsertOutcome::AlreadyPresent(existing));
        }
        if let Some(path) = self.journal_path.as_deref() {
            append_journal_entry(path, &input)?;
        }
        Ok(UpsertOutcome::Inserted(self.apply_row(input)))
    }

    /// Rows for `object_hash`, newest first; ties keep the later insert first.
    pub fn lookup(&self, object_hash: &ObjectId) -> Vec<&ContentOriginMappingRow> {
        let mut out = self
            .hash_index
            .get(object_hash)
            .map(|ids| ids.iter().filter_map(|id| self.rows.get(id)).collect::<Vec<_>>())
            .unwrap_or_default();
        out.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.row_id.cmp(&a.row_id))
        });
        out
    }

    pub fn latest(&self, object_hash: &ObjectId) -> Option<&ContentOriginMappingRow> {
        self.lookup(object_hash).into_iter().next()
    }

    /// Origin URLs for every requested hash that has at least one row.
    pub fn lookup_many(&self, object_hashes: &[ObjectId]) -> BTreeMap<ObjectId, Vec<String>> {
        let mut out = BTreeMap::new();
        for hash in object_hashes {
            if out.contains_key(hash) {
                continue;
            }
            let urls = self
                .lookup(hash)
                .into_iter()
                .map(|row| row.origin_url.clone())
                .collect::<Vec<_>>();
            if !urls.is_empty() {
                out.insert(*hash, urls);
            }
        }
        out
    }

    pub fn contents_for_origin(&self, origin_url: &str) -> Vec<ObjectId> {
        self.origin_index
            .get(origin_url)
            .map(|hashes| hashes.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row_id_for(&self, object_hash: &ObjectId, origin_url: &str) -> Option<u64> {
        self.unique_index
            .get(&(*object_hash, origin_url.to_string()))
            .copied()
    }

    fn apply_if_absent(&mut self, input: ContentOriginMappingInput) -> UpsertOutcome {
        match self.row_id_for(&input.object_hash, &input.origin_url) {
            Some(existing) => UpsertOutcome::AlreadyPresent(existing),
            None => UpsertOutcome::Inserted(self.apply_row(input)),
        }
    }

    fn apply_row(&mut self, input: ContentOriginMappingInput) -> u64 {
        let row_id = self.next_row_id;
        self.next_row_id = self.next_row_id.saturating_add(1);
        self.unique_index
            .insert((input.object_hash, input.origin_url.clone()), row_id);
        self.hash_index
            .entry(input.object_hash)
            .or_default()
            .push(row_id);
        self.origin_index
            .entry(input.origin_url.clone())
            .or_default()
            .insert(input.object_hash);
        self.rows.insert(
            row_id,
            ContentOriginMappingRow {
                row_id,
                object_hash: input.object_hash,
                origin_url: input.origin_url,
                created_at: input.created_at,
            },
        );
        row_id
    }

    /// Reads from the last consumed offset. A trailing line without its
    /// newline is an append still in flight and stays unconsumed.
    fn replay_journal_tail(&mut self) -> Result<(usize, usize), StorageError> {
        let Some(path) = self.journal_path.clone() else {
            return Ok((0, 0));
        };
        let mut file = File::open(&path).map_err(|err| journal_error(&path, err.to_string()))?;
        let mut tail = Vec::new();
        file.seek(SeekFrom::Start(self.journal_offset))
            .and_then(|_| file.read_to_end(&mut tail))
            .map_err(|err| journal_error(&path, format!("read failed: {err}")))?;
        let Some(complete) = tail.iter().rposition(|b| *b == b'\n').map(|end| end + 1) else {
            return Ok((0, 0));
        };

        let mut applied = 0usize;
        let mut duplicates = 0usize;
        let mut line_no = self.journal_lines;
        for raw in tail[..complete - 1].split(|b| *b == b'\n') {
            line_no += 1;
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let entry: MappingJournalEntry = serde_json::from_slice(raw).map_err(|err| {
                journal_error(&path, format!("parse failed at line {line_no}: {err}"))
            })?;
            if entry.schema_version != JOURNAL_SCHEMA_VERSION {
                return Err(journal_error(
                    &path,
                    format!(
                        "unsupported schema_version={} at line {line_no}",
                        entry.schema_version
                    ),
                ));
            }
            let input = ContentOriginMappingInput::v1(
                entry.object_hash,
                entry.origin_url,
                entry.created_at,
            )?;
            match self.apply_if_absent(input) {
                UpsertOutcome::Inserted(_) => applied += 1,
                UpsertOutcome::AlreadyPresent(_) => duplicates += 1,
            }
        }
        self.journal_offset += complete as u64;
        self.journal_lines = line_no;
        Ok((applied, duplicates))
    }
}

fn append_journal_entry(
    path: &Path,
    input: &ContentOriginMappingInput,
) -> Result<(), StorageError> {
    let entry = MappingJournalEntry {
        schema_version: JOURNAL_SCHEMA_VERSION,
        object_hash: input.object_hash,
        origin_url: input.origin_url.clone(),
        created_at: input.created_at,
    };
    let mut line = serde_json::to_string(&entry)
        .map_err(|err| journal_error(path, format!("encode failed: {err}")))?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|err| journal_error(path, format!("open for append failed: {err}")))?;
    file.write_all(line.as_bytes())
        .and_then(|_| file.sync_data())
        .map_err(|err| journal_error(path, format!("write failed: {err}")))?;
    Ok(())
}

fn journal_error(path: &Path, reason: String) -> StorageError {
    StorageError::Journal {
        table: TABLE,
        path: path.to_path_buf(),
        reason,
    }
}

fn poisoned(what: &str) -> StorageError {
    warn!(table = TABLE, lock = what, "origin mapping store lock poisoned");
    StorageError::Unavailable {
        table: TABLE,
        reason: format!("{what} lock poisoned"),
    }
}

/// Cloneable handle shared by request handlers and the background writer.
///
/// Reads first catch up with lines other handles appended to the journal.
/// Journal appends run under their own lock, so a slow fsync never blocks
/// readers of the in-memory table.
#[derive(Debug, Clone, Default)]
pub struct SharedMappingStore {
    inner: Arc<Mutex<ContentOriginMappingStore>>,
    journal_writer: Arc<Mutex<()>>,
}

impl SharedMappingStore {
    pub fn new(store: ContentOriginMappingStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
            journal_writer: Arc::new(Mutex::new(())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ContentOriginMappingStore>, StorageError> {
        self.inner.lock().map_err(|_| poisoned("store"))
    }

    /// Locks the table after applying any journal tail. A tail that fails to
    /// replay leaves the loaded rows readable.
    fn lock_current(&self) -> Result<MutexGuard<'_, ContentOriginMappingStore>, StorageError> {
        let mut store = self.lock()?;
        if let Err(err) = store.refresh_from_journal() {
            warn!(table = TABLE, error = %err, "origin mapping journal tail not applied");
        }
        Ok(store)
    }

    pub fn upsert(
        &self,
        object_hash: ObjectId,
        origin_url: &str,
    ) -> Result<UpsertOutcome, StorageError> {
        self.upsert_at(object_hash, origin_url, UnixTimeNs::now())
    }

    /// Racing writers of the same pair may both append a journal line; replay
    /// keeps the first, so the table still holds one row per pair.
    pub fn upsert_at(
        &self,
        object_hash: ObjectId,
        origin_url: &str,
        created_at: UnixTimeNs,
    ) -> Result<UpsertOutcome, StorageError> {
        let input =
            ContentOriginMappingInput::v1(object_hash, origin_url.to_string(), created_at)?;
        let journal_path = {
            let store = self.lock_current()?;
            if let Some(existing) = store.row_id_for(&input.object_hash, &input.origin_url) {
                return Ok(UpsertOutcome::AlreadyPresent(existing));
            }
            store.journal_path.clone()
        };
        if let Some(path) = journal_path.as_deref() {
            let _writer = self
                .journal_writer
                .lock()
                .map_err(|_| poisoned("journal writer"))?;
            append_journal_entry(path, &input)?;
        }
        Ok(self.lock()?.apply_if_absent(input))
    }

    pub fn lookup(
        &self,
        object_hash: &ObjectId,
    ) -> Result<Vec<ContentOriginMappingRow>, StorageError> {
        Ok(self
            .lock_current()?
            .lookup(object_hash)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn lookup_many(
        &self,
        object_hashes: &[ObjectId],
    ) -> Result<BTreeMap<ObjectId, Vec<String>>, StorageError> {
        Ok(self.lock_current()?.lookup_many(object_hashes))
    }

    pub fn contents_for_origin(&self, origin_url: &str) -> Result<Vec<ObjectId>, StorageError> {
        Ok(self.lock_current()?.contents_for_origin(origin_url))
    }

    pub fn row_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock_current()?.row_count())
    }
}

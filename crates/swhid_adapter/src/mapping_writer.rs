#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;

use swhid_contracts::swhid::ObjectId;
use swhid_resolver::OriginMappingSink;
use swhid_storage::{SharedMappingStore, UpsertOutcome};
use tracing::{debug, warn};

pub const MAPPING_WRITER_QUEUE_DEFAULT: usize = 1_024;

#[derive(Debug)]
struct MappingWrite {
    object_hash: ObjectId,
    origin_url: String,
}

#[derive(Debug, Default)]
struct MappingWriterCounters {
    inserted: AtomicU64,
    already_present: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct MappingWriterHealth {
    pub background: bool,
    pub inserted: u64,
    pub already_present: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Records learned origins into the mapping store, either on the calling
/// thread or through a bounded queue drained by one worker thread. Writes
/// never fail the caller: errors and queue overflow are counted and logged.
#[derive(Debug)]
pub struct MappingWriter {
    store: SharedMappingStore,
    queue: Option<SyncSender<MappingWrite>>,
    counters: Arc<MappingWriterCounters>,
}

impl MappingWriter {
    pub fn inline(store: SharedMappingStore) -> Self {
        Self {
            store,
            queue: None,
            counters: Arc::new(MappingWriterCounters::default()),
        }
    }

    /// The worker exits once the writer is dropped and the queue is drained.
    pub fn spawn(store: SharedMappingStore, capacity: usize) -> Result<Self, String> {
        let (tx, rx) = mpsc::sync_channel::<MappingWrite>(capacity.max(1));
        let counters = Arc::new(MappingWriterCounters::default());
        let worker_store = store.clone();
        let worker_counters = counters.clone();
        thread::Builder::new()
            .name("swhid-mapping-writer".to_string())
            .spawn(move || {
                while let Ok(write) = rx.recv() {
                    apply_write(&worker_store, &worker_counters, write);
                }
                debug!("mapping writer queue closed");
            })
            .map_err(|err| format!("failed to start mapping writer thread: {err}"))?;
        Ok(Self {
            store,
            queue: Some(tx),
            counters,
        })
    }

    pub fn store(&self) -> &SharedMappingStore {
        &self.store
    }

    pub fn health(&self) -> MappingWriterHealth {
        MappingWriterHealth {
            background: self.queue.is_some(),
            inserted: self.counters.inserted.load(Ordering::Relaxed),
            already_present: self.counters.already_present.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl OriginMappingSink for MappingWriter {
    fn record_origin(&self, object_hash: ObjectId, origin_url: &str) {
        let write = MappingWrite {
            object_hash,
            origin_url: origin_url.to_string(),
        };
        let Some(queue) = self.queue.as_ref() else {
            apply_write(&self.store, &self.counters, write);
            return;
        };
        match queue.try_send(write) {
            Ok(()) => {}
            Err(TrySendError::Full(write)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    object_hash = %write.object_hash,
                    origin = %write.origin_url,
                    "mapping writer queue full; write dropped"
                );
            }
            Err(TrySendError::Disconnected(write)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    object_hash = %write.object_hash,
                    origin = %write.origin_url,
                    "mapping writer stopped; write dropped"
                );
            }
        }
    }
}

fn apply_write(store: &SharedMappingStore, counters: &MappingWriterCounters, write: MappingWrite) {
    match store.upsert(write.object_hash, &write.origin_url) {
        Ok(UpsertOutcome::Inserted(row_id)) => {
            counters.inserted.fetch_add(1, Ordering::Relaxed);
            debug!(
                object_hash = %write.object_hash,
                origin = %write.origin_url,
                row_id,
                "learned origin recorded"
            );
        }
        Ok(UpsertOutcome::AlreadyPresent(_)) => {
            counters.already_present.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                object_hash = %write.object_hash,
                origin = %write.origin_url,
                error = %err,
                "learned origin not recorded"
            );
        }
    }
}

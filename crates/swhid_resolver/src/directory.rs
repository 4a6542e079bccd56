#![forbid(unsafe_code)]

use swhid_contracts::archive::DirectoryEntry;
use swhid_contracts::attribution::{AttributionSource, OriginAttribution};
use swhid_contracts::swhid::ObjectId;
use swhid_storage::{SharedMappingStore, StorageError, UpsertOutcome};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectoryRecordReport {
    pub inserted: usize,
    pub already_present: usize,
    pub skipped: usize,
}

/// Stores `origin_url` for every content entry of a directory listing.
/// Directory and revision entries are skipped.
pub fn record_directory_origin(
    store: &SharedMappingStore,
    entries: &[DirectoryEntry],
    origin_url: &str,
) -> Result<DirectoryRecordReport, StorageError> {
    let mut report = DirectoryRecordReport::default();
    for entry in entries {
        if !entry.is_content() {
            report.skipped += 1;
            continue;
        }
        match store.upsert(entry.target, origin_url)? {
            UpsertOutcome::Inserted(_) => report.inserted += 1,
            UpsertOutcome::AlreadyPresent(_) => report.already_present += 1,
        }
    }
    info!(
        origin = origin_url,
        inserted = report.inserted,
        already_present = report.already_present,
        skipped = report.skipped,
        "directory origin recorded"
    );
    Ok(report)
}

/// Attributes every entry of a listing with one batch store read, in
/// entry order. Non-content entries and unmapped contents are unresolved;
/// a store failure leaves the whole listing unresolved.
pub fn attribute_directory(
    store: &SharedMappingStore,
    entries: &[DirectoryEntry],
) -> Vec<OriginAttribution> {
    let hashes = entries
        .iter()
        .filter(|e| e.is_content())
        .map(|e| e.target)
        .collect::<Vec<_>>();
    let found = match store.lookup_many(&hashes) {
        Ok(found) => found,
        Err(err) => {
            warn!(error = %err, entries = entries.len(), "directory attribution read failed");
            return vec![OriginAttribution::unresolved(); entries.len()];
        }
    };
    entries
        .iter()
        .map(|entry| {
            if !entry.is_content() {
                return OriginAttribution::unresolved();
            }
            found
                .get(&entry.target)
                .and_then(|urls| urls.first())
                .and_then(|url| {
                    OriginAttribution::v1(url.clone(), AttributionSource::FromMappingStore).ok()
                })
                .unwrap_or_else(OriginAttribution::unresolved)
        })
        .collect()
}

/// Every known origin of a content object, newest first.
pub fn origins_for_content(
    store: &SharedMappingStore,
    object_hash: &ObjectId,
) -> Result<Vec<String>, StorageError> {
    Ok(store
        .lookup(object_hash)?
        .into_iter()
        .map(|row| row.origin_url)
        .collect())
}

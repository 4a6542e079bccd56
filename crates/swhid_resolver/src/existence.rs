#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::thread;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use swhid_contracts::archive::{ArchiveError, CanonicalOriginInfo, ObjectMetadata};
use swhid_contracts::attribution::ExistenceResult;
use swhid_contracts::swhid::{parse_core_swhid, CoreSwhid, ObjectId, ObjectType};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::resolve::ResolveError;

/// Largest identifier list accepted by one bulk existence check.
pub const MAX_KNOWN_BATCH: usize = 1000;

/// Read contract of the archive object store.
pub trait ArchiveObjectStore: Send + Sync {
    fn lookup_object(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_id: &ObjectId,
    ) -> Result<Option<ObjectMetadata>, ArchiveError>;

    fn lookup_origin(
        &self,
        ctx: &RequestContext,
        origin_url: &str,
    ) -> Result<Option<CanonicalOriginInfo>, ArchiveError>;

    fn lookup_missing_hashes(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_ids: &[ObjectId],
    ) -> Result<BTreeSet<ObjectId>, ArchiveError>;
}

impl<T: ArchiveObjectStore + ?Sized> ArchiveObjectStore for Arc<T> {
    fn lookup_object(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_id: &ObjectId,
    ) -> Result<Option<ObjectMetadata>, ArchiveError> {
        (**self).lookup_object(ctx, object_type, object_id)
    }

    fn lookup_origin(
        &self,
        ctx: &RequestContext,
        origin_url: &str,
    ) -> Result<Option<CanonicalOriginInfo>, ArchiveError> {
        (**self).lookup_origin(ctx, origin_url)
    }

    fn lookup_missing_hashes(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_ids: &[ObjectId],
    ) -> Result<BTreeSet<ObjectId>, ArchiveError> {
        (**self).lookup_missing_hashes(ctx, object_type, object_ids)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownEntry {
    pub swhid: CoreSwhid,
    pub known: bool,
}

/// Bulk existence answer in caller order, one entry per distinct
/// identifier. Serializes as `{"<swhid>": {"known": bool}, ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KnownReport {
    pub entries: Vec<KnownEntry>,
}

impl KnownReport {
    pub fn known_count(&self) -> usize {
        self.entries.iter().filter(|e| e.known).count()
    }

    pub fn get(&self, swhid: &CoreSwhid) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| &e.swhid == swhid)
            .map(|e| e.known)
    }
}

#[derive(Serialize)]
struct KnownFlag {
    known: bool,
}

impl Serialize for KnownReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.swhid.to_string(), &KnownFlag { known: entry.known })?;
        }
        map.end()
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveExistenceChecker<A> {
    archive: A,
}

impl<A: ArchiveObjectStore> ArchiveExistenceChecker<A> {
    pub fn new(archive: A) -> Self {
        Self { archive }
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    /// Single-object check. An object type the archive does not index is
    /// malformed input rather than a fault.
    pub fn exists(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_id: &ObjectId,
    ) -> Result<ExistenceResult, ArchiveError> {
        match self.archive.lookup_object(ctx, object_type, object_id) {
            Ok(Some(_)) => Ok(ExistenceResult::Found),
            Ok(None) => Ok(ExistenceResult::NotFound),
            Err(ArchiveError::UnsupportedObjectType(t)) => {
                debug!(object_type = t.name(), "existence check on unsupported type");
                Ok(ExistenceResult::MalformedInput)
            }
            Err(err) => Err(err),
        }
    }

    /// Bulk check of core identifiers. The size cap is enforced before any
    /// element is parsed; a malformed element fails the whole batch. One
    /// archive query runs per object type, concurrently across types.
    pub fn check_known<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        texts: &[S],
    ) -> Result<KnownReport, ResolveError> {
        if texts.len() > MAX_KNOWN_BATCH {
            return Err(ResolveError::PayloadTooLarge {
                max: MAX_KNOWN_BATCH,
                got: texts.len(),
            });
        }
        let swhids = texts
            .iter()
            .map(|t| parse_core_swhid(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups: BTreeMap<ObjectType, BTreeSet<ObjectId>> = BTreeMap::new();
        for swhid in &swhids {
            groups
                .entry(swhid.object_type)
                .or_default()
                .insert(swhid.object_id);
        }
        let missing = self.missing_per_type(ctx, groups)?;

        let mut seen = HashSet::new();
        let entries = swhids
            .into_iter()
            .filter(|swhid| seen.insert(*swhid))
            .map(|swhid| KnownEntry {
                swhid,
                known: missing
                    .get(&swhid.object_type)
                    .is_some_and(|m| !m.contains(&swhid.object_id)),
            })
            .collect();
        Ok(KnownReport { entries })
    }

    /// Missing hashes per type. Types the archive does not index are
    /// absent from the result, so their identifiers report unknown.
    fn missing_per_type(
        &self,
        ctx: &RequestContext,
        groups: BTreeMap<ObjectType, BTreeSet<ObjectId>>,
    ) -> Result<BTreeMap<ObjectType, BTreeSet<ObjectId>>, ResolveError> {
        let archive = &self.archive;
        let results = thread::scope(|scope| {
            let handles = groups
                .into_iter()
                .map(|(object_type, ids)| {
                    let ids = ids.into_iter().collect::<Vec<_>>();
                    let handle = scope.spawn(move || {
                        if ctx.is_done() {
                            return Err(ArchiveError::DeadlineExceeded);
                        }
                        archive.lookup_missing_hashes(ctx, object_type, &ids)
                    });
                    (object_type, handle)
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|(object_type, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(ArchiveError::Unavailable(
                            "missing-hash worker panicked".to_string(),
                        ))
                    });
                    (object_type, result)
                })
                .collect::<Vec<_>>()
        });

        let mut out = BTreeMap::new();
        for (object_type, result) in results {
            match result {
                Ok(missing) => {
                    out.insert(object_type, missing);
                }
                Err(ArchiveError::UnsupportedObjectType(_)) => {
                    debug!(
                        object_type = object_type.name(),
                        "bulk check on unsupported type"
                    );
                }
                Err(err) => {
                    warn!(
                        object_type = object_type.name(),
                        error = %err,
                        "bulk existence check failed"
                    );
                    return Err(ResolveError::ArchiveUnavailable(err.to_string()));
                }
            }
        }
        Ok(out)
    }
}

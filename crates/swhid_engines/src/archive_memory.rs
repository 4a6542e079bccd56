#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use swhid_contracts::archive::{
    similar_origin_urls, ArchiveError, CanonicalOriginInfo, ObjectMetadata,
};
use swhid_contracts::attribution::validate_origin_url;
use swhid_contracts::swhid::{CoreSwhid, ObjectId, ObjectType};
use swhid_contracts::ContractViolation;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveFixtureError {
    #[error("archive fixture unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive fixture is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("archive fixture rejected: {0}")]
    Contract(#[from] ContractViolation),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArchiveFixture {
    #[serde(default)]
    objects: BTreeMap<ObjectType, Vec<ObjectId>>,
    #[serde(default)]
    origins: Vec<String>,
    #[serde(default)]
    unsupported_types: Vec<ObjectType>,
}

/// Archive held in process memory, used for local runs and as a
/// deterministic backend in tests.
///
/// Fixture format:
/// `{"objects":{"revision":["<hex>"]},"origins":["<url>"],"unsupported_types":[]}`
#[derive(Debug, Clone, Default)]
pub struct InMemoryArchive {
    objects: BTreeMap<ObjectType, BTreeSet<ObjectId>>,
    origins: BTreeSet<String>,
    unsupported: BTreeSet<ObjectType>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture_json(json: &str) -> Result<Self, ArchiveFixtureError> {
        let fixture: ArchiveFixture = serde_json::from_str(json)?;
        let mut archive = Self::new();
        for (object_type, ids) in fixture.objects {
            for object_id in ids {
                archive.insert_object(object_type, object_id);
            }
        }
        for origin in fixture.origins {
            archive.insert_origin(origin)?;
        }
        for object_type in fixture.unsupported_types {
            archive.mark_unsupported(object_type);
        }
        Ok(archive)
    }

    pub fn load_fixture(path: &Path) -> Result<Self, ArchiveFixtureError> {
        let json = fs::read_to_string(path)?;
        Self::from_fixture_json(&json)
    }

    pub fn insert_object(&mut self, object_type: ObjectType, object_id: ObjectId) {
        self.objects.entry(object_type).or_default().insert(object_id);
    }

    pub fn insert_swhid(&mut self, swhid: CoreSwhid) {
        self.insert_object(swhid.object_type, swhid.object_id);
    }

    /// Registers `url` as a canonical origin URL.
    pub fn insert_origin(&mut self, url: impl Into<String>) -> Result<(), ContractViolation> {
        let url = url.into();
        validate_origin_url("in_memory_archive.origin", &url)?;
        self.origins.insert(url);
        Ok(())
    }

    pub fn mark_unsupported(&mut self, object_type: ObjectType) {
        self.unsupported.insert(object_type);
    }

    pub fn object_count(&self) -> usize {
        self.objects.values().map(BTreeSet::len).sum()
    }

    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }

    pub fn lookup_object(
        &self,
        object_type: ObjectType,
        object_id: &ObjectId,
    ) -> Result<Option<ObjectMetadata>, ArchiveError> {
        self.check_supported(object_type)?;
        let present = self
            .objects
            .get(&object_type)
            .is_some_and(|ids| ids.contains(object_id));
        Ok(present.then(|| ObjectMetadata::new(object_type, *object_id)))
    }

    /// Matches `url` or one of its trailing-slash / `.git` variants.
    pub fn lookup_origin(&self, url: &str) -> Result<Option<CanonicalOriginInfo>, ArchiveError> {
        let Some(found) = similar_origin_urls(url)
            .into_iter()
            .find(|candidate| self.origins.contains(candidate))
        else {
            return Ok(None);
        };
        CanonicalOriginInfo::v1(found)
            .map(Some)
            .map_err(|err| ArchiveError::InvalidResponse(err.to_string()))
    }

    pub fn lookup_missing_hashes(
        &self,
        object_type: ObjectType,
        object_ids: &[ObjectId],
    ) -> Result<BTreeSet<ObjectId>, ArchiveError> {
        self.check_supported(object_type)?;
        let known = self.objects.get(&object_type);
        Ok(object_ids
            .iter()
            .filter(|id| !known.is_some_and(|ids| ids.contains(*id)))
            .copied()
            .collect())
    }

    fn check_supported(&self, object_type: ObjectType) -> Result<(), ArchiveError> {
        if self.unsupported.contains(&object_type) {
            return Err(ArchiveError::UnsupportedObjectType(object_type));
        }
        Ok(())
    }
}

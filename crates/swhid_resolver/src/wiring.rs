#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use swhid_contracts::archive::{ArchiveError, CanonicalOriginInfo, ObjectMetadata};
use swhid_contracts::index::{CandidateOriginId, IndexError};
use swhid_contracts::swhid::{ObjectId, ObjectType};
use swhid_engines::archive_http::ArchiveHttpClient;
use swhid_engines::archive_memory::InMemoryArchive;
use swhid_engines::metadata_index::MetadataIndexHttpClient;

use crate::attribution::MetadataIndex;
use crate::context::RequestContext;
use crate::existence::ArchiveObjectStore;

impl ArchiveObjectStore for ArchiveHttpClient {
    fn lookup_object(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_id: &ObjectId,
    ) -> Result<Option<ObjectMetadata>, ArchiveError> {
        let timeout = ctx.call_timeout(self.configured_timeout());
        ArchiveHttpClient::lookup_object(self, object_type, object_id, timeout)
    }

    fn lookup_origin(
        &self,
        ctx: &RequestContext,
        origin_url: &str,
    ) -> Result<Option<CanonicalOriginInfo>, ArchiveError> {
        let timeout = ctx.call_timeout(self.configured_timeout());
        ArchiveHttpClient::lookup_origin(self, origin_url, timeout)
    }

    fn lookup_missing_hashes(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_ids: &[ObjectId],
    ) -> Result<BTreeSet<ObjectId>, ArchiveError> {
        let timeout = ctx.call_timeout(self.configured_timeout());
        ArchiveHttpClient::lookup_missing_hashes(self, object_type, object_ids, timeout)
    }
}

impl ArchiveObjectStore for InMemoryArchive {
    fn lookup_object(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_id: &ObjectId,
    ) -> Result<Option<ObjectMetadata>, ArchiveError> {
        if ctx.is_done() {
            return Err(ArchiveError::DeadlineExceeded);
        }
        InMemoryArchive::lookup_object(self, object_type, object_id)
    }

    fn lookup_origin(
        &self,
        ctx: &RequestContext,
        origin_url: &str,
    ) -> Result<Option<CanonicalOriginInfo>, ArchiveError> {
        if ctx.is_done() {
            return Err(ArchiveError::DeadlineExceeded);
        }
        InMemoryArchive::lookup_origin(self, origin_url)
    }

    fn lookup_missing_hashes(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_ids: &[ObjectId],
    ) -> Result<BTreeSet<ObjectId>, ArchiveError> {
        if ctx.is_done() {
            return Err(ArchiveError::DeadlineExceeded);
        }
        InMemoryArchive::lookup_missing_hashes(self, object_type, object_ids)
    }
}

impl MetadataIndex for MetadataIndexHttpClient {
    fn search_by_type_and_hash(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_id: &ObjectId,
        limit: u8,
    ) -> Result<Vec<CandidateOriginId>, IndexError> {
        let timeout = ctx.call_timeout(self.configured_timeout());
        MetadataIndexHttpClient::search_by_type_and_hash(
            self,
            object_type,
            object_id,
            limit,
            timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_wiring_01_in_memory_archive_honours_cancellation() {
        let mut archive = InMemoryArchive::new();
        let id = ObjectId::from_bytes(&[3u8; 20]).unwrap();
        archive.insert_object(ObjectType::Content, id);
        let ctx = RequestContext::unbounded();
        assert!(ArchiveObjectStore::lookup_object(&archive, &ctx, ObjectType::Content, &id)
            .unwrap()
            .is_some());
        ctx.cancel();
        assert_eq!(
            ArchiveObjectStore::lookup_object(&archive, &ctx, ObjectType::Content, &id),
            Err(ArchiveError::DeadlineExceeded)
        );
    }

    #[test]
    fn at_wiring_02_http_calls_fail_fast_once_cancelled() {
        let client = ArchiveHttpClient::new(
            swhid_engines::archive_http::ArchiveHttpConfig::mvp_v1("http://127.0.0.1:9/api/1"),
        )
        .unwrap();
        let ctx = RequestContext::unbounded();
        ctx.cancel();
        assert_eq!(
            ArchiveObjectStore::lookup_origin(&client, &ctx, "https://x"),
            Err(ArchiveError::DeadlineExceeded)
        );
    }
}

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use swhid_contracts::swhid::ObjectId;

use crate::origin_mapping::{
    ContentOriginMappingInput, ContentOriginMappingRow, ContentOriginMappingStore, StorageError,
    UpsertOutcome,
};

/// Typed repository interface for content-to-origin mapping persistence.
pub trait OriginMappingRepo {
    fn upsert_origin_mapping_row(
        &mut self,
        input: ContentOriginMappingInput,
    ) -> Result<UpsertOutcome, StorageError>;
    fn origin_mapping_rows_for_hash(&self, object_hash: &ObjectId)
        -> Vec<&ContentOriginMappingRow>;
    fn origin_mapping_urls_for_hashes(
        &self,
        object_hashes: &[ObjectId],
    ) -> BTreeMap<ObjectId, Vec<String>>;
    fn origin_mapping_hashes_for_origin(&self, origin_url: &str) -> Vec<ObjectId>;
}

impl OriginMappingRepo for ContentOriginMappingStore {
    fn upsert_origin_mapping_row(
        &mut self,
        input: ContentOriginMappingInput,
    ) -> Result<UpsertOutcome, StorageError> {
        self.upsert(input)
    }

    fn origin_mapping_rows_for_hash(
        &self,
        object_hash: &ObjectId,
    ) -> Vec<&ContentOriginMappingRow> {
        self.lookup(object_hash)
    }

    fn origin_mapping_urls_for_hashes(
        &self,
        object_hashes: &[ObjectId],
    ) -> BTreeMap<ObjectId, Vec<String>> {
        self.lookup_many(object_hashes)
    }

    fn origin_mapping_hashes_for_origin(&self, origin_url: &str) -> Vec<ObjectId> {
        self.contents_for_origin(origin_url)
    }
}

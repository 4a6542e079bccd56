#![forbid(unsafe_code)]

pub mod origin_mapping;
pub mod repo;

pub use origin_mapping::{
    ContentOriginMappingInput, ContentOriginMappingRow, ContentOriginMappingStore,
    SharedMappingStore, StorageError, UpsertOutcome,
};
pub use repo::OriginMappingRepo;

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_bounded_text;
use crate::swhid::{ObjectId, ObjectType};
use crate::{ContractViolation, Validate};

/// Upper bound on matches requested from the metadata index per lookup.
pub const MAX_INDEX_LOOKUP_LIMIT: u8 = 5;

pub fn clamp_index_limit(limit: u8) -> u8 {
    limit.clamp(1, MAX_INDEX_LOOKUP_LIMIT)
}

/// Origin identifier as returned by the index; resolved to a canonical URL
/// through the archive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateOriginId(String);

impl CandidateOriginId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let c = Self(id.into());
        c.validate()?;
        Ok(c)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for CandidateOriginId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_bounded_text(
            "candidate_origin_id",
            &self.0,
            crate::attribution::MAX_ORIGIN_URL_LEN,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("metadata index unavailable: {0}")]
    Unavailable(String),
    #[error("metadata index returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("request deadline exceeded before the index call")]
    DeadlineExceeded,
}

/// Index field holding the hash of an object of the given type.
pub fn index_hash_field(object_type: ObjectType) -> &'static str {
    match object_type {
        ObjectType::Content => "sha1_git",
        ObjectType::Directory => "directory",
        ObjectType::Revision => "revision",
        ObjectType::Release => "release",
        ObjectType::Snapshot => "snapshot",
    }
}

/// Conjunction of type-tagged terms scoping a lookup to one object.
pub fn index_query_terms(object_type: ObjectType, object_id: &ObjectId) -> Vec<String> {
    vec![
        format!("object_type:{}", object_type.name()),
        format!("{}:{}", index_hash_field(object_type), object_id.to_hex()),
    ]
}

pub fn index_query_text(object_type: ObjectType, object_id: &ObjectId) -> String {
    index_query_terms(object_type, object_id).join(" AND ")
}

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::attribution::validate_origin_url;
use crate::swhid::{CoreSwhid, ObjectId, ObjectType};
use crate::{ContractViolation, Validate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub object_type: ObjectType,
    pub object_id: ObjectId,
}

impl ObjectMetadata {
    pub fn new(object_type: ObjectType, object_id: ObjectId) -> Self {
        Self {
            object_type,
            object_id,
        }
    }
}

/// Origin record as registered by the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalOriginInfo {
    pub url: String,
}

impl CanonicalOriginInfo {
    pub fn v1(url: String) -> Result<Self, ContractViolation> {
        let o = Self { url };
        o.validate()?;
        Ok(o)
    }
}

impl Validate for CanonicalOriginInfo {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_origin_url("canonical_origin_info.url", &self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive does not index {0} objects")]
    UnsupportedObjectType(ObjectType),
    #[error("archive unavailable: {0}")]
    Unavailable(String),
    #[error("archive returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("request deadline exceeded before the archive call")]
    DeadlineExceeded,
}

/// Variants of an origin URL the archive registry may hold it under,
/// starting with the URL itself.
pub fn similar_origin_urls(url: &str) -> Vec<String> {
    let mut out = vec![url.to_string()];
    if let Some(stripped) = url.strip_suffix('/') {
        out.push(stripped.to_string());
    } else if let Some(stripped) = url.strip_suffix(".git") {
        out.push(stripped.to_string());
    } else {
        out.push(format!("{url}/"));
        out.push(format!("{url}.git"));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryEntryType {
    File,
    Dir,
    Rev,
}

impl DirectoryEntryType {
    pub fn target_object_type(self) -> ObjectType {
        match self {
            DirectoryEntryType::File => ObjectType::Content,
            DirectoryEntryType::Dir => ObjectType::Directory,
            DirectoryEntryType::Rev => ObjectType::Revision,
        }
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: DirectoryEntryType,
    pub target: ObjectId,
}

impl DirectoryEntry {
    pub fn target_swhid(&self) -> CoreSwhid {
        CoreSwhid::new(self.entry_type.target_object_type(), self.target)
    }

    pub fn is_content(&self) -> bool {
        self.entry_type == DirectoryEntryType::File
    }
}

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_bounded_text;
use crate::{ContractViolation, Validate};

/// Longest origin URL the system persists or reports.
pub const MAX_ORIGIN_URL_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExistenceResult {
    Found,
    NotFound,
    MalformedInput,
}

/// Which cascade stage produced an origin. Variant order is the confidence
/// ranking, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionSource {
    FromQualifier,
    FromMappingStore,
    FromMetadataIndex,
    FromHeuristicExtraction,
    Unresolved,
}

impl AttributionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributionSource::FromQualifier => "from_qualifier",
            AttributionSource::FromMappingStore => "from_mapping_store",
            AttributionSource::FromMetadataIndex => "from_metadata_index",
            AttributionSource::FromHeuristicExtraction => "from_heuristic_extraction",
            AttributionSource::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginAttribution {
    origin_url: Option<String>,
    source: AttributionSource,
}

impl OriginAttribution {
    pub fn v1(origin_url: String, source: AttributionSource) -> Result<Self, ContractViolation> {
        let a = Self {
            origin_url: Some(origin_url),
            source,
        };
        a.validate()?;
        Ok(a)
    }

    pub fn unresolved() -> Self {
        Self {
            origin_url: None,
            source: AttributionSource::Unresolved,
        }
    }

    pub fn origin_url(&self) -> Option<&str> {
        self.origin_url.as_deref()
    }

    /// Empty string when unresolved; callers render the field either way.
    pub fn origin_url_or_empty(&self) -> &str {
        self.origin_url.as_deref().unwrap_or("")
    }

    pub fn source(&self) -> AttributionSource {
        self.source
    }

    pub fn is_resolved(&self) -> bool {
        self.origin_url.is_some()
    }
}

impl Validate for OriginAttribution {
    fn validate(&self) -> Result<(), ContractViolation> {
        match (&self.origin_url, self.source) {
            (None, AttributionSource::Unresolved) => Ok(()),
            (Some(_), AttributionSource::Unresolved) => Err(ContractViolation::InvalidValue {
                field: "origin_attribution.origin_url",
                reason: "must be absent when unresolved",
            }),
            (None, _) => Err(ContractViolation::InvalidValue {
                field: "origin_attribution.origin_url",
                reason: "must be present for a resolved source",
            }),
            (Some(url), _) => validate_origin_url("origin_attribution.origin_url", url),
        }
    }
}

pub fn validate_origin_url(field: &'static str, url: &str) -> Result<(), ContractViolation> {
    validate_bounded_text(field, url, MAX_ORIGIN_URL_LEN)
}

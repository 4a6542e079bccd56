#![forbid(unsafe_code)]

use std::sync::Arc;

use serde::Serialize;
use swhid_contracts::attribution::{validate_origin_url, AttributionSource, OriginAttribution};
use swhid_contracts::index::{clamp_index_limit, CandidateOriginId, IndexError};
use swhid_contracts::swhid::{ObjectId, ObjectType, TypedIdentifier};
use swhid_storage::SharedMappingStore;
use tracing::{debug, warn};
use url::{form_urlencoded, Url};

use crate::context::RequestContext;
use crate::existence::ArchiveObjectStore;

/// Secondary full-text index over archived objects.
pub trait MetadataIndex: Send + Sync {
    fn search_by_type_and_hash(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_id: &ObjectId,
        limit: u8,
    ) -> Result<Vec<CandidateOriginId>, IndexError>;
}

/// Receives origins learned for content objects. Recording is
/// fire-and-forget: implementations log and drop their own failures.
pub trait OriginMappingSink: Send + Sync {
    fn record_origin(&self, object_hash: ObjectId, origin_url: &str);
}

/// Browse-layer rendering of an identifier, when one exists.
pub trait BrowseUrlProvider: Send + Sync {
    fn browse_url(&self, identifier: &TypedIdentifier) -> Option<String>;
}

impl<T: MetadataIndex + ?Sized> MetadataIndex for Arc<T> {
    fn search_by_type_and_hash(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_id: &ObjectId,
        limit: u8,
    ) -> Result<Vec<CandidateOriginId>, IndexError> {
        (**self).search_by_type_and_hash(ctx, object_type, object_id, limit)
    }
}

impl<T: OriginMappingSink + ?Sized> OriginMappingSink for Arc<T> {
    fn record_origin(&self, object_hash: ObjectId, origin_url: &str) {
        (**self).record_origin(object_hash, origin_url)
    }
}

impl<T: BrowseUrlProvider + ?Sized> BrowseUrlProvider for Arc<T> {
    fn browse_url(&self, identifier: &TypedIdentifier) -> Option<String> {
        (**self).browse_url(identifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributionConfig {
    pub index_enabled: bool,
    pub index_limit: u8,
    pub record_learned_origins: bool,
}

impl AttributionConfig {
    pub fn mvp_v1() -> Self {
        Self {
            index_enabled: true,
            index_limit: 1,
            record_learned_origins: true,
        }
    }
}

/// Why a cascade stage produced no origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoResultReason {
    NoQualifier,
    InvalidOrigin,
    NotContentObject,
    NoMapping,
    StoreUnavailable,
    IndexDisabled,
    IndexNoMatch,
    IndexUnavailable,
    IndexInvalidResponse,
    CanonicalizationFailed,
    NoBrowseUrl,
    NoOriginParameter,
    InvalidOriginParameter,
    Cancelled,
}

impl NoResultReason {
    pub fn as_str(self) -> &'static str {
        match self {
            NoResultReason::NoQualifier => "no_qualifier",
            NoResultReason::InvalidOrigin => "invalid_origin",
            NoResultReason::NotContentObject => "not_content_object",
            NoResultReason::NoMapping => "no_mapping",
            NoResultReason::StoreUnavailable => "store_unavailable",
            NoResultReason::IndexDisabled => "index_disabled",
            NoResultReason::IndexNoMatch => "index_no_match",
            NoResultReason::IndexUnavailable => "index_unavailable",
            NoResultReason::IndexInvalidResponse => "index_invalid_response",
            NoResultReason::CanonicalizationFailed => "canonicalization_failed",
            NoResultReason::NoBrowseUrl => "no_browse_url",
            NoResultReason::NoOriginParameter => "no_origin_parameter",
            NoResultReason::InvalidOriginParameter => "invalid_origin_parameter",
            NoResultReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Attributed(String),
    NoResult(NoResultReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: AttributionSource,
    pub outcome: StageOutcome,
}

/// Stages that ran for one attribution, in cascade order. Stages after
/// the first attributed one never run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AttributionTrace {
    pub stages: Vec<StageRecord>,
}

impl AttributionTrace {
    pub fn outcome_of(&self, stage: AttributionSource) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.outcome)
    }

    fn push(&mut self, stage: AttributionSource, outcome: StageOutcome) {
        self.stages.push(StageRecord { stage, outcome });
    }
}

const CASCADE: [AttributionSource; 4] = [
    AttributionSource::FromQualifier,
    AttributionSource::FromMappingStore,
    AttributionSource::FromMetadataIndex,
    AttributionSource::FromHeuristicExtraction,
];

/// Best-effort origin attribution. Every stage failure becomes a
/// `NoResult` outcome; `attribute` itself never fails.
#[derive(Debug, Clone)]
pub struct OriginAttributionEngine<A, I, W> {
    config: AttributionConfig,
    archive: A,
    index: I,
    mapping: SharedMappingStore,
    sink: W,
}

impl<A, I, W> OriginAttributionEngine<A, I, W>
where
    A: ArchiveObjectStore,
    I: MetadataIndex,
    W: OriginMappingSink,
{
    pub fn new(
        config: AttributionConfig,
        archive: A,
        index: I,
        mapping: SharedMappingStore,
        sink: W,
    ) -> Self {
        Self {
            config,
            archive,
            index,
            mapping,
            sink,
        }
    }

    pub fn config(&self) -> &AttributionConfig {
        &self.config
    }

    pub fn mapping_store(&self) -> &SharedMappingStore {
        &self.mapping
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn attribute(
        &self,
        ctx: &RequestContext,
        identifier: &TypedIdentifier,
        browse_url: Option<&str>,
    ) -> OriginAttribution {
        self.attribute_traced(ctx, identifier, browse_url).0
    }

    pub fn attribute_traced(
        &self,
        ctx: &RequestContext,
        identifier: &TypedIdentifier,
        browse_url: Option<&str>,
    ) -> (OriginAttribution, AttributionTrace) {
        let mut trace = AttributionTrace::default();
        for stage in CASCADE {
            let outcome = match stage {
                AttributionSource::FromQualifier => self.from_qualifier(ctx, identifier),
                AttributionSource::FromMappingStore => self.from_mapping_store(identifier),
                AttributionSource::FromMetadataIndex => self.from_metadata_index(ctx, identifier),
                _ => from_browse_url(browse_url),
            };
            trace.push(stage, outcome.clone());
            let StageOutcome::Attributed(url) = outcome else {
                continue;
            };
            match OriginAttribution::v1(url.clone(), stage) {
                Ok(attribution) => {
                    debug!(
                        swhid = %identifier.core(),
                        stage = stage.as_str(),
                        "origin attributed"
                    );
                    self.record_learned(identifier, stage, &url);
                    return (attribution, trace);
                }
                Err(err) => {
                    warn!(
                        swhid = %identifier.core(),
                        stage = stage.as_str(),
                        error = %err,
                        "attributed origin failed validation"
                    );
                }
            }
        }
        debug!(swhid = %identifier.core(), "origin unresolved");
        (OriginAttribution::unresolved(), trace)
    }

    fn from_qualifier(&self, ctx: &RequestContext, identifier: &TypedIdentifier) -> StageOutcome {
        let Some(decoded) = identifier.origin_url() else {
            return StageOutcome::NoResult(NoResultReason::NoQualifier);
        };
        if validate_origin_url("origin_qualifier", decoded).is_err() {
            return StageOutcome::NoResult(NoResultReason::InvalidOrigin);
        }
        // The literal stands whenever canonicalization cannot improve on it.
        match self.archive.lookup_origin(ctx, decoded) {
            Ok(Some(canonical)) => StageOutcome::Attributed(canonical.url),
            Ok(None) => StageOutcome::Attributed(decoded.to_string()),
            Err(err) => {
                debug!(origin = decoded, error = %err, "origin canonicalization failed");
                StageOutcome::Attributed(decoded.to_string())
            }
        }
    }

    fn from_mapping_store(&self, identifier: &TypedIdentifier) -> StageOutcome {
        if identifier.object_type() != ObjectType::Content {
            return StageOutcome::NoResult(NoResultReason::NotContentObject);
        }
        match self.mapping.lookup(identifier.object_id()) {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => StageOutcome::Attributed(row.origin_url),
                None => StageOutcome::NoResult(NoResultReason::NoMapping),
            },
            Err(err) => {
                warn!(swhid = %identifier.core(), error = %err, "mapping store read failed");
                StageOutcome::NoResult(NoResultReason::StoreUnavailable)
            }
        }
    }

    fn from_metadata_index(
        &self,
        ctx: &RequestContext,
        identifier: &TypedIdentifier,
    ) -> StageOutcome {
        if !self.config.index_enabled {
            return StageOutcome::NoResult(NoResultReason::IndexDisabled);
        }
        if ctx.is_done() {
            return StageOutcome::NoResult(NoResultReason::Cancelled);
        }
        let limit = clamp_index_limit(self.config.index_limit);
        let candidates = match self.index.search_by_type_and_hash(
            ctx,
            identifier.object_type(),
            identifier.object_id(),
            limit,
        ) {
            Ok(candidates) => candidates,
            Err(IndexError::InvalidResponse(reason)) => {
                warn!(
                    swhid = %identifier.core(),
                    reason = %reason,
                    "metadata index response rejected"
                );
                return StageOutcome::NoResult(NoResultReason::IndexInvalidResponse);
            }
            Err(err) => {
                warn!(swhid = %identifier.core(), error = %err, "metadata index unavailable");
                return StageOutcome::NoResult(NoResultReason::IndexUnavailable);
            }
        };
        if candidates.is_empty() {
            debug!(swhid = %identifier.core(), "metadata index has no match");
            return StageOutcome::NoResult(NoResultReason::IndexNoMatch);
        }
        for candidate in candidates.iter().take(usize::from(limit)) {
            match self.archive.lookup_origin(ctx, candidate.as_str()) {
                Ok(Some(canonical)) => return StageOutcome::Attributed(canonical.url),
                Ok(None) => {
                    debug!(candidate = candidate.as_str(), "index candidate not in archive");
                }
                Err(err) => {
                    warn!(
                        candidate = candidate.as_str(),
                        error = %err,
                        "index candidate canonicalization failed"
                    );
                }
            }
        }
        StageOutcome::NoResult(NoResultReason::CanonicalizationFailed)
    }

    fn record_learned(&self, identifier: &TypedIdentifier, stage: AttributionSource, url: &str) {
        if !self.config.record_learned_origins
            || stage == AttributionSource::FromMappingStore
            || identifier.object_type() != ObjectType::Content
        {
            return;
        }
        self.sink.record_origin(*identifier.object_id(), url);
    }
}

/// Lower-confidence stage: an `origin` or `origin_url` query parameter
/// embedded in a browse URL. The decoded value must be an absolute URL.
fn from_browse_url(browse_url: Option<&str>) -> StageOutcome {
    let Some(browse_url) = browse_url else {
        return StageOutcome::NoResult(NoResultReason::NoBrowseUrl);
    };
    match origin_query_parameter(browse_url) {
        None => StageOutcome::NoResult(NoResultReason::NoOriginParameter),
        Some(url)
            if !url.contains(char::REPLACEMENT_CHARACTER)
                && Url::parse(&url).is_ok()
                && validate_origin_url("browse_url.origin", &url).is_ok() =>
        {
            StageOutcome::Attributed(url)
        }
        Some(_) => StageOutcome::NoResult(NoResultReason::InvalidOriginParameter),
    }
}

/// Decoded value of the first `origin` / `origin_url` query parameter,
/// read with `application/x-www-form-urlencoded` rules.
pub fn origin_query_parameter(browse_url: &str) -> Option<String> {
    let before_fragment = browse_url.split('#').next().unwrap_or(browse_url);
    let (_, query) = before_fragment.split_once('?')?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "origin" || key == "origin_url")
        .map(|(_, value)| value.into_owned())
}

#![forbid(unsafe_code)]

use swhid_contracts::archive::ArchiveError;
use swhid_contracts::attribution::{ExistenceResult, OriginAttribution};
use swhid_contracts::swhid::{parse_swhid, SwhidParseError, TypedIdentifier};
use swhid_storage::SharedMappingStore;
use tracing::{info, warn};

use crate::attribution::{
    AttributionConfig, AttributionTrace, BrowseUrlProvider, MetadataIndex, OriginAttributionEngine,
    OriginMappingSink,
};
use crate::context::RequestContext;
use crate::existence::{ArchiveExistenceChecker, ArchiveObjectStore, KnownReport};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },
    #[error("object {swhid} not found in the archive")]
    NotFound { swhid: String },
    #[error("payload too large: {got} identifiers submitted, at most {max} accepted")]
    PayloadTooLarge { max: usize, got: usize },
    #[error("archive unavailable: {0}")]
    ArchiveUnavailable(String),
}

impl ResolveError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::MalformedInput { .. } => "malformed_input",
            ResolveError::NotFound { .. } => "not_found",
            ResolveError::PayloadTooLarge { .. } => "payload_too_large",
            ResolveError::ArchiveUnavailable(_) => "archive_unavailable",
        }
    }
}

impl From<SwhidParseError> for ResolveError {
    fn from(err: SwhidParseError) -> Self {
        ResolveError::MalformedInput {
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSwhid {
    pub identifier: TypedIdentifier,
    pub browse_url: Option<String>,
    pub attribution: OriginAttribution,
    pub trace: AttributionTrace,
}

/// Parse, existence check, then best-effort origin attribution.
#[derive(Debug, Clone)]
pub struct SwhidResolver<A, I, W, B> {
    checker: ArchiveExistenceChecker<A>,
    engine: OriginAttributionEngine<A, I, W>,
    browse: B,
}

impl<A, I, W, B> SwhidResolver<A, I, W, B>
where
    A: ArchiveObjectStore + Clone,
    I: MetadataIndex,
    W: OriginMappingSink,
    B: BrowseUrlProvider,
{
    pub fn new(
        config: AttributionConfig,
        archive: A,
        index: I,
        mapping: SharedMappingStore,
        sink: W,
        browse: B,
    ) -> Self {
        Self {
            checker: ArchiveExistenceChecker::new(archive.clone()),
            engine: OriginAttributionEngine::new(config, archive, index, mapping, sink),
            browse,
        }
    }

    pub fn known<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        texts: &[S],
    ) -> Result<KnownReport, ResolveError> {
        self.checker.check_known(ctx, texts)
    }

    /// Parse and existence failures are returned to the caller; nothing
    /// inside attribution can fail the resolution.
    pub fn resolve(&self, ctx: &RequestContext, text: &str) -> Result<ResolvedSwhid, ResolveError> {
        let identifier = parse_swhid(text)?;
        let core = identifier.core();
        match self
            .checker
            .exists(ctx, identifier.object_type(), identifier.object_id())
        {
            Ok(ExistenceResult::Found) => {}
            Ok(ExistenceResult::NotFound) => {
                return Err(ResolveError::NotFound {
                    swhid: core.to_string(),
                });
            }
            Ok(ExistenceResult::MalformedInput) => {
                return Err(ResolveError::MalformedInput {
                    reason: ArchiveError::UnsupportedObjectType(identifier.object_type())
                        .to_string(),
                });
            }
            Err(err) => {
                warn!(swhid = %core, error = %err, "existence check failed");
                return Err(ResolveError::ArchiveUnavailable(err.to_string()));
            }
        }

        let browse_url = self.browse.browse_url(&identifier);
        let (attribution, trace) =
            self.engine
                .attribute_traced(ctx, &identifier, browse_url.as_deref());
        info!(
            swhid = %core,
            object_type = identifier.object_type().name(),
            source = attribution.source().as_str(),
            "swhid resolved"
        );
        Ok(ResolvedSwhid {
            identifier,
            browse_url,
            attribution,
            trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::{NoResultReason, StageOutcome};
    use crate::browse::ArchiveBrowseUrls;
    use crate::existence::tests::CountingArchive;
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use swhid_contracts::archive::{CanonicalOriginInfo, ObjectMetadata};
    use swhid_contracts::attribution::AttributionSource;
    use swhid_contracts::index::{CandidateOriginId, IndexError};
    use swhid_contracts::swhid::{ObjectId, ObjectType};
    use swhid_engines::archive_memory::InMemoryArchive;

    const REV_HEX: &str = "96db9023b881d7cd9f379b0c154650d6c108e9a3";
    const OPENSSL_QUALIFIED: &str = "swh:1:rev:96db9023b881d7cd9f379b0c154650d6c108e9a3;\
         origin=https%3A%2F%2Fgithub.com%2Fopenssl%2Fopenssl%2F";

    struct NoMatchIndex;

    impl MetadataIndex for NoMatchIndex {
        fn search_by_type_and_hash(
            &self,
            _ctx: &RequestContext,
            _object_type: ObjectType,
            _object_id: &ObjectId,
            _limit: u8,
        ) -> Result<Vec<CandidateOriginId>, IndexError> {
            Ok(Vec::new())
        }
    }

    struct StoreSink(SharedMappingStore);

    impl OriginMappingSink for StoreSink {
        fn record_origin(&self, object_hash: ObjectId, origin_url: &str) {
            let _ = self.0.upsert(object_hash, origin_url);
        }
    }

    struct NoBrowse;

    impl BrowseUrlProvider for NoBrowse {
        fn browse_url(&self, _identifier: &TypedIdentifier) -> Option<String> {
            None
        }
    }

    fn archive_with_rev() -> Arc<CountingArchive> {
        let mut inner = InMemoryArchive::new();
        inner.insert_object(ObjectType::Revision, ObjectId::from_hex(REV_HEX).unwrap());
        Arc::new(CountingArchive::new(inner))
    }

    fn resolver<B: BrowseUrlProvider>(
        archive: Arc<CountingArchive>,
        store: SharedMappingStore,
        browse: B,
    ) -> SwhidResolver<Arc<CountingArchive>, NoMatchIndex, StoreSink, B> {
        SwhidResolver::new(
            AttributionConfig::mvp_v1(),
            archive,
            NoMatchIndex,
            store.clone(),
            StoreSink(store),
            browse,
        )
    }

    #[test]
    fn at_resolve_01_qualified_revision_reports_decoded_origin() {
        let r = resolver(archive_with_rev(), SharedMappingStore::default(), NoBrowse);
        let out = r
            .resolve(&RequestContext::unbounded(), OPENSSL_QUALIFIED)
            .unwrap();
        assert_eq!(out.identifier.object_type(), ObjectType::Revision);
        assert_eq!(
            out.attribution.origin_url_or_empty(),
            "https://github.com/openssl/openssl/"
        );
        assert_eq!(out.attribution.source(), AttributionSource::FromQualifier);
    }

    #[test]
    fn at_resolve_02_unqualified_revision_is_unresolved_with_empty_origin() {
        let r = resolver(archive_with_rev(), SharedMappingStore::default(), NoBrowse);
        let out = r
            .resolve(&RequestContext::unbounded(), &format!("swh:1:rev:{REV_HEX}"))
            .unwrap();
        assert_eq!(out.attribution.origin_url_or_empty(), "");
        assert_eq!(out.attribution.source(), AttributionSource::Unresolved);
        assert_eq!(
            out.trace.outcome_of(AttributionSource::FromMetadataIndex),
            Some(&StageOutcome::NoResult(NoResultReason::IndexNoMatch))
        );
    }

    #[test]
    fn at_resolve_03_absent_object_is_not_found_even_if_well_formed() {
        let archive = archive_with_rev();
        let r = resolver(Arc::clone(&archive), SharedMappingStore::default(), NoBrowse);
        let err = r
            .resolve(
                &RequestContext::unbounded(),
                "swh:1:cnt:94a9ed024d3859793618152ea559a168bbcbb5e2",
            )
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::NotFound {
                swhid: "swh:1:cnt:94a9ed024d3859793618152ea559a168bbcbb5e2".to_string()
            }
        );
        assert_eq!(err.kind(), "not_found");
        assert_eq!(archive.origin_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn at_resolve_04_malformed_text_never_reaches_archive() {
        let archive = archive_with_rev();
        let r = resolver(Arc::clone(&archive), SharedMappingStore::default(), NoBrowse);
        for bad in [
            "swh:2:rev:96db9023b881d7cd9f379b0c154650d6c108e9a3",
            "swx:1:rev:96db9023b881d7cd9f379b0c154650d6c108e9a3",
            "swh:1:rev:96db9023b881d7cd9f379b0c154650d6c108e9",
            "swh:1:rev:96db9023b881d7cd9f379b0c154650d6c108e9a3;origin=%G1",
        ] {
            let err = r.resolve(&RequestContext::unbounded(), bad).unwrap_err();
            assert_eq!(err.kind(), "malformed_input", "{bad}");
        }
        assert_eq!(archive.total_calls(), 0);
    }

    #[test]
    fn at_resolve_05_unsupported_type_is_malformed_input() {
        let mut inner = InMemoryArchive::new();
        inner.mark_unsupported(ObjectType::Snapshot);
        let r = resolver(
            Arc::new(CountingArchive::new(inner)),
            SharedMappingStore::default(),
            NoBrowse,
        );
        let err = r
            .resolve(
                &RequestContext::unbounded(),
                "swh:1:snp:c7c108084bc0bf3d81436bf980b46e98bd338453",
            )
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_input");
    }

    #[test]
    fn at_resolve_06_browse_url_is_built_and_origin_learned_for_content() {
        let cnt = ObjectId::from_bytes(&[9u8; 20]).unwrap();
        let mut inner = InMemoryArchive::new();
        inner.insert_object(ObjectType::Content, cnt);
        let store = SharedMappingStore::default();
        let r = resolver(
            Arc::new(CountingArchive::new(inner)),
            store.clone(),
            ArchiveBrowseUrls::new("https://archive.example.org"),
        );
        let text = format!("swh:1:cnt:{};origin=https://example.org/r.git", cnt.to_hex());

        let first = r.resolve(&RequestContext::unbounded(), &text).unwrap();
        assert_eq!(
            first.browse_url.as_deref(),
            Some(
                format!(
                    "https://archive.example.org/browse/content/sha1_git:{}/\
                     ?origin_url=https%3A%2F%2Fexample.org%2Fr.git",
                    cnt.to_hex()
                )
                .as_str()
            )
        );
        assert_eq!(store.row_count().unwrap(), 1);

        let unqualified = r
            .resolve(&RequestContext::unbounded(), &format!("swh:1:cnt:{}", cnt.to_hex()))
            .unwrap();
        assert_eq!(
            unqualified.attribution.origin_url(),
            Some("https://example.org/r.git")
        );
        assert_eq!(
            unqualified.attribution.source(),
            AttributionSource::FromMappingStore
        );
    }

    #[test]
    fn at_resolve_07_archive_outage_is_unavailable() {
        #[derive(Clone)]
        struct DownArchive;
        impl ArchiveObjectStore for DownArchive {
            fn lookup_object(
                &self,
                _ctx: &RequestContext,
                _object_type: ObjectType,
                _object_id: &ObjectId,
            ) -> Result<Option<ObjectMetadata>, ArchiveError> {
                Err(ArchiveError::Unavailable("down".to_string()))
            }
            fn lookup_origin(
                &self,
                _ctx: &RequestContext,
                _origin_url: &str,
            ) -> Result<Option<CanonicalOriginInfo>, ArchiveError> {
                Err(ArchiveError::Unavailable("down".to_string()))
            }
            fn lookup_missing_hashes(
                &self,
                _ctx: &RequestContext,
                _object_type: ObjectType,
                _object_ids: &[ObjectId],
            ) -> Result<BTreeSet<ObjectId>, ArchiveError> {
                Err(ArchiveError::Unavailable("down".to_string()))
            }
        }

        let store = SharedMappingStore::default();
        let r = SwhidResolver::new(
            AttributionConfig::mvp_v1(),
            DownArchive,
            NoMatchIndex,
            store.clone(),
            StoreSink(store),
            NoBrowse,
        );
        let err = r
            .resolve(&RequestContext::unbounded(), OPENSSL_QUALIFIED)
            .unwrap_err();
        assert_eq!(err.kind(), "archive_unavailable");
    }
}

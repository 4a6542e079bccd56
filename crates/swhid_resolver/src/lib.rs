#![forbid(unsafe_code)]

pub mod attribution;
pub mod browse;
pub mod context;
pub mod directory;
pub mod existence;
pub mod resolve;
pub mod wiring;

pub use attribution::{
    AttributionConfig, AttributionTrace, BrowseUrlProvider, MetadataIndex, NoResultReason,
    OriginAttributionEngine, OriginMappingSink, StageOutcome,
};
pub use context::RequestContext;
pub use existence::{ArchiveExistenceChecker, ArchiveObjectStore, KnownEntry, KnownReport};
pub use resolve::{ResolveError, ResolvedSwhid, SwhidResolver};

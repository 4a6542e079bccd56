#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use swhid_contracts::archive::{ArchiveError, CanonicalOriginInfo, ObjectMetadata};
use swhid_contracts::index::{CandidateOriginId, IndexError};
use swhid_contracts::swhid::{decode_percent_strict, ObjectId, ObjectType, SwhidQualifiers};
use swhid_engines::archive_http::{
    ArchiveHttpClient, ArchiveHttpConfig, ARCHIVE_TIMEOUT_MS_DEFAULT,
};
use swhid_engines::archive_memory::InMemoryArchive;
use swhid_engines::http_common::{HTTP_TIMEOUT_MS_MAX, HTTP_TIMEOUT_MS_MIN};
use swhid_engines::metadata_index::{
    MetadataIndexHttpClient, MetadataIndexHttpConfig, INDEX_TIMEOUT_MS_DEFAULT,
};
use swhid_resolver::browse::ArchiveBrowseUrls;
use swhid_resolver::existence::MAX_KNOWN_BATCH;
use swhid_resolver::{
    ArchiveObjectStore, AttributionConfig, KnownReport, MetadataIndex, RequestContext,
    ResolveError, SwhidResolver,
};
use swhid_storage::{ContentOriginMappingStore, SharedMappingStore};
use tracing::info;

pub mod mapping_writer;

pub use mapping_writer::{MappingWriter, MappingWriterHealth, MAPPING_WRITER_QUEUE_DEFAULT};

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:8080";
pub const REQUEST_BUDGET_MS_DEFAULT: u64 = 10_000;
pub const REQUEST_BUDGET_MS_MIN: u64 = 100;
pub const REQUEST_BUDGET_MS_MAX: u64 = 120_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub http_bind: String,
    pub public_base_url: String,
    pub archive_url: Option<String>,
    pub archive_fixture: Option<PathBuf>,
    pub index_url: Option<String>,
    pub mapping_store_path: Option<PathBuf>,
    pub archive_timeout_ms: u32,
    pub index_timeout_ms: u32,
    pub request_budget_ms: u64,
    pub background_mapping_writes: bool,
}

impl AdapterConfig {
    pub fn mvp_v1() -> Self {
        Self {
            http_bind: DEFAULT_HTTP_BIND.to_string(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            archive_url: None,
            archive_fixture: None,
            index_url: None,
            mapping_store_path: None,
            archive_timeout_ms: ARCHIVE_TIMEOUT_MS_DEFAULT,
            index_timeout_ms: INDEX_TIMEOUT_MS_DEFAULT,
            request_budget_ms: REQUEST_BUDGET_MS_DEFAULT,
            background_mapping_writes: true,
        }
    }

    pub fn from_env() -> Self {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    /// Unset or blank values keep their defaults; numeric values outside
    /// their range fall back to the default as well.
    pub fn from_env_var_map<F>(mut env_getter: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut config = Self::mvp_v1();
        let mut text = |key: &str| {
            env_getter(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(v) = text("SWHID_HTTP_BIND") {
            config.http_bind = v;
        }
        if let Some(v) = text("SWHID_PUBLIC_BASE_URL") {
            config.public_base_url = v;
        }
        config.archive_url = text("SWHID_ARCHIVE_URL");
        config.archive_fixture = text("SWHID_ARCHIVE_FIXTURE").map(PathBuf::from);
        config.index_url = text("SWHID_INDEX_URL");
        config.mapping_store_path = text("SWHID_MAPPING_STORE_PATH").map(PathBuf::from);
        config.archive_timeout_ms = text("SWHID_ARCHIVE_TIMEOUT_MS")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| (HTTP_TIMEOUT_MS_MIN..=HTTP_TIMEOUT_MS_MAX).contains(v))
            .unwrap_or(ARCHIVE_TIMEOUT_MS_DEFAULT);
        config.index_timeout_ms = text("SWHID_INDEX_TIMEOUT_MS")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| (HTTP_TIMEOUT_MS_MIN..=HTTP_TIMEOUT_MS_MAX).contains(v))
            .unwrap_or(INDEX_TIMEOUT_MS_DEFAULT);
        config.request_budget_ms = text("SWHID_REQUEST_BUDGET_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (REQUEST_BUDGET_MS_MIN..=REQUEST_BUDGET_MS_MAX).contains(v))
            .unwrap_or(REQUEST_BUDGET_MS_DEFAULT);
        if let Some(v) = text("SWHID_MAPPING_WRITER_BACKGROUND") {
            config.background_mapping_writes = !matches!(
                v.to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
        config
    }
}

#[derive(Debug, Clone)]
pub enum ArchiveBackend {
    Http(ArchiveHttpClient),
    Memory(InMemoryArchive),
}

impl ArchiveBackend {
    pub fn from_config(config: &AdapterConfig) -> Result<Self, String> {
        if let Some(url) = config.archive_url.as_deref() {
            let http = ArchiveHttpConfig {
                timeout_ms: config.archive_timeout_ms,
                ..ArchiveHttpConfig::mvp_v1(url)
            };
            let client = ArchiveHttpClient::new(http)
                .map_err(|err| format!("invalid archive configuration: {err}"))?;
            return Ok(ArchiveBackend::Http(client));
        }
        match config.archive_fixture.as_deref() {
            Some(path) => InMemoryArchive::load_fixture(path)
                .map(ArchiveBackend::Memory)
                .map_err(|err| {
                    format!("failed to load archive fixture '{}': {err}", path.display())
                }),
            None => Ok(ArchiveBackend::Memory(InMemoryArchive::new())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ArchiveBackend::Http(_) => "http",
            ArchiveBackend::Memory(_) => "memory",
        }
    }
}

impl ArchiveObjectStore for ArchiveBackend {
    fn lookup_object(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_id: &ObjectId,
    ) -> Result<Option<ObjectMetadata>, ArchiveError> {
        match self {
            ArchiveBackend::Http(client) => {
                ArchiveObjectStore::lookup_object(client, ctx, object_type, object_id)
            }
            ArchiveBackend::Memory(archive) => {
                ArchiveObjectStore::lookup_object(archive, ctx, object_type, object_id)
            }
        }
    }

    fn lookup_origin(
        &self,
        ctx: &RequestContext,
        origin_url: &str,
    ) -> Result<Option<CanonicalOriginInfo>, ArchiveError> {
        match self {
            ArchiveBackend::Http(client) => {
                ArchiveObjectStore::lookup_origin(client, ctx, origin_url)
            }
            ArchiveBackend::Memory(archive) => {
                ArchiveObjectStore::lookup_origin(archive, ctx, origin_url)
            }
        }
    }

    fn lookup_missing_hashes(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_ids: &[ObjectId],
    ) -> Result<BTreeSet<ObjectId>, ArchiveError> {
        match self {
            ArchiveBackend::Http(client) => {
                ArchiveObjectStore::lookup_missing_hashes(client, ctx, object_type, object_ids)
            }
            ArchiveBackend::Memory(archive) => {
                ArchiveObjectStore::lookup_missing_hashes(archive, ctx, object_type, object_ids)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum IndexBackend {
    Http(MetadataIndexHttpClient),
    Disabled,
}

impl IndexBackend {
    pub fn from_config(config: &AdapterConfig) -> Result<Self, String> {
        let Some(url) = config.index_url.as_deref() else {
            return Ok(IndexBackend::Disabled);
        };
        let http = MetadataIndexHttpConfig {
            timeout_ms: config.index_timeout_ms,
            ..MetadataIndexHttpConfig::mvp_v1(url)
        };
        MetadataIndexHttpClient::new(http)
            .map(IndexBackend::Http)
            .map_err(|err| format!("invalid metadata index configuration: {err}"))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IndexBackend::Http(_) => "http",
            IndexBackend::Disabled => "disabled",
        }
    }
}

impl MetadataIndex for IndexBackend {
    fn search_by_type_and_hash(
        &self,
        ctx: &RequestContext,
        object_type: ObjectType,
        object_id: &ObjectId,
        limit: u8,
    ) -> Result<Vec<CandidateOriginId>, IndexError> {
        match self {
            IndexBackend::Http(client) => {
                MetadataIndex::search_by_type_and_hash(client, ctx, object_type, object_id, limit)
            }
            IndexBackend::Disabled => Ok(Vec::new()),
        }
    }
}

pub type AdapterResolver =
    SwhidResolver<Arc<ArchiveBackend>, IndexBackend, Arc<MappingWriter>, ArchiveBrowseUrls>;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAdapterResponse {
    pub namespace: String,
    pub scheme_version: u32,
    pub object_type: String,
    pub object_id: String,
    pub metadata: SwhidQualifiers,
    pub browse_url: Option<String>,
    pub origin_url: String,
    pub origin_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterErrorResponse {
    pub error: String,
    pub reason: String,
}

/// A failed request: HTTP status plus the JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status} {}: {}", .response.error, .response.reason)]
pub struct AdapterError {
    pub status: u16,
    pub response: AdapterErrorResponse,
}

impl AdapterError {
    pub fn internal(reason: impl Into<String>) -> Self {
        Self {
            status: 500,
            response: AdapterErrorResponse {
                error: "internal".to_string(),
                reason: reason.into(),
            },
        }
    }
}

impl From<ResolveError> for AdapterError {
    fn from(err: ResolveError) -> Self {
        let status = match &err {
            ResolveError::MalformedInput { .. } => 400,
            ResolveError::NotFound { .. } => 404,
            ResolveError::PayloadTooLarge { .. } => 413,
            ResolveError::ArchiveUnavailable(_) => 503,
        };
        Self {
            status,
            response: AdapterErrorResponse {
                error: err.kind().to_string(),
                reason: err.to_string(),
            },
        }
    }
}

/// Body of `POST /known`: a JSON array of identifier strings. The size cap
/// is checked before element types, so an oversized body is always 413.
pub fn parse_known_request(body: &[u8]) -> Result<Vec<String>, AdapterError> {
    let malformed = |reason: String| AdapterError::from(ResolveError::MalformedInput { reason });
    let values = serde_json::from_slice::<Vec<serde_json::Value>>(body).map_err(|err| {
        malformed(format!("request body must be a JSON array of strings: {err}"))
    })?;
    if values.len() > MAX_KNOWN_BATCH {
        return Err(AdapterError::from(ResolveError::PayloadTooLarge {
            max: MAX_KNOWN_BATCH,
            got: values.len(),
        }));
    }
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| match value {
            serde_json::Value::String(text) => Ok(text),
            other => Err(malformed(format!(
                "request body element {i} must be a string, got {other}"
            ))),
        })
        .collect()
}

pub const RESOLVE_PATH_PREFIX: &str = "/api/1/resolve/";

/// Identifier text from a raw `/api/1/resolve/` request path, one trailing
/// slash dropped. Qualifier values keep their percent-encoding as sent. A
/// segment without a literal `:` was encoded whole and is decoded once.
pub fn identifier_from_resolve_path(path: &str) -> Option<String> {
    let raw = path.strip_prefix(RESOLVE_PATH_PREFIX)?;
    let raw = raw.strip_suffix('/').unwrap_or(raw);
    if raw.contains(':') {
        return Some(raw.to_string());
    }
    Some(decode_percent_strict(raw).unwrap_or_else(|| raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct AdapterMappingHealth {
    pub rows: u64,
    pub journal: bool,
    pub writer: MappingWriterHealth,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub archive_backend: String,
    pub index_backend: String,
    pub mapping: AdapterMappingHealth,
}

impl AdapterHealthResponse {
    pub fn unhealthy(reason: String) -> Self {
        Self {
            status: "error".to_string(),
            outcome: "UNHEALTHY".to_string(),
            reason: Some(reason),
            archive_backend: String::new(),
            index_backend: String::new(),
            mapping: AdapterMappingHealth::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterRuntime {
    resolver: Arc<AdapterResolver>,
    writer: Arc<MappingWriter>,
    archive_kind: &'static str,
    index_kind: &'static str,
    journal: bool,
    request_budget: Duration,
}

impl AdapterRuntime {
    pub fn new(
        config: &AdapterConfig,
        archive: ArchiveBackend,
        index: IndexBackend,
        writer: MappingWriter,
        journal: bool,
    ) -> Self {
        let archive_kind = archive.kind();
        let index_kind = index.kind();
        let attribution = AttributionConfig {
            index_enabled: !matches!(index, IndexBackend::Disabled),
            ..AttributionConfig::mvp_v1()
        };
        let mapping = writer.store().clone();
        let writer = Arc::new(writer);
        let resolver = SwhidResolver::new(
            attribution,
            Arc::new(archive),
            index,
            mapping,
            writer.clone(),
            ArchiveBrowseUrls::new(config.public_base_url.clone()),
        );
        Self {
            resolver: Arc::new(resolver),
            writer,
            archive_kind,
            index_kind,
            journal,
            request_budget: Duration::from_millis(config.request_budget_ms),
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self, String> {
        let archive = ArchiveBackend::from_config(config)?;
        let index = IndexBackend::from_config(config)?;
        let store = match config.mapping_store_path.as_ref() {
            Some(path) => ContentOriginMappingStore::open_with_journal(path.clone())
                .map_err(|err| format!("failed to open mapping store: {err}"))?,
            None => ContentOriginMappingStore::new_in_memory(),
        };
        let journal = store.journal_path().is_some();
        let store = SharedMappingStore::new(store);
        let writer = if config.background_mapping_writes {
            MappingWriter::spawn(store, MAPPING_WRITER_QUEUE_DEFAULT)?
        } else {
            MappingWriter::inline(store)
        };
        info!(
            archive = archive.kind(),
            index = index.kind(),
            journal,
            public_base = %config.public_base_url,
            "adapter runtime ready"
        );
        Ok(Self::new(config, archive, index, writer, journal))
    }

    pub fn default_from_env() -> Result<Self, String> {
        Self::from_config(&AdapterConfig::from_env())
    }

    pub fn resolver(&self) -> &AdapterResolver {
        &self.resolver
    }

    pub fn mapping_store(&self) -> &SharedMappingStore {
        self.writer.store()
    }

    /// Fresh per-request context carrying the configured deadline.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_budget(self.request_budget)
    }

    pub fn known(
        &self,
        ctx: &RequestContext,
        texts: &[String],
    ) -> Result<KnownReport, AdapterError> {
        Ok(self.resolver.known(ctx, texts)?)
    }

    pub fn resolve(
        &self,
        ctx: &RequestContext,
        text: &str,
    ) -> Result<ResolveAdapterResponse, AdapterError> {
        let resolved = self.resolver.resolve(ctx, text)?;
        let identifier = resolved.identifier;
        Ok(ResolveAdapterResponse {
            namespace: identifier.namespace().to_string(),
            scheme_version: identifier.scheme_version(),
            object_type: identifier.object_type().name().to_string(),
            object_id: identifier.object_id().to_hex(),
            metadata: identifier.qualifiers().clone(),
            browse_url: resolved.browse_url,
            origin_url: resolved.attribution.origin_url_or_empty().to_string(),
            origin_source: resolved.attribution.source().as_str().to_string(),
        })
    }

    pub fn health_report(&self) -> Result<AdapterHealthResponse, String> {
        let rows = self
            .mapping_store()
            .row_count()
            .map_err(|err| format!("mapping store unavailable: {err}"))?;
        Ok(AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            reason: None,
            archive_backend: self.archive_kind.to_string(),
            index_backend: self.index_kind.to_string(),
            mapping: AdapterMappingHealth {
                rows: rows as u64,
                journal: self.journal,
                writer: self.writer.health(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use swhid_contracts::swhid::parse_core_swhid;

    const REV: &str = "swh:1:rev:96db9023b881d7cd9f379b0c154650d6c108e9a3";
    const CNT: &str = "swh:1:cnt:94a9ed024d3859793618152ea559a168bbcbb5e2";
    const MISSING: &str = "swh:1:dir:0000000000000000000000000000000000000001";

    fn archive() -> InMemoryArchive {
        let mut archive = InMemoryArchive::new();
        archive.insert_swhid(parse_core_swhid(REV).unwrap());
        archive.insert_swhid(parse_core_swhid(CNT).unwrap());
        archive
            .insert_origin("https://github.com/openssl/openssl/")
            .unwrap();
        archive
    }

    fn runtime() -> AdapterRuntime {
        let config = AdapterConfig {
            public_base_url: "https://archive.example.org/".to_string(),
            ..AdapterConfig::mvp_v1()
        };
        AdapterRuntime::new(
            &config,
            ArchiveBackend::Memory(archive()),
            IndexBackend::Disabled,
            MappingWriter::inline(SharedMappingStore::default()),
            false,
        )
    }

    #[test]
    fn at_adapter_01_env_overrides_and_bounds() {
        let vars = BTreeMap::from([
            ("SWHID_HTTP_BIND", "0.0.0.0:9000"),
            ("SWHID_ARCHIVE_URL", " https://archive.example.org/api/1 "),
            ("SWHID_INDEX_URL", "   "),
            ("SWHID_ARCHIVE_TIMEOUT_MS", "250"),
            ("SWHID_INDEX_TIMEOUT_MS", "99"),
            ("SWHID_REQUEST_BUDGET_MS", "not-a-number"),
            ("SWHID_MAPPING_WRITER_BACKGROUND", "off"),
        ]);
        let config = AdapterConfig::from_env_var_map(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.http_bind, "0.0.0.0:9000");
        assert_eq!(
            config.archive_url.as_deref(),
            Some("https://archive.example.org/api/1")
        );
        assert_eq!(config.index_url, None);
        assert_eq!(config.archive_timeout_ms, 250);
        assert_eq!(config.index_timeout_ms, INDEX_TIMEOUT_MS_DEFAULT);
        assert_eq!(config.request_budget_ms, REQUEST_BUDGET_MS_DEFAULT);
        assert!(!config.background_mapping_writes);
        assert_eq!(config.public_base_url, DEFAULT_PUBLIC_BASE_URL);
    }

    #[test]
    fn at_adapter_02_resolve_qualified_revision() {
        let rt = runtime();
        let ctx = rt.request_context();
        let response = rt
            .resolve(
                &ctx,
                &format!("{REV};origin=https%3A%2F%2Fgithub.com%2Fopenssl%2Fopenssl%2F"),
            )
            .unwrap();
        assert_eq!(response.object_type, "revision");
        assert_eq!(response.origin_url, "https://github.com/openssl/openssl/");
        assert_eq!(response.origin_source, "from_qualifier");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["schemeVersion"], 1);
        assert_eq!(json["objectId"], "96db9023b881d7cd9f379b0c154650d6c108e9a3");
        assert_eq!(
            json["metadata"]["origin"],
            "https%3A%2F%2Fgithub.com%2Fopenssl%2Fopenssl%2F"
        );
        assert!(json["browseUrl"]
            .as_str()
            .unwrap()
            .starts_with("https://archive.example.org/browse/revision/"));
    }

    #[test]
    fn at_adapter_03_unresolved_origin_is_empty_string() {
        let rt = runtime();
        let response = rt.resolve(&rt.request_context(), REV).unwrap();
        assert_eq!(response.origin_url, "");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["originUrl"], "");
        assert_eq!(json["originSource"], "unresolved");
    }

    #[test]
    fn at_adapter_04_error_statuses() {
        let rt = runtime();
        let ctx = rt.request_context();
        assert_eq!(rt.resolve(&ctx, "swh:1:rev:xyz").unwrap_err().status, 400);
        let missing = rt.resolve(&ctx, MISSING).unwrap_err();
        assert_eq!(missing.status, 404);
        assert_eq!(missing.response.error, "not_found");

        let too_many = vec![REV.to_string(); 1001];
        let err = rt.known(&ctx, &too_many).unwrap_err();
        assert_eq!(err.status, 413);
        assert_eq!(err.response.error, "payload_too_large");

        let down = AdapterError::from(ResolveError::ArchiveUnavailable("timeout".to_string()));
        assert_eq!(down.status, 503);
    }

    #[test]
    fn at_adapter_05_known_reports_each_identifier() {
        let rt = runtime();
        let texts = vec![REV.to_string(), MISSING.to_string(), CNT.to_string()];
        let report = rt.known(&rt.request_context(), &texts).unwrap();
        assert_eq!(report.known_count(), 2);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json[REV]["known"], true);
        assert_eq!(json[MISSING]["known"], false);
    }

    #[test]
    fn at_adapter_06_known_body_must_be_string_array() {
        assert_eq!(
            parse_known_request(br#"["a","b"]"#).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        let err = parse_known_request(br#"{"swhids":[]}"#).unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.response.error, "malformed_input");
        assert_eq!(parse_known_request(b"[1,2]").unwrap_err().status, 400);
    }

    #[test]
    fn at_adapter_09_oversized_known_body_is_413_whatever_its_elements() {
        let mut elements = vec![format!("\"{REV}\""); 1000];
        elements.push("7".to_string());
        let body = format!("[{}]", elements.join(","));
        let err = parse_known_request(body.as_bytes()).unwrap_err();
        assert_eq!(err.status, 413);
        assert_eq!(err.response.error, "payload_too_large");

        elements.truncate(999);
        elements.push("7".to_string());
        let body = format!("[{}]", elements.join(","));
        assert_eq!(parse_known_request(body.as_bytes()).unwrap_err().status, 400);

        elements.pop();
        elements.push(format!("\"{CNT}\""));
        let body = format!("[{}]", elements.join(","));
        assert_eq!(parse_known_request(body.as_bytes()).unwrap().len(), 1000);
    }

    #[test]
    fn at_adapter_10_resolve_path_accepts_raw_and_fully_encoded_identifiers() {
        let rt = runtime();
        let ctx = rt.request_context();
        let raw = format!(
            "{RESOLVE_PATH_PREFIX}{REV};origin=https%3A%2F%2Fgithub.com%2Fopenssl%2Fopenssl%2F/"
        );
        let encoded = format!(
            "{RESOLVE_PATH_PREFIX}swh%3A1%3Arev%3A96db9023b881d7cd9f379b0c154650d6c108e9a3\
             %3Borigin%3Dhttps%253A%252F%252Fgithub.com%252Fopenssl%252Fopenssl%252F"
        );
        for path in [&raw, &encoded] {
            let text = identifier_from_resolve_path(path).unwrap();
            assert_eq!(
                text,
                format!("{REV};origin=https%3A%2F%2Fgithub.com%2Fopenssl%2Fopenssl%2F")
            );
            let response = rt.resolve(&ctx, &text).unwrap();
            assert_eq!(response.origin_url, "https://github.com/openssl/openssl/");
            assert_eq!(response.origin_source, "from_qualifier");
        }

        let bare = format!(
            "{RESOLVE_PATH_PREFIX}swh%3A1%3Acnt%3A94a9ed024d3859793618152ea559a168bbcbb5e2"
        );
        assert_eq!(identifier_from_resolve_path(&bare).unwrap(), CNT);
        assert_eq!(identifier_from_resolve_path("/api/1/known/"), None);
    }

    #[test]
    fn at_adapter_07_learned_content_origin_reaches_store_and_health() {
        let rt = runtime();
        let text = format!("{CNT};origin=https://github.com/openssl/openssl/");
        rt.resolve(&rt.request_context(), &text).unwrap();
        let health = rt.health_report().unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.archive_backend, "memory");
        assert_eq!(health.index_backend, "disabled");
        assert_eq!(health.mapping.rows, 1);
        assert_eq!(health.mapping.writer.inserted, 1);

        let plain = rt.resolve(&rt.request_context(), CNT).unwrap();
        assert_eq!(plain.origin_url, "https://github.com/openssl/openssl/");
        assert_eq!(plain.origin_source, "from_mapping_store");
    }

    #[test]
    fn at_adapter_08_fixture_backend_from_config() {
        let suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(1);
        let path = env::temp_dir().join(format!("swhid-adapter-fixture-{suffix}.json"));
        std::fs::write(
            &path,
            r#"{"objects":{"revision":["96db9023b881d7cd9f379b0c154650d6c108e9a3"]}}"#,
        )
        .unwrap();
        let config = AdapterConfig {
            archive_fixture: Some(path.clone()),
            background_mapping_writes: false,
            ..AdapterConfig::mvp_v1()
        };
        let rt = AdapterRuntime::from_config(&config).unwrap();
        assert!(rt.resolve(&rt.request_context(), REV).is_ok());
        let _ = std::fs::remove_file(path);

        let broken = AdapterConfig {
            archive_url: Some("ftp://archive.example.org".to_string()),
            ..AdapterConfig::mvp_v1()
        };
        assert!(AdapterRuntime::from_config(&broken).is_err());
    }
}

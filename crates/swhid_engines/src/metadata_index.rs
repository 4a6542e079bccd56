#![forbid(unsafe_code)]

use std::time::Duration;

use serde::Deserialize;
use swhid_contracts::index::{clamp_index_limit, index_query_text, CandidateOriginId, IndexError};
use swhid_contracts::swhid::{ObjectId, ObjectType};
use swhid_contracts::{ContractViolation, Validate};
use tracing::debug;
use url::Url;

use crate::http_common::{
    build_http_agent, classify_transport_error, parse_base_url, validate_timeout_ms,
    DEFAULT_USER_AGENT,
};

pub const INDEX_TIMEOUT_MS_DEFAULT: u32 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataIndexHttpConfig {
    pub base_url: String,
    pub timeout_ms: u32,
    pub user_agent: String,
}

impl MetadataIndexHttpConfig {
    pub fn mvp_v1(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: INDEX_TIMEOUT_MS_DEFAULT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Validate for MetadataIndexHttpConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        parse_base_url("metadata_index_http_config.base_url", &self.base_url)?;
        validate_timeout_ms("metadata_index_http_config.timeout_ms", self.timeout_ms)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(alias = "url")]
    origin: String,
}

/// Full-text search client: `GET search/?q=<terms>&limit=<n>` answering
/// `{"results":[{"origin":"<id>"}]}` in rank order.
#[derive(Debug, Clone)]
pub struct MetadataIndexHttpClient {
    base: Url,
    timeout: Duration,
    agent: ureq::Agent,
}

impl MetadataIndexHttpClient {
    pub fn new(config: MetadataIndexHttpConfig) -> Result<Self, ContractViolation> {
        config.validate()?;
        Ok(Self {
            base: parse_base_url("metadata_index_http_config.base_url", &config.base_url)?,
            timeout: Duration::from_millis(u64::from(config.timeout_ms)),
            agent: build_http_agent(config.timeout_ms, &config.user_agent),
        })
    }

    pub fn configured_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn search_by_type_and_hash(
        &self,
        object_type: ObjectType,
        object_id: &ObjectId,
        limit: u8,
        timeout: Duration,
    ) -> Result<Vec<CandidateOriginId>, IndexError> {
        if timeout.is_zero() {
            return Err(IndexError::DeadlineExceeded);
        }
        let limit = clamp_index_limit(limit);
        let url = self
            .base
            .join("search/")
            .map_err(|err| IndexError::Unavailable(format!("endpoint: {err}")))?;
        let response = self
            .agent
            .get(url.as_str())
            .timeout(timeout.min(self.timeout))
            .set("Accept", "application/json")
            .query("q", &index_query_text(object_type, object_id))
            .query("limit", &limit.to_string())
            .call()
            .map_err(index_error_from_ureq)?;
        let body: SearchResponse = serde_json::from_reader(response.into_reader())
            .map_err(|err| IndexError::InvalidResponse(format!("search payload: {err}")))?;
        let candidates = body
            .results
            .into_iter()
            .take(usize::from(limit))
            .map(|hit| CandidateOriginId::new(hit.origin))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| IndexError::InvalidResponse(format!("search hit: {err}")))?;
        debug!(
            object_type = object_type.name(),
            limit,
            hits = candidates.len(),
            "metadata index search"
        );
        Ok(candidates)
    }
}

fn index_error_from_ureq(err: ureq::Error) -> IndexError {
    match err {
        ureq::Error::Status(status, _) => IndexError::Unavailable(format!("http status {status}")),
        ureq::Error::Transport(transport) => {
            IndexError::Unavailable(classify_transport_error(&transport).to_string())
        }
    }
}

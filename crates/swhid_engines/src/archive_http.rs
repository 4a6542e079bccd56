#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use swhid_contracts::archive::{ArchiveError, CanonicalOriginInfo, ObjectMetadata};
use swhid_contracts::swhid::{ObjectId, ObjectType};
use swhid_contracts::{ContractViolation, Validate};
use tracing::debug;
use url::Url;

use crate::http_common::{
    build_http_agent, classify_transport_error, parse_base_url, validate_timeout_ms,
    DEFAULT_USER_AGENT,
};

pub const ARCHIVE_TIMEOUT_MS_DEFAULT: u32 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHttpConfig {
    pub base_url: String,
    pub timeout_ms: u32,
    pub user_agent: String,
}

impl ArchiveHttpConfig {
    pub fn mvp_v1(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: ARCHIVE_TIMEOUT_MS_DEFAULT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Validate for ArchiveHttpConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        parse_base_url("archive_http_config.base_url", &self.base_url)?;
        validate_timeout_ms("archive_http_config.timeout_ms", self.timeout_ms)?;
        if self.user_agent.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "archive_http_config.user_agent",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct OriginPayload {
    url: String,
}

/// Blocking client for the archive's read API.
///
/// Endpoints, relative to the configured base:
/// - `GET content/sha1_git:<hex>/`, `GET <type>/<hex>/` for other types
/// - `GET origin/get/?url=<url>`
/// - `POST <type>/missing/` with a JSON array of hex hashes
#[derive(Debug, Clone)]
pub struct ArchiveHttpClient {
    base: Url,
    timeout: Duration,
    agent: ureq::Agent,
}

impl ArchiveHttpClient {
    pub fn new(config: ArchiveHttpConfig) -> Result<Self, ContractViolation> {
        config.validate()?;
        let base = parse_base_url("archive_http_config.base_url", &config.base_url)?;
        Ok(Self {
            base,
            timeout: Duration::from_millis(u64::from(config.timeout_ms)),
            agent: build_http_agent(config.timeout_ms, &config.user_agent),
        })
    }

    /// Per-call ceiling; callers pass a shorter timeout when their own
    /// deadline is closer.
    pub fn configured_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn lookup_object(
        &self,
        object_type: ObjectType,
        object_id: &ObjectId,
        timeout: Duration,
    ) -> Result<Option<ObjectMetadata>, ArchiveError> {
        let url = self.endpoint(&object_path(object_type, object_id))?;
        let timeout = self.effective_timeout(timeout)?;
        match self.agent.get(url.as_str()).timeout(timeout).call() {
            Ok(_) => Ok(Some(ObjectMetadata::new(object_type, *object_id))),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(ureq::Error::Status(400, _)) => {
                Err(ArchiveError::UnsupportedObjectType(object_type))
            }
            Err(err) => Err(archive_error_from_ureq("lookup_object", err)),
        }
    }

    pub fn lookup_origin(
        &self,
        origin_url: &str,
        timeout: Duration,
    ) -> Result<Option<CanonicalOriginInfo>, ArchiveError> {
        let url = self.endpoint("origin/get/")?;
        let timeout = self.effective_timeout(timeout)?;
        let response = match self
            .agent
            .get(url.as_str())
            .timeout(timeout)
            .set("Accept", "application/json")
            .query("url", origin_url)
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(err) => return Err(archive_error_from_ureq("lookup_origin", err)),
        };
        let payload: OriginPayload = serde_json::from_reader(response.into_reader())
            .map_err(|err| ArchiveError::InvalidResponse(format!("origin payload: {err}")))?;
        CanonicalOriginInfo::v1(payload.url)
            .map(Some)
            .map_err(|err| ArchiveError::InvalidResponse(format!("origin payload: {err}")))
    }

    /// Hashes among `object_ids` that the archive does not hold.
    pub fn lookup_missing_hashes(
        &self,
        object_type: ObjectType,
        object_ids: &[ObjectId],
        timeout: Duration,
    ) -> Result<BTreeSet<ObjectId>, ArchiveError> {
        if object_ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let url = self.endpoint(&format!("{}/missing/", object_type.name()))?;
        let timeout = self.effective_timeout(timeout)?;
        let body = object_ids.iter().map(ObjectId::to_hex).collect::<Vec<_>>();
        let response = match self
            .agent
            .post(url.as_str())
            .timeout(timeout)
            .set("Accept", "application/json")
            .send_json(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(400, _)) => {
                return Err(ArchiveError::UnsupportedObjectType(object_type))
            }
            Err(err) => return Err(archive_error_from_ureq("lookup_missing_hashes", err)),
        };
        let missing: Vec<ObjectId> = serde_json::from_reader(response.into_reader())
            .map_err(|err| ArchiveError::InvalidResponse(format!("missing payload: {err}")))?;
        let requested = object_ids.iter().collect::<BTreeSet<_>>();
        if let Some(stray) = missing.iter().find(|id| !requested.contains(id)) {
            return Err(ArchiveError::InvalidResponse(format!(
                "missing payload names unrequested hash {stray}"
            )));
        }
        debug!(
            object_type = object_type.name(),
            requested = object_ids.len(),
            missing = missing.len(),
            "archive missing-hash lookup"
        );
        Ok(missing.into_iter().collect())
    }

    fn endpoint(&self, relative: &str) -> Result<Url, ArchiveError> {
        self.base
            .join(relative)
            .map_err(|err| ArchiveError::Unavailable(format!("endpoint {relative}: {err}")))
    }

    fn effective_timeout(&self, timeout: Duration) -> Result<Duration, ArchiveError> {
        if timeout.is_zero() {
            return Err(ArchiveError::DeadlineExceeded);
        }
        Ok(timeout.min(self.timeout))
    }
}

/// Relative object path; content objects are addressed by their
/// `sha1_git` checksum.
pub fn object_path(object_type: ObjectType, object_id: &ObjectId) -> String {
    match object_type {
        ObjectType::Content => format!("content/sha1_git:{}/", object_id.to_hex()),
        other => format!("{}/{}/", other.name(), object_id.to_hex()),
    }
}

fn archive_error_from_ureq(call: &'static str, err: ureq::Error) -> ArchiveError {
    match err {
        ureq::Error::Status(status, _) => {
            ArchiveError::Unavailable(format!("{call}: http status {status}"))
        }
        ureq::Error::Transport(transport) => ArchiveError::Unavailable(format!(
            "{call}: {}",
            classify_transport_error(&transport)
        )),
    }
}

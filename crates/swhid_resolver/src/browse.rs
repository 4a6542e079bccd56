#![forbid(unsafe_code)]

use swhid_contracts::swhid::{ObjectType, TypedIdentifier};
use url::form_urlencoded;

use crate::attribution::BrowseUrlProvider;

/// Browse path for an identifier, relative to the web root.
///
/// Qualifiers become query parameters (`origin_url`, `path`, `snapshot`)
/// and `lines` becomes a `#L<n>[-L<m>]` fragment.
pub fn browse_path(identifier: &TypedIdentifier) -> String {
    let hex = identifier.object_id().to_hex();
    let mut out = match identifier.object_type() {
        ObjectType::Content => format!("/browse/content/sha1_git:{hex}/"),
        other => format!("/browse/{}/{hex}/", other.name()),
    };

    let qualifiers = identifier.qualifiers();
    let mut query = form_urlencoded::Serializer::new(String::new());
    let mut has_query = false;
    if let Some(origin) = qualifiers.origin() {
        query.append_pair("origin_url", origin.decoded());
        has_query = true;
    }
    if let Some(path) = qualifiers.path() {
        query.append_pair("path", path.decoded());
        has_query = true;
    }
    if let Some(visit) = qualifiers.visit() {
        query.append_pair("snapshot", &visit.object_id.to_hex());
        has_query = true;
    }
    if has_query {
        out.push('?');
        out.push_str(&query.finish());
    }

    if let Some(lines) = qualifiers.lines() {
        out.push_str(&format!("#L{}", lines.start));
        if let Some(end) = lines.end {
            out.push_str(&format!("-L{end}"));
        }
    }
    out
}

/// Absolute browse URLs under a public base such as
/// `https://archive.example.org`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBrowseUrls {
    public_base: String,
}

impl ArchiveBrowseUrls {
    pub fn new(public_base: impl Into<String>) -> Self {
        let public_base = public_base.into();
        Self {
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

impl BrowseUrlProvider for ArchiveBrowseUrls {
    fn browse_url(&self, identifier: &TypedIdentifier) -> Option<String> {
        Some(format!("{}{}", self.public_base, browse_path(identifier)))
    }
}

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{ContractViolation, SchemaVersion};

pub const SWHID_NAMESPACE: &str = "swh";
pub const SWHID_SCHEME_VERSION: SchemaVersion = SchemaVersion(1);
/// Width of a sha1_git object hash.
pub const OBJECT_ID_LEN: usize = 20;
pub const OBJECT_ID_HEX_LEN: usize = OBJECT_ID_LEN * 2;
pub const MAX_SWHID_TEXT_LEN: usize = 16 * 1024;

const ERROR_INPUT_PREVIEW_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Content,
    Directory,
    Revision,
    Release,
    Snapshot,
}

impl ObjectType {
    pub const ALL: [ObjectType; 5] = [
        ObjectType::Content,
        ObjectType::Directory,
        ObjectType::Revision,
        ObjectType::Release,
        ObjectType::Snapshot,
    ];

    /// Three-letter tag used inside identifier text.
    pub fn tag(self) -> &'static str {
        match self {
            ObjectType::Content => "cnt",
            ObjectType::Directory => "dir",
            ObjectType::Revision => "rev",
            ObjectType::Release => "rel",
            ObjectType::Snapshot => "snp",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Content => "content",
            ObjectType::Directory => "directory",
            ObjectType::Revision => "revision",
            ObjectType::Release => "release",
            ObjectType::Snapshot => "snapshot",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        ObjectType::ALL.into_iter().find(|t| t.tag() == tag)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContractViolation> {
        let raw: [u8; OBJECT_ID_LEN] =
            bytes
                .try_into()
                .map_err(|_| ContractViolation::InvalidLength {
                    field: "object_id",
                    expected: OBJECT_ID_LEN,
                    got: bytes.len(),
                })?;
        Ok(Self(raw))
    }

    /// Accepts lowercase hexadecimal only, matching the identifier grammar.
    pub fn from_hex(text: &str) -> Result<Self, ContractViolation> {
        if text.len() != OBJECT_ID_HEX_LEN {
            return Err(ContractViolation::InvalidLength {
                field: "object_id",
                expected: OBJECT_ID_HEX_LEN,
                got: text.len(),
            });
        }
        if !text.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(ContractViolation::InvalidValue {
                field: "object_id",
                reason: "must be lowercase hexadecimal",
            });
        }
        let mut raw = [0u8; OBJECT_ID_LEN];
        hex::decode_to_slice(text, &mut raw).map_err(|_| ContractViolation::InvalidValue {
            field: "object_id",
            reason: "must be lowercase hexadecimal",
        })?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ContractViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        ObjectId::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwhidParseErrorKind {
    Empty,
    TooLong,
    CoreSyntax,
    Namespace,
    SchemeVersion,
    ObjectType,
    ObjectId,
    QualifiersNotAllowed,
    QualifierSyntax,
    UnknownQualifier,
    DuplicateQualifier,
    PercentEncoding,
    Visit,
    Anchor,
    Lines,
}

impl SwhidParseErrorKind {
    pub fn describe(self) -> &'static str {
        match self {
            SwhidParseErrorKind::Empty => "identifier is empty",
            SwhidParseErrorKind::TooLong => "identifier exceeds the maximum length",
            SwhidParseErrorKind::CoreSyntax => {
                "expected four ':'-separated fields (namespace, version, type, hash)"
            }
            SwhidParseErrorKind::Namespace => "namespace must be 'swh'",
            SwhidParseErrorKind::SchemeVersion => "scheme version must be 1",
            SwhidParseErrorKind::ObjectType => {
                "object type must be one of cnt, dir, rev, rel, snp"
            }
            SwhidParseErrorKind::ObjectId => "object hash must be 40 lowercase hex digits",
            SwhidParseErrorKind::QualifiersNotAllowed => "qualifiers are not allowed here",
            SwhidParseErrorKind::QualifierSyntax => "qualifier must have the form key=value",
            SwhidParseErrorKind::UnknownQualifier => {
                "qualifier must be one of origin, visit, anchor, path, lines"
            }
            SwhidParseErrorKind::DuplicateQualifier => "qualifier is repeated",
            SwhidParseErrorKind::PercentEncoding => {
                "qualifier value is not valid percent-encoded UTF-8"
            }
            SwhidParseErrorKind::Visit => "visit qualifier must be a snapshot identifier",
            SwhidParseErrorKind::Anchor => {
                "anchor qualifier must be a directory, revision, release or snapshot identifier"
            }
            SwhidParseErrorKind::Lines => "lines qualifier must be N or N-M with 1 <= N <= M",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid SWHID {input:?}: {}", .kind.describe())]
pub struct SwhidParseError {
    pub kind: SwhidParseErrorKind,
    pub input: String,
}

impl SwhidParseError {
    fn new(kind: SwhidParseErrorKind, input: &str) -> Self {
        let input = match input.char_indices().nth(ERROR_INPUT_PREVIEW_CHARS) {
            Some((cut, _)) => format!("{}...", &input[..cut]),
            None => input.to_string(),
        };
        Self { kind, input }
    }
}

/// Decodes `%XX` escapes, rejecting truncated or non-hex escapes and
/// byte sequences that are not UTF-8.
pub fn decode_percent_strict(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !well_formed {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoreSwhid {
    pub object_type: ObjectType,
    pub object_id: ObjectId,
}

impl CoreSwhid {
    pub fn new(object_type: ObjectType, object_id: ObjectId) -> Self {
        Self {
            object_type,
            object_id,
        }
    }
}

impl fmt::Display for CoreSwhid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            SWHID_NAMESPACE,
            SWHID_SCHEME_VERSION.0,
            self.object_type.tag(),
            self.object_id
        )
    }
}

impl FromStr for CoreSwhid {
    type Err = SwhidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_core_swhid(s)
    }
}

/// Qualifier value kept both as written and percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedText {
    raw: String,
    decoded: String,
}

impl EncodedText {
    fn parse(raw: &str) -> Option<Self> {
        let decoded = decode_percent_strict(raw)?;
        Some(Self {
            raw: raw.to_string(),
            decoded,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn decoded(&self) -> &str {
        &self.decoded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRange {
    pub start: u32,
    pub end: Option<u32>,
}

impl LineRange {
    fn parse(text: &str) -> Option<Self> {
        let parse_line = |s: &str| -> Option<u32> {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse::<u32>().ok().filter(|n| *n >= 1)
        };
        match text.split_once('-') {
            None => Some(Self {
                start: parse_line(text)?,
                end: None,
            }),
            Some((start, end)) => {
                let start = parse_line(start)?;
                let end = parse_line(end)?;
                if end < start {
                    return None;
                }
                Some(Self {
                    start,
                    end: Some(end),
                })
            }
        }
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}", self.start),
        }
    }
}

/// Optional identifier qualifiers. Iteration and serialization always use
/// the canonical order: origin, visit, anchor, path, lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SwhidQualifiers {
    origin: Option<EncodedText>,
    visit: Option<CoreSwhid>,
    anchor: Option<CoreSwhid>,
    path: Option<EncodedText>,
    lines: Option<LineRange>,
}

impl SwhidQualifiers {
    pub fn is_empty(&self) -> bool {
        self.origin.is_none()
            && self.visit.is_none()
            && self.anchor.is_none()
            && self.path.is_none()
            && self.lines.is_none()
    }

    pub fn origin(&self) -> Option<&EncodedText> {
        self.origin.as_ref()
    }

    pub fn visit(&self) -> Option<&CoreSwhid> {
        self.visit.as_ref()
    }

    pub fn anchor(&self) -> Option<&CoreSwhid> {
        self.anchor.as_ref()
    }

    pub fn path(&self) -> Option<&EncodedText> {
        self.path.as_ref()
    }

    pub fn lines(&self) -> Option<&LineRange> {
        self.lines.as_ref()
    }

    /// Qualifier pairs as written in identifier text.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(origin) = &self.origin {
            out.push(("origin", origin.raw.clone()));
        }
        if let Some(visit) = &self.visit {
            out.push(("visit", visit.to_string()));
        }
        if let Some(anchor) = &self.anchor {
            out.push(("anchor", anchor.to_string()));
        }
        if let Some(path) = &self.path {
            out.push(("path", path.raw.clone()));
        }
        if let Some(lines) = &self.lines {
            out.push(("lines", lines.to_string()));
        }
        out
    }
}

impl Serialize for SwhidQualifiers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let pairs = self.pairs();
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (key, value) in &pairs {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A parsed identifier: core part plus qualifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedIdentifier {
    scheme_version: SchemaVersion,
    core: CoreSwhid,
    qualifiers: SwhidQualifiers,
}

impl TypedIdentifier {
    pub fn from_core(core: CoreSwhid) -> Self {
        Self {
            scheme_version: SWHID_SCHEME_VERSION,
            core,
            qualifiers: SwhidQualifiers::default(),
        }
    }

    pub fn namespace(&self) -> &'static str {
        SWHID_NAMESPACE
    }

    pub fn scheme_version(&self) -> u32 {
        self.scheme_version.0
    }

    pub fn core(&self) -> &CoreSwhid {
        &self.core
    }

    pub fn object_type(&self) -> ObjectType {
        self.core.object_type
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.core.object_id
    }

    pub fn qualifiers(&self) -> &SwhidQualifiers {
        &self.qualifiers
    }

    /// Percent-decoded `origin` qualifier, when present.
    pub fn origin_url(&self) -> Option<&str> {
        self.qualifiers.origin.as_ref().map(EncodedText::decoded)
    }
}

impl fmt::Display for TypedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.core)?;
        for (key, value) in self.qualifiers.pairs() {
            write!(f, ";{key}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for TypedIdentifier {
    type Err = SwhidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_swhid(s)
    }
}

fn check_input_bounds(text: &str) -> Result<(), SwhidParseErrorKind> {
    if text.is_empty() {
        return Err(SwhidParseErrorKind::Empty);
    }
    if text.len() > MAX_SWHID_TEXT_LEN {
        return Err(SwhidParseErrorKind::TooLong);
    }
    Ok(())
}

fn parse_core_text(text: &str) -> Result<CoreSwhid, SwhidParseErrorKind> {
    let mut parts = text.split(':');
    let (Some(namespace), Some(version), Some(tag), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(SwhidParseErrorKind::CoreSyntax);
    };
    if namespace != SWHID_NAMESPACE {
        return Err(SwhidParseErrorKind::Namespace);
    }
    if version != "1" {
        return Err(SwhidParseErrorKind::SchemeVersion);
    }
    let object_type = ObjectType::from_tag(tag).ok_or(SwhidParseErrorKind::ObjectType)?;
    let object_id = ObjectId::from_hex(hash).map_err(|_| SwhidParseErrorKind::ObjectId)?;
    Ok(CoreSwhid::new(object_type, object_id))
}

fn parse_qualifiers<'a>(
    segments: impl Iterator<Item = &'a str>,
) -> Result<SwhidQualifiers, SwhidParseErrorKind> {
    let mut q = SwhidQualifiers::default();
    for segment in segments {
        let (key, value) = segment
            .split_once('=')
            .ok_or(SwhidParseErrorKind::QualifierSyntax)?;
        if key.is_empty() || value.is_empty() {
            return Err(SwhidParseErrorKind::QualifierSyntax);
        }
        match key {
            "origin" => {
                if q.origin.is_some() {
                    return Err(SwhidParseErrorKind::DuplicateQualifier);
                }
                q.origin =
                    Some(EncodedText::parse(value).ok_or(SwhidParseErrorKind::PercentEncoding)?);
            }
            "visit" => {
                if q.visit.is_some() {
                    return Err(SwhidParseErrorKind::DuplicateQualifier);
                }
                let visit = parse_core_text(value).map_err(|_| SwhidParseErrorKind::Visit)?;
                if visit.object_type != ObjectType::Snapshot {
                    return Err(SwhidParseErrorKind::Visit);
                }
                q.visit = Some(visit);
            }
            "anchor" => {
                if q.anchor.is_some() {
                    return Err(SwhidParseErrorKind::DuplicateQualifier);
                }
                let anchor = parse_core_text(value).map_err(|_| SwhidParseErrorKind::Anchor)?;
                if anchor.object_type == ObjectType::Content {
                    return Err(SwhidParseErrorKind::Anchor);
                }
                q.anchor = Some(anchor);
            }
            "path" => {
                if q.path.is_some() {
                    return Err(SwhidParseErrorKind::DuplicateQualifier);
                }
                q.path =
                    Some(EncodedText::parse(value).ok_or(SwhidParseErrorKind::PercentEncoding)?);
            }
            "lines" => {
                if q.lines.is_some() {
                    return Err(SwhidParseErrorKind::DuplicateQualifier);
                }
                q.lines = Some(LineRange::parse(value).ok_or(SwhidParseErrorKind::Lines)?);
            }
            _ => return Err(SwhidParseErrorKind::UnknownQualifier),
        }
    }
    Ok(q)
}

/// Parses a full identifier, qualifiers included.
pub fn parse_swhid(text: &str) -> Result<TypedIdentifier, SwhidParseError> {
    let parse = || -> Result<TypedIdentifier, SwhidParseErrorKind> {
        check_input_bounds(text)?;
        let mut segments = text.split(';');
        let core_text = segments.next().unwrap_or_default();
        let core = parse_core_text(core_text)?;
        let qualifiers = parse_qualifiers(segments)?;
        Ok(TypedIdentifier {
            scheme_version: SWHID_SCHEME_VERSION,
            core,
            qualifiers,
        })
    };
    parse().map_err(|kind| SwhidParseError::new(kind, text))
}

/// Parses an identifier that must not carry qualifiers.
pub fn parse_core_swhid(text: &str) -> Result<CoreSwhid, SwhidParseError> {
    let parse = || -> Result<CoreSwhid, SwhidParseErrorKind> {
        check_input_bounds(text)?;
        if text.contains(';') {
            return Err(SwhidParseErrorKind::QualifiersNotAllowed);
        }
        parse_core_text(text)
    };
    parse().map_err(|kind| SwhidParseError::new(kind, text))
}

/// Parses every element or fails on the first invalid one.
pub fn parse_all<S: AsRef<str>>(texts: &[S]) -> Result<Vec<TypedIdentifier>, SwhidParseError> {
    texts.iter().map(|t| parse_swhid(t.as_ref())).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartialParse {
    pub parsed: Vec<(usize, TypedIdentifier)>,
    pub rejected: Vec<(usize, SwhidParseError)>,
}

/// Best-effort batch parse. Indexes refer to positions in `texts`.
pub fn parse_all_partial<S: AsRef<str>>(texts: &[S]) -> PartialParse {
    let mut out = PartialParse::default();
    for (idx, text) in texts.iter().enumerate() {
        match parse_swhid(text.as_ref()) {
            Ok(id) => out.parsed.push((idx, id)),
            Err(err) => out.rejected.push((idx, err)),
        }
    }
    out
}

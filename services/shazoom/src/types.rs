//!
//! src/types.rs  Oct 16th, 2026
//!
//! Domain types shared by the catalog, search and identification workflow,
//! plus the wire schemas of the identification service. Optional fields
//! are defaulted once here so the rest of the crate sees complete values
//!

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_TITLE: &str = "Unknown";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_YEAR: &str = "N/A";

// identify responses fill absent fields with these instead
pub const MISSING_FIELD: &str = "n.a.";
pub const MISSING_COVER: &str = "/placeholder.svg";

/// Release year or the "N/A" sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Year {
    Known(u32),
    Unknown
}

impl Serialize for Year {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Year::Known(y) => s.serialize_u32(*y),
            Year::Unknown => s.serialize_str(UNKNOWN_YEAR)
        }
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Year::Known(y) => write!(f, "{y}"),
            Year::Unknown => f.write_str(UNKNOWN_YEAR)
        }
    }
}

/// One identifiable track of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: Year,
    pub album_cover_url: String
}

/// A catalog entry together with its relevance for one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub score: u32
}

/// Opaque object-store key, either freshly uploaded or an example sample's
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadReference(pub String);

impl UploadReference {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for UploadReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The track reported by the identification service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedTrack {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: String,
    pub album_cover_url: String
}

/// Outcome of one identification call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentificationResult {
    pub matched_track: Option<MatchedTrack>,
    pub confidence_percent: u8
}

impl IdentificationResult {
    pub fn is_low_confidence(&self, threshold_percent: u8) -> bool {
        self.confidence_percent < threshold_percent
    }
}

/// round(raw * 100) kept inside 0..=100
pub fn confidence_percent(raw: f64) -> u8 {
    if !raw.is_finite() {
        return 0;
    }
    (raw * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Raw object returned by POST /find-song
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentifyResponse {
    #[serde(default)]
    pub track_metadata: Option<TrackMetadata>,
    #[serde(default)]
    pub confidence: Option<f64>
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    // numbers and strings both occur
    #[serde(default)]
    pub year: Option<serde_json::Value>,
    #[serde(default)]
    pub album_cover: Option<String>
}

fn or_missing(value: Option<String>, missing: &str) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or_else(|| missing.to_string())
}

impl From<TrackMetadata> for MatchedTrack {
    fn from(m: TrackMetadata) -> Self {
        let year = match m.year {
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            _ => MISSING_FIELD.to_string()
        };
        MatchedTrack {
            title: or_missing(m.title, MISSING_FIELD),
            artist: or_missing(m.artist, MISSING_FIELD),
            album: or_missing(m.album, MISSING_FIELD),
            year,
            album_cover_url: or_missing(m.album_cover, MISSING_COVER)
        }
    }
}

impl From<IdentifyResponse> for IdentificationResult {
    fn from(r: IdentifyResponse) -> Self {
        IdentificationResult {
            matched_track: r.track_metadata.map(MatchedTrack::from),
            confidence_percent: r.confidence.map(confidence_percent).unwrap_or(0)
        }
    }
}

/// Raw object returned by GET /upload-url
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub file_key: String,
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub upload_data: Option<PresignedPost>
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PresignedPost {
    pub url: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>
}

/// Where and how the object store accepts the upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    /// raw body PUT with the file's content type
    Put { url: String },
    /// multipart form with the issuer's fields, file last
    Post { url: String, fields: BTreeMap<String, String> }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDestination {
    pub reference: UploadReference,
    pub target: UploadTarget
}

impl TryFrom<UploadUrlResponse> for UploadDestination {
    type Error = crate::errors::ShazoomError;

    fn try_from(r: UploadUrlResponse) -> Result<Self, Self::Error> {
        if r.file_key.trim().is_empty() {
            return Err(crate::errors::ShazoomError::Upload(
                "upload destination has no fileKey".to_string()
            ));
        }
        // the form shape wins when an issuer sends both
        let target = match (r.upload_data, r.upload_url) {
            (Some(post), _) => UploadTarget::Post { url: post.url, fields: post.fields },
            (None, Some(url)) => UploadTarget::Put { url },
            (None, None) => return Err(crate::errors::ShazoomError::Upload(
                "upload destination has neither uploadUrl nor uploadData".to_string()
            ))
        };
        Ok( UploadDestination { reference: UploadReference(r.file_key), target } )
    }
}

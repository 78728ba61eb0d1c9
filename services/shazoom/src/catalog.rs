//!
//! src/catalog.rs  Oct 16th, 2026
//!
//! Loads the tracks metadata document once and flattens it into catalog
//! entries. The catalog is immutable after load and shared by handle
//!

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::config::{CatalogConfig, CatalogSource, HttpConfig};
use crate::errors::ShazoomError;
use crate::fetch;
use crate::types::{
    CatalogEntry, Year, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_TITLE
};

#[derive(Debug, Default, Deserialize)]
struct RawTrack {
    #[serde(default)]
    youtube: Option<YoutubeMeta>,
    #[serde(default)]
    spotify: Option<SpotifyMeta>
}

#[derive(Debug, Default, Deserialize)]
struct YoutubeMeta {
    #[serde(default)]
    youtube_title_v3: Option<String>,
    #[serde(default)]
    youtube_artist: Option<String>
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpotifyMeta {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    year: Option<Value>,
    #[serde(default)]
    album_cover: Option<String>
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

fn resolve_year(value: Option<&Value>) -> Year {
    let year = match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|y| u32::try_from(y).ok()),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        _ => None
    };
    match year {
        Some(y) if y > 0 => Year::Known(y),
        _ => Year::Unknown
    }
}

fn to_entry(key: &str, raw: RawTrack, placeholder_cover: &str) -> CatalogEntry {
    let spotify = raw.spotify.unwrap_or_default();
    let youtube = raw.youtube.unwrap_or_default();

    let title = present(spotify.title.as_ref())
        .or(present(youtube.youtube_title_v3.as_ref()))
        .unwrap_or(UNKNOWN_TITLE);
    let artist = present(spotify.artist.as_ref())
        .or(present(youtube.youtube_artist.as_ref()))
        .unwrap_or(UNKNOWN_ARTIST);
    let album = present(spotify.album.as_ref()).unwrap_or(UNKNOWN_ALBUM);
    let album_cover_url = present(spotify.album_cover.as_ref()).unwrap_or(placeholder_cover);

    CatalogEntry {
        id: format!("song{key}"),
        title: title.to_string(),
        artist: artist.to_string(),
        album: album.to_string(),
        year: resolve_year(spotify.year.as_ref()),
        album_cover_url: album_cover_url.to_string()
    }
}

/// Canonical decimal integer keys, which enumerate before all others
fn array_index(key: &str) -> Option<u32> {
    let n = key.parse::<u32>().ok()?;
    (n != u32::MAX && n.to_string() == key).then_some(n)
}

///
/// Flattens the metadata document. Integer-like keys come first in numeric
/// order, the rest keep document order.
///
pub fn normalize(document: &str, placeholder_cover: &str) ->
    Result<Vec<CatalogEntry>, ShazoomError> {

    let map: Map<String, Value> = serde_json::from_str(document)?;

    let mut keyed: Vec<(Option<u32>, String, Value)> = map.into_iter()
        .map(|(k, v)| (array_index(&k), k, v))
        .collect();
    // stable, so non-index keys stay in insertion order
    keyed.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal
    });

    keyed.into_iter()
        .map(|(_, key, value)| {
            let raw: RawTrack = serde_json::from_value(value)
                .map_err(|e| ShazoomError::Parse(format!("track {key}: {e}")))?;
            Ok( to_entry(&key, raw, placeholder_cover) )
        })
        .collect()
}

/// Immutable, cheaply cloned handle over the loaded entries
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Arc<[CatalogEntry]>
}

impl Catalog {
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries: entries.into() }
    }

    pub fn entries(&self) -> &[CatalogEntry] { &self.entries }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// The first `n` entries, as listed beside the identify panel
    pub fn preview(&self, n: usize) -> &[CatalogEntry] {
        &self.entries[..n.min(self.entries.len())]
    }
}

async fn read_document(cfg: &CatalogConfig, http: &HttpConfig) ->
    Result<String, ShazoomError> {

    match &cfg.source {
        CatalogSource::Remote(url) => {
            // body is kept raw so malformed json surfaces as Parse
            let client = fetch::base_client(http)?;
            fetch::get_text_with_retry(client.get(url.clone()), &http.retry).await
                .map_err(|e| ShazoomError::Fetch(format!("tracks metadata {url}: {e}")))
        },
        CatalogSource::Local(path) => tokio::fs::read_to_string(path).await
            .map_err(|e| ShazoomError::Fetch(format!("read {}: {e}", path.display())))
    }
}

/// Fetch and normalize; Fetch on transport/status errors, Parse on bad json
pub async fn load(cfg: &CatalogConfig, http: &HttpConfig) -> Result<Catalog, ShazoomError> {
    let document = read_document(cfg, http).await?;
    let entries = normalize(&document, &cfg.placeholder_cover)?;
    info!(source = %cfg.source, tracks = entries.len(), "catalog.load");
    Ok( Catalog::from_entries(entries) )
}

///
/// Application-scoped catalog state: built once at startup and passed by
/// reference. A failed load leaves an empty catalog and the error.
///
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    catalog: Catalog,
    error: Option<String>
}

impl CatalogStore {
    pub async fn load_or_empty(cfg: &CatalogConfig, http: &HttpConfig) -> Self {
        match load(cfg, http).await {
            Ok(catalog) => Self { catalog, error: None },
            Err(e) => {
                error!(source = %cfg.source, error = %e, "catalog.load.failed");
                Self { catalog: Catalog::default(), error: Some(e.user_message()) }
            }
        }
    }

    pub fn catalog(&self) -> &Catalog { &self.catalog }
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }
}

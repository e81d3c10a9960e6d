// src/providers/mod.rs
//! Provider abstraction: every external data source adapts its raw response
//! into a [`ProfileFragment`] at the boundary, so the pipeline and scoring
//! never see provider JSON.

pub mod fixture;
pub mod lastfm;
pub mod musicbrainz;
pub mod spotify;
pub mod youtube;

use crate::isrc::Isrc;
use crate::profile::ProfileFragment;
use crate::ratelimit::RateBudgetConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use fixture::StaticProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    MusicBrainz,
    Spotify,
    LastFm,
    YouTube,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::MusicBrainz,
        ProviderId::Spotify,
        ProviderId::LastFm,
        ProviderId::YouTube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::MusicBrainz => "musicbrainz",
            ProviderId::Spotify => "spotify",
            ProviderId::LastFm => "lastfm",
            ProviderId::YouTube => "youtube",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority class. Declaration order is merge priority: identity providers
/// win over enrichment, enrichment over optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    Identity,
    Enrichment,
    Optional,
}

/// What a provider needs to run a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKey {
    Isrc,
    ArtistName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderQuery {
    pub isrc: Isrc,
    /// Filled from higher-priority providers before name-keyed providers run.
    pub artist_name: Option<String>,
}

impl ProviderQuery {
    pub fn new(isrc: Isrc) -> Self {
        Self {
            isrc,
            artist_name: None,
        }
    }

    pub fn with_artist(mut self, name: Option<String>) -> Self {
        self.artist_name = name;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("lookup needs {0}")]
    MissingInput(&'static str),
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            ProviderError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Decode(e.to_string())
    }
}

#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    fn id(&self) -> ProviderId;

    fn role(&self) -> ProviderRole;

    /// Declared request budget, registered with the rate limiter at startup.
    fn rate_budget(&self) -> RateBudgetConfig;

    fn lookup_key(&self) -> LookupKey {
        LookupKey::Isrc
    }

    async fn fetch(&self, query: &ProviderQuery) -> Result<ProfileFragment, ProviderError>;
}

/// Maps a non-success HTTP response into a provider error, keeping a short
/// body excerpt for diagnostics.
pub(crate) async fn error_for_status(
    resp: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message: String = body.chars().take(200).collect();
    Err(ProviderError::Http {
        status: status.as_u16(),
        message,
    })
}

pub const USER_AGENT: &str = concat!(
    "isrc-lead-scout/",
    env!("CARGO_PKG_VERSION"),
    " ( https://github.com/lumlich/isrc-lead-scout )"
);

/// Shared HTTP client with the crate's User-Agent. The per-call timeout is
/// enforced by the pipeline, not here.
pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProviderError::NotConfigured(e.to_string()))
}

/// Free text from provider payloads (bios, descriptions): entity decode,
/// tag strip, link-trailer removal, whitespace collapse, length cap.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_LINK_TRAILER: once_cell::sync::OnceCell<regex::Regex> =
        once_cell::sync::OnceCell::new();
    let re_trailer = RE_LINK_TRAILER
        .get_or_init(|| regex::Regex::new(r"(?is)<a [^>]*>\s*read more on last\.fm\s*</a>.*$").unwrap());
    out = re_trailer.replace_all(&out, "").to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 2000 {
        out = out.chars().take(2000).collect();
    }
    out
}

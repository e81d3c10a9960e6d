//! Last.fm `artist.getinfo` (enrichment provider, keyed by artist name).
//! Supplies the listeners metric and the artist bio.

use super::{
    clean_text, http_client, LookupKey, ProviderClient, ProviderError, ProviderId, ProviderQuery,
    ProviderRole,
};
use crate::profile::ProfileFragment;
use crate::ratelimit::RateBudgetConfig;
use async_trait::async_trait;
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";
pub const BUDGET: RateBudgetConfig = RateBudgetConfig::new(5, 1);

/// Last.fm error code for an unknown artist.
const ERR_NOT_FOUND: i64 = 6;

#[derive(Debug, Deserialize)]
struct Envelope {
    artist: Option<Artist>,
    error: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: Option<String>,
    url: Option<String>,
    stats: Option<Stats>,
    bio: Option<Bio>,
}

#[derive(Debug, Deserialize)]
struct Stats {
    // Sent as a string.
    listeners: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Bio {
    summary: Option<String>,
    content: Option<String>,
}

pub struct LastFmClient {
    api_key: String,
    api_url: String,
    client: reqwest::Client,
}

impl LastFmClient {
    pub fn new(api_key: String, api_url: Option<String>) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("lastfm api key missing".into()));
        }
        Ok(Self {
            api_key,
            api_url: api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            client: http_client()?,
        })
    }

    fn parse(body: &str) -> Result<ProfileFragment, ProviderError> {
        let env: Envelope = serde_json::from_str(body)?;
        if let Some(code) = env.error {
            if code == ERR_NOT_FOUND {
                return Ok(ProfileFragment::not_listed());
            }
            return Err(ProviderError::Http {
                status: 200,
                message: format!(
                    "lastfm error {code}: {}",
                    env.message.unwrap_or_default()
                ),
            });
        }
        let Some(artist) = env.artist else {
            return Ok(ProfileFragment::not_listed());
        };

        let listeners = artist
            .stats
            .and_then(|s| s.listeners)
            .and_then(|l| l.trim().parse::<i64>().ok());
        let bio = artist
            .bio
            .and_then(|b| b.content.filter(|c| !c.trim().is_empty()).or(b.summary))
            .map(|b| clean_text(&b))
            .filter(|b| !b.is_empty());

        Ok(ProfileFragment {
            listed: Some(true),
            artist_name: artist.name,
            listeners,
            bio,
            social_links: artist.url.into_iter().collect(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl ProviderClient for LastFmClient {
    fn id(&self) -> ProviderId {
        ProviderId::LastFm
    }

    fn role(&self) -> ProviderRole {
        ProviderRole::Enrichment
    }

    fn rate_budget(&self) -> RateBudgetConfig {
        BUDGET
    }

    fn lookup_key(&self) -> LookupKey {
        LookupKey::ArtistName
    }

    async fn fetch(&self, query: &ProviderQuery) -> Result<ProfileFragment, ProviderError> {
        let artist = query
            .artist_name
            .as_deref()
            .ok_or(ProviderError::MissingInput("artist name"))?;
        let resp = self
            .client
            .get(&self.api_url)
            .query(&[
                ("method", "artist.getinfo"),
                ("artist", artist),
                ("api_key", self.api_key.as_str()),
                ("autocorrect", "1"),
                ("format", "json"),
            ])
            .send()
            .await?;
        // Last.fm reports unknown artists with a 4xx and an error body.
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_client_error() && body.contains("\"error\"") {
            return Self::parse(&body);
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        Self::parse(&body)
    }
}

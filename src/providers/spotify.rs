//! Spotify Web API (identity provider).
//!
//! Client-credentials token, cached until shortly before expiry. One lookup is
//! three calls: track search by ISRC, album (label), artist (followers and
//! popularity). Album and artist failures degrade the fragment rather than
//! failing it.

use super::{
    error_for_status, http_client, ProviderClient, ProviderError, ProviderId, ProviderQuery,
    ProviderRole,
};
use crate::profile::ProfileFragment;
use crate::ratelimit::RateBudgetConfig;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const BUDGET: RateBudgetConfig = RateBudgetConfig::new(60, 30);

const TOKEN_SKEW: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Page,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    items: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistRef>,
    album: Option<AlbumRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumRef {
    id: Option<String>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Album {
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    followers: Option<Followers>,
    popularity: Option<u8>,
    external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct Followers {
    total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

/// Ids needed for the follow-up calls.
#[derive(Debug, Default, PartialEq)]
struct FollowUp {
    album_id: Option<String>,
    artist_id: Option<String>,
}

pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    api_url: String,
    token_url: String,
    client: reqwest::Client,
    token: Mutex<Option<(String, Instant)>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self, ProviderError> {
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "spotify client id/secret missing".into(),
            ));
        }
        Ok(Self {
            client_id,
            client_secret,
            api_url: DEFAULT_API_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client: http_client()?,
            token: Mutex::new(None),
        })
    }

    pub fn with_urls(mut self, api_url: Option<String>, token_url: Option<String>) -> Self {
        if let Some(u) = api_url {
            self.api_url = u.trim_end_matches('/').to_string();
        }
        if let Some(u) = token_url {
            self.token_url = u;
        }
        self
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.lock().await;
        if let Some((tok, expires)) = guard.as_ref() {
            if Instant::now() < *expires {
                return Ok(tok.clone());
            }
        }

        let resp = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let body = error_for_status(resp).await?.text().await?;
        let tok: TokenResponse = serde_json::from_str(&body)?;
        let ttl = Duration::from_secs(tok.expires_in).saturating_sub(TOKEN_SKEW);
        *guard = Some((tok.access_token.clone(), Instant::now() + ttl));
        tracing::debug!(target: "providers", provider = "spotify", ttl_s = ttl.as_secs(), "token refreshed");
        Ok(tok.access_token)
    }

    async fn get_json(&self, url: &str, token: &str) -> Result<String, ProviderError> {
        let resp = self.client.get(url).bearer_auth(token).send().await?;
        Ok(error_for_status(resp).await?.text().await?)
    }

    fn parse_search(body: &str) -> Result<(ProfileFragment, FollowUp), ProviderError> {
        let resp: SearchResponse = serde_json::from_str(body)?;
        let Some(track) = resp.tracks.items.into_iter().next() else {
            return Ok((ProfileFragment::not_listed(), FollowUp::default()));
        };

        let first_artist = track.artists.into_iter().next();
        let (artist_name, artist_id) = match first_artist {
            Some(a) => (a.name, a.id),
            None => (None, None),
        };
        let (latest_release, album_id) = match track.album {
            Some(al) => (al.release_date.as_deref().and_then(parse_release_date), al.id),
            None => (None, None),
        };

        Ok((
            ProfileFragment {
                listed: Some(true),
                artist_name,
                track_title: track.name,
                latest_release,
                ..Default::default()
            },
            FollowUp {
                album_id,
                artist_id,
            },
        ))
    }

    fn apply_album(frag: &mut ProfileFragment, body: &str) -> Result<(), ProviderError> {
        let album: Album = serde_json::from_str(body)?;
        frag.label = album.label.filter(|l| !l.trim().is_empty());
        Ok(())
    }

    fn apply_artist(frag: &mut ProfileFragment, body: &str) -> Result<(), ProviderError> {
        let artist: Artist = serde_json::from_str(body)?;
        frag.followers = artist.followers.and_then(|f| f.total);
        frag.spotify_popularity = artist.popularity.map(|p| p.min(100));
        if let Some(url) = artist.external_urls.and_then(|u| u.spotify) {
            frag.social_links.push(url);
        }
        Ok(())
    }
}

/// Album dates come at year, month or day precision.
fn parse_release_date(s: &str) -> Option<NaiveDate> {
    super::musicbrainz::parse_partial_date(s)
}

#[async_trait]
impl ProviderClient for SpotifyClient {
    fn id(&self) -> ProviderId {
        ProviderId::Spotify
    }

    fn role(&self) -> ProviderRole {
        ProviderRole::Identity
    }

    fn rate_budget(&self) -> RateBudgetConfig {
        BUDGET
    }

    async fn fetch(&self, query: &ProviderQuery) -> Result<ProfileFragment, ProviderError> {
        let token = self.access_token().await?;
        let search_url = format!(
            "{}/search?q=isrc:{}&type=track&limit=1",
            self.api_url, query.isrc
        );
        let body = self.get_json(&search_url, &token).await?;
        let (mut frag, follow) = Self::parse_search(&body)?;

        if let Some(id) = follow.album_id {
            let url = format!("{}/albums/{}", self.api_url, id);
            match self.get_json(&url, &token).await {
                Ok(b) => Self::apply_album(&mut frag, &b)?,
                Err(e) => {
                    tracing::warn!(target: "providers", provider = "spotify", error = %e, "album lookup failed")
                }
            }
        }
        if let Some(id) = follow.artist_id {
            let url = format!("{}/artists/{}", self.api_url, id);
            match self.get_json(&url, &token).await {
                Ok(b) => Self::apply_artist(&mut frag, &b)?,
                Err(e) => {
                    tracing::warn!(target: "providers", provider = "spotify", error = %e, "artist lookup failed")
                }
            }
        }
        Ok(frag)
    }
}

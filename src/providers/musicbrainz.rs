//! MusicBrainz ISRC lookup (identity provider).
//!
//! `GET /ws/2/isrc/{isrc}?inc=artist-credits+releases&fmt=json`.
//! MusicBrainz asks for at most one request per second and a descriptive
//! User-Agent. A 404 means the ISRC is unknown there.

use super::{
    error_for_status, http_client, ProviderClient, ProviderError, ProviderId, ProviderQuery,
    ProviderRole,
};
use crate::profile::ProfileFragment;
use crate::ratelimit::RateBudgetConfig;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://musicbrainz.org";
pub const BUDGET: RateBudgetConfig = RateBudgetConfig::new(1, 1);

#[derive(Debug, Deserialize)]
struct IsrcResponse {
    #[serde(default)]
    recordings: Vec<Recording>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    title: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    name: Option<String>,
    #[serde(default)]
    joinphrase: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    date: Option<String>,
    country: Option<String>,
}

pub struct MusicBrainzClient {
    base_url: String,
    client: reqwest::Client,
}

impl MusicBrainzClient {
    pub fn new(base_url: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client()?,
        })
    }

    fn parse(body: &str) -> Result<ProfileFragment, ProviderError> {
        let resp: IsrcResponse = serde_json::from_str(body)?;
        let Some(rec) = resp.recordings.into_iter().next() else {
            return Ok(ProfileFragment::not_listed());
        };

        let artist_name = if rec.artist_credit.is_empty() {
            None
        } else {
            let joined: String = rec
                .artist_credit
                .iter()
                .map(|c| format!("{}{}", c.name.as_deref().unwrap_or_default(), c.joinphrase))
                .collect();
            Some(joined.trim().to_string())
        };

        let latest_release = rec
            .releases
            .iter()
            .filter_map(|r| r.date.as_deref().and_then(parse_partial_date))
            .max();
        // "XW" (worldwide) and "XE" (Europe) are not countries.
        let country = rec
            .releases
            .iter()
            .filter_map(|r| r.country.as_deref())
            .find(|c| !c.starts_with('X'))
            .map(str::to_string);

        Ok(ProfileFragment {
            listed: Some(true),
            artist_name,
            track_title: rec.title,
            country,
            latest_release,
            ..Default::default()
        })
    }
}

/// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`; missing parts default to the first.
pub(crate) fn parse_partial_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.trim().splitn(3, '-');
    let y: i32 = parts.next()?.parse().ok()?;
    let m: u32 = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 1,
    };
    let d: u32 = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(y, m, d)
}

#[async_trait]
impl ProviderClient for MusicBrainzClient {
    fn id(&self) -> ProviderId {
        ProviderId::MusicBrainz
    }

    fn role(&self) -> ProviderRole {
        ProviderRole::Identity
    }

    fn rate_budget(&self) -> RateBudgetConfig {
        BUDGET
    }

    async fn fetch(&self, query: &ProviderQuery) -> Result<ProfileFragment, ProviderError> {
        let url = format!(
            "{}/ws/2/isrc/{}?inc=artist-credits+releases&fmt=json",
            self.base_url, query.isrc
        );
        let resp = self.client.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(ProfileFragment::not_listed());
        }
        let body = error_for_status(resp).await?.text().await?;
        Self::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "isrc": "USRC17607839",
        "recordings": [{
            "id": "b3015bab-1540-4d4e-9f30-14872a1525f7",
            "title": "Stolen Car",
            "artist-credit": [
                { "name": "Tiny Ruins", "joinphrase": " & " },
                { "name": "Hamish Kilgour", "joinphrase": "" }
            ],
            "releases": [
                { "title": "Stolen Car", "date": "2016", "country": "XW" },
                { "title": "Hurtling Through", "date": "2017-03-10", "country": "NZ" },
                { "title": "Promo", "date": "", "country": null }
            ]
        }]
    }"#;

    #[test]
    fn parses_recording() {
        let f = MusicBrainzClient::parse(BODY).unwrap();
        assert_eq!(f.listed, Some(true));
        assert_eq!(f.artist_name.as_deref(), Some("Tiny Ruins & Hamish Kilgour"));
        assert_eq!(f.track_title.as_deref(), Some("Stolen Car"));
        assert_eq!(f.country.as_deref(), Some("NZ"));
        assert_eq!(f.latest_release, NaiveDate::from_ymd_opt(2017, 3, 10));
    }

    #[test]
    fn empty_recordings_mean_not_listed() {
        let f = MusicBrainzClient::parse(r#"{"isrc":"X","recordings":[]}"#).unwrap();
        assert_eq!(f, ProfileFragment::not_listed());
    }

    #[test]
    fn partial_dates() {
        assert_eq!(parse_partial_date("2019"), NaiveDate::from_ymd_opt(2019, 1, 1));
        assert_eq!(parse_partial_date("2019-07"), NaiveDate::from_ymd_opt(2019, 7, 1));
        assert_eq!(parse_partial_date(""), None);
        assert_eq!(parse_partial_date("2019-13-01"), None);
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(matches!(
            MusicBrainzClient::parse("<html>"),
            Err(ProviderError::Decode(_))
        ));
    }
}

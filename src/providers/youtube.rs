//! YouTube Data API (optional provider, keyed by artist name).
//!
//! Channel search, then a statistics call for the best name match. A search
//! costs 100 quota units of the 10k daily default, hence the daily budget.

use super::{
    error_for_status, http_client, LookupKey, ProviderClient, ProviderError, ProviderId,
    ProviderQuery, ProviderRole,
};
use crate::profile::{ChannelSummary, ProfileFragment, SecondaryChannel, UploadCadence};
use crate::ratelimit::RateBudgetConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const BUDGET: RateBudgetConfig = RateBudgetConfig::new(100, 86_400);

/// Minimum Jaro-Winkler similarity between artist and channel title.
pub const NAME_MATCH_THRESHOLD: f64 = 0.85;

const AVG_DAYS_PER_MONTH: f64 = 30.44;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: Option<String>,
    channel_title: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelsResponse {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    snippet: Option<Snippet>,
    statistics: Option<Statistics>,
}

// Counts arrive as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    subscriber_count: Option<String>,
    video_count: Option<String>,
    #[serde(default)]
    hidden_subscriber_count: bool,
}

pub struct YouTubeClient {
    api_key: String,
    api_url: String,
    client: reqwest::Client,
}

impl YouTubeClient {
    pub fn new(api_key: String, api_url: Option<String>) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("youtube api key missing".into()));
        }
        Ok(Self {
            api_key,
            api_url: api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client()?,
        })
    }

    /// Best channel whose title is close enough to the artist name.
    fn best_match(body: &str, artist: &str) -> Result<Option<String>, ProviderError> {
        let resp: SearchResponse = serde_json::from_str(body)?;
        let wanted = normalize_name(artist);
        let best = resp
            .items
            .into_iter()
            .filter_map(|it| {
                let id = it.id.channel_id?;
                let snip = it.snippet?;
                let title = snip.channel_title.or(snip.title)?;
                let sim = strsim::jaro_winkler(&wanted, &normalize_name(&title));
                (sim >= NAME_MATCH_THRESHOLD).then_some((id, sim))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));
        Ok(best.map(|(id, _)| id))
    }

    fn parse_channel(
        body: &str,
        channel_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProfileFragment, ProviderError> {
        let resp: ChannelsResponse = serde_json::from_str(body)?;
        let Some(ch) = resp.items.into_iter().next() else {
            return Ok(absent());
        };

        let stats = ch.statistics;
        let subscribers = stats
            .as_ref()
            .filter(|s| !s.hidden_subscriber_count)
            .and_then(|s| s.subscriber_count.as_deref())
            .and_then(|c| c.parse::<i64>().ok())
            .unwrap_or(0);
        let video_count = stats
            .as_ref()
            .and_then(|s| s.video_count.as_deref())
            .and_then(|c| c.parse::<u64>().ok());
        let published = ch
            .snippet
            .and_then(|s| s.published_at)
            .and_then(|p| DateTime::parse_from_rfc3339(&p).ok())
            .map(|d| d.with_timezone(&Utc));

        let cadence = match (video_count, published) {
            (Some(n), Some(since)) => {
                let months = (now - since).num_days() as f64 / AVG_DAYS_PER_MONTH;
                UploadCadence::from_monthly_rate(n as f64 / months.max(1.0))
            }
            _ => UploadCadence::Unknown,
        };

        Ok(ProfileFragment {
            listed: Some(true),
            secondary_channel: Some(SecondaryChannel::Present(ChannelSummary::new(
                subscribers,
                video_count,
                cadence,
            ))),
            social_links: vec![format!("https://www.youtube.com/channel/{channel_id}")],
            ..Default::default()
        })
    }
}

fn absent() -> ProfileFragment {
    ProfileFragment {
        listed: Some(false),
        secondary_channel: Some(SecondaryChannel::Absent),
        ..Default::default()
    }
}

fn normalize_name(s: &str) -> String {
    let lower = s.to_lowercase();
    let trimmed = lower
        .trim_end_matches(" - topic")
        .trim_end_matches("vevo")
        .trim_end_matches(" official");
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl ProviderClient for YouTubeClient {
    fn id(&self) -> ProviderId {
        ProviderId::YouTube
    }

    fn role(&self) -> ProviderRole {
        ProviderRole::Optional
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
            .get(format!("{}/search", self.api_url))
            .query(&[
                ("part", "snippet"),
                ("type", "channel"),
                ("maxResults", "5"),
                ("q", artist),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;
        let body = error_for_status(resp).await?.text().await?;
        let Some(channel_id) = Self::best_match(&body, artist)? else {
            tracing::debug!(target: "providers", provider = "youtube", artist, "no matching channel");
            return Ok(absent());
        };

        let resp = self
            .client
            .get(format!("{}/channels", self.api_url))
            .query(&[
                ("part", "snippet,statistics"),
                ("id", channel_id.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;
        let body = error_for_status(resp).await?.text().await?;
        Self::parse_channel(&body, &channel_id, Utc::now())
    }
}

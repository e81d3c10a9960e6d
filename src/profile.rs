//! # Profiles
//! `ProfileFragment` is what one provider knows; `MergedProfile` is the
//! priority-merged union the pipeline hands to scoring, contact discovery and
//! persistence.
//!
//! Merge rule: fragments are absorbed in provider priority order and a field
//! is only filled while it is still absent, so a higher-priority value is
//! never overwritten. Social links are unioned in arrival (= priority) order.

use crate::isrc::Isrc;
use crate::label::{LabelDirectory, LabelType};
use crate::providers::ProviderId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Subscriber/listener ratio below which a channel has a lot of room to grow.
pub const GROWTH_HIGH_RATIO: f64 = 0.10;
/// Subscriber/listener ratio below which growth potential is medium.
pub const GROWTH_MEDIUM_RATIO: f64 = 0.50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadCadence {
    Inactive,
    Occasional,
    Regular,
    Frequent,
    Unknown,
}

impl UploadCadence {
    /// Classify by average uploads per month.
    pub fn from_monthly_rate(per_month: f64) -> Self {
        if !per_month.is_finite() || per_month < 0.0 {
            UploadCadence::Unknown
        } else if per_month < 0.25 {
            UploadCadence::Inactive
        } else if per_month < 1.0 {
            UploadCadence::Occasional
        } else if per_month < 4.0 {
            UploadCadence::Regular
        } else {
            UploadCadence::Frequent
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPotential {
    Low,
    Medium,
    High,
    Unknown,
}

/// Secondary (video) platform channel summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub subscribers: i64,
    #[serde(default)]
    pub video_count: Option<u64>,
    pub upload_cadence: UploadCadence,
    pub growth_potential: GrowthPotential,
}

impl ChannelSummary {
    pub fn new(subscribers: i64, video_count: Option<u64>, upload_cadence: UploadCadence) -> Self {
        Self {
            subscribers,
            video_count,
            upload_cadence,
            growth_potential: GrowthPotential::Unknown,
        }
    }

    /// Growth potential relative to the primary popularity metric.
    pub fn assess_growth(subscribers: i64, listeners: i64) -> GrowthPotential {
        if listeners <= 0 {
            return GrowthPotential::Unknown;
        }
        let ratio = subscribers.max(0) as f64 / listeners as f64;
        if ratio < GROWTH_HIGH_RATIO {
            GrowthPotential::High
        } else if ratio < GROWTH_MEDIUM_RATIO {
            GrowthPotential::Medium
        } else {
            GrowthPotential::Low
        }
    }
}

/// `None` on the profile means "unknown" (provider not run or failed);
/// `Absent` means the lookup ran and found no channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SecondaryChannel {
    Absent,
    Present(ChannelSummary),
}

/// One provider's adapted answer. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileFragment {
    /// Whether the artist/track was found on this provider's platform.
    pub listed: Option<bool>,
    pub artist_name: Option<String>,
    pub track_title: Option<String>,
    pub country: Option<String>,
    pub label: Option<String>,
    pub label_type: Option<LabelType>,
    /// Monthly-listener-like popularity metric.
    pub listeners: Option<i64>,
    pub spotify_popularity: Option<u8>,
    pub followers: Option<i64>,
    pub latest_release: Option<NaiveDate>,
    pub website: Option<String>,
    pub social_links: Vec<String>,
    pub bio: Option<String>,
    pub secondary_channel: Option<SecondaryChannel>,
}

impl ProfileFragment {
    /// "Looked, found nothing."
    pub fn not_listed() -> Self {
        Self {
            listed: Some(false),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedProfile {
    pub isrc: Isrc,
    /// Reference date used for release recency.
    pub as_of: NaiveDate,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub track_title: Option<String>,
    /// ISO 3166-1 alpha-2, upper case.
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub label_type: Option<LabelType>,
    #[serde(default)]
    pub listeners: Option<i64>,
    #[serde(default)]
    pub spotify_popularity: Option<u8>,
    #[serde(default)]
    pub followers: Option<i64>,
    #[serde(default)]
    pub latest_release: Option<NaiveDate>,
    #[serde(default)]
    pub platforms: BTreeMap<ProviderId, bool>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub social_links: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub secondary_channel: Option<SecondaryChannel>,
    /// Field name → provider that supplied it.
    #[serde(default)]
    pub field_sources: BTreeMap<String, ProviderId>,
}

fn fill<T>(slot: &mut Option<T>, incoming: Option<T>) -> bool {
    if slot.is_none() && incoming.is_some() {
        *slot = incoming;
        true
    } else {
        false
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Keep only two-letter codes, upper-cased.
pub fn normalize_country(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.len() == 2 && t.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(t.to_ascii_uppercase())
    } else {
        None
    }
}

impl MergedProfile {
    pub fn new(isrc: Isrc, as_of: NaiveDate) -> Self {
        Self {
            isrc,
            as_of,
            artist_name: None,
            track_title: None,
            country: None,
            label: None,
            label_type: None,
            listeners: None,
            spotify_popularity: None,
            followers: None,
            latest_release: None,
            platforms: BTreeMap::new(),
            website: None,
            social_links: Vec::new(),
            bio: None,
            secondary_channel: None,
            field_sources: BTreeMap::new(),
        }
    }

    fn note(&mut self, field: &str, provider: ProviderId) {
        self.field_sources.insert(field.to_string(), provider);
    }

    /// Absorb one provider's fragment. Callers must absorb in priority order.
    pub fn absorb(&mut self, provider: ProviderId, frag: ProfileFragment) {
        if let Some(listed) = frag.listed {
            self.platforms.entry(provider).or_insert(listed);
        }

        if fill(&mut self.artist_name, non_blank(frag.artist_name)) {
            self.note("artist_name", provider);
        }
        if fill(&mut self.track_title, non_blank(frag.track_title)) {
            self.note("track_title", provider);
        }
        if fill(
            &mut self.country,
            frag.country.as_deref().and_then(normalize_country),
        ) {
            self.note("country", provider);
        }
        if fill(&mut self.label, non_blank(frag.label)) {
            self.note("label", provider);
        }
        if fill(&mut self.label_type, frag.label_type) {
            self.note("label_type", provider);
        }
        if fill(&mut self.listeners, frag.listeners) {
            self.note("listeners", provider);
        }
        if fill(&mut self.spotify_popularity, frag.spotify_popularity) {
            self.note("spotify_popularity", provider);
        }
        if fill(&mut self.followers, frag.followers) {
            self.note("followers", provider);
        }
        if fill(&mut self.latest_release, frag.latest_release) {
            self.note("latest_release", provider);
        }
        if fill(&mut self.website, non_blank(frag.website)) {
            self.note("website", provider);
        }
        if fill(&mut self.bio, non_blank(frag.bio)) {
            self.note("bio", provider);
        }
        if fill(&mut self.secondary_channel, frag.secondary_channel) {
            self.note("secondary_channel", provider);
        }

        for link in frag.social_links {
            let link = link.trim().to_string();
            if link.is_empty() {
                continue;
            }
            if !self
                .social_links
                .iter()
                .any(|l| l.eq_ignore_ascii_case(&link))
            {
                self.social_links.push(link);
            }
        }
    }

    /// Derived fields, computed once after all fragments are in.
    pub fn finalize(&mut self, labels: &LabelDirectory) {
        if self.label_type.is_none() {
            if let Some(label) = self.label.clone() {
                if let Some(t) = labels.classify(&label, self.artist_name.as_deref()) {
                    self.label_type = Some(t);
                    if let Some(p) = self.field_source("label") {
                        self.note("label_type", p);
                    }
                }
            }
        }

        if let (Some(SecondaryChannel::Present(ch)), Some(listeners)) =
            (self.secondary_channel.as_mut(), self.listeners)
        {
            if ch.growth_potential == GrowthPotential::Unknown {
                ch.growth_potential = ChannelSummary::assess_growth(ch.subscribers, listeners);
            }
        }
    }

    pub fn field_source(&self, field: &str) -> Option<ProviderId> {
        self.field_sources.get(field).copied()
    }

    pub fn is_listed_on(&self, provider: ProviderId) -> Option<bool> {
        self.platforms.get(&provider).copied()
    }

    pub fn listed_platform_count(&self) -> usize {
        self.platforms.values().filter(|v| **v).count()
    }

    pub fn has_unlisted_platform(&self) -> bool {
        self.platforms.values().any(|v| !*v)
    }

    // Data groups used for confidence.
    pub fn has_label_info(&self) -> bool {
        self.label_type.is_some()
    }

    pub fn has_popularity_info(&self) -> bool {
        self.listeners.is_some()
    }

    pub fn has_geographic_info(&self) -> bool {
        self.country.is_some()
    }

    pub fn has_channel_info(&self) -> bool {
        self.secondary_channel.is_some()
    }
}

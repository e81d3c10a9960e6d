//! Contact discovery from a merged profile.
//!
//! Sources and confidence:
//! - website supplied by a provider: 0.9
//! - e-mail addresses found in the bio: 0.8
//! - social links, classified by host: 0.7
//! - `contact@<website domain>` guess: 0.3
//!
//! Output is deduplicated case-insensitively (highest confidence wins) and
//! sorted by confidence, then value.

use crate::profile::MergedProfile;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

pub const WEBSITE_CONFIDENCE: f64 = 0.9;
pub const BIO_EMAIL_CONFIDENCE: f64 = 0.8;
pub const SOCIAL_CONFIDENCE: f64 = 0.7;
pub const INFERRED_EMAIL_CONFIDENCE: f64 = 0.3;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").unwrap()
});

/// Host suffix → platform name.
const PLATFORMS: &[(&str, &str)] = &[
    ("instagram.com", "instagram"),
    ("twitter.com", "twitter"),
    ("x.com", "twitter"),
    ("facebook.com", "facebook"),
    ("tiktok.com", "tiktok"),
    ("youtube.com", "youtube"),
    ("youtu.be", "youtube"),
    ("bandcamp.com", "bandcamp"),
    ("soundcloud.com", "soundcloud"),
    ("spotify.com", "spotify"),
    ("last.fm", "lastfm"),
    ("linktr.ee", "linktree"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Email,
    Website,
    Social,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub kind: ContactKind,
    pub value: String,
    /// In [0, 1].
    pub confidence: f64,
    /// Provider name, "bio", "social_links" or "inferred".
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[async_trait]
pub trait ContactDiscovery: Send + Sync {
    async fn discover(&self, profile: &MergedProfile) -> Vec<Contact>;
}

/// Offline discovery: reads only what the profile already carries.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProfileContactDiscovery;

impl ProfileContactDiscovery {
    pub fn discover_sync(&self, profile: &MergedProfile) -> Vec<Contact> {
        let mut found = Vec::new();

        if let Some(site) = profile.website.as_deref().and_then(parse_url) {
            let source = profile
                .field_source("website")
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| "profile".to_string());
            match platform_of(&site) {
                Some(platform) => found.push(Contact {
                    kind: ContactKind::Social,
                    value: site.to_string(),
                    confidence: SOCIAL_CONFIDENCE,
                    source,
                    platform: Some(platform.to_string()),
                }),
                None => {
                    if let Some(domain) = site.host_str().map(strip_www) {
                        found.push(Contact {
                            kind: ContactKind::Email,
                            value: format!("contact@{domain}"),
                            confidence: INFERRED_EMAIL_CONFIDENCE,
                            source: "inferred".into(),
                            platform: None,
                        });
                    }
                    found.push(Contact {
                        kind: ContactKind::Website,
                        value: site.to_string(),
                        confidence: WEBSITE_CONFIDENCE,
                        source,
                        platform: None,
                    });
                }
            }
        }

        for link in &profile.social_links {
            let Some(u) = parse_url(link) else { continue };
            let platform = platform_of(&u);
            found.push(Contact {
                kind: if platform.is_some() {
                    ContactKind::Social
                } else {
                    ContactKind::Website
                },
                value: u.to_string(),
                confidence: SOCIAL_CONFIDENCE,
                source: "social_links".into(),
                platform: platform.map(str::to_string),
            });
        }

        if let Some(bio) = profile.bio.as_deref() {
            for m in EMAIL_RE.find_iter(bio) {
                found.push(Contact {
                    kind: ContactKind::Email,
                    value: m.as_str().trim_end_matches('.').to_lowercase(),
                    confidence: BIO_EMAIL_CONFIDENCE,
                    source: "bio".into(),
                    platform: None,
                });
            }
        }

        dedupe_and_sort(found)
    }
}

#[async_trait]
impl ContactDiscovery for ProfileContactDiscovery {
    async fn discover(&self, profile: &MergedProfile) -> Vec<Contact> {
        self.discover_sync(profile)
    }
}

fn parse_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("https://{raw}"))
    };
    parsed
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn platform_of(u: &Url) -> Option<&'static str> {
    let host = strip_www(u.host_str()?).to_ascii_lowercase();
    PLATFORMS
        .iter()
        .find(|(suffix, _)| host == *suffix || host.ends_with(&format!(".{suffix}")))
        .map(|(_, name)| *name)
}

fn dedupe_and_sort(found: Vec<Contact>) -> Vec<Contact> {
    let mut best: HashMap<String, Contact> = HashMap::new();
    for c in found {
        let key = c.value.to_lowercase();
        match best.get(&key) {
            Some(existing) if existing.confidence >= c.confidence => {}
            _ => {
                best.insert(key, c);
            }
        }
    }
    let mut out: Vec<Contact> = best.into_values().collect();
    out.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.value.cmp(&b.value))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isrc::Isrc;
    use crate::providers::ProviderId;
    use chrono::NaiveDate;

    fn profile() -> MergedProfile {
        MergedProfile::new(
            Isrc::parse("NZAB12400001").unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
        )
    }

    #[test]
    fn empty_profile_has_no_contacts() {
        assert!(ProfileContactDiscovery.discover_sync(&profile()).is_empty());
    }

    #[test]
    fn platform_website_is_not_used_for_inference() {
        let mut p = profile();
        p.website = Some("https://artist.bandcamp.com".into());
        let found = ProfileContactDiscovery.discover_sync(&p);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ContactKind::Social);
        assert_eq!(found[0].platform.as_deref(), Some("bandcamp"));
    }

    #[test]
    fn scheme_less_links_are_accepted() {
        let mut p = profile();
        p.social_links = vec!["instagram.com/tinyruins".into(), "not a url at all".into()];
        let found = ProfileContactDiscovery.discover_sync(&p);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "https://instagram.com/tinyruins");
    }

    #[test]
    fn website_source_is_the_supplying_provider() {
        let mut p = profile();
        p.absorb(
            ProviderId::LastFm,
            crate::profile::ProfileFragment {
                website: Some("https://www.tinyruins.com".into()),
                ..Default::default()
            },
        );
        let found = ProfileContactDiscovery.discover_sync(&p);
        assert_eq!(found[0].kind, ContactKind::Website);
        assert_eq!(found[0].source, "lastfm");
        assert_eq!(found[1].value, "contact@tinyruins.com");
        assert_eq!(found[1].source, "inferred");
    }
}

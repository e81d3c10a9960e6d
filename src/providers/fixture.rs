//! Static provider: answers from canned fragments. Used by tests and by the
//! batch binary's offline mode (`--fixtures <file.json>`).

use super::{LookupKey, ProviderClient, ProviderError, ProviderId, ProviderQuery, ProviderRole};
use crate::profile::ProfileFragment;
use crate::ratelimit::RateBudgetConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Fragment(ProfileFragment),
    Error(ProviderError),
}

#[derive(Debug)]
pub struct StaticProvider {
    id: ProviderId,
    role: ProviderRole,
    key: LookupKey,
    budget: RateBudgetConfig,
    delay: Duration,
    default_reply: Reply,
    by_isrc: HashMap<String, ProfileFragment>,
    calls: Arc<AtomicUsize>,
}

impl StaticProvider {
    /// Defaults: identity role, ISRC-keyed, generous budget, answers with an
    /// empty fragment.
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            role: ProviderRole::Identity,
            key: LookupKey::Isrc,
            budget: RateBudgetConfig::new(1_000, 1),
            delay: Duration::ZERO,
            default_reply: Reply::Fragment(ProfileFragment::default()),
            by_isrc: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn role(mut self, role: ProviderRole) -> Self {
        self.role = role;
        self
    }

    pub fn keyed_by_artist(mut self) -> Self {
        self.key = LookupKey::ArtistName;
        self
    }

    pub fn budget(mut self, budget: RateBudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    /// Simulated network latency.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn respond(mut self, fragment: ProfileFragment) -> Self {
        self.default_reply = Reply::Fragment(fragment);
        self
    }

    pub fn fail(mut self, err: ProviderError) -> Self {
        self.default_reply = Reply::Error(err);
        self
    }

    /// Per-ISRC answer; other identifiers get the default reply.
    pub fn respond_for(mut self, isrc: &str, fragment: ProfileFragment) -> Self {
        self.by_isrc.insert(isrc.to_ascii_uppercase(), fragment);
        self
    }

    /// Shared call counter, usable after the provider is moved into a pipeline.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Build a set of providers from a JSON fixture file:
    /// ```json
    /// { "musicbrainz": { "role": "identity", "isrcs": { "USRC17607839": { "artist_name": "..." } } } }
    /// ```
    pub fn load_set(path: &Path) -> Result<Vec<StaticProvider>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixtures from {}", path.display()))?;
        let set: HashMap<ProviderId, FixtureEntry> =
            serde_json::from_str(&raw).context("parsing fixture json")?;

        let mut out: Vec<StaticProvider> = set
            .into_iter()
            .map(|(id, entry)| {
                let mut p = StaticProvider::new(id).role(entry.role);
                if entry.keyed_by_artist {
                    p = p.keyed_by_artist();
                }
                if let Some(b) = entry.budget {
                    p = p.budget(b);
                }
                if entry.unknown_not_listed {
                    p = p.respond(ProfileFragment::not_listed());
                }
                for (isrc, frag) in entry.isrcs {
                    p = p.respond_for(&isrc, frag);
                }
                p
            })
            .collect();
        out.sort_by_key(|p| p.id);
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct FixtureEntry {
    #[serde(default = "default_role")]
    role: ProviderRole,
    #[serde(default)]
    keyed_by_artist: bool,
    #[serde(default)]
    budget: Option<RateBudgetConfig>,
    #[serde(default)]
    unknown_not_listed: bool,
    #[serde(default)]
    isrcs: HashMap<String, ProfileFragment>,
}

fn default_role() -> ProviderRole {
    ProviderRole::Identity
}

#[async_trait]
impl ProviderClient for StaticProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn role(&self) -> ProviderRole {
        self.role
    }

    fn rate_budget(&self) -> RateBudgetConfig {
        self.budget
    }

    fn lookup_key(&self) -> LookupKey {
        self.key
    }

    async fn fetch(&self, query: &ProviderQuery) -> Result<ProfileFragment, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(frag) = self.by_isrc.get(query.isrc.as_str()) {
            return Ok(frag.clone());
        }
        match &self.default_reply {
            Reply::Fragment(f) => Ok(f.clone()),
            Reply::Error(e) => Err(e.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isrc::Isrc;

    #[tokio::test]
    async fn per_isrc_answers_win_over_default() {
        let p = StaticProvider::new(ProviderId::Spotify)
            .respond(ProfileFragment::not_listed())
            .respond_for(
                "usrc17607839",
                ProfileFragment {
                    artist_name: Some("Known".into()),
                    ..Default::default()
                },
            );
        let known = ProviderQuery::new(Isrc::parse("USRC17607839").unwrap());
        let other = ProviderQuery::new(Isrc::parse("GBAYE0601498").unwrap());

        assert_eq!(
            p.fetch(&known).await.unwrap().artist_name.as_deref(),
            Some("Known")
        );
        assert_eq!(p.fetch(&other).await.unwrap().listed, Some(false));
        assert_eq!(p.calls(), 2);
    }

    #[test]
    fn loads_fixture_sets() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fixtures.json");
        std::fs::write(
            &path,
            r#"{
                "lastfm": { "role": "enrichment", "keyed_by_artist": true,
                            "isrcs": { "USRC17607839": { "listeners": 25000 } } },
                "musicbrainz": { "isrcs": { "USRC17607839": { "artist_name": "A" } } }
            }"#,
        )
        .unwrap();

        let set = StaticProvider::load_set(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set[0].id(), ProviderId::MusicBrainz);
        assert_eq!(set[1].lookup_key(), LookupKey::ArtistName);
        assert_eq!(ProviderClient::role(&set[1]), ProviderRole::Enrichment);
    }
}

// src/config/providers.rs
//! Which providers run and with which credentials.
//!
//! ```toml
//! labels_path = "config/labels.json"   # optional label directory override
//!
//! [spotify]
//! enabled = true
//! client_id = "ENV"        # read SPOTIFY_CLIENT_ID
//! client_secret = "ENV"    # read SPOTIFY_CLIENT_SECRET
//! ```
//! A provider whose credentials are missing is disabled with a warning; the
//! service still starts.

use crate::label::LabelDirectory;
use crate::providers::{
    lastfm::LastFmClient, musicbrainz::MusicBrainzClient, spotify::SpotifyClient,
    youtube::YouTubeClient, ProviderClient, ProviderError,
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const ENV_PROVIDERS_CONFIG_PATH: &str = "PROVIDERS_CONFIG_PATH";
pub const DEFAULT_PROVIDERS_CONFIG_PATH: &str = "config/providers.toml";

pub const ENV_SPOTIFY_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
pub const ENV_SPOTIFY_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
pub const ENV_LASTFM_API_KEY: &str = "LASTFM_API_KEY";
pub const ENV_YOUTUBE_API_KEY: &str = "YOUTUBE_API_KEY";

fn yes() -> bool {
    true
}

fn env_marker() -> String {
    "ENV".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicBrainzSettings {
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotifySettings {
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default = "env_marker")]
    pub client_id: String,
    #[serde(default = "env_marker")]
    pub client_secret: String,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
}

/// Shared shape of API-key providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedSettings {
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default = "env_marker")]
    pub api_key: String,
    #[serde(default)]
    pub api_url: Option<String>,
}

impl Default for MusicBrainzSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
        }
    }
}

impl Default for SpotifySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id: env_marker(),
            client_secret: env_marker(),
            api_url: None,
            token_url: None,
        }
    }
}

impl Default for KeyedSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: env_marker(),
            api_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub labels_path: Option<PathBuf>,
    pub musicbrainz: MusicBrainzSettings,
    pub spotify: SpotifySettings,
    pub lastfm: KeyedSettings,
    pub youtube: KeyedSettings,
}

impl ProvidersConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading providers config from {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// 1) $PROVIDERS_CONFIG_PATH (must exist)
    /// 2) config/providers.toml
    /// 3) built-in defaults (everything enabled, secrets from env)
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_PROVIDERS_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
            return Err(anyhow!(
                "{ENV_PROVIDERS_CONFIG_PATH} points to non-existent path {}",
                pb.display()
            ));
        }
        let fallback = PathBuf::from(DEFAULT_PROVIDERS_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from_file(&fallback);
        }
        Ok(Self::default())
    }

    pub fn labels(&self) -> LabelDirectory {
        match &self.labels_path {
            Some(p) => LabelDirectory::load_from_file(p),
            None => LabelDirectory::default_seed(),
        }
    }

    /// Instantiate enabled providers. Misconfigured ones are skipped.
    pub fn build_providers(&self) -> Vec<Arc<dyn ProviderClient>> {
        let mut out: Vec<Arc<dyn ProviderClient>> = Vec::new();

        if self.musicbrainz.enabled {
            keep(
                &mut out,
                "musicbrainz",
                MusicBrainzClient::new(self.musicbrainz.base_url.clone()),
            );
        }

        if self.spotify.enabled {
            let client = match (
                resolve_secret(&self.spotify.client_id, ENV_SPOTIFY_CLIENT_ID),
                resolve_secret(&self.spotify.client_secret, ENV_SPOTIFY_CLIENT_SECRET),
            ) {
                (Some(id), Some(secret)) => SpotifyClient::new(id, secret).map(|c| {
                    c.with_urls(
                        self.spotify.api_url.clone(),
                        self.spotify.token_url.clone(),
                    )
                }),
                _ => Err(ProviderError::NotConfigured(format!(
                    "set {ENV_SPOTIFY_CLIENT_ID} and {ENV_SPOTIFY_CLIENT_SECRET}"
                ))),
            };
            keep(&mut out, "spotify", client);
        }

        if self.lastfm.enabled {
            let client = match resolve_secret(&self.lastfm.api_key, ENV_LASTFM_API_KEY) {
                Some(key) => LastFmClient::new(key, self.lastfm.api_url.clone()),
                None => Err(ProviderError::NotConfigured(format!(
                    "set {ENV_LASTFM_API_KEY}"
                ))),
            };
            keep(&mut out, "lastfm", client);
        }

        if self.youtube.enabled {
            let client = match resolve_secret(&self.youtube.api_key, ENV_YOUTUBE_API_KEY) {
                Some(key) => YouTubeClient::new(key, self.youtube.api_url.clone()),
                None => Err(ProviderError::NotConfigured(format!(
                    "set {ENV_YOUTUBE_API_KEY}"
                ))),
            };
            keep(&mut out, "youtube", client);
        }

        info!(count = out.len(), "providers configured");
        out
    }
}

fn keep<P: ProviderClient + 'static>(
    out: &mut Vec<Arc<dyn ProviderClient>>,
    name: &str,
    built: Result<P, ProviderError>,
) {
    match built {
        Ok(p) => out.push(Arc::new(p)),
        Err(e) => warn!(target: "providers", provider = name, error = %e, "provider disabled"),
    }
}

/// `"ENV"` (any case) reads `env_name`; blank values count as missing.
pub fn resolve_secret(value: &str, env_name: &str) -> Option<String> {
    let v = value.trim();
    let resolved = if v.eq_ignore_ascii_case("env") {
        env::var(env_name).ok()?
    } else {
        v.to_string()
    };
    let resolved = resolved.trim().to_string();
    (!resolved.is_empty()).then_some(resolved)
}

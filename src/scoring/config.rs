// src/scoring/config.rs
//! Scoring configuration: weights, tier thresholds and rule tables.
//!
//! TOML shape (every section optional, missing keys fall back to defaults):
//! ```toml
//! [weights]
//! independence = 40
//! opportunity = 40
//! geographic = 20
//!
//! [tiers]
//! a = 70.0
//! b = 50.0
//! c = 30.0
//!
//! [geographic.regions]
//! NZ = 30
//! AU = 25
//! ```
//!
//! Loaded once at startup and validated by `ScoringEngine::new`.

use crate::label::LabelType;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_SCORING_CONFIG_PATH: &str = "SCORING_CONFIG_PATH";
pub const DEFAULT_SCORING_CONFIG_PATH: &str = "config/scoring.toml";

pub const TIER_A_MIN: f64 = 70.0;
pub const TIER_B_MIN: f64 = 50.0;
pub const TIER_C_MIN: f64 = 30.0;

/// A present secondary channel underperforms when its subscribers are below
/// this fraction of the primary popularity metric. Tunable via
/// `opportunity.underperforming_ratio`.
pub const UNDERPERFORMING_CHANNEL_RATIO: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("weights must sum to 100, got {0}")]
    WeightsSum(u32),
    #[error("tier thresholds must be strictly descending within (0, 100], got a={a} b={b} c={c}")]
    Thresholds { a: f64, b: f64, c: f64 },
    #[error("{0} table has no positive points")]
    EmptyTable(&'static str),
    #[error("opportunity cap must be positive")]
    ZeroCap,
    #[error("underperforming ratio must be within (0, 1], got {0}")]
    Ratio(f64),
    #[error("popularity bands invalid: {0}")]
    Bands(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub independence: u32,
    pub opportunity: u32,
    pub geographic: u32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            independence: 40,
            opportunity: 40,
            geographic: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            a: TIER_A_MIN,
            b: TIER_B_MIN,
            c: TIER_C_MIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndependenceTable {
    pub self_released: u32,
    pub indie: u32,
    pub distributor: u32,
    pub major: u32,
    /// No label data.
    pub unknown: u32,
}

impl Default for IndependenceTable {
    fn default() -> Self {
        Self {
            self_released: 40,
            indie: 30,
            distributor: 20,
            major: 5,
            unknown: 5,
        }
    }
}

impl IndependenceTable {
    pub fn points(&self, label: Option<LabelType>) -> u32 {
        match label {
            Some(LabelType::SelfReleased) => self.self_released,
            Some(LabelType::Indie) => self.indie,
            Some(LabelType::Distributor) => self.distributor,
            Some(LabelType::Major) => self.major,
            None => self.unknown,
        }
    }

    pub fn max(&self) -> u32 {
        [
            self.self_released,
            self.indie,
            self.distributor,
            self.major,
            self.unknown,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeographicTable {
    /// Unlisted or unknown country.
    pub default: u32,
    /// ISO 3166-1 alpha-2 → points.
    pub regions: BTreeMap<String, u32>,
}

impl Default for GeographicTable {
    fn default() -> Self {
        let regions = [
            ("NZ", 30),
            ("AU", 25),
            ("GB", 20),
            ("IE", 20),
            ("CA", 15),
            ("US", 15),
            ("DE", 10),
            ("NL", 10),
            ("SE", 10),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            default: 5,
            regions,
        }
    }
}

impl GeographicTable {
    pub fn points(&self, country: Option<&str>) -> u32 {
        country
            .and_then(|c| self.regions.get(&c.trim().to_ascii_uppercase()))
            .copied()
            .unwrap_or(self.default)
    }

    pub fn max(&self) -> u32 {
        self.regions
            .values()
            .copied()
            .chain(std::iter::once(self.default))
            .max()
            .unwrap_or(0)
    }
}

/// Half-open listener band `[min, max)`; `max = None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularityBand {
    pub name: String,
    pub min: i64,
    #[serde(default)]
    pub max: Option<i64>,
    pub points: u32,
}

impl PopularityBand {
    fn new(name: &str, min: i64, max: Option<i64>, points: u32) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
            points,
        }
    }

    pub fn contains(&self, listeners: i64) -> bool {
        listeners >= self.min && self.max.map_or(true, |m| listeners < m)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpportunityRules {
    pub cap: u32,
    /// Lookup ran, no secondary channel exists.
    pub no_channel: u32,
    pub underperforming_channel: u32,
    pub underperforming_ratio: f64,
    /// Some provider reported the artist as not listed.
    pub missing_platform: u32,
    pub distribution_breadth: u32,
    pub breadth_min_platforms: usize,
    pub recent_release: u32,
    pub recent_release_months: u32,
    pub active_release: u32,
    pub active_release_months: u32,
    pub bands: Vec<PopularityBand>,
}

impl Default for OpportunityRules {
    fn default() -> Self {
        Self {
            cap: 100,
            no_channel: 30,
            underperforming_channel: 15,
            underperforming_ratio: UNDERPERFORMING_CHANNEL_RATIO,
            missing_platform: 10,
            distribution_breadth: 10,
            breadth_min_platforms: 2,
            recent_release: 20,
            recent_release_months: 6,
            active_release: 10,
            active_release_months: 18,
            bands: vec![
                PopularityBand::new("nascent", 0, Some(1_000), 5),
                PopularityBand::new("emerging", 1_000, Some(10_000), 15),
                PopularityBand::new("growing", 10_000, Some(100_000), 25),
                PopularityBand::new("established", 100_000, Some(1_000_000), 15),
                PopularityBand::new("mainstream", 1_000_000, None, 0),
            ],
        }
    }
}

impl OpportunityRules {
    pub fn band_for(&self, listeners: i64) -> Option<&PopularityBand> {
        self.bands.iter().find(|b| b.contains(listeners))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: Weights,
    pub tiers: TierThresholds,
    pub independence: IndependenceTable,
    pub opportunity: OpportunityRules,
    pub geographic: GeographicTable,
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ScoringError> {
        let w = self.weights;
        let sum = w.independence + w.opportunity + w.geographic;
        if sum != 100 {
            return Err(ScoringError::WeightsSum(sum));
        }

        let t = self.tiers;
        let in_range = |x: f64| x > 0.0 && x <= 100.0;
        if !(in_range(t.a) && in_range(t.b) && in_range(t.c) && t.a > t.b && t.b > t.c) {
            return Err(ScoringError::Thresholds {
                a: t.a,
                b: t.b,
                c: t.c,
            });
        }

        if self.independence.max() == 0 {
            return Err(ScoringError::EmptyTable("independence"));
        }
        if self.geographic.max() == 0 {
            return Err(ScoringError::EmptyTable("geographic"));
        }

        let o = &self.opportunity;
        if o.cap == 0 {
            return Err(ScoringError::ZeroCap);
        }
        if !(o.underperforming_ratio > 0.0 && o.underperforming_ratio <= 1.0) {
            return Err(ScoringError::Ratio(o.underperforming_ratio));
        }
        validate_bands(&o.bands)
    }

    /// Load from TOML.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading scoring config from {}", path.display()))?;
        let cfg: ScoringConfig = toml::from_str(&content)
            .with_context(|| format!("parsing scoring config {}", path.display()))?;
        Ok(cfg)
    }

    /// Env var + fallbacks:
    /// 1) $SCORING_CONFIG_PATH
    /// 2) config/scoring.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_SCORING_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
            return Err(anyhow!(
                "{ENV_SCORING_CONFIG_PATH} points to non-existent path {}",
                pb.display()
            ));
        }
        let default_path = PathBuf::from(DEFAULT_SCORING_CONFIG_PATH);
        if default_path.exists() {
            return Self::load_from_file(&default_path);
        }
        Ok(Self::default())
    }
}

fn validate_bands(bands: &[PopularityBand]) -> Result<(), ScoringError> {
    let mut prev_max: Option<i64> = None;
    for (i, b) in bands.iter().enumerate() {
        if let Some(max) = b.max {
            if max <= b.min {
                return Err(ScoringError::Bands(format!("band '{}' is empty", b.name)));
            }
        } else if i + 1 != bands.len() {
            return Err(ScoringError::Bands(format!(
                "unbounded band '{}' must be last",
                b.name
            )));
        }
        if let Some(pm) = prev_max {
            if b.min < pm {
                return Err(ScoringError::Bands(format!(
                    "band '{}' overlaps its predecessor",
                    b.name
                )));
            }
        }
        prev_max = b.max;
    }
    Ok(())
}

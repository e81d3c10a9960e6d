// src/scoring/mod.rs
//! # Scoring Engine
//! Pure, deterministic mapping `MergedProfile` → `LeadScore`. No I/O, no
//! clock: release recency is measured against the profile's own `as_of`.
//!
//! Sub-scores are integer points clamped to their table maximum
//! (opportunity to its cap). The total rescales each sub-score to a fraction
//! of its maximum and weights it (weights sum to 100), giving 0–100.

pub mod config;

use crate::profile::{MergedProfile, SecondaryChannel};
use chrono::Months;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use config::{
    ScoringConfig, ScoringError, TierThresholds, TIER_A_MIN, TIER_B_MIN, TIER_C_MIN,
    UNDERPERFORMING_CHANNEL_RATIO,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    A,
    B,
    C,
    D,
}

impl Tier {
    pub fn for_total(total: f64, t: &TierThresholds) -> Tier {
        if total >= t.a {
            Tier::A
        } else if total >= t.b {
            Tier::B
        } else if total >= t.c {
            Tier::C
        } else {
            Tier::D
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
            Tier::D => "D",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    pub independence: u32,
    pub opportunity: u32,
    pub geographic: u32,
    /// Weighted total in [0, 100].
    pub total: f64,
    pub tier: Tier,
    /// Share of expected data groups present, in percent.
    pub confidence: u8,
    /// Rules that contributed points, in evaluation order.
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    /// Validates once; a bad configuration is a startup error.
    pub fn new(config: ScoringConfig) -> Result<Self, ScoringError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: ScoringConfig::default(),
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, profile: &MergedProfile) -> LeadScore {
        let cfg = &self.config;
        let mut reasons = Vec::new();

        // 1) Independence
        let independence = cfg
            .independence
            .points(profile.label_type)
            .min(cfg.independence.max());
        match profile.label_type {
            Some(t) => reasons.push(format!("independence: {} (+{independence})", label_name(t))),
            None => reasons.push(format!("independence: unknown label (+{independence})")),
        }

        // 2) Opportunity
        let opportunity = self.opportunity(profile, &mut reasons);

        // 3) Geographic
        let geographic = cfg
            .geographic
            .points(profile.country.as_deref())
            .min(cfg.geographic.max());
        reasons.push(format!(
            "geographic: {} (+{geographic})",
            profile.country.as_deref().unwrap_or("unknown")
        ));

        // 4) Total
        let w = cfg.weights;
        let total = fraction(independence, cfg.independence.max()) * f64::from(w.independence)
            + fraction(opportunity, cfg.opportunity.cap) * f64::from(w.opportunity)
            + fraction(geographic, cfg.geographic.max()) * f64::from(w.geographic);
        let total = total.clamp(0.0, 100.0);

        LeadScore {
            independence,
            opportunity,
            geographic,
            total,
            tier: Tier::for_total(total, &cfg.tiers),
            confidence: confidence(profile),
            reasons,
        }
    }

    fn opportunity(&self, profile: &MergedProfile, reasons: &mut Vec<String>) -> u32 {
        let rules = &self.config.opportunity;
        let listeners = profile.listeners.map(|l| l.max(0));
        let mut points: u32 = 0;
        let mut add = |pts: u32, why: String| {
            if pts > 0 {
                points = points.saturating_add(pts);
                reasons.push(format!("opportunity: {why} (+{pts})"));
            }
        };

        match (&profile.secondary_channel, listeners) {
            (Some(SecondaryChannel::Absent), _) => {
                add(rules.no_channel, "no secondary channel".into());
            }
            (Some(SecondaryChannel::Present(ch)), Some(l)) => {
                let subs = ch.subscribers.max(0) as f64;
                if subs < rules.underperforming_ratio * l as f64 {
                    add(
                        rules.underperforming_channel,
                        "underperforming secondary channel".into(),
                    );
                }
            }
            _ => {}
        }

        if let Some(l) = listeners {
            if let Some(band) = rules.band_for(l) {
                add(band.points, format!("{} popularity band", band.name));
            }
        }

        if profile.has_unlisted_platform() {
            add(rules.missing_platform, "missing platform presence".into());
        }

        if profile.listed_platform_count() >= rules.breadth_min_platforms {
            add(rules.distribution_breadth, "distribution breadth".into());
        }

        if let Some(release) = profile.latest_release {
            if within_months(release, profile, rules.recent_release_months) {
                add(rules.recent_release, "recent release".into());
            } else if within_months(release, profile, rules.active_release_months) {
                add(rules.active_release, "active release window".into());
            }
        }

        points.min(rules.cap)
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn fraction(value: u32, max: u32) -> f64 {
    if max == 0 {
        0.0
    } else {
        f64::from(value.min(max)) / f64::from(max)
    }
}

/// Release on or after `as_of - months` (future dates count as recent).
fn within_months(release: chrono::NaiveDate, profile: &MergedProfile, months: u32) -> bool {
    match profile.as_of.checked_sub_months(Months::new(months)) {
        Some(cutoff) => release >= cutoff,
        None => true,
    }
}

/// Equal share per present data group: label, popularity, geography,
/// secondary channel.
fn confidence(profile: &MergedProfile) -> u8 {
    let groups = [
        profile.has_label_info(),
        profile.has_popularity_info(),
        profile.has_geographic_info(),
        profile.has_channel_info(),
    ];
    let present = groups.iter().filter(|g| **g).count();
    (present * 100 / groups.len()) as u8
}

fn label_name(t: crate::label::LabelType) -> &'static str {
    use crate::label::LabelType::*;
    match t {
        SelfReleased => "self-released",
        Indie => "indie label",
        Distributor => "distributor",
        Major => "major label",
    }
}

// src/lib.rs
// Public library surface for the service binary, the batch binary and tests.

pub mod api;
pub mod batch;
pub mod config;
pub mod contacts;
pub mod isrc;
pub mod label;
pub mod metrics;
pub mod pipeline;
pub mod profile;
pub mod providers;
pub mod ratelimit;
pub mod scoring;
pub mod service;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::batch::{BatchConfig, BatchDriver, BatchReport};
pub use crate::isrc::{Isrc, IsrcError};
pub use crate::pipeline::{
    AggregationPipeline, FetchMode, PipelineConfig, PipelineError, PipelineResult,
    ProcessOptions, ProviderOutcome, ProviderResult, SkipReason,
};
pub use crate::profile::{MergedProfile, ProfileFragment};
pub use crate::providers::{ProviderClient, ProviderId, ProviderRole, StaticProvider};
pub use crate::ratelimit::{RateBudgetConfig, RateLimitManager};
pub use crate::scoring::{LeadScore, ScoringConfig, ScoringEngine, Tier};
pub use crate::service::{LeadReport, LeadService};

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::providers::ProvidersConfig;
use crate::config::AppConfig;
use crate::store::InMemoryLeadStore;

pub const DEFAULT_LOG_FILTER: &str = "isrc_lead_scout=info,warn";

/// Compact logs by default; `LOG_FORMAT=json` for JSON lines. Filter from
/// `RUST_LOG`. A no-op when a subscriber is already installed.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Wire scoring, providers, pipeline and an in-memory store from `cfg`.
pub fn build_service(cfg: &AppConfig) -> Result<LeadService> {
    let scoring = match &cfg.scoring_config_path {
        Some(p) => ScoringConfig::load_from_file(p)?,
        None => ScoringConfig::load_default()?,
    };
    let engine = ScoringEngine::new(scoring).context("invalid scoring configuration")?;

    let providers_cfg = match &cfg.providers_config_path {
        Some(p) => ProvidersConfig::load_from_file(p)?,
        None => ProvidersConfig::load_default()?,
    };
    let providers = providers_cfg.build_providers();
    if providers.is_empty() {
        warn!("no providers enabled; every lead will score from an empty profile");
    }

    let pipeline = AggregationPipeline::new(providers, cfg.pipeline_config())
        .with_labels(providers_cfg.labels());
    info!(order = ?pipeline.provider_order(), mode = ?cfg.fetch_mode, "pipeline ready");

    Ok(LeadService::new(Arc::new(pipeline), Arc::new(engine))
        .with_store(Arc::new(InMemoryLeadStore::new())))
}

/// Full HTTP application: API routes plus `/metrics`.
pub async fn app() -> Result<Router> {
    let metrics = crate::metrics::Metrics::init()?;
    let cfg = AppConfig::from_env()?;
    let service = build_service(&cfg)?;
    Ok(router(AppState::new(Arc::new(service))).merge(metrics.router()))
}

// src/pipeline.rs
//! # Aggregation pipeline
//! Validates an ISRC, calls every provider under its rate budget and a call
//! timeout, and merges fragments into one `MergedProfile`.
//!
//! - Providers are ordered once by role (identity, enrichment, optional),
//!   ties by registration order. That order is the merge priority.
//! - Failures, timeouts and rate-limit denials are recorded per provider;
//!   the run always continues.
//! - Name-keyed providers run only once an artist name is known.
//! - `Concurrent` mode runs ISRC-keyed providers together, then name-keyed
//!   ones, and merges all successes in priority order afterwards.

use crate::isrc::{Isrc, IsrcError};
use crate::label::LabelDirectory;
use crate::profile::MergedProfile;
use crate::providers::{LookupKey, ProviderClient, ProviderId, ProviderQuery, ProviderRole};
use crate::ratelimit::{Clock, RateLimitManager};
use chrono::{NaiveDate, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Sequential,
    Concurrent,
}

impl std::str::FromStr for FetchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(FetchMode::Sequential),
            "concurrent" | "parallel" => Ok(FetchMode::Concurrent),
            other => Err(format!("unknown fetch mode: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub call_timeout: Duration,
    /// Longest a single provider call may wait for rate budget.
    pub max_wait: Duration,
    pub fetch_mode: FetchMode,
    /// Pins `MergedProfile::as_of`; today (UTC) when unset.
    pub reference_date: Option<NaiveDate>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_wait: DEFAULT_MAX_WAIT,
            fetch_mode: FetchMode::Sequential,
            reference_date: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    pub persist: bool,
    pub force_refresh: bool,
    pub include_optional_providers: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            persist: true,
            force_refresh: false,
            include_optional_providers: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    RateLimited { retry_after_ms: u64 },
    MissingArtistName,
    /// Optional provider left out by the caller. Not counted as attempted.
    Excluded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderResult {
    Success {
        fragment: crate::profile::ProfileFragment,
    },
    Failure {
        error: String,
    },
    Skipped {
        #[serde(flatten)]
        reason: SkipReason,
    },
}

impl ProviderResult {
    fn label(&self) -> &'static str {
        match self {
            ProviderResult::Success { .. } => "success",
            ProviderResult::Failure { .. } => "failure",
            ProviderResult::Skipped {
                reason: SkipReason::RateLimited { .. },
            } => "rate_limited",
            ProviderResult::Skipped {
                reason: SkipReason::MissingArtistName,
            } => "missing_artist_name",
            ProviderResult::Skipped {
                reason: SkipReason::Excluded,
            } => "excluded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderOutcome {
    pub provider: ProviderId,
    pub role: ProviderRole,
    pub result: ProviderResult,
    pub elapsed_ms: u64,
}

impl ProviderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, ProviderResult::Success { .. })
    }

    /// Attempted = not excluded by options.
    pub fn is_attempted(&self) -> bool {
        !matches!(
            self.result,
            ProviderResult::Skipped {
                reason: SkipReason::Excluded
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub isrc: Isrc,
    pub profile: MergedProfile,
    /// In provider priority order.
    pub outcomes: Vec<ProviderOutcome>,
    pub errors: Vec<String>,
    /// 100 × successes / attempted.
    pub confidence: u8,
    pub elapsed_ms: u64,
}

impl PipelineResult {
    pub fn outcome(&self, provider: ProviderId) -> Option<&ProviderOutcome> {
        self.outcomes.iter().find(|o| o.provider == provider)
    }

    /// Largest rate-limit hint of this run, if any provider was denied.
    pub fn retry_after(&self) -> Option<Duration> {
        retry_after(&self.outcomes)
    }

    /// A provider failed or was rate limited; another run could do better.
    pub fn needs_retry(&self) -> bool {
        needs_retry(&self.outcomes)
    }
}

pub fn retry_after(outcomes: &[ProviderOutcome]) -> Option<Duration> {
    outcomes
        .iter()
        .filter_map(|o| match o.result {
            ProviderResult::Skipped {
                reason: SkipReason::RateLimited { retry_after_ms },
            } => Some(Duration::from_millis(retry_after_ms)),
            _ => None,
        })
        .max()
}

pub fn needs_retry(outcomes: &[ProviderOutcome]) -> bool {
    outcomes.iter().any(|o| {
        matches!(
            o.result,
            ProviderResult::Failure { .. }
                | ProviderResult::Skipped {
                    reason: SkipReason::RateLimited { .. }
                }
        )
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("invalid ISRC: {0}")]
    Validation(#[from] IsrcError),
    #[error("processing cancelled")]
    Cancelled,
}

pub struct AggregationPipeline {
    providers: Vec<Arc<dyn ProviderClient>>,
    limiter: Arc<RateLimitManager>,
    labels: Arc<LabelDirectory>,
    config: PipelineConfig,
}

impl AggregationPipeline {
    /// Builds a rate limiter from the providers' declared budgets.
    pub fn new(providers: Vec<Arc<dyn ProviderClient>>, config: PipelineConfig) -> Self {
        let limiter = Arc::new(limiter_for(&providers, None));
        Self::with_limiter(providers, limiter, config)
    }

    /// Shares an existing limiter (status endpoint, tests with a manual clock).
    pub fn with_limiter(
        mut providers: Vec<Arc<dyn ProviderClient>>,
        limiter: Arc<RateLimitManager>,
        config: PipelineConfig,
    ) -> Self {
        crate::metrics::ensure_metrics_described();
        // Stable: equal roles keep registration order.
        providers.sort_by_key(|p| p.role());
        Self {
            providers,
            limiter,
            labels: Arc::new(LabelDirectory::default_seed()),
            config,
        }
    }

    pub fn with_labels(mut self, labels: LabelDirectory) -> Self {
        self.labels = Arc::new(labels);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimitManager> {
        &self.limiter
    }

    pub fn labels(&self) -> &LabelDirectory {
        &self.labels
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Provider ids in priority order.
    pub fn provider_order(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub async fn process(
        &self,
        identifier: &str,
        options: ProcessOptions,
    ) -> Result<PipelineResult, PipelineError> {
        self.process_with_cancel(identifier, options, &CancellationToken::new())
            .await
    }

    pub async fn process_with_cancel(
        &self,
        identifier: &str,
        options: ProcessOptions,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult, PipelineError> {
        let isrc = match Isrc::parse(identifier) {
            Ok(i) => i,
            Err(e) => {
                counter!("pipeline_validation_errors_total").increment(1);
                warn!(target: "pipeline", identifier, error = %e, "rejected identifier");
                return Err(e.into());
            }
        };
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        counter!("pipeline_runs_total").increment(1);
        let started = Instant::now();
        let as_of = self
            .config
            .reference_date
            .unwrap_or_else(|| Utc::now().date_naive());
        info!(target: "pipeline", isrc = %isrc, mode = ?self.config.fetch_mode, "processing");

        let slots = match self.config.fetch_mode {
            FetchMode::Sequential => self.run_sequential(&isrc, as_of, options, cancel).await?,
            FetchMode::Concurrent => self.run_concurrent(&isrc, as_of, options, cancel).await?,
        };

        // Final merge in priority order, whatever the arrival order was.
        let mut profile = MergedProfile::new(isrc.clone(), as_of);
        let mut outcomes = Vec::with_capacity(slots.len());
        let mut errors = Vec::new();
        for outcome in slots {
            counter!(
                "provider_outcomes_total",
                "provider" => outcome.provider.as_str(),
                "outcome" => outcome.result.label()
            )
            .increment(1);
            match &outcome.result {
                ProviderResult::Success { fragment } => {
                    profile.absorb(outcome.provider, fragment.clone())
                }
                ProviderResult::Failure { error } => {
                    errors.push(format!("{}: {error}", outcome.provider))
                }
                ProviderResult::Skipped {
                    reason: SkipReason::RateLimited { retry_after_ms },
                } => errors.push(format!(
                    "{}: rate limited, retry after {retry_after_ms}ms",
                    outcome.provider
                )),
                ProviderResult::Skipped { .. } => {}
            }
            outcomes.push(outcome);
        }
        profile.finalize(&self.labels);

        let attempted = outcomes.iter().filter(|o| o.is_attempted()).count();
        let successes = outcomes.iter().filter(|o| o.is_success()).count();
        let confidence = if attempted == 0 {
            0
        } else {
            (successes * 100 / attempted) as u8
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            target: "pipeline",
            isrc = %isrc,
            attempted,
            successes,
            confidence,
            elapsed_ms,
            "processed"
        );

        Ok(PipelineResult {
            isrc,
            profile,
            outcomes,
            errors,
            confidence,
            elapsed_ms,
        })
    }

    async fn run_sequential(
        &self,
        isrc: &Isrc,
        as_of: NaiveDate,
        options: ProcessOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProviderOutcome>, PipelineError> {
        // Running merge, only used to learn the artist name early.
        let mut partial = MergedProfile::new(isrc.clone(), as_of);
        let mut out = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            if let Some(skipped) = pre_skip(provider.as_ref(), options, &partial) {
                out.push(skipped);
                continue;
            }
            let query = ProviderQuery::new(isrc.clone()).with_artist(partial.artist_name.clone());
            let call = call_provider(
                Arc::clone(provider),
                Arc::clone(&self.limiter),
                query,
                self.config.call_timeout,
                self.config.max_wait,
            );
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(target: "pipeline", isrc = %isrc, provider = %provider.id(), "cancelled");
                    return Err(PipelineError::Cancelled);
                }
                o = call => o,
            };
            if let ProviderResult::Success { fragment } = &outcome.result {
                partial.absorb(outcome.provider, fragment.clone());
            }
            out.push(outcome);
        }
        Ok(out)
    }

    async fn run_concurrent(
        &self,
        isrc: &Isrc,
        as_of: NaiveDate,
        options: ProcessOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProviderOutcome>, PipelineError> {
        let mut slots: Vec<Option<ProviderOutcome>> = vec![None; self.providers.len()];

        for stage in [LookupKey::Isrc, LookupKey::ArtistName] {
            // Artist name from everything merged so far, in priority order.
            let mut partial = MergedProfile::new(isrc.clone(), as_of);
            for o in slots.iter().flatten() {
                if let ProviderResult::Success { fragment } = &o.result {
                    partial.absorb(o.provider, fragment.clone());
                }
            }

            let mut set = JoinSet::new();
            for (idx, provider) in self.providers.iter().enumerate() {
                if provider.lookup_key() != stage {
                    continue;
                }
                if let Some(skipped) = pre_skip(provider.as_ref(), options, &partial) {
                    slots[idx] = Some(skipped);
                    continue;
                }
                let query =
                    ProviderQuery::new(isrc.clone()).with_artist(partial.artist_name.clone());
                let fut = call_provider(
                    Arc::clone(provider),
                    Arc::clone(&self.limiter),
                    query,
                    self.config.call_timeout,
                    self.config.max_wait,
                );
                set.spawn(async move { (idx, fut.await) });
            }

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        set.abort_all();
                        warn!(target: "pipeline", isrc = %isrc, "cancelled");
                        return Err(PipelineError::Cancelled);
                    }
                    n = set.join_next() => n,
                };
                match next {
                    None => break,
                    Some(Ok((idx, outcome))) => slots[idx] = Some(outcome),
                    Some(Err(e)) => {
                        warn!(target: "pipeline", isrc = %isrc, error = %e, "provider task failed")
                    }
                }
            }
        }

        // A panicked task leaves its slot empty; report it as a failure.
        Ok(slots
            .into_iter()
            .zip(&self.providers)
            .map(|(slot, p)| {
                slot.unwrap_or_else(|| ProviderOutcome {
                    provider: p.id(),
                    role: p.role(),
                    result: ProviderResult::Failure {
                        error: "provider task aborted".into(),
                    },
                    elapsed_ms: 0,
                })
            })
            .collect())
    }
}

/// Rate limiter preloaded with each provider's declared budget.
pub fn limiter_for(
    providers: &[Arc<dyn ProviderClient>],
    clock: Option<Arc<dyn Clock>>,
) -> RateLimitManager {
    let base = match clock {
        Some(c) => RateLimitManager::with_clock(c),
        None => RateLimitManager::new(),
    };
    providers
        .iter()
        .fold(base, |m, p| m.with_budget(p.id(), p.rate_budget()))
}

/// Skips decided before touching the limiter.
fn pre_skip(
    provider: &dyn ProviderClient,
    options: ProcessOptions,
    partial: &MergedProfile,
) -> Option<ProviderOutcome> {
    let reason = if provider.role() == ProviderRole::Optional && !options.include_optional_providers
    {
        SkipReason::Excluded
    } else if provider.lookup_key() == LookupKey::ArtistName && partial.artist_name.is_none() {
        SkipReason::MissingArtistName
    } else {
        return None;
    };
    debug!(target: "pipeline", provider = %provider.id(), ?reason, "skipped");
    Some(ProviderOutcome {
        provider: provider.id(),
        role: provider.role(),
        result: ProviderResult::Skipped { reason },
        elapsed_ms: 0,
    })
}

async fn call_provider(
    provider: Arc<dyn ProviderClient>,
    limiter: Arc<RateLimitManager>,
    query: ProviderQuery,
    call_timeout: Duration,
    max_wait: Duration,
) -> ProviderOutcome {
    let id = provider.id();
    let role = provider.role();
    let started = Instant::now();

    let permit = limiter.acquire(id, max_wait).await;
    if !permit.granted {
        let retry_after = permit.retry_after.unwrap_or_default();
        warn!(
            target: "pipeline",
            provider = %id,
            retry_after_ms = retry_after.as_millis() as u64,
            "rate budget exhausted"
        );
        return ProviderOutcome {
            provider: id,
            role,
            result: ProviderResult::Skipped {
                reason: SkipReason::RateLimited {
                    retry_after_ms: retry_after.as_millis() as u64,
                },
            },
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
    }

    let fetch_started = Instant::now();
    let result = match tokio::time::timeout(call_timeout, provider.fetch(&query)).await {
        Ok(Ok(fragment)) => ProviderResult::Success { fragment },
        Ok(Err(e)) => {
            warn!(target: "providers", provider = %id, error = %e, "provider call failed");
            ProviderResult::Failure {
                error: e.to_string(),
            }
        }
        Err(_) => {
            let e = crate::providers::ProviderError::Timeout(call_timeout);
            warn!(target: "providers", provider = %id, error = %e, "provider call timed out");
            ProviderResult::Failure {
                error: e.to_string(),
            }
        }
    };
    histogram!("provider_fetch_ms", "provider" => id.as_str())
        .record(fetch_started.elapsed().as_secs_f64() * 1_000.0);

    ProviderOutcome {
        provider: id,
        role,
        result,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

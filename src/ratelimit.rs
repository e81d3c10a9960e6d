//! # Rate Limit Manager
//! Rolling request budget per provider (e.g. 1 request / second for
//! MusicBrainz, 100 searches / 24h for YouTube).
//!
//! Each provider owns a log of granted request instants behind its own mutex.
//! Entries at least one window old are pruned lazily on every check. The
//! grant decision and the log append happen in one critical section with no
//! `.await` inside, so an `acquire` that is cancelled while sleeping leaves
//! the log untouched.

use crate::providers::ProviderId;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Source of "now". Injected so tests can run against a deterministic clock.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Tokio's clock; honours `tokio::time::pause` in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for unit tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut off = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *off += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let off = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + off
    }
}

/// Declared budget: at most `max_requests` within any trailing `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudgetConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateBudgetConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug)]
struct RateBudget {
    config: RateBudgetConfig,
    log: VecDeque<Instant>,
}

impl RateBudget {
    fn new(config: RateBudgetConfig) -> Self {
        Self {
            config,
            log: VecDeque::with_capacity(config.max_requests.min(1024) as usize),
        }
    }

    fn prune(&mut self, now: Instant) {
        let window = self.config.window();
        while let Some(&t) = self.log.front() {
            if now.saturating_duration_since(t) >= window {
                self.log.pop_front();
            } else {
                break;
            }
        }
    }

    /// Grants and logs `now`, or returns how long until the oldest entry
    /// leaves the window.
    fn try_grant(&mut self, now: Instant) -> Result<(), Duration> {
        self.prune(now);
        if (self.log.len() as u64) < u64::from(self.config.max_requests) {
            self.log.push_back(now);
            return Ok(());
        }
        let wait = match self.log.front() {
            Some(&oldest) => (oldest + self.config.window()).saturating_duration_since(now),
            None => self.config.window(),
        };
        Err(wait)
    }

    fn status(&mut self, provider: ProviderId, now: Instant) -> RateStatus {
        self.prune(now);
        let window_remaining = self
            .log
            .front()
            .map(|&oldest| (oldest + self.config.window()).saturating_duration_since(now))
            .unwrap_or_default();
        RateStatus {
            provider,
            used: self.log.len() as u32,
            limit: self.config.max_requests,
            window_secs: self.config.window_secs,
            window_remaining_ms: window_remaining.as_millis() as u64,
        }
    }
}

/// Snapshot for health/monitoring endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStatus {
    pub provider: ProviderId,
    pub used: u32,
    pub limit: u32,
    pub window_secs: u64,
    /// Time until the oldest logged request leaves the window (0 when idle).
    pub window_remaining_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireResult {
    pub granted: bool,
    pub waited: Duration,
    /// Set when denied: when the budget is expected to free up.
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {provider}; retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    pub provider: ProviderId,
    pub retry_after: Duration,
}

impl AcquireResult {
    pub fn into_result(self, provider: ProviderId) -> Result<Duration, RateLimitExceeded> {
        if self.granted {
            Ok(self.waited)
        } else {
            Err(RateLimitExceeded {
                provider,
                retry_after: self.retry_after.unwrap_or_default(),
            })
        }
    }
}

/// Shared, explicitly owned rate limiter. Build once at startup and pass
/// around in an `Arc`.
#[derive(Debug)]
pub struct RateLimitManager {
    clock: Arc<dyn Clock>,
    budgets: HashMap<ProviderId, Mutex<RateBudget>>,
}

impl RateLimitManager {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            budgets: HashMap::new(),
        }
    }

    /// Registers (or replaces) a provider's budget. Builder style.
    pub fn with_budget(mut self, provider: ProviderId, config: RateBudgetConfig) -> Self {
        self.budgets
            .insert(provider, Mutex::new(RateBudget::new(config)));
        self
    }

    pub fn is_registered(&self, provider: ProviderId) -> bool {
        self.budgets.contains_key(&provider)
    }

    fn attempt(&self, provider: ProviderId) -> Result<(), Duration> {
        let Some(budget) = self.budgets.get(&provider) else {
            // Unregistered providers are ungated.
            return Ok(());
        };
        let now = self.clock.now();
        let mut guard = budget.lock().unwrap_or_else(PoisonError::into_inner);
        guard.try_grant(now)
    }

    /// Non-blocking: grant and log now, or deny.
    pub fn try_acquire(&self, provider: ProviderId) -> bool {
        match self.attempt(provider) {
            Ok(()) => true,
            Err(_) => {
                counter!("ratelimit_denied_total", "provider" => provider.as_str()).increment(1);
                false
            }
        }
    }

    /// Waits for budget up to `max_wait`. Denies straight away (with the
    /// retry hint) when the expected wait does not fit in what is left.
    pub async fn acquire(&self, provider: ProviderId, max_wait: Duration) -> AcquireResult {
        let start = self.clock.now();
        loop {
            let waited = self.clock.now().saturating_duration_since(start);
            match self.attempt(provider) {
                Ok(()) => {
                    return AcquireResult {
                        granted: true,
                        waited,
                        retry_after: None,
                    }
                }
                Err(retry_after) => {
                    let retry_after = retry_after.max(Duration::from_millis(1));
                    let remaining = max_wait.saturating_sub(waited);
                    if retry_after > remaining {
                        counter!("ratelimit_denied_total", "provider" => provider.as_str())
                            .increment(1);
                        debug!(
                            target: "ratelimit",
                            %provider,
                            retry_after_ms = retry_after.as_millis() as u64,
                            "budget exhausted"
                        );
                        return AcquireResult {
                            granted: false,
                            waited,
                            retry_after: Some(retry_after),
                        };
                    }
                    debug!(
                        target: "ratelimit",
                        %provider,
                        wait_ms = retry_after.as_millis() as u64,
                        "waiting for budget"
                    );
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }

    pub fn status(&self, provider: ProviderId) -> Option<RateStatus> {
        let budget = self.budgets.get(&provider)?;
        let now = self.clock.now();
        let mut guard = budget.lock().unwrap_or_else(PoisonError::into_inner);
        Some(guard.status(provider, now))
    }

    pub fn status_all(&self) -> BTreeMap<ProviderId, RateStatus> {
        self.budgets
            .keys()
            .filter_map(|p| self.status(*p).map(|s| (*p, s)))
            .collect()
    }
}

impl Default for RateLimitManager {
    fn default() -> Self {
        Self::new()
    }
}

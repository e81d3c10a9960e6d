//! Lead service: pipeline → scoring → contact discovery → optional store.

use crate::contacts::{Contact, ContactDiscovery, ProfileContactDiscovery};
use crate::isrc::Isrc;
use crate::pipeline::{self, AggregationPipeline, PipelineError, ProcessOptions, ProviderOutcome};
use crate::profile::MergedProfile;
use crate::scoring::{LeadScore, ScoringEngine};
use crate::store::LeadStore;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadReport {
    pub isrc: Isrc,
    pub profile: MergedProfile,
    pub score: LeadScore,
    pub contacts: Vec<Contact>,
    /// Empty for cached reports.
    pub outcomes: Vec<ProviderOutcome>,
    pub errors: Vec<String>,
    /// Provider success rate of the run; `None` when served from the store.
    pub data_confidence: Option<u8>,
    pub elapsed_ms: u64,
    pub cached: bool,
    pub persisted: bool,
}

impl LeadReport {
    pub fn retry_after(&self) -> Option<Duration> {
        pipeline::retry_after(&self.outcomes)
    }

    pub fn needs_retry(&self) -> bool {
        pipeline::needs_retry(&self.outcomes)
    }
}

pub struct LeadService {
    pipeline: Arc<AggregationPipeline>,
    scoring: Arc<ScoringEngine>,
    contacts: Arc<dyn ContactDiscovery>,
    store: Option<Arc<dyn LeadStore>>,
}

impl LeadService {
    /// Profile-based contact discovery, no store.
    pub fn new(pipeline: Arc<AggregationPipeline>, scoring: Arc<ScoringEngine>) -> Self {
        Self {
            pipeline,
            scoring,
            contacts: Arc::new(ProfileContactDiscovery),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn LeadStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_contact_discovery(mut self, contacts: Arc<dyn ContactDiscovery>) -> Self {
        self.contacts = contacts;
        self
    }

    pub fn pipeline(&self) -> &Arc<AggregationPipeline> {
        &self.pipeline
    }

    pub fn scoring(&self) -> &Arc<ScoringEngine> {
        &self.scoring
    }

    pub async fn process(
        &self,
        identifier: &str,
        options: ProcessOptions,
    ) -> Result<LeadReport, PipelineError> {
        self.process_with_cancel(identifier, options, &CancellationToken::new())
            .await
    }

    pub async fn process_with_cancel(
        &self,
        identifier: &str,
        options: ProcessOptions,
        cancel: &CancellationToken,
    ) -> Result<LeadReport, PipelineError> {
        let isrc = Isrc::parse(identifier).map_err(|e| {
            counter!("pipeline_validation_errors_total").increment(1);
            PipelineError::from(e)
        })?;

        if !options.force_refresh {
            if let Some(report) = self.cached(&isrc).await {
                return Ok(report);
            }
        }

        let run = self
            .pipeline
            .process_with_cancel(isrc.as_str(), options, cancel)
            .await?;
        let score = self.rescore(&run.profile);
        let contacts = self.contacts.discover(&run.profile).await;
        let mut errors = run.errors;

        let mut persisted = false;
        if options.persist {
            if let Some(store) = &self.store {
                match store.save(&run.profile, &score, &contacts).await {
                    Ok(()) => persisted = true,
                    Err(e) => {
                        warn!(target: "service", isrc = %isrc, error = ?e, "save failed");
                        errors.push(format!("store: {e:#}"));
                    }
                }
            }
        }

        info!(
            target: "service",
            isrc = %isrc,
            tier = %score.tier,
            total = score.total,
            contacts = contacts.len(),
            persisted,
            "lead processed"
        );

        Ok(LeadReport {
            isrc,
            profile: run.profile,
            score,
            contacts,
            outcomes: run.outcomes,
            errors,
            data_confidence: Some(run.confidence),
            elapsed_ms: run.elapsed_ms,
            cached: false,
            persisted,
        })
    }

    /// Scores a profile without fetching anything.
    pub fn rescore(&self, profile: &MergedProfile) -> LeadScore {
        let score = self.scoring.score(profile);
        counter!("lead_scores_total", "tier" => score.tier.as_str()).increment(1);
        score
    }

    async fn cached(&self, isrc: &Isrc) -> Option<LeadReport> {
        let store = self.store.as_ref()?;
        match store.find(isrc).await {
            Ok(Some(rec)) => {
                info!(target: "service", isrc = %isrc, saved_at = %rec.saved_at, "serving stored lead");
                Some(LeadReport {
                    isrc: isrc.clone(),
                    profile: rec.profile,
                    score: rec.score,
                    contacts: rec.contacts,
                    outcomes: Vec::new(),
                    errors: Vec::new(),
                    data_confidence: None,
                    elapsed_ms: 0,
                    cached: true,
                    persisted: true,
                })
            }
            Ok(None) => None,
            Err(e) => {
                warn!(target: "service", isrc = %isrc, error = ?e, "store lookup failed; fetching");
                None
            }
        }
    }
}

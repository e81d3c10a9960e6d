//! Batch runner: processes ISRCs from the command line (or a file, one per
//! line) through the lead service and prints the batch report as JSON.
//!
//! ```text
//! lead_batch USRC17607839 GBAYE0601498
//! lead_batch --file isrcs.txt --fixtures demos/fixtures.json --no-optional
//! ```
//! Ctrl-C cancels; unfinished identifiers are listed as cancelled.

use anyhow::{bail, Context, Result};
use isrc_lead_scout::config::AppConfig;
use isrc_lead_scout::pipeline::ProcessOptions;
use isrc_lead_scout::scoring::{ScoringConfig, ScoringEngine};
use isrc_lead_scout::{
    build_service, AggregationPipeline, BatchDriver, LeadService, ProviderClient, StaticProvider,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Args {
    identifiers: Vec<String>,
    fixtures: Option<PathBuf>,
    options: ProcessOptions,
}

fn parse_args() -> Result<Args> {
    let mut identifiers = Vec::new();
    let mut fixtures = None;
    let mut options = ProcessOptions {
        persist: false,
        ..Default::default()
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--file" => {
                let path = it.next().context("--file needs a path")?;
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading identifiers from {path}"))?;
                identifiers.extend(
                    raw.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('#'))
                        .map(str::to_string),
                );
            }
            "--fixtures" => {
                fixtures = Some(PathBuf::from(it.next().context("--fixtures needs a path")?));
            }
            "--no-optional" => options.include_optional_providers = false,
            "--persist" => options.persist = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            _ => identifiers.push(arg),
        }
    }
    if identifiers.is_empty() {
        bail!("usage: lead_batch [--file PATH] [--fixtures PATH] [--no-optional] [--persist] ISRC...");
    }
    Ok(Args {
        identifiers,
        fixtures,
        options,
    })
}

fn offline_service(cfg: &AppConfig, fixtures: &Path) -> Result<LeadService> {
    let providers: Vec<Arc<dyn ProviderClient>> = StaticProvider::load_set(fixtures)?
        .into_iter()
        .map(|p| Arc::new(p) as Arc<dyn ProviderClient>)
        .collect();
    let scoring = match &cfg.scoring_config_path {
        Some(p) => ScoringConfig::load_from_file(p)?,
        None => ScoringConfig::load_default()?,
    };
    let pipeline = AggregationPipeline::new(providers, cfg.pipeline_config());
    Ok(LeadService::new(
        Arc::new(pipeline),
        Arc::new(ScoringEngine::new(scoring)?),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    isrc_lead_scout::init_tracing();

    let args = parse_args()?;
    let cfg = AppConfig::from_env()?;
    let service = match &args.fixtures {
        Some(f) => offline_service(&cfg, f)?,
        None => build_service(&cfg)?,
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(target: "batch", "interrupt received; cancelling");
            on_signal.cancel();
        }
    });

    let driver = BatchDriver::new(Arc::new(service), cfg.batch_config(args.options));
    let report = driver.run(args.identifiers, &cancel).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

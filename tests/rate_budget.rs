// tests/rate_budget.rs
//
// RateLimitManager under contention and through the pipeline.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use isrc_lead_scout::pipeline::{limiter_for, SkipReason};
use isrc_lead_scout::ratelimit::ManualClock;
use isrc_lead_scout::{
    AggregationPipeline, PipelineConfig, PipelineError, ProcessOptions, ProviderClient,
    ProviderId, ProviderResult, RateBudgetConfig, RateLimitManager, StaticProvider,
};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_never_exceed_the_budget() {
    let clock = ManualClock::new();
    let mgr = Arc::new(
        RateLimitManager::with_clock(Arc::new(clock.clone()))
            .with_budget(ProviderId::MusicBrainz, RateBudgetConfig::new(5, 1)),
    );

    let mut handles = Vec::new();
    for _ in 0..50 {
        let mgr = Arc::clone(&mgr);
        handles.push(tokio::spawn(async move {
            mgr.try_acquire(ProviderId::MusicBrainz)
        }));
    }
    let mut granted = 0;
    for h in handles {
        if h.await.expect("task panicked") {
            granted += 1;
        }
    }
    assert_eq!(granted, 5);

    // N+1 inside the window is denied; the window then reopens.
    assert!(!mgr.try_acquire(ProviderId::MusicBrainz));
    clock.advance(Duration::from_secs(1));
    assert!(mgr.try_acquire(ProviderId::MusicBrainz));
}

#[tokio::test(start_paused = true)]
async fn acquire_waits_when_the_wait_fits() {
    let mgr = RateLimitManager::new()
        .with_budget(ProviderId::MusicBrainz, RateBudgetConfig::new(1, 1));

    let first = mgr.acquire(ProviderId::MusicBrainz, Duration::ZERO).await;
    assert!(first.granted);

    let second = mgr
        .acquire(ProviderId::MusicBrainz, Duration::from_secs(2))
        .await;
    assert!(second.granted);
    assert!(second.waited >= Duration::from_secs(1), "{:?}", second.waited);
    assert!(second.waited < Duration::from_millis(1_100), "{:?}", second.waited);

    let third = mgr.acquire(ProviderId::MusicBrainz, Duration::ZERO).await;
    assert!(!third.granted);
    assert_eq!(third.retry_after, Some(Duration::from_secs(1)));
    assert!(third.into_result(ProviderId::MusicBrainz).is_err());
}

#[tokio::test]
async fn pipelines_sharing_a_limiter_share_the_budget() {
    let providers: Vec<Arc<dyn ProviderClient>> = vec![Arc::new(
        StaticProvider::new(ProviderId::MusicBrainz).budget(RateBudgetConfig::new(2, 3600)),
    )];
    let clock = ManualClock::new();
    let limiter = Arc::new(limiter_for(&providers, Some(Arc::new(clock.clone()))));
    let cfg = PipelineConfig {
        max_wait: Duration::ZERO,
        reference_date: NaiveDate::from_ymd_opt(2026, 10, 1),
        ..Default::default()
    };
    let a = AggregationPipeline::with_limiter(providers.clone(), Arc::clone(&limiter), cfg.clone());
    let b = AggregationPipeline::with_limiter(providers, Arc::clone(&limiter), cfg);

    assert!(a.process("USRC17607839", ProcessOptions::default()).await.unwrap().errors.is_empty());
    assert!(b.process("GBAYE0601498", ProcessOptions::default()).await.unwrap().errors.is_empty());

    let denied = a.process("USRC17607839", ProcessOptions::default()).await.unwrap();
    match &denied.outcome(ProviderId::MusicBrainz).unwrap().result {
        ProviderResult::Skipped {
            reason: SkipReason::RateLimited { retry_after_ms },
        } => assert_eq!(*retry_after_ms, 3_600_000),
        other => panic!("expected a rate-limit skip, got {other:?}"),
    }
    assert!(denied.needs_retry());

    let status = limiter.status(ProviderId::MusicBrainz).unwrap();
    assert_eq!(status.used, 2);
    assert_eq!(status.limit, 2);
}

#[tokio::test(start_paused = true)]
async fn waiting_callers_never_exceed_the_limit() {
    let mgr = Arc::new(
        RateLimitManager::new().with_budget(ProviderId::LastFm, RateBudgetConfig::new(3, 10)),
    );

    let mut handles = Vec::new();
    for _ in 0..40 {
        let mgr = Arc::clone(&mgr);
        handles.push(tokio::spawn(async move {
            mgr.acquire(ProviderId::LastFm, Duration::from_secs(15))
                .await
                .granted
        }));
    }
    let mut granted = 0;
    for h in handles {
        if h.await.expect("task panicked") {
            granted += 1;
        }
    }

    // Three at once, three more when the window rolls over; nobody else
    // fits in what is left of their wait.
    assert_eq!(granted, 6);
    let status = mgr.status(ProviderId::LastFm).unwrap();
    assert!(status.used <= status.limit, "{status:?}");
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_budget_wait_leaves_the_log_intact() {
    let providers: Vec<Arc<dyn ProviderClient>> = vec![Arc::new(
        StaticProvider::new(ProviderId::MusicBrainz).budget(RateBudgetConfig::new(1, 10)),
    )];
    let pipeline = AggregationPipeline::new(
        providers,
        PipelineConfig {
            max_wait: Duration::from_secs(30),
            reference_date: NaiveDate::from_ymd_opt(2026, 10, 1),
            ..Default::default()
        },
    );
    let first = pipeline
        .process("USRC17607839", ProcessOptions::default())
        .await
        .unwrap();
    assert!(first.errors.is_empty());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let res = pipeline
        .process_with_cancel("GBAYE0601498", ProcessOptions::default(), &cancel)
        .await;
    assert_eq!(res.unwrap_err(), PipelineError::Cancelled);

    let status = pipeline.limiter().status(ProviderId::MusicBrainz).unwrap();
    assert_eq!(status.used, 1);
    assert!(status.window_remaining_ms > 9_000, "{status:?}");

    // The abandoned wait left no entry behind: the next call gets in as
    // soon as the first grant ages out.
    let started = tokio::time::Instant::now();
    let third = pipeline
        .process("GBAYE0601498", ProcessOptions::default())
        .await
        .unwrap();
    assert!(third.errors.is_empty(), "{:?}", third.errors);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        pipeline.limiter().status(ProviderId::MusicBrainz).unwrap().used,
        1
    );
}

// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET  /health
// - POST /leads/{isrc}   (valid, malformed, query options)
// - GET  /status/rate-limits
// - POST /score

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use isrc_lead_scout::store::InMemoryLeadStore;
use isrc_lead_scout::{
    api, AggregationPipeline, AppState, LeadService, PipelineConfig, ProfileFragment,
    ProviderClient, ProviderId, ProviderRole, RateBudgetConfig, ScoringEngine, StaticProvider,
};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router() -> Router {
    let providers: Vec<Arc<dyn ProviderClient>> = vec![
        Arc::new(
            StaticProvider::new(ProviderId::MusicBrainz)
                .budget(RateBudgetConfig::new(1, 60))
                .respond(ProfileFragment {
                    listed: Some(true),
                    artist_name: Some("Tiny Ruins".into()),
                    country: Some("NZ".into()),
                    ..Default::default()
                }),
        ),
        Arc::new(
            StaticProvider::new(ProviderId::LastFm)
                .role(ProviderRole::Enrichment)
                .keyed_by_artist()
                .respond(ProfileFragment {
                    listeners: Some(25_000),
                    ..Default::default()
                }),
        ),
    ];
    let pipeline = AggregationPipeline::new(
        providers,
        PipelineConfig {
            max_wait: std::time::Duration::ZERO,
            reference_date: NaiveDate::from_ymd_opt(2026, 10, 1),
            ..Default::default()
        },
    );
    let service = LeadService::new(Arc::new(pipeline), Arc::new(ScoringEngine::with_defaults()))
        .with_store(Arc::new(InMemoryLeadStore::new()));
    api::router(AppState::new(Arc::new(service)))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Vec<u8>) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

fn json_of(bytes: &[u8]) -> Json {
    serde_json::from_slice(bytes).expect("response should be JSON")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let (status, bytes) = send(test_router(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(bytes).unwrap().trim(), "ok");
}

#[tokio::test]
async fn api_lead_returns_score_profile_and_outcomes() {
    let (status, bytes) = send(test_router(), "POST", "/leads/USRC17607839", None).await;
    assert_eq!(status, StatusCode::OK);
    let v = json_of(&bytes);

    // Contract checks for UI consumers
    assert_eq!(v["isrc"], "USRC17607839");
    assert_eq!(v["profile"]["artist_name"], "Tiny Ruins");
    assert_eq!(v["profile"]["listeners"], 25_000);
    assert!(v["score"]["tier"].is_string(), "missing 'score.tier'");
    assert!(v["score"]["total"].is_number(), "missing 'score.total'");
    assert_eq!(v["data_confidence"], 100);
    assert_eq!(v["cached"], false);
    assert_eq!(v["persisted"], true);

    let outcomes = v["outcomes"].as_array().expect("outcomes array");
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["provider"], "musicbrainz");
    assert_eq!(outcomes[0]["result"]["status"], "success");
}

#[tokio::test]
async fn api_malformed_isrc_is_422_with_reason() {
    let (status, bytes) = send(test_router(), "POST", "/leads/US-RC1-76-0783X", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let v = json_of(&bytes);
    let msg = v["error"].as_str().expect("error message");
    assert!(msg.contains("designation"), "unexpected message: {msg}");
}

#[tokio::test]
async fn api_query_options_and_rate_limit_status() {
    let app = test_router();

    let (status, bytes) = send(
        app.clone(),
        "POST",
        "/leads/USRC17607839?persist=false",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&bytes)["persisted"], false);

    // Budget of one per minute is now spent: the next run is rate limited.
    let (_, bytes) = send(app.clone(), "POST", "/leads/GBAYE0601498", None).await;
    let v = json_of(&bytes);
    assert_eq!(v["outcomes"][0]["result"]["status"], "skipped");
    assert_eq!(v["outcomes"][0]["result"]["reason"], "rate_limited");
    assert!(v["errors"][0]
        .as_str()
        .unwrap()
        .starts_with("musicbrainz: rate limited"));

    let (status, bytes) = send(app, "GET", "/status/rate-limits", None).await;
    assert_eq!(status, StatusCode::OK);
    let v = json_of(&bytes);
    assert_eq!(v["musicbrainz"]["used"], 1);
    assert_eq!(v["musicbrainz"]["limit"], 1);
    assert_eq!(v["lastfm"]["used"], 1);
}

#[tokio::test]
async fn api_score_rates_a_posted_profile() {
    let profile = json!({
        "isrc": "USRC17607839",
        "as_of": "2026-10-01",
        "label_type": "self_released",
        "country": "NZ",
        "listeners": 25000,
        "secondary_channel": { "status": "absent" }
    });
    let (status, bytes) = send(test_router(), "POST", "/score", Some(profile)).await;
    assert_eq!(status, StatusCode::OK);
    let v = json_of(&bytes);
    assert_eq!(v["independence"], 40);
    assert_eq!(v["geographic"], 30);
    assert_eq!(v["tier"], "A");
}

#[tokio::test]
async fn api_score_rejects_profiles_with_bad_isrc() {
    let profile = json!({ "isrc": "nope", "as_of": "2026-10-01" });
    let (status, _) = send(test_router(), "POST", "/score", Some(profile)).await;
    assert!(status.is_client_error(), "got {status}");
}

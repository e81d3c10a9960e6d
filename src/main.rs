//! ISRC Lead Scout: service binary entrypoint.
//! Boots the Axum HTTP server through Shuttle.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    isrc_lead_scout::init_tracing();

    let router = isrc_lead_scout::app().await?;

    Ok(router.into())
}

// tests/pipeline_aggregation.rs
//
// End-to-end behaviour of AggregationPipeline against static providers.
//
// Covered:
// - malformed identifiers never reach a provider
// - partial failure keeps the fields of the providers that answered
// - repeated runs over the same answers give the same profile
// - concurrent mode merges by priority, not by arrival order
// - name-keyed providers receive the artist found by identity providers

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use isrc_lead_scout::providers::ProviderError;
use isrc_lead_scout::{
    AggregationPipeline, FetchMode, PipelineConfig, PipelineError, ProcessOptions,
    ProfileFragment, ProviderClient, ProviderId, ProviderResult, ProviderRole, StaticProvider,
};

const ISRC: &str = "USRC17607839";

fn arc(p: StaticProvider) -> Arc<dyn ProviderClient> {
    Arc::new(p)
}

fn config(mode: FetchMode) -> PipelineConfig {
    PipelineConfig {
        fetch_mode: mode,
        reference_date: NaiveDate::from_ymd_opt(2026, 10, 1),
        ..Default::default()
    }
}

fn musicbrainz() -> StaticProvider {
    StaticProvider::new(ProviderId::MusicBrainz).respond(ProfileFragment {
        listed: Some(true),
        artist_name: Some("Tiny Ruins".into()),
        track_title: Some("Stolen Car".into()),
        country: Some("nz".into()),
        latest_release: NaiveDate::from_ymd_opt(2026, 3, 10),
        ..Default::default()
    })
}

fn spotify() -> StaticProvider {
    StaticProvider::new(ProviderId::Spotify).respond(ProfileFragment {
        listed: Some(true),
        artist_name: Some("TINY RUINS (Spotify)".into()),
        label: Some("Self-Released".into()),
        followers: Some(48_213),
        ..Default::default()
    })
}

fn lastfm() -> StaticProvider {
    StaticProvider::new(ProviderId::LastFm)
        .role(ProviderRole::Enrichment)
        .keyed_by_artist()
        .respond(ProfileFragment {
            listed: Some(true),
            listeners: Some(25_000),
            country: Some("AU".into()),
            ..Default::default()
        })
}

fn youtube() -> StaticProvider {
    StaticProvider::new(ProviderId::YouTube)
        .role(ProviderRole::Optional)
        .keyed_by_artist()
        .respond(ProfileFragment::not_listed())
}

#[tokio::test]
async fn malformed_identifiers_make_no_provider_calls() {
    let mb = musicbrainz();
    let sp = spotify();
    let counters = [mb.call_counter(), sp.call_counter()];
    let pipeline = AggregationPipeline::new(vec![arc(mb), arc(sp)], config(FetchMode::Sequential));

    let bad_inputs = [
        "",
        "   ",
        "USRC1760783",
        "USRC176078390",
        "1SRC17607839",
        "US#C17607839",
        "USRC1A607839",
        "USRC17607X39",
    ];
    for bad in bad_inputs {
        let err = pipeline
            .process(bad, ProcessOptions::default())
            .await
            .expect_err("identifier should be rejected");
        assert!(
            matches!(err, PipelineError::Validation(_)),
            "{bad:?} gave {err:?}"
        );
    }
    for c in counters {
        assert_eq!(c.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn three_of_four_succeeding_keeps_their_fields() {
    let pipeline = AggregationPipeline::new(
        vec![
            arc(musicbrainz()),
            arc(StaticProvider::new(ProviderId::Spotify).fail(ProviderError::Network(
                "connection reset".into(),
            ))),
            arc(lastfm()),
            arc(youtube()),
        ],
        config(FetchMode::Sequential),
    );

    let r = pipeline
        .process(ISRC, ProcessOptions::default())
        .await
        .expect("run should complete despite one failure");

    let all_ok = AggregationPipeline::new(
        vec![arc(musicbrainz()), arc(spotify()), arc(lastfm()), arc(youtube())],
        config(FetchMode::Sequential),
    )
    .process(ISRC, ProcessOptions::default())
    .await
    .unwrap();
    assert_eq!(all_ok.confidence, 100);
    assert_eq!(r.confidence, 75);
    assert_eq!(r.errors.len(), 1);
    assert!(r.errors[0].starts_with("spotify: network error"));
    assert!(matches!(
        r.outcome(ProviderId::Spotify).unwrap().result,
        ProviderResult::Failure { .. }
    ));

    let p = &r.profile;
    assert_eq!(p.artist_name.as_deref(), Some("Tiny Ruins"));
    assert_eq!(p.country.as_deref(), Some("NZ"));
    assert_eq!(p.listeners, Some(25_000));
    assert_eq!(p.label, None);
    assert_eq!(p.is_listed_on(ProviderId::YouTube), Some(false));
    assert_eq!(p.is_listed_on(ProviderId::Spotify), None);
    // Failed providers leave no trace in the merged fields.
    assert!(p.field_sources.values().all(|src| *src != ProviderId::Spotify));
}

#[tokio::test]
async fn higher_priority_values_win_and_sources_are_recorded() {
    let pipeline = AggregationPipeline::new(
        vec![arc(lastfm()), arc(spotify()), arc(musicbrainz())],
        config(FetchMode::Sequential),
    );
    let r = pipeline.process(ISRC, ProcessOptions::default()).await.unwrap();
    let p = &r.profile;

    // Spotify was registered before MusicBrainz; both are identity providers.
    assert_eq!(p.artist_name.as_deref(), Some("TINY RUINS (Spotify)"));
    assert_eq!(p.field_source("artist_name"), Some(ProviderId::Spotify));
    // Country from MusicBrainz (identity) beats Last.fm (enrichment).
    assert_eq!(p.country.as_deref(), Some("NZ"));
    assert_eq!(p.field_source("country"), Some(ProviderId::MusicBrainz));
    assert_eq!(p.field_source("listeners"), Some(ProviderId::LastFm));
    assert_eq!(
        p.label_type,
        Some(isrc_lead_scout::label::LabelType::SelfReleased)
    );
}

#[tokio::test]
async fn repeated_runs_give_identical_profiles() {
    let pipeline = AggregationPipeline::new(
        vec![arc(musicbrainz()), arc(spotify()), arc(lastfm()), arc(youtube())],
        config(FetchMode::Sequential),
    );
    let first = pipeline.process(ISRC, ProcessOptions::default()).await.unwrap();
    let second = pipeline
        .process("us-rc1-76-07839", ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(first.isrc, second.isrc);
    assert_eq!(first.profile, second.profile);
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(first.errors, second.errors);
}

#[tokio::test(start_paused = true)]
async fn concurrent_mode_merges_in_priority_order() {
    // The higher-priority provider answers last.
    let slow_mb = musicbrainz().delay(Duration::from_millis(500));
    let sequential = AggregationPipeline::new(
        vec![arc(musicbrainz()), arc(spotify()), arc(lastfm()), arc(youtube())],
        config(FetchMode::Sequential),
    );
    let concurrent = AggregationPipeline::new(
        vec![arc(slow_mb), arc(spotify()), arc(lastfm()), arc(youtube())],
        config(FetchMode::Concurrent),
    );

    let a = sequential.process(ISRC, ProcessOptions::default()).await.unwrap();
    let b = concurrent.process(ISRC, ProcessOptions::default()).await.unwrap();

    assert_eq!(b.profile.artist_name.as_deref(), Some("Tiny Ruins"));
    assert_eq!(b.profile.field_source("artist_name"), Some(ProviderId::MusicBrainz));
    assert_eq!(a.profile, b.profile);
    assert_eq!(
        b.outcomes.iter().map(|o| o.provider).collect::<Vec<_>>(),
        concurrent.provider_order()
    );
}

#[tokio::test]
async fn name_keyed_provider_sees_identity_artist() {
    struct EchoArtist;

    #[async_trait::async_trait]
    impl ProviderClient for EchoArtist {
        fn id(&self) -> ProviderId {
            ProviderId::LastFm
        }
        fn role(&self) -> ProviderRole {
            ProviderRole::Enrichment
        }
        fn rate_budget(&self) -> isrc_lead_scout::RateBudgetConfig {
            isrc_lead_scout::RateBudgetConfig::new(10, 1)
        }
        fn lookup_key(&self) -> isrc_lead_scout::providers::LookupKey {
            isrc_lead_scout::providers::LookupKey::ArtistName
        }
        async fn fetch(
            &self,
            query: &isrc_lead_scout::providers::ProviderQuery,
        ) -> Result<ProfileFragment, ProviderError> {
            let name = query
                .artist_name
                .clone()
                .ok_or(ProviderError::MissingInput("artist name"))?;
            Ok(ProfileFragment {
                bio: Some(format!("looked up {name}")),
                ..Default::default()
            })
        }
    }

    for mode in [FetchMode::Sequential, FetchMode::Concurrent] {
        let pipeline = AggregationPipeline::new(
            vec![Arc::new(EchoArtist) as Arc<dyn ProviderClient>, arc(musicbrainz())],
            config(mode),
        );
        let r = pipeline.process(ISRC, ProcessOptions::default()).await.unwrap();
        assert_eq!(
            r.profile.bio.as_deref(),
            Some("looked up Tiny Ruins"),
            "mode {mode:?}"
        );
        assert_eq!(r.confidence, 100);
    }
}

//! Integration tests for the periodic resampler.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use telemetry_runtime::actor::Service;
use telemetry_runtime::timeseries::{
    RegistryError, ResampledOutput, Resampler, Sample, SourceConfig, SourceId,
};

mod common;

const FAST_PERIOD: &str = "[resampler]\nperiod_ms = 50";

fn source_config(toml: &str, id: &str) -> SourceConfig {
    let snapshot = common::snapshot(toml);
    SourceConfig::from_settings(&snapshot.core.resampler, id)
}

async fn stop_clean(resampler: &mut Resampler) {
    resampler.stop().unwrap();
    let outcomes = resampler.wait().await;
    assert!(
        outcomes.iter().all(|o| !o.is_failure()),
        "resampler crashed: {outcomes:?}"
    );
}

#[tokio::test]
async fn emits_averages_per_cycle() {
    let (_cfg_tx, cfg_rx) = common::snapshot_channel(FAST_PERIOD);
    let (out_tx, mut out_rx) = mpsc::channel(1_024);
    let mut resampler = Resampler::new(cfg_rx, out_tx);
    let handle = resampler.handle();
    resampler.start().unwrap();

    handle
        .add_source("meter", source_config(FAST_PERIOD, "meter"))
        .await
        .unwrap();
    let samples = handle.sample_sender();
    let producer = tokio::spawn(async move {
        for _ in 0..40 {
            let sample = Sample::new("meter", Utc::now(), 10.0);
            if samples.send(sample).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let outputs = common::collect_outputs(&mut out_rx, Duration::from_millis(400)).await;
    producer.abort();

    let values: Vec<&ResampledOutput> = outputs
        .iter()
        .filter(|o| o.source == SourceId::new("meter"))
        .collect();
    assert!(values.len() >= 4, "expected several cycles, got {values:?}");
    // A steady producer means steady averages once samples are flowing.
    assert!(values
        .iter()
        .skip(1)
        .all(|o| o.value.is_none() || o.value == Some(10.0)));
    assert!(values.iter().any(|o| o.value == Some(10.0)));

    stop_clean(&mut resampler).await;
}

#[tokio::test]
async fn silent_source_emits_exactly_one_gap_per_cycle() {
    let (_cfg_tx, cfg_rx) = common::snapshot_channel(FAST_PERIOD);
    let (out_tx, mut out_rx) = mpsc::channel(1_024);
    let mut resampler = Resampler::new(cfg_rx, out_tx);
    let handle = resampler.handle();
    resampler.start().unwrap();

    handle
        .add_source("silent", source_config(FAST_PERIOD, "silent"))
        .await
        .unwrap();

    let outputs = common::collect_outputs(&mut out_rx, Duration::from_millis(300)).await;
    assert!(!outputs.is_empty(), "no cycles ran");
    assert!(outputs.iter().all(|o| o.is_gap()));

    // Exactly one marker per cycle boundary, not a crash and not a skip.
    let boundaries: BTreeSet<_> = outputs.iter().map(|o| o.ts).collect();
    assert_eq!(boundaries.len(), outputs.len());

    stop_clean(&mut resampler).await;
}

#[tokio::test]
async fn skip_policy_suppresses_gap_markers() {
    let toml = "[resampler]\nperiod_ms = 50\non_empty = \"skip\"";
    let (_cfg_tx, cfg_rx) = common::snapshot_channel(toml);
    let (out_tx, mut out_rx) = mpsc::channel(1_024);
    let mut resampler = Resampler::new(cfg_rx, out_tx);
    let handle = resampler.handle();
    resampler.start().unwrap();

    handle
        .add_source("silent", source_config(toml, "silent"))
        .await
        .unwrap();

    let outputs = common::collect_outputs(&mut out_rx, Duration::from_millis(300)).await;
    assert!(outputs.is_empty(), "skip policy still emitted {outputs:?}");

    stop_clean(&mut resampler).await;
}

#[tokio::test]
async fn concurrent_add_never_disturbs_existing_sources() {
    let (_cfg_tx, cfg_rx) = common::snapshot_channel(FAST_PERIOD);
    let (out_tx, mut out_rx) = mpsc::channel(4_096);
    let mut resampler = Resampler::new(cfg_rx, out_tx);
    let handle = resampler.handle();
    resampler.start().unwrap();

    let primary = SourceId::new("primary");
    handle
        .add_source("primary", source_config(FAST_PERIOD, "primary"))
        .await
        .unwrap();

    // Keep samples flowing to the pre-existing source the whole time.
    let samples = handle.sample_sender();
    let producer = tokio::spawn(async move {
        loop {
            let sample = Sample::new("primary", Utc::now(), 1.0);
            if samples.send(sample).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    // Hammer the registry with membership changes while cycles run.
    let churn_handle = handle.clone();
    let churn = tokio::spawn(async move {
        for index in 0..30 {
            let id = format!("extra-{index}");
            churn_handle
                .add_source(id.as_str(), source_config(FAST_PERIOD, id.as_str()))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            if index % 3 == 0 {
                churn_handle.remove_source(id.as_str()).await.unwrap();
            }
        }
    });

    let outputs = common::collect_outputs(&mut out_rx, Duration::from_millis(700)).await;
    churn.await.unwrap();
    producer.abort();

    // Group by cycle boundary: the pre-existing source must appear in
    // every cycle, exactly once: nothing dropped, nothing duplicated.
    // The last boundary may have been cut off mid-cycle by the
    // collection window, so it is not held to the completeness check.
    let mut by_boundary: BTreeMap<_, usize> = BTreeMap::new();
    for output in outputs.iter().filter(|o| o.source == primary) {
        *by_boundary.entry(output.ts).or_default() += 1;
    }
    let mut all_boundaries: BTreeSet<_> = outputs.iter().map(|o| o.ts).collect();
    let last = all_boundaries.iter().next_back().copied();
    if let Some(last) = last {
        all_boundaries.remove(&last);
        by_boundary.remove(&last);
    }
    assert!(by_boundary.len() >= 5, "too few cycles observed");
    assert!(
        by_boundary.values().all(|&count| count == 1),
        "duplicated output for an existing source: {by_boundary:?}"
    );
    assert_eq!(
        by_boundary.keys().collect::<BTreeSet<_>>(),
        all_boundaries.iter().collect::<BTreeSet<_>>(),
        "a cycle dropped the pre-existing source"
    );

    stop_clean(&mut resampler).await;
}

#[tokio::test]
async fn removed_source_stops_producing() {
    let (_cfg_tx, cfg_rx) = common::snapshot_channel(FAST_PERIOD);
    let (out_tx, mut out_rx) = mpsc::channel(1_024);
    let mut resampler = Resampler::new(cfg_rx, out_tx);
    let handle = resampler.handle();
    resampler.start().unwrap();

    handle
        .add_source("transient", source_config(FAST_PERIOD, "transient"))
        .await
        .unwrap();
    common::collect_outputs(&mut out_rx, Duration::from_millis(200)).await;

    handle.remove_source("transient").await.unwrap();
    // Let the cycle that may already be at the boundary flush through.
    common::collect_outputs(&mut out_rx, Duration::from_millis(100)).await;

    let outputs = common::collect_outputs(&mut out_rx, Duration::from_millis(300)).await;
    assert!(
        outputs.is_empty(),
        "removed source still produced {outputs:?}"
    );

    stop_clean(&mut resampler).await;
}

#[tokio::test]
async fn membership_misuse_is_reported() {
    let (_cfg_tx, cfg_rx) = common::snapshot_channel(FAST_PERIOD);
    let (out_tx, _out_rx) = mpsc::channel(1_024);
    let mut resampler = Resampler::new(cfg_rx, out_tx);
    let handle = resampler.handle();
    resampler.start().unwrap();

    handle
        .add_source("dup", source_config(FAST_PERIOD, "dup"))
        .await
        .unwrap();
    let duplicate = handle
        .add_source("dup", source_config(FAST_PERIOD, "dup"))
        .await;
    assert!(matches!(duplicate, Err(RegistryError::DuplicateSource(_))));

    let unknown = handle.remove_source("never-registered").await;
    assert!(matches!(unknown, Err(RegistryError::UnknownSource(_))));

    stop_clean(&mut resampler).await;
}

#[tokio::test]
async fn out_of_order_samples_do_not_crash_the_actor() {
    let (_cfg_tx, cfg_rx) = common::snapshot_channel(FAST_PERIOD);
    let (out_tx, mut out_rx) = mpsc::channel(1_024);
    let mut resampler = Resampler::new(cfg_rx, out_tx);
    let handle = resampler.handle();
    resampler.start().unwrap();

    handle
        .add_source("meter", source_config(FAST_PERIOD, "meter"))
        .await
        .unwrap();
    let samples = handle.sample_sender();
    let now = Utc::now();
    samples.send(Sample::new("meter", now, 5.0)).await.unwrap();
    // Strictly older than the stored newest: rejected at the window.
    samples
        .send(Sample::new("meter", now - chrono::TimeDelta::seconds(10), 1.0))
        .await
        .unwrap();
    // Sample for a source nobody registered: dropped.
    samples
        .send(Sample::new("ghost", now, 2.0))
        .await
        .unwrap();

    let outputs = common::collect_outputs(&mut out_rx, Duration::from_millis(200)).await;
    assert!(outputs
        .iter()
        .all(|o| o.source == SourceId::new("meter")));
    assert!(outputs.iter().any(|o| o.value == Some(5.0)));

    stop_clean(&mut resampler).await;
}

#[tokio::test]
async fn config_change_applies_at_a_cycle_boundary() {
    let (cfg_tx, cfg_rx) = common::snapshot_channel(FAST_PERIOD);
    let (out_tx, mut out_rx) = mpsc::channel(4_096);
    let mut resampler = Resampler::new(cfg_rx, out_tx);
    let handle = resampler.handle();
    resampler.start().unwrap();

    handle
        .add_source("silent", source_config(FAST_PERIOD, "silent"))
        .await
        .unwrap();
    let before = common::collect_outputs(&mut out_rx, Duration::from_millis(250)).await;
    assert!(before.iter().all(|o| o.is_gap()));
    assert!(!before.is_empty());

    // Gaps off, period up; both take effect at the next boundary.
    cfg_tx.send_replace(common::snapshot(
        "[resampler]\nperiod_ms = 200\non_empty = \"skip\"",
    ));
    // Drain anything already in flight from the old settings.
    common::collect_outputs(&mut out_rx, Duration::from_millis(150)).await;

    let after = common::collect_outputs(&mut out_rx, Duration::from_millis(500)).await;
    assert!(
        after.is_empty(),
        "skip policy not applied after config change: {after:?}"
    );

    stop_clean(&mut resampler).await;
}

#[tokio::test]
async fn second_start_is_rejected() {
    let (_cfg_tx, cfg_rx) = common::snapshot_channel(FAST_PERIOD);
    let (out_tx, _out_rx) = mpsc::channel(16);
    let mut resampler = Resampler::new(cfg_rx, out_tx);
    resampler.start().unwrap();
    assert!(resampler.start().is_err());
    stop_clean(&mut resampler).await;
}

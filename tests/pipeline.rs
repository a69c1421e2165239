//! End-to-end: train, export, reload, predict, adapt.

use anyhow::{ensure, Result};
use envcast::{
    train, ForecastError, ModelArtifact, Observation, Predictor, Topology, TrainedModel,
    TrainerConfig,
};

/// Hourly readings over a few days with a daily temperature/humidity swing.
fn daily_cycle(hours: usize) -> Vec<Observation> {
    (0..hours)
        .map(|h| {
            let phase = (h % 24) as f32 / 24.0;
            let swing = (phase * std::f32::consts::TAU).sin();
            let drift = h as f32 * 0.01;
            Observation::new(21.0 + 4.0 * swing + drift, 60.0 - 10.0 * swing, phase)
        })
        .collect()
}

fn small_model() -> Result<TrainedModel> {
    let config = TrainerConfig {
        topology: Topology::new(4, 8, 4),
        learning_rate: 0.01,
        max_iter: 60,
        n_iter_no_change: 20,
        ..TrainerConfig::default()
    };
    Ok(train(&daily_cycle(120), &config)?)
}

fn warm(predictor: &mut Predictor, readings: &[Observation]) {
    for &reading in readings {
        predictor.observe(reading);
    }
}

#[test]
fn test_every_export_format_reproduces_predictions() -> Result<()> {
    let model = small_model()?;
    let topology = model.topology;
    let artifact = model.to_artifact();
    let history = daily_cycle(8);

    let mut reference = model.into_predictor()?;
    warm(&mut reference, &history);
    let expected = reference.predict()?;

    let from_flat = ModelArtifact::from_flat(topology, &artifact.to_flat())?;
    let from_bytes = ModelArtifact::from_le_bytes(topology, &artifact.to_le_bytes())?;
    let from_json = ModelArtifact::from_json(&artifact.to_json()?)?;

    for reloaded in [from_flat, from_bytes, from_json] {
        ensure!(reloaded == artifact, "artifact changed across export");
        let mut predictor = Predictor::from_artifact(&reloaded)?;
        warm(&mut predictor, &history);
        let got = predictor.predict()?;
        assert_eq!(got.metric_a.to_bits(), expected.metric_a.to_bits());
        assert_eq!(got.metric_b.to_bits(), expected.metric_b.to_bits());
    }
    Ok(())
}

#[test]
fn test_frozen_and_adaptive_agree_until_first_update() -> Result<()> {
    let artifact = small_model()?.to_artifact();
    let mut frozen = Predictor::from_artifact(&artifact)?;
    let mut adaptive = Predictor::from_artifact(&artifact)?;

    let stream = daily_cycle(30);
    for pair in stream.windows(2) {
        frozen.observe(pair[0]);
        adaptive.observe(pair[0]);
        assert_eq!(frozen.predict()?, adaptive.predict()?);
        adaptive.apply_update(pair[1].metric_a, pair[1].metric_b, 0.0)?;
    }

    frozen.observe(stream[29]);
    adaptive.observe(stream[29]);
    frozen.predict()?;
    adaptive.predict()?;
    adaptive.apply_update(stream[29].metric_a + 5.0, stream[29].metric_b, 1e-2)?;

    ensure!(
        adaptive.network().params() != frozen.network().params(),
        "a non-zero step must move the adaptive parameters"
    );
    Ok(())
}

#[test]
fn test_update_without_prediction_is_rejected() -> Result<()> {
    let mut predictor = small_model()?.into_predictor()?;
    predictor.observe(Observation::new(20.0, 60.0, 0.5));
    assert_eq!(
        predictor.apply_update(20.0, 60.0, 1e-3),
        Err(ForecastError::AdapterMisuse)
    );

    predictor.predict()?;
    predictor.apply_update(20.0, 60.0, 1e-3)?;
    assert_eq!(
        predictor.apply_update(20.0, 60.0, 1e-3),
        Err(ForecastError::AdapterMisuse)
    );
    Ok(())
}

#[test]
fn test_frozen_source_lists_every_parameter() -> Result<()> {
    let model = small_model()?;
    let artifact = model.to_artifact();
    let source = artifact.to_rust_source()?;

    assert!(source.contains("pub const WINDOW_SIZE: usize = 4;"));
    assert!(source.contains("pub const HIDDEN1: usize = 8;"));
    assert!(source.contains("pub const HIDDEN2: usize = 4;"));
    assert_eq!(
        artifact.to_flat().len(),
        model.topology.artifact_len(),
        "flat length must match the topology"
    );
    Ok(())
}

#[test]
fn test_report_is_consistent() -> Result<()> {
    let model = small_model()?;
    let report = &model.report;
    assert_eq!(report.parameter_count, model.topology.parameter_count());
    assert_eq!(report.loss_curve.len(), report.iterations);
    assert!(report.loss_curve.iter().all(|l| l.is_finite()));
    assert_eq!(report.warning().is_some(), !report.converged);
    Ok(())
}

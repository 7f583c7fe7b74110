//! End-to-end training runs on synthetic tones.
//
//   cargo test -p gcommands --test training
//

mod common;

use std::path::Path;

use anyhow::Result;
use candle_core::Device;
use common::{TONES, small_features, write_split};
use gcommands::{
    Architecture, Checkpoint, CheckpointLoad, DatasetError, Evaluation, Model, OptimizerKind,
    TrainConfig, TrainError, fit, test_checkpoint,
};

fn layout(root: &Path) -> Result<()> {
    write_split(&root.join("train"), TONES, 6)?;
    write_split(&root.join("valid"), TONES, 2)?;
    write_split(&root.join("test"), TONES, 2)?;
    Ok(())
}

fn config(root: &Path) -> TrainConfig {
    let mut cfg = TrainConfig {
        epochs: 2,
        log_interval: 1,
        checkpoint: root.join("checkpoint").join("ckpt.cbor"),
        features: small_features(),
        ..Default::default()
    };
    cfg.data.train_path = root.join("train");
    cfg.data.valid_path = root.join("valid");
    cfg.data.test_path = root.join("test");
    cfg.data.batch_size = 4;
    cfg.data.test_batch_size = 3;
    cfg.model.arch = Architecture::LeNet;
    cfg
}

#[test]
fn lenet_fit_writes_best_checkpoint_and_tests_it() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    layout(tmp.path())?;
    let cfg = config(tmp.path());

    let report = fit(&cfg)?;
    assert_eq!(report.epochs_run, 2);
    assert!(!report.stopped_early);
    assert!(report.best_epoch.is_some());
    assert!(report.best_valid_loss.is_finite());
    assert_eq!(report.test.total, 4);
    assert!(cfg.checkpoint.is_file(), "checkpoint directory is created");

    let ckpt = Checkpoint::load_from_file(&cfg.checkpoint)?;
    assert_eq!(ckpt.arch, Architecture::LeNet);
    assert_eq!(ckpt.labels, ["high", "low"]);
    assert_eq!(ckpt.input_dims, (81, 24));
    assert_eq!(Some(ckpt.epoch), report.best_epoch);
    assert_eq!(ckpt.valid_loss, report.best_valid_loss);
    assert_eq!(ckpt.spectrogram, cfg.features);

    // re-testing the checkpoint reproduces the report
    let again = test_checkpoint(&cfg.checkpoint, &cfg.data.test_path, 2, &Device::Cpu)?;
    assert_eq!(again.total, report.test.total);
    assert_eq!(again.correct, report.test.correct);
    assert!((again.loss - report.test.loss).abs() < 1e-5);
    Ok(())
}

fn assert_same_evaluation(a: &Evaluation, b: &Evaluation) {
    assert_eq!(a.total, b.total);
    assert_eq!(a.correct, b.correct);
    assert!(
        (a.loss - b.loss).abs() <= 1e-4 * b.loss.abs().max(1.0),
        "{} vs {}",
        a.loss,
        b.loss
    );
}

#[test]
fn worsening_validation_stops_early_and_tests_the_best_epoch() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    write_split(&tmp.path().join("train"), TONES, 6)?;
    // validation labels are swapped, so fitting the training set drives
    // the validation loss up
    write_split(&tmp.path().join("valid"), &[("high", 300.0), ("low", 2_000.0)], 2)?;
    write_split(&tmp.path().join("test"), TONES, 2)?;
    let mut cfg = config(tmp.path());
    cfg.epochs = 10;
    cfg.patience = 1;
    cfg.optim.lr = 0.01;

    let report = fit(&cfg)?;
    assert!(report.stopped_early);
    assert!(report.epochs_run < cfg.epochs);
    let best = report
        .best_epoch
        .ok_or_else(|| anyhow::anyhow!("no epoch improved"))?;
    assert!(best < report.epochs_run);
    // patience 1: the run ends on the first epoch that fails to improve
    assert_eq!(report.epochs_run, best + 1);

    let ckpt = Checkpoint::load_from_file(&cfg.checkpoint)?;
    assert_eq!(ckpt.epoch, best);
    assert_eq!(ckpt.valid_loss, report.best_valid_loss);

    // the reported test score comes from the best checkpoint, not the last epoch
    let again = test_checkpoint(&cfg.checkpoint, &cfg.data.test_path, 3, &Device::Cpu)?;
    assert_same_evaluation(&again, &report.test);
    Ok(())
}

#[test]
fn vgg11_fit_round_trips_through_its_checkpoint() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    layout(tmp.path())?;
    let mut cfg = config(tmp.path());
    cfg.epochs = 1;
    cfg.model.arch = Architecture::Vgg11;
    // five 2x2 pools need at least 32 frames
    cfg.features.max_len = 32;

    let report = fit(&cfg)?;
    assert_eq!(report.epochs_run, 1);
    assert_eq!(report.best_epoch, Some(1));
    assert_eq!(report.test.total, 4);

    let ckpt = Checkpoint::load_from_file(&cfg.checkpoint)?;
    assert_eq!(ckpt.arch, Architecture::Vgg11);
    assert_eq!(ckpt.input_dims, (81, 32));
    assert!(ckpt.weights.keys().any(|k| k.ends_with(".bn.running_mean")));

    let model = Model::from_checkpoint(&ckpt, &Device::Cpu)?;
    assert_eq!(model.arch(), Architecture::Vgg11);
    assert_eq!(model.num_params(), ckpt.num_params());

    let again = test_checkpoint(&cfg.checkpoint, &cfg.data.test_path, 2, &Device::Cpu)?;
    assert_same_evaluation(&again, &report.test);
    Ok(())
}

#[test]
fn repeated_fits_can_each_size_their_worker_pool() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    layout(tmp.path())?;
    let mut cfg = config(tmp.path());
    cfg.epochs = 1;

    cfg.data.num_workers = 2;
    let first = fit(&cfg)?;
    cfg.data.num_workers = 3;
    let second = fit(&cfg)?;
    assert_eq!(first.test.total, second.test.total);
    assert_eq!(second.best_epoch, Some(1));
    Ok(())
}

#[test]
fn sgd_run_produces_a_loadable_model() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    layout(tmp.path())?;
    let mut cfg = config(tmp.path());
    cfg.epochs = 1;
    cfg.optim.kind = OptimizerKind::Sgd;
    cfg.optim.lr = 0.01;
    cfg.data.cache = false;

    let report = fit(&cfg)?;
    assert_eq!(report.best_epoch, Some(1));

    let ckpt = Checkpoint::load_from_file(&cfg.checkpoint)?;
    let model = Model::from_checkpoint(&ckpt, &Device::Cpu)?;
    assert_eq!(model.num_params(), ckpt.num_params());
    assert_eq!(model.labels(), ckpt.labels.as_slice());
    Ok(())
}

#[test]
fn unknown_validation_class_aborts_before_training() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    layout(tmp.path())?;
    write_split(&tmp.path().join("valid"), &[("mystery", 900.0)], 1)?;
    let cfg = config(tmp.path());

    let err = fit(&cfg).err().ok_or_else(|| anyhow::anyhow!("fit succeeded"))?;
    assert!(matches!(
        err,
        TrainError::Dataset(DatasetError::UnknownClass { .. })
    ));
    assert!(!cfg.checkpoint.exists());
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    cfg.epochs = 0;
    assert!(matches!(fit(&cfg), Err(TrainError::Config(_))));
}

#[test]
fn test_checkpoint_rejects_other_feature_sizes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    layout(tmp.path())?;
    let mut cfg = config(tmp.path());
    cfg.epochs = 1;
    fit(&cfg)?;

    // same labels, 16 kHz clips: 161 bins instead of 81
    let other = tmp.path().join("wide");
    for (label, freq) in TONES {
        common::write_tone(&other.join(label).join("x.wav"), *freq, 0.5, 16_000)?;
    }
    let err = test_checkpoint(&cfg.checkpoint, &other, 2, &Device::Cpu);
    assert!(matches!(err, Err(TrainError::InputMismatch { .. })));
    Ok(())
}

//! End-to-end engine behavior: counters, accumulation, checkpoint cadence,
//! resume, and monitor resolution, driven through the public API.

use candle_core::Device;
use std::path::Path;
use tempfile::TempDir;

use maneuver_rs::config::ManeuverConfig;
use maneuver_rs::data::generate_trajectories;
use maneuver_rs::model::ManeuverClassifier;
use maneuver_rs::strategy::SingleDevice;
use maneuver_rs::trainer::Trainer;

fn small_config(checkpoint_dir: &Path) -> ManeuverConfig {
    let mut config = ManeuverConfig::default();
    config.model.hidden_dim = 8;
    config.model.num_layers = 1;
    config.dataset.seq_len = 4;
    config.dataset.num_train = 5;
    config.dataset.num_valid = 2;
    config.trainer.max_epochs = Some(3);
    config.trainer.checkpoint_dir = checkpoint_dir.to_string_lossy().into_owned();
    config
}

fn fit(config: &ManeuverConfig, resume: bool) -> Trainer {
    let device = Device::Cpu;
    let mut trainer = Trainer::new(
        Box::new(SingleDevice::with_device(device.clone())),
        &config.trainer,
    );
    let mut model = ManeuverClassifier::new(config, &device).unwrap();
    let train =
        generate_trajectories(&config.dataset, config.dataset.num_train, config.seed, &device)
            .unwrap();
    let val = generate_trajectories(
        &config.dataset,
        config.dataset.num_valid,
        config.seed + 1,
        &device,
    )
    .unwrap();
    trainer.fit(&mut model, train, Some(val), resume).unwrap();
    trainer
}

#[test]
fn test_fit_runs_to_max_epochs() {
    let dir = TempDir::new().unwrap();
    let config = small_config(dir.path());
    let trainer = fit(&config, false);

    assert_eq!(trainer.state().current_epoch, 3);
    // 5 batches per epoch, one optimizer step each
    assert_eq!(trainer.state().global_step, 15);
    assert!(!trainer.state().should_stop);
    for name in ["epoch-0001.ckpt", "epoch-0002.ckpt", "epoch-0003.ckpt"] {
        assert!(dir.path().join(name).exists(), "missing {name}");
    }
}

#[test]
fn test_accumulation_takes_floor_of_batches() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(dir.path());
    config.trainer.grad_accum_steps = 2;
    config.trainer.max_epochs = Some(2);
    let trainer = fit(&config, false);

    // floor(5 / 2) steps per epoch, over two epochs
    assert_eq!(trainer.state().global_step, 4);
}

#[test]
fn test_checkpoint_cadence_includes_final_epoch() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(dir.path());
    config.trainer.checkpoint_frequency = 2;
    let _ = fit(&config, false);

    assert!(!dir.path().join("epoch-0001.ckpt").exists());
    assert!(dir.path().join("epoch-0002.ckpt").exists());
    // the final epoch is always checkpointed
    assert!(dir.path().join("epoch-0003.ckpt").exists());
}

#[test]
fn test_resume_continues_counters() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(dir.path());
    config.trainer.max_epochs = Some(2);
    let first = fit(&config, false);
    assert_eq!(first.state().global_step, 10);

    config.trainer.max_epochs = Some(4);
    let resumed = fit(&config, true);
    assert_eq!(resumed.state().current_epoch, 4);
    assert_eq!(resumed.state().global_step, 20);
    assert!(dir.path().join("epoch-0004.ckpt").exists());
}

#[test]
fn test_resume_at_max_epochs_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(dir.path());
    config.trainer.max_epochs = Some(2);
    let _ = fit(&config, false);

    let resumed = fit(&config, true);
    assert_eq!(resumed.state().current_epoch, 2);
    assert_eq!(resumed.state().global_step, 10);
}

#[test]
fn test_resume_without_checkpoints_is_a_cold_start() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(dir.path());
    config.trainer.max_epochs = Some(1);
    let trainer = fit(&config, true);
    assert_eq!(trainer.state().current_epoch, 1);
}

#[test]
fn test_unexpected_checkpoint_entry_fails_resume() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(dir.path());
    config.trainer.max_epochs = Some(1);
    let _ = fit(&config, false);

    let path = dir.path().join("epoch-0001.ckpt");
    let mut value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    value["surprise"] = serde_json::json!(1);
    std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

    config.trainer.max_epochs = Some(2);
    let device = Device::Cpu;
    let mut trainer = Trainer::new(
        Box::new(SingleDevice::with_device(device.clone())),
        &config.trainer,
    );
    let mut model = ManeuverClassifier::new(&config, &device).unwrap();
    let train =
        generate_trajectories(&config.dataset, config.dataset.num_train, config.seed, &device)
            .unwrap();
    let err = trainer.fit(&mut model, train, None, true).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("unused checkpoint values"), "{message}");
    assert!(message.contains("surprise"), "{message}");
}

#[test]
fn test_plateau_without_validation_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(dir.path());
    config.lr_scheduler.lrs = "plateau".into();

    let device = Device::Cpu;
    let mut trainer = Trainer::new(
        Box::new(SingleDevice::with_device(device.clone())),
        &config.trainer,
    );
    let mut model = ManeuverClassifier::new(&config, &device).unwrap();
    let train =
        generate_trajectories(&config.dataset, config.dataset.num_train, config.seed, &device)
            .unwrap();
    let err = trainer.fit(&mut model, train, None, false).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("val_loss"), "{message}");
    // the error names the values that were available
    assert!(message.contains("train_loss"), "{message}");
}

#[test]
fn test_plateau_with_validation_trains() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(dir.path());
    config.lr_scheduler.lrs = "plateau".into();
    config.trainer.max_epochs = Some(2);
    let trainer = fit(&config, false);
    assert_eq!(trainer.state().current_epoch, 2);
}

#[test]
fn test_limit_train_batches_caps_the_run() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(dir.path());
    config.trainer.limit_train_batches = Some(2);
    let trainer = fit(&config, false);
    // reaching the batch limit ends training entirely
    assert_eq!(trainer.state().current_epoch, 1);
    assert_eq!(trainer.state().global_step, 2);
}

#[test]
fn test_max_steps_caps_the_run() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(dir.path());
    config.trainer.max_epochs = Some(100);
    config.trainer.max_steps = Some(7);
    let trainer = fit(&config, false);
    assert_eq!(trainer.state().global_step, 7);
    assert_eq!(trainer.state().current_epoch, 2);
}

//! Model checkpointing and training-state persistence.
//!
//! A checkpoint directory holds three files under one fixed base name, each
//! overwritten on every save:
//! - `alexnet-cnn.mpk.gz`: model weights
//! - `alexnet-cnn-optim.mpk.gz`: optimizer (momentum) state
//! - `alexnet-cnn.json`: global step, learning rate and bookkeeping
//!
//! Training also leaves `model_config.json` (the exact architecture) and
//! `training_config.json` there, so inference can rebuild the network
//! without being told its input size.

use std::fs;
use std::path::{Path, PathBuf};

use burn::config::Config;
use burn::module::Module;
use burn::optim::Optimizer;
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{AlexNet, AlexNetConfig, TrainingConfig};
use crate::utils::error::{EmotionError, Result};

/// Base file name of every checkpoint artifact
pub const CHECKPOINT_NAME: &str = "alexnet-cnn";

/// Weights path without extension (the recorder appends its own)
pub fn weights_path(dir: &Path) -> PathBuf {
    dir.join(CHECKPOINT_NAME)
}

/// Optimizer state path without extension
pub fn optimizer_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}-optim", CHECKPOINT_NAME))
}

/// Training-state sidecar path
pub fn state_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.json", CHECKPOINT_NAME))
}

/// Architecture written by the trainer
pub const MODEL_CONFIG_FILE: &str = "model_config.json";
/// Full run configuration written by the trainer
pub const TRAINING_CONFIG_FILE: &str = "training_config.json";

/// Architecture of the network stored in `dir`
///
/// Prefers `model_config.json`, then derives it from `training_config.json`,
/// and falls back to `default` when neither file is present.
pub fn checkpoint_model_config(dir: &Path, default: AlexNetConfig) -> Result<AlexNetConfig> {
    let model_file = dir.join(MODEL_CONFIG_FILE);
    if model_file.exists() {
        return AlexNetConfig::load(&model_file).map_err(|e| {
            EmotionError::Checkpoint(format!("Failed to read {}: {}", model_file.display(), e))
        });
    }

    let training_file = dir.join(TRAINING_CONFIG_FILE);
    if training_file.exists() {
        let json = fs::read_to_string(&training_file)?;
        let config: TrainingConfig = serde_json::from_str(&json)?;
        return Ok(config.model_config());
    }

    Ok(default)
}

/// Bookkeeping saved next to the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub global_step: usize,
    pub learning_rate: f64,
    pub epoch: usize,
    pub validation_accuracy: Option<f64>,
    pub timestamp: String,
}

impl TrainingState {
    pub fn new(
        global_step: usize,
        learning_rate: f64,
        epoch: usize,
        validation_accuracy: Option<f64>,
    ) -> Self {
        Self {
            global_step,
            learning_rate,
            epoch,
            validation_accuracy,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Save state to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load state from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            EmotionError::Checkpoint(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Write weights, optimizer state and sidecar; returns the weights path
pub fn save_checkpoint<B, O>(
    dir: &Path,
    model: &AlexNet<B>,
    optimizer: &O,
    state: &TrainingState,
) -> Result<PathBuf>
where
    B: AutodiffBackend,
    O: Optimizer<AlexNet<B>, B>,
{
    fs::create_dir_all(dir)?;
    let recorder = CompactRecorder::new();

    let weights = weights_path(dir);
    model.clone().save_file(weights.clone(), &recorder)?;
    <CompactRecorder as Recorder<B>>::record(&recorder, optimizer.to_record(), optimizer_path(dir))?;
    state.save(&state_path(dir))?;

    Ok(weights)
}

/// Restore weights from `dir` into `model`
pub fn load_model<B: Backend>(
    dir: &Path,
    model: AlexNet<B>,
    device: &B::Device,
) -> Result<AlexNet<B>> {
    let path = weights_path(dir);
    let model = model
        .load_file(path.clone(), &CompactRecorder::new(), device)
        .map_err(|e| {
            EmotionError::Checkpoint(format!("Failed to load weights {}: {:?}", path.display(), e))
        })?;
    info!("Loaded weights from {:?}", path);
    Ok(model)
}

/// Restore optimizer state from `dir`
pub fn load_optimizer<B, O>(dir: &Path, optimizer: O, device: &B::Device) -> Result<O>
where
    B: AutodiffBackend,
    O: Optimizer<AlexNet<B>, B>,
{
    let record = <CompactRecorder as Recorder<B>>::load(
        &CompactRecorder::new(),
        optimizer_path(dir),
        device,
    )?;
    Ok(optimizer.load_record(record))
}

/// Everything needed to continue a run
pub fn load_checkpoint<B, O>(
    dir: &Path,
    model: AlexNet<B>,
    optimizer: O,
    device: &B::Device,
) -> Result<(AlexNet<B>, O, TrainingState)>
where
    B: AutodiffBackend,
    O: Optimizer<AlexNet<B>, B>,
{
    let state = TrainingState::load(&state_path(dir))?;
    let model = load_model(dir, model, device)?;
    let optimizer = load_optimizer(dir, optimizer, device)?;
    info!(
        "Resuming from step {} (epoch {}, lr {:e})",
        state.global_step, state.epoch, state.learning_rate
    );
    Ok((model, optimizer, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::alexnet::tests::tiny_config;
    use burn::backend::Autodiff;
    use burn::module::AutodiffModule;
    use burn::optim::momentum::MomentumConfig;
    use burn::optim::{GradientsParams, SgdConfig};
    use burn::tensor::{ElementConversion, Tensor};
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_state_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = state_path(dir.path());
        let state = TrainingState::new(1500, 1e-4, 3, Some(0.625));
        state.save(&path).unwrap();

        let loaded = TrainingState::load(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_missing_state_is_checkpoint_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            TrainingState::load(&state_path(dir.path())),
            Err(EmotionError::Checkpoint(_))
        ));
    }

    fn momentum_sgd() -> impl Optimizer<AlexNet<TestBackend>, TestBackend> {
        SgdConfig::new()
            .with_momentum(Some(MomentumConfig::new()))
            .init::<TestBackend, AlexNet<TestBackend>>()
    }

    fn logits(model: &AlexNet<TestBackend>, input: &Tensor<TestBackend, 4>) -> Vec<f32> {
        model
            .forward(input.clone())
            .into_data()
            .to_vec::<f32>()
            .unwrap()
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let config = tiny_config().with_keep_prob(1.0);
        let input = Tensor::<TestBackend, 4>::ones([2, 3, 67, 67], &device);

        // one step so the momentum buffers are populated
        let mut optimizer = momentum_sgd();
        let model = AlexNet::<TestBackend>::new(&config, &device);
        let loss = model.forward(input.clone()).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let model = optimizer.step(0.01, model, grads);
        let expected = logits(&model, &input);

        let state = TrainingState::new(500, 1e-3, 1, Some(0.5));
        let weights = save_checkpoint(dir.path(), &model, &optimizer, &state).unwrap();
        assert_eq!(weights, dir.path().join("alexnet-cnn"));
        assert!(state_path(dir.path()).exists());

        let fresh = AlexNet::<TestBackend>::new(&config, &device);
        let (restored, mut restored_optimizer, restored_state) =
            load_checkpoint(dir.path(), fresh, momentum_sgd(), &device).unwrap();
        assert_eq!(restored_state.global_step, 500);

        // weights are stored at half precision
        let actual = logits(&restored, &input);
        assert_eq!(actual.len(), 12);
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() <= 1e-2 * (1.0 + e.abs()), "{a} vs {e}");
        }

        let loss = restored.forward(input.clone()).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &restored);
        let stepped = restored_optimizer.step(0.01, restored, grads);
        assert_eq!(stepped.forward(input).dims(), [2, 6]);
    }

    #[test]
    fn test_load_model_reads_weights_into_inner_backend() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let config = tiny_config();

        let model = AlexNet::<TestBackend>::new(&config, &device);
        save_checkpoint(dir.path(), &model, &momentum_sgd(), &TrainingState::new(1, 1e-3, 0, None))
            .unwrap();

        let restored =
            load_model(dir.path(), AlexNet::<NdArray>::new(&config, &device), &device).unwrap();
        let expected: f64 = model.valid().weight_l2().into_scalar().elem();
        let actual: f64 = restored.weight_l2().into_scalar().elem();
        assert!((actual - expected).abs() <= 1e-2 * expected);
    }

    #[test]
    fn test_load_model_missing_weights_is_checkpoint_error() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let model = AlexNet::<NdArray>::new(&tiny_config(), &device);
        assert!(matches!(
            load_model(dir.path(), model, &device),
            Err(EmotionError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_checkpoint_model_config_sources() {
        let dir = TempDir::new().unwrap();
        let default = AlexNetConfig::new();
        assert_eq!(
            checkpoint_model_config(dir.path(), default.clone()).unwrap().input_size,
            150
        );

        let training = TrainingConfig {
            image_size: 180,
            ..Default::default()
        };
        training
            .save_json(&dir.path().join(TRAINING_CONFIG_FILE))
            .unwrap();
        let from_training = checkpoint_model_config(dir.path(), default.clone()).unwrap();
        assert_eq!(from_training.input_size, 180);
        assert_eq!(from_training.fc_units, 4096);

        tiny_config()
            .save(dir.path().join(MODEL_CONFIG_FILE))
            .unwrap();
        let from_model = checkpoint_model_config(dir.path(), default).unwrap();
        assert_eq!(from_model.input_size, 67);
        assert_eq!(from_model.conv1_filters, 4);
    }

    #[test]
    fn test_checkpoint_model_config_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MODEL_CONFIG_FILE), "not json").unwrap();
        assert!(matches!(
            checkpoint_model_config(dir.path(), AlexNetConfig::new()),
            Err(EmotionError::Checkpoint(_))
        ));
    }
}

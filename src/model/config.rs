//! Training Configuration Module
//!
//! Hyperparameters, paths and schedule for a training run. Loaded from TOML
//! with every missing key taking its default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::alexnet::AlexNetConfig;
use crate::dataset::{default_class_names, IMAGE_SIZE, NUM_CLASSES};
use crate::utils::error::{EmotionError, Result};

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,

    /// Examples per optimizer step; also the per-class read size of each worker
    pub batch_size: usize,

    /// Initial learning rate
    pub learning_rate: f64,

    /// Dropout keep-probability during training
    pub keep_prob: f64,

    /// SGD momentum
    pub momentum: f64,

    /// Weight decay (L2 penalty)
    pub weight_decay: f64,

    /// Continue from the checkpoint in `ckpt_path`
    pub resume: bool,

    /// Log training loss/accuracy every N steps
    pub display_step: usize,

    /// Validate and checkpoint every N steps
    pub test_step: usize,

    pub ckpt_path: PathBuf,
    pub summary_path: PathBuf,

    /// Per-class training image directories live here
    pub train_dir: PathBuf,

    /// Source of the fixed validation batch
    pub eval_dir: PathBuf,

    /// Number of training images; `num_images / batch_size` steps per epoch
    pub num_images: usize,

    /// Validation images read per class
    pub valid_batch_size: usize,

    /// Loader worker threads
    pub num_threads: usize,

    /// Global steps after which the learning rate is multiplied by `decay_factor`
    pub decay_steps: Vec<usize>,
    pub decay_factor: f64,

    pub image_size: u32,

    /// Random seed for reproducibility
    pub seed: u64,

    /// Class sub-directory names in label order
    pub class_names: Vec<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 90,
            batch_size: 126,
            learning_rate: 1e-3,
            keep_prob: 0.5,
            momentum: 0.9,
            weight_decay: 5e-4,
            resume: false,
            display_step: 10,
            test_step: 500,
            ckpt_path: PathBuf::from("ckpt-alexnet"),
            summary_path: PathBuf::from("summary"),
            train_dir: PathBuf::from("/var/data/bias_data/image/train"),
            eval_dir: PathBuf::from("/var/data/bias_data/image/train"),
            num_images: 60_000,
            valid_batch_size: 126,
            num_threads: 3,
            decay_steps: vec![170_000, 350_000],
            decay_factor: 0.1,
            image_size: IMAGE_SIZE,
            seed: 42,
            class_names: default_class_names(),
        }
    }
}

impl TrainingConfig {
    /// Load from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        load_toml_config(path)
    }

    /// Optimizer steps per epoch
    pub fn num_batches(&self) -> usize {
        self.num_images / self.batch_size.max(1)
    }

    /// Model configuration implied by this run
    pub fn model_config(&self) -> AlexNetConfig {
        AlexNetConfig::new()
            .with_num_classes(self.class_names.len())
            .with_input_size(self.image_size as usize)
            .with_keep_prob(self.keep_prob)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(EmotionError::Config(msg.to_string()));

        if self.batch_size == 0 {
            return fail("batch_size must be greater than 0");
        }
        if self.num_batches() == 0 {
            return fail("num_images must be at least batch_size");
        }
        if self.display_step == 0 || self.test_step == 0 {
            return fail("display_step and test_step must be greater than 0");
        }
        if self.num_threads == 0 {
            return fail("num_threads must be greater than 0");
        }
        if self.valid_batch_size == 0 {
            return fail("valid_batch_size must be greater than 0");
        }
        if self.learning_rate <= 0.0 {
            return fail("learning_rate must be positive");
        }
        if self.class_names.len() != NUM_CLASSES {
            return Err(EmotionError::Config(format!(
                "expected {} class names, got {}",
                NUM_CLASSES,
                self.class_names.len()
            )));
        }

        self.model_config().validate().map_err(EmotionError::Config)
    }

    /// Save configuration as pretty JSON (written next to checkpoints)
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Read and deserialize a TOML file
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path).map_err(|e| {
        EmotionError::Config(format!("Failed to read config {}: {e}", path.display()))
    })?;

    toml::from_str(&content).map_err(|e| {
        EmotionError::Config(format!("Failed to parse config {}: {e}", path.display()))
    })
}

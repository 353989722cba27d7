//! # Emotion AlexNet
//!
//! AlexNet facial-emotion classifier built on the Burn framework.
//!
//! ## Features
//!
//! - **Queue-fed training**: background loader threads keep a bounded queue of
//!   preprocessed examples full while the main thread trains
//! - **Six emotion classes**: cheer, fearful, happy, joy, rage, sorrow
//! - **Bias evaluation**: scores old and young test subjects and writes
//!   two-group and six-class result files
//!
//! ## Modules
//!
//! - `dataset`: Preprocessing, per-class sampling, batching and the loader queue
//! - `model`: AlexNet architecture and configuration
//! - `training`: Training loop, learning-rate schedule and checkpoints
//! - `inference`: Prediction, classification and the bias evaluation
//! - `utils`: Logging, errors, metrics and time formatting
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use emotion_alexnet::backend::{default_device, TrainingBackend};
//! use emotion_alexnet::training::{run_training, TrainingConfig};
//!
//! let config = TrainingConfig::default();
//! let summary = run_training::<TrainingBackend>(&config, &default_device())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{
    onehot, EmotionBatch, EmotionBatcher, EmotionDataset, EmotionItem, LoaderPool, CLASS_NAMES,
    IMAGE_SIZE, NUM_CLASSES,
};
pub use inference::{collapse_to_binary, run_bias_evaluation, Predictor};
pub use model::{AlexNet, AlexNetConfig, TrainingConfig};
pub use training::{run_training, LRScheduler, TrainingSummary};
pub use utils::error::{EmotionError, Result};
pub use utils::format_time;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

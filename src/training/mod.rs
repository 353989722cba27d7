//! Training module
//!
//! This module provides:
//! - The queue-fed training loop (momentum SGD, step-decayed learning rate)
//! - Loss and accuracy helpers
//! - Checkpoint save/restore with a training-state sidecar
//!
//! ## Resuming
//!
//! With `resume = true` the weights, optimizer state and global step are
//! restored from `ckpt_path`; training continues at epoch
//! `global_step / num_batches` and the learning rate follows the schedule
//! from that step.

pub mod checkpoint;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::{
    checkpoint_model_config, load_checkpoint, load_model, save_checkpoint, TrainingState,
};
pub use scheduler::LRScheduler;
pub use trainer::{
    accuracy, evaluate_accuracy, regularized_loss, run_training, run_training_with_model,
    softmax_cross_entropy, TrainingSummary,
};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;

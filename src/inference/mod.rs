//! Inference module for prediction and the bias evaluation
//!
//! This module provides:
//! - Batched prediction with a restored model
//! - Top-k classification of single files or directories
//! - Multi-crop averaged prediction
//! - The old/young bias evaluation writing two- and six-class result files

pub mod bias;
pub mod predictor;

pub use bias::{collapse_to_binary, run_bias_evaluation, BiasSummary, GroupSummary};
pub use predictor::{PredictionResult, Predictor};

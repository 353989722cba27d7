//! Model module for the AlexNet emotion classifier
//!
//! This module provides:
//! - The AlexNet architecture with local response normalization
//! - Model and training configuration

pub mod alexnet;
pub mod config;

pub use alexnet::{local_response_norm, AlexNet, AlexNetConfig};
pub use config::{load_toml_config, TrainingConfig};

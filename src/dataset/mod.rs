//! Dataset module for facial-emotion image handling
//!
//! This module provides functionality for:
//! - Preprocessing images (shorter-side resize, center crop, mean subtraction)
//! - Sampling random images from per-class directories
//! - Batching examples into Burn tensors
//! - The bounded example queue fed by background loader workers
//!
//! ## Directory Layout
//!
//! Training images live in one sub-directory per class, named after the
//! class (`cheer_out/`, `fearful_out/`, ...). Test images for the bias
//! evaluation live in two flat directories, one per age group.

pub mod burn_dataset;
pub mod loader;
pub mod preprocess;
pub mod queue;

pub use burn_dataset::{EmotionBatch, EmotionBatcher, EmotionDataset, EmotionItem};
pub use loader::{
    class_counts, dataset_size, list_images, read_batch, read_image, read_test_images,
    read_test_labels, DatasetStats, DirectorySampler,
};
pub use preprocess::{preprocess_image, read_k_patches, IMAGENET_MEAN};
pub use queue::{Coordinator, ExampleSource, LoaderPool};

use crate::utils::error::{EmotionError, Result};

/// Number of emotion classes
pub const NUM_CLASSES: usize = 6;

/// Side length of the square network input
pub const IMAGE_SIZE: u32 = 150;

/// Class names in label-index order; each is also the training sub-directory
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "cheer_out",
    "fearful_out",
    "happy_out",
    "joy_out",
    "rage_out",
    "sorrow_out",
];

/// Get the class name for a given label index
pub fn class_name(label: usize) -> Option<&'static str> {
    CLASS_NAMES.get(label).copied()
}

/// Get the label index for a given class name
pub fn class_index(name: &str) -> Option<usize> {
    CLASS_NAMES.iter().position(|&n| n == name)
}

/// Default class list as owned strings, for configuration
pub fn default_class_names() -> Vec<String> {
    CLASS_NAMES.iter().map(|s| s.to_string()).collect()
}

/// One-hot vector with `1.0` at `index`
pub fn onehot(index: usize) -> Result<[f32; NUM_CLASSES]> {
    if index >= NUM_CLASSES {
        return Err(EmotionError::InvalidLabel {
            index,
            num_classes: NUM_CLASSES,
        });
    }

    let mut vector = [0.0f32; NUM_CLASSES];
    vector[index] = 1.0;
    Ok(vector)
}

/// Index of the largest entry; first one wins on ties
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_idx, best), (idx, &v)| {
            if v > best {
                (idx, v)
            } else {
                (best_idx, best)
            }
        })
        .0
}

//! Burn Dataset Integration
//!
//! Implements Burn's Dataset trait and Batcher for preprocessed emotion
//! examples. Items are already mean-subtracted, so the batcher only packs
//! them into tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::{argmax, NUM_CLASSES};

/// One preprocessed example
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmotionItem {
    /// Flattened CHW floats `[3 * H * W]`, mean-subtracted
    pub image: Vec<f32>,
    /// One-hot label
    pub label: [f32; NUM_CLASSES],
}

impl EmotionItem {
    /// Label index of the one-hot vector
    pub fn class_index(&self) -> usize {
        argmax(&self.label)
    }
}

/// In-memory dataset, used for the fixed validation batch
#[derive(Clone, Debug, Default)]
pub struct EmotionDataset {
    items: Vec<EmotionItem>,
}

impl EmotionDataset {
    pub fn new(items: Vec<EmotionItem>) -> Self {
        Self { items }
    }

    /// Consecutive chunks of at most `chunk_size` items
    pub fn chunks(&self, chunk_size: usize) -> impl Iterator<Item = &[EmotionItem]> {
        self.items.chunks(chunk_size.max(1))
    }
}

impl Dataset<EmotionItem> for EmotionDataset {
    fn get(&self, index: usize) -> Option<EmotionItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of images and one-hot targets
#[derive(Clone, Debug)]
pub struct EmotionBatch<B: Backend> {
    /// Images `[N, 3, H, W]`
    pub images: Tensor<B, 4>,
    /// One-hot targets `[N, NUM_CLASSES]`
    pub targets: Tensor<B, 2>,
}

/// Packs [`EmotionItem`]s into tensors on any backend
#[derive(Clone, Debug)]
pub struct EmotionBatcher {
    image_size: usize,
}

impl EmotionBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }

    /// Pack raw CHW images without labels
    pub fn images<B: Backend>(&self, images: &[Vec<f32>], device: &B::Device) -> Tensor<B, 4> {
        let data: Vec<f32> = images.iter().flat_map(|img| img.iter().copied()).collect();
        Tensor::<B, 4>::from_floats(
            TensorData::new(data, [images.len(), 3, self.image_size, self.image_size]),
            device,
        )
    }
}

impl<B: Backend> Batcher<B, EmotionItem, EmotionBatch<B>> for EmotionBatcher {
    fn batch(&self, items: Vec<EmotionItem>, device: &B::Device) -> EmotionBatch<B> {
        let batch_size = items.len();

        let images_data: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.iter().copied())
            .collect();
        let targets_data: Vec<f32> = items
            .iter()
            .flat_map(|item| item.label.iter().copied())
            .collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(
                images_data,
                [batch_size, 3, self.image_size, self.image_size],
            ),
            device,
        );
        let targets = Tensor::<B, 2>::from_floats(
            TensorData::new(targets_data, [batch_size, NUM_CLASSES]),
            device,
        );

        EmotionBatch { images, targets }
    }
}

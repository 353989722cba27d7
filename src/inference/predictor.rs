//! Inference Predictor Module
//!
//! Runs a restored AlexNet on preprocessed images. Use a non-autodiff
//! backend here: dropout is then inactive and probabilities are
//! deterministic.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::tensor::backend::Backend;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{
    argmax, class_name, list_images, preprocess_image, read_k_patches, EmotionBatcher,
    NUM_CLASSES,
};
use crate::model::{AlexNet, AlexNetConfig};
use crate::training::checkpoint::{checkpoint_model_config, load_model};
use crate::utils::error::{EmotionError, Result};

/// Default number of images per forward pass
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Path to the input image (if applicable)
    pub image_path: Option<PathBuf>,

    /// Predicted class index
    pub predicted_class: usize,

    /// Predicted class name
    pub class_name: String,

    /// Probability of the predicted class
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: [f32; NUM_CLASSES],

    /// Top-k predictions with their probabilities
    pub top_k: Vec<(usize, String, f32)>,

    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl PredictionResult {
    pub fn new(
        probabilities: [f32; NUM_CLASSES],
        top_k: usize,
        inference_time: Duration,
        image_path: Option<PathBuf>,
    ) -> Self {
        let predicted_class = argmax(&probabilities);

        let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

        let top_k = indexed
            .into_iter()
            .take(top_k)
            .map(|(idx, prob)| (idx, class_name(idx).unwrap_or("unknown").to_string(), prob))
            .collect();

        Self {
            image_path,
            predicted_class,
            class_name: class_name(predicted_class).unwrap_or("unknown").to_string(),
            confidence: probabilities[predicted_class],
            probabilities,
            top_k,
            inference_time_ms: inference_time.as_secs_f64() * 1000.0,
        }
    }

    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = String::new();

        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {:?}\n", path));
        }
        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.class_name, self.predicted_class
        ));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence * 100.0));
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));

        output.push_str(&format!("\nTop-{} predictions:\n", self.top_k.len()));
        for (i, (idx, name, prob)) in self.top_k.iter().enumerate() {
            output.push_str(&format!(
                "  {}. {} (class {}) - {:.2}%\n",
                i + 1,
                name,
                idx,
                prob * 100.0
            ));
        }

        output
    }
}

/// Predictor wrapping a trained model
pub struct Predictor<B: Backend> {
    model: AlexNet<B>,
    batcher: EmotionBatcher,
    image_size: u32,
    batch_size: usize,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Restore weights from the checkpoint directory
    pub fn load(ckpt_dir: &Path, config: &AlexNetConfig, device: &B::Device) -> Result<Self> {
        config.validate().map_err(EmotionError::Config)?;
        if config.num_classes != NUM_CLASSES {
            return Err(EmotionError::Config(format!(
                "predictor expects {} classes, config has {}",
                NUM_CLASSES, config.num_classes
            )));
        }

        let model = load_model(ckpt_dir, AlexNet::new(config, device), device)?;
        Ok(Self::from_model(model, config.input_size as u32, device.clone()))
    }

    /// Restore a checkpoint using the architecture recorded next to it
    ///
    /// Checkpoints without a recorded configuration are assumed to hold the
    /// default network.
    pub fn from_checkpoint(ckpt_dir: &Path, device: &B::Device) -> Result<Self> {
        let config = checkpoint_model_config(ckpt_dir, AlexNetConfig::new())?;
        debug!("Checkpoint architecture: input {}", config.input_size);
        Self::load(ckpt_dir, &config, device)
    }

    /// Wrap an in-memory model
    pub fn from_model(model: AlexNet<B>, image_size: u32, device: B::Device) -> Self {
        Self {
            model,
            batcher: EmotionBatcher::new(image_size as usize),
            image_size,
            batch_size: DEFAULT_BATCH_SIZE,
            device,
        }
    }

    /// Set the number of images per forward pass
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Softmax probabilities for preprocessed images
    pub fn predict(&self, images: &[Vec<f32>]) -> Result<Vec<[f32; NUM_CLASSES]>> {
        let expected = 3 * (self.image_size as usize).pow(2);
        if let Some(bad) = images.iter().find(|img| img.len() != expected) {
            return Err(EmotionError::Model(format!(
                "image has {} values, expected {}",
                bad.len(),
                expected
            )));
        }

        let mut results = Vec::with_capacity(images.len());
        for chunk in images.chunks(self.batch_size) {
            let input = self.batcher.images::<B>(chunk, &self.device);
            let probs = self
                .model
                .forward_softmax(input)
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| EmotionError::Model(format!("{:?}", e)))?;

            for row in probs.chunks(NUM_CLASSES) {
                let row: [f32; NUM_CLASSES] = row
                    .try_into()
                    .map_err(|_| EmotionError::Model("unexpected output width".to_string()))?;
                results.push(row);
            }
            debug!("Predicted chunk of {}", chunk.len());
        }

        Ok(results)
    }

    /// Classify one image file
    pub fn predict_file(&self, path: &Path, top_k: usize) -> Result<PredictionResult> {
        let start = Instant::now();
        let image = preprocess_image(path, self.image_size)?;
        let probs = self
            .predict(std::slice::from_ref(&image))?
            .pop()
            .ok_or_else(|| EmotionError::Model("empty prediction".to_string()))?;

        Ok(PredictionResult::new(
            probs,
            top_k,
            start.elapsed(),
            Some(path.to_path_buf()),
        ))
    }

    /// Classify a file, or every image file of a directory
    pub fn classify(&self, path: &Path, top_k: usize) -> Result<Vec<PredictionResult>> {
        if path.is_dir() {
            list_images(path)?
                .iter()
                .map(|file| self.predict_file(file, top_k))
                .collect()
        } else {
            Ok(vec![self.predict_file(path, top_k)?])
        }
    }

    /// Probabilities averaged over `k` random patches of one image
    ///
    /// The shorter side is first scaled to `image_size * 256 / 224`, the same
    /// ratio as the classic 256/224 multi-crop scheme.
    pub fn multi_crop_predict<R: Rng + ?Sized>(
        &self,
        path: &Path,
        k: usize,
        rng: &mut R,
    ) -> Result<[f32; NUM_CLASSES]> {
        if k == 0 {
            return Err(EmotionError::Config("k must be at least 1".to_string()));
        }

        let resize_to = self.image_size * 256 / 224;
        let patches = read_k_patches(path, k, resize_to, self.image_size, rng)?;
        let predictions = self.predict(&patches)?;

        let mut mean = [0.0f32; NUM_CLASSES];
        for probs in &predictions {
            for (acc, p) in mean.iter_mut().zip(probs) {
                *acc += p / predictions.len() as f32;
            }
        }
        Ok(mean)
    }
}

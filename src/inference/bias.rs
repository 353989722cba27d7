//! Old/young bias evaluation
//!
//! Scores two flat directories of face images (old subjects, then young
//! subjects), collapses the six emotion probabilities into two groups and
//! writes both views as comma-separated result files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::predictor::Predictor;
use crate::dataset::{read_test_images, CLASS_NAMES, NUM_CLASSES};
use crate::utils::error::{EmotionError, Result};

/// Label written for images of the old group
pub const OLD_LABEL: u8 = 1;
/// Label written for images of the young group
pub const YOUNG_LABEL: u8 = 0;

/// Class indices summed into each binary column
///
/// Column 0 is cheer + happy + joy, column 1 is fearful + rage + sorrow.
pub const BINARY_GROUPS: [[usize; 3]; 2] = [[0, 2, 3], [1, 4, 5]];

pub const TWO_CLASS_FILE: &str = "test_results_two.txt";
pub const SIX_CLASS_FILE: &str = "test_results_six.txt";

/// Collapse six-way probabilities into the two emotion groups
pub fn collapse_to_binary(probs: &[f32; NUM_CLASSES]) -> [f32; 2] {
    BINARY_GROUPS.map(|group| group.iter().map(|&i| probs[i]).sum())
}

/// `label,c0,c1`
pub fn format_two_class_row(label: u8, binary: &[f32; 2]) -> String {
    format!("{},{},{}", label, binary[0], binary[1])
}

/// `label,p0,...,p5`
pub fn format_six_class_row(label: u8, probs: &[f32; NUM_CLASSES]) -> String {
    let values: Vec<String> = probs.iter().map(|p| p.to_string()).collect();
    format!("{},{}", label, values.join(","))
}

/// Write both result files into `output_dir`
pub fn write_results(
    output_dir: &Path,
    labels: &[u8],
    probabilities: &[[f32; NUM_CLASSES]],
) -> Result<(PathBuf, PathBuf)> {
    if labels.len() != probabilities.len() {
        return Err(EmotionError::Model(format!(
            "{} labels for {} predictions",
            labels.len(),
            probabilities.len()
        )));
    }
    std::fs::create_dir_all(output_dir)?;

    let two_path = output_dir.join(TWO_CLASS_FILE);
    let six_path = output_dir.join(SIX_CLASS_FILE);
    let mut two = BufWriter::new(File::create(&two_path)?);
    let mut six = BufWriter::new(File::create(&six_path)?);

    for (&label, probs) in labels.iter().zip(probabilities) {
        writeln!(two, "{}", format_two_class_row(label, &collapse_to_binary(probs)))?;
        writeln!(six, "{}", format_six_class_row(label, probs))?;
    }
    two.flush()?;
    six.flush()?;

    Ok((two_path, six_path))
}

/// Aggregate scores for one age group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub label: u8,
    pub count: usize,
    pub mean_binary: [f64; 2],
    pub mean_probabilities: [f64; NUM_CLASSES],
}

/// Outcome of a bias evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasSummary {
    pub old: GroupSummary,
    pub young: GroupSummary,
    pub two_class_file: PathBuf,
    pub six_class_file: PathBuf,
}

impl BiasSummary {
    /// Print the per-group means to console
    pub fn print(&self) {
        println!("\n{}", "Bias Evaluation:".cyan().bold());
        for (name, group) in [("old", &self.old), ("young", &self.young)] {
            println!(
                "  {:6} (label {}) {:5} images  positive {:.4}  negative {:.4}",
                name, group.label, group.count, group.mean_binary[0], group.mean_binary[1]
            );
            for (class, p) in CLASS_NAMES.iter().zip(group.mean_probabilities) {
                println!("      {:12} {:.4}", class, p);
            }
        }
        println!("\n  📄 {:?}", self.two_class_file);
        println!("  📄 {:?}", self.six_class_file);
    }
}

/// Mean scores over the rows carrying `label`
pub fn summarize_group(
    label: u8,
    labels: &[u8],
    probabilities: &[[f32; NUM_CLASSES]],
) -> GroupSummary {
    let mut count = 0usize;
    let mut binary = [0.0f64; 2];
    let mut six = [0.0f64; NUM_CLASSES];

    for (probs, _) in probabilities
        .iter()
        .zip(labels)
        .filter(|(_, l)| **l == label)
    {
        count += 1;
        for (acc, v) in binary.iter_mut().zip(collapse_to_binary(probs)) {
            *acc += v as f64;
        }
        for (acc, v) in six.iter_mut().zip(probs) {
            *acc += *v as f64;
        }
    }

    if count > 0 {
        binary.iter_mut().for_each(|v| *v /= count as f64);
        six.iter_mut().for_each(|v| *v /= count as f64);
    }

    GroupSummary {
        label,
        count,
        mean_binary: binary,
        mean_probabilities: six,
    }
}

/// Score `old_dir` (label 1) then `young_dir` (label 0) and write the result files
pub fn run_bias_evaluation<B: Backend>(
    predictor: &Predictor<B>,
    old_dir: &Path,
    young_dir: &Path,
    output_dir: &Path,
) -> Result<BiasSummary> {
    let size = predictor.image_size();
    let old_images = read_test_images(old_dir, size)?;
    let young_images = read_test_images(young_dir, size)?;
    info!(
        "Scoring {} old and {} young images",
        old_images.len(),
        young_images.len()
    );

    let labels: Vec<u8> = std::iter::repeat(OLD_LABEL)
        .take(old_images.len())
        .chain(std::iter::repeat(YOUNG_LABEL).take(young_images.len()))
        .collect();

    let mut images = old_images;
    images.extend(young_images);
    let probabilities = predictor.predict(&images)?;

    let (two_class_file, six_class_file) = write_results(output_dir, &labels, &probabilities)?;
    info!("Results written to {:?}", output_dir);

    Ok(BiasSummary {
        old: summarize_group(OLD_LABEL, &labels, &probabilities),
        young: summarize_group(YOUNG_LABEL, &labels, &probabilities),
        two_class_file,
        six_class_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::alexnet::tests::tiny_config;
    use crate::model::AlexNet;
    use burn_ndarray::NdArray;
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_collapse_to_binary_groups() {
        let probs = [0.1, 0.2, 0.05, 0.15, 0.3, 0.2];
        let binary = collapse_to_binary(&probs);
        assert!((binary[0] - 0.3).abs() < 1e-6);
        assert!((binary[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_row_formats() {
        assert_eq!(format_two_class_row(1, &[0.25, 0.75]), "1,0.25,0.75");
        assert_eq!(
            format_six_class_row(0, &[0.5, 0.0, 0.25, 0.125, 0.125, 0.0]),
            "0,0.5,0,0.25,0.125,0.125,0"
        );
    }

    #[test]
    fn test_write_results_and_summary() {
        let dir = TempDir::new().unwrap();
        let labels = [1u8, 1, 0];
        let probs = [
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.5, 0.5],
        ];

        let (two, six) = write_results(dir.path(), &labels, &probs).unwrap();
        let two = std::fs::read_to_string(two).unwrap();
        assert_eq!(two.lines().collect::<Vec<_>>(), vec!["1,1,0", "1,0,1", "0,0,1"]);
        let six = std::fs::read_to_string(six).unwrap();
        assert_eq!(six.lines().next(), Some("1,1,0,0,0,0,0"));

        let old = summarize_group(OLD_LABEL, &labels, &probs);
        assert_eq!(old.count, 2);
        assert!((old.mean_binary[0] - 0.5).abs() < 1e-9);
        let young = summarize_group(YOUNG_LABEL, &labels, &probs);
        assert_eq!(young.count, 1);
        assert!((young.mean_probabilities[4] - 0.5).abs() < 1e-9);

        assert!(write_results(dir.path(), &labels[..2], &probs).is_err());
    }

    #[test]
    fn test_run_bias_evaluation_orders_old_first() {
        let dir = TempDir::new().unwrap();
        let old_dir = dir.path().join("test_old");
        let young_dir = dir.path().join("test_young");
        for (folder, n) in [(&old_dir, 2), (&young_dir, 3)] {
            std::fs::create_dir_all(folder).unwrap();
            for i in 0..n {
                DynamicImage::ImageRgb8(RgbImage::from_pixel(70, 70, Rgb([i as u8 * 50; 3])))
                    .save(folder.join(format!("{i}.png")))
                    .unwrap();
            }
        }

        let device = Default::default();
        let model = AlexNet::<NdArray>::new(&tiny_config(), &device);
        let predictor = Predictor::from_model(model, 67, device);
        let out = dir.path().join("out");

        let summary = run_bias_evaluation(&predictor, &old_dir, &young_dir, &out).unwrap();
        assert_eq!(summary.old.count, 2);
        assert_eq!(summary.young.count, 3);

        let rows = std::fs::read_to_string(out.join(TWO_CLASS_FILE)).unwrap();
        let labels: Vec<&str> = rows.lines().map(|l| &l[..1]).collect();
        assert_eq!(labels, vec!["1", "1", "0", "0", "0"]);
        let six = std::fs::read_to_string(out.join(SIX_CLASS_FILE)).unwrap();
        assert!(six.lines().all(|l| l.split(',').count() == 7));
    }
}

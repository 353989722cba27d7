//! Emotion dataset loader
//!
//! Random sampling from per-class image directories, plus the sequential
//! readers used by the bias evaluation and the `stats` command.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::burn_dataset::EmotionItem;
use super::preprocess::preprocess_image;
use super::queue::ExampleSource;
use super::{onehot, NUM_CLASSES};
use crate::utils::error::{EmotionError, Result};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Whether a path has a recognised image extension
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `folder`, sorted by file name
pub fn list_images<P: AsRef<Path>>(folder: P) -> Result<Vec<PathBuf>> {
    let folder = folder.as_ref();
    if !folder.is_dir() {
        return Err(EmotionError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("directory does not exist: {}", folder.display()),
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Preprocess one uniformly chosen image from `folder`
pub fn read_image<P: AsRef<Path>, R: Rng + ?Sized>(
    folder: P,
    size: u32,
    rng: &mut R,
) -> Result<Vec<f32>> {
    let folder = folder.as_ref();
    let files = list_images(folder)?;
    let path = files
        .choose(rng)
        .ok_or_else(|| EmotionError::EmptyClassDir(folder.to_path_buf()))?;
    preprocess_image(path, size)
}

/// `batch_size` random images from every class directory, shuffled
///
/// Returns `class_names.len() * batch_size` examples; class `j` is labelled
/// `onehot(j)`.
pub fn read_batch<P: AsRef<Path>, R: Rng + ?Sized>(
    batch_size: usize,
    source: P,
    class_names: &[String],
    size: u32,
    rng: &mut R,
) -> Result<Vec<EmotionItem>> {
    let source = source.as_ref();
    let mut batch = Vec::with_capacity(batch_size * class_names.len());

    for (label, class) in class_names.iter().enumerate() {
        let folder = source.join(class);
        let files = list_images(&folder)?;
        if files.is_empty() {
            return Err(EmotionError::EmptyClassDir(folder));
        }

        let target = onehot(label)?;
        for _ in 0..batch_size {
            // non-empty checked above
            let path = &files[rng.gen_range(0..files.len())];
            batch.push(EmotionItem {
                image: preprocess_image(path, size)?,
                label: target,
            });
        }
    }

    batch.shuffle(rng);
    Ok(batch)
}

/// Preprocess every image in `folder` in file-name order
pub fn read_test_images<P: AsRef<Path>>(folder: P, size: u32) -> Result<Vec<Vec<f32>>> {
    let folder = folder.as_ref();
    let files = list_images(folder)?;
    info!("Reading {} test images from {:?}", files.len(), folder);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message("preprocessing");

    let images = files
        .par_iter()
        .map(|path| {
            let result = preprocess_image(path, size);
            pb.inc(1);
            result
        })
        .collect::<Result<Vec<_>>>();

    pb.finish_and_clear();
    images
}

/// Parse a file of 1-based class indices, one per line, into one-hot labels
pub fn read_test_labels<P: AsRef<Path>>(path: P) -> Result<Vec<[f32; NUM_CLASSES]>> {
    let content = std::fs::read_to_string(path.as_ref())?;

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let index: usize = line
                .parse()
                .map_err(|_| EmotionError::Config(format!("invalid label line '{}'", line)))?;
            let zero_based = index.checked_sub(1).ok_or(EmotionError::InvalidLabel {
                index,
                num_classes: NUM_CLASSES,
            })?;
            onehot(zero_based)
        })
        .collect()
}

/// Per-class file counts of a training directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_counts: Vec<(String, usize)>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Dataset Statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("\n  Samples per class:");

        for (idx, (name, count)) in self.class_counts.iter().enumerate() {
            let bar_len = if self.total_samples > 0 {
                (*count as f32 / self.total_samples as f32 * 40.0) as usize
            } else {
                0
            };
            println!("    {:3}. {:16} {:6} {}", idx, name, count, "█".repeat(bar_len));
        }
    }
}

/// Image counts for the given class sub-directories of `source`
pub fn class_counts<P: AsRef<Path>>(source: P, class_names: &[String]) -> Result<DatasetStats> {
    let source = source.as_ref();
    let mut counts = Vec::with_capacity(class_names.len());

    for class in class_names {
        let count = list_images(source.join(class))?.len();
        debug!("Class '{}': {} images", class, count);
        counts.push((class.clone(), count));
    }

    Ok(DatasetStats {
        total_samples: counts.iter().map(|(_, c)| c).sum(),
        class_counts: counts,
    })
}

/// Total number of image files across all sub-directories of `source`
pub fn dataset_size<P: AsRef<Path>>(source: P) -> Result<usize> {
    let mut total = 0;
    for entry in std::fs::read_dir(source.as_ref())? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            total += WalkDir::new(entry.path())
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
                .count();
        }
    }
    Ok(total)
}

/// Random per-class sampler feeding one loader worker
pub struct DirectorySampler {
    source: PathBuf,
    class_names: Vec<String>,
    batch_size: usize,
    image_size: u32,
    rng: ChaCha8Rng,
}

impl DirectorySampler {
    pub fn new(
        source: PathBuf,
        class_names: Vec<String>,
        batch_size: usize,
        image_size: u32,
        seed: u64,
    ) -> Self {
        Self {
            source,
            class_names,
            batch_size,
            image_size,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl ExampleSource for DirectorySampler {
    fn read_batch(&mut self) -> Result<Vec<EmotionItem>> {
        read_batch(
            self.batch_size,
            &self.source,
            &self.class_names,
            self.image_size,
            &mut self.rng,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dataset::{argmax, default_class_names};
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    /// Write `per_class` small images into every class directory of `root`
    pub(crate) fn make_class_tree(root: &Path, per_class: usize) {
        for (label, class) in default_class_names().iter().enumerate() {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let shade = (label * 40 + i) as u8;
                DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 10, Rgb([shade, shade, shade])))
                    .save(dir.join(format!("img_{i}.png")))
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b.JPG")));
        assert!(is_image_file(Path::new("b.bmp")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("noext")));
    }

    #[test]
    fn test_read_batch_counts_and_labels() {
        let dir = TempDir::new().unwrap();
        make_class_tree(dir.path(), 2);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let batch = read_batch(3, dir.path(), &default_class_names(), 8, &mut rng).unwrap();
        assert_eq!(batch.len(), 18);
        for item in &batch {
            assert_eq!(item.image.len(), 3 * 8 * 8);
        }
        let mut per_class = [0usize; NUM_CLASSES];
        for item in &batch {
            per_class[argmax(&item.label)] += 1;
        }
        assert_eq!(per_class, [3; NUM_CLASSES]);
    }

    #[test]
    fn test_read_batch_empty_class_dir() {
        let dir = TempDir::new().unwrap();
        make_class_tree(dir.path(), 1);
        let empty = dir.path().join("rage_out");
        std::fs::remove_dir_all(&empty).unwrap();
        std::fs::create_dir_all(&empty).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let err = read_batch(1, dir.path(), &default_class_names(), 8, &mut rng).unwrap_err();
        assert!(matches!(err, EmotionError::EmptyClassDir(p) if p.ends_with("rage_out")));
    }

    #[test]
    fn test_read_image_empty_folder() {
        let dir = TempDir::new().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            read_image(dir.path(), 8, &mut rng),
            Err(EmotionError::EmptyClassDir(_))
        ));
    }

    #[test]
    fn test_read_test_images_sorted() {
        let dir = TempDir::new().unwrap();
        for (name, shade) in [("b.png", 200u8), ("a.png", 0u8)] {
            DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([shade, shade, shade])))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("readme.txt"), "skip").unwrap();

        let images = read_test_images(dir.path(), 8).unwrap();
        assert_eq!(images.len(), 2);
        // a.png (black) first
        assert!(images[0][0] < images[1][0]);
    }

    #[test]
    fn test_read_test_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "1\n6\n\n3\n").unwrap();

        let labels = read_test_labels(&path).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(argmax(&labels[0]), 0);
        assert_eq!(argmax(&labels[1]), 5);
        assert_eq!(argmax(&labels[2]), 2);

        std::fs::write(&path, "0\n").unwrap();
        assert!(read_test_labels(&path).is_err());
        std::fs::write(&path, "7\n").unwrap();
        assert!(read_test_labels(&path).is_err());
    }

    #[test]
    fn test_dataset_size_and_counts() {
        let dir = TempDir::new().unwrap();
        make_class_tree(dir.path(), 2);

        assert_eq!(dataset_size(dir.path()).unwrap(), 12);
        std::fs::write(dir.path().join("cheer_out").join("Thumbs.db"), b"x").unwrap();
        std::fs::write(dir.path().join("rage_out").join("labels.txt"), b"x").unwrap();
        assert_eq!(dataset_size(dir.path()).unwrap(), 12);

        let stats = class_counts(dir.path(), &default_class_names()).unwrap();
        assert_eq!(stats.total_samples, 12);
        assert_eq!(stats.class_counts[0], ("cheer_out".to_string(), 2));
    }
}

//! Image preprocessing
//!
//! Turns a decoded image into the float layout the network expects:
//! shorter side resized to the target size, center-cropped to a square,
//! per-channel mean subtracted on the 0-255 scale, channel-first (CHW).

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};
use rand::Rng;

use crate::utils::error::{EmotionError, Result};

/// Per-channel RGB mean subtracted from every pixel
pub const IMAGENET_MEAN: [f32; 3] = [123.68, 116.779, 103.939];

/// Target dimensions when the shorter side is scaled to `target`
///
/// Aspect ratio is preserved; the longer side is floored.
pub fn shorter_side_dims(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width < height {
        let h = (target as u64 * height as u64 / width.max(1) as u64) as u32;
        (target, h)
    } else {
        let w = (target as u64 * width as u64 / height.max(1) as u64) as u32;
        (w, target)
    }
}

/// Resize so the shorter side equals `target` (Lanczos)
pub fn resize_shorter_side(img: &DynamicImage, target: u32) -> DynamicImage {
    let (w, h) = shorter_side_dims(img.width(), img.height(), target);
    img.resize_exact(w, h, FilterType::Lanczos3)
}

/// Crop the central `size × size` region
pub fn center_crop(img: &DynamicImage, size: u32) -> DynamicImage {
    let x = img.width().saturating_sub(size) / 2;
    let y = img.height().saturating_sub(size) / 2;
    img.crop_imm(x, y, size, size)
}

/// Mean-subtracted CHW floats for an RGB image
pub fn to_chw_mean_subtracted(rgb: &RgbImage) -> Vec<f32> {
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let plane = width * height;
    let mut tensor = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = y as usize * width + x as usize;
        for c in 0..3 {
            tensor[c * plane + offset] = pixel[c] as f32 - IMAGENET_MEAN[c];
        }
    }

    tensor
}

/// Full preprocessing for an already decoded image
pub fn preprocess(img: &DynamicImage, size: u32) -> Vec<f32> {
    let resized = resize_shorter_side(img, size);
    let cropped = center_crop(&resized, size);
    to_chw_mean_subtracted(&cropped.to_rgb8())
}

/// Open and decode an image file
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| EmotionError::Image(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| EmotionError::Image(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| EmotionError::Image(path.to_path_buf(), e.to_string()))
}

/// Load an image file and preprocess it to `[3, size, size]`
pub fn preprocess_image<P: AsRef<Path>>(path: P, size: u32) -> Result<Vec<f32>> {
    let img = open_image(path.as_ref())?;
    Ok(preprocess(&img, size))
}

/// `k` random `crop × crop` patches after resizing the shorter side to `resize_to`
pub fn read_k_patches<P: AsRef<Path>, R: Rng + ?Sized>(
    path: P,
    k: usize,
    resize_to: u32,
    crop: u32,
    rng: &mut R,
) -> Result<Vec<Vec<f32>>> {
    if crop == 0 || crop > resize_to {
        return Err(EmotionError::Config(format!(
            "crop size {} must be in 1..={}",
            crop, resize_to
        )));
    }

    let img = open_image(path.as_ref())?;
    let resized = resize_shorter_side(&img, resize_to);
    let max_x = resized.width().saturating_sub(crop);
    let max_y = resized.height().saturating_sub(crop);

    let patches = (0..k)
        .map(|_| {
            let x = rng.gen_range(0..=max_x);
            let y = rng.gen_range(0..=max_y);
            to_chw_mean_subtracted(&resized.crop_imm(x, y, crop, crop).to_rgb8())
        })
        .collect();

    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_shorter_side_dims() {
        assert_eq!(shorter_side_dims(300, 200, 150), (225, 150));
        assert_eq!(shorter_side_dims(200, 300, 150), (150, 225));
        assert_eq!(shorter_side_dims(100, 100, 150), (150, 150));
        // floor of 150 * 301 / 200 = 225.75
        assert_eq!(shorter_side_dims(301, 200, 150), (225, 150));
    }

    #[test]
    fn test_resize_preserves_aspect_ratio() {
        let resized = resize_shorter_side(&solid(80, 40, [0, 0, 0]), 20);
        assert_eq!((resized.width(), resized.height()), (40, 20));
    }

    #[test]
    fn test_center_crop_is_square() {
        let cropped = center_crop(&solid(40, 20, [0, 0, 0]), 20);
        assert_eq!((cropped.width(), cropped.height()), (20, 20));
    }

    #[test]
    fn test_mean_subtraction_per_channel() {
        let rgb = RgbImage::from_pixel(2, 2, Rgb([200, 100, 50]));
        let tensor = to_chw_mean_subtracted(&rgb);
        assert_eq!(tensor.len(), 12);
        assert!((tensor[0] - (200.0 - 123.68)).abs() < 1e-4);
        assert!((tensor[4] - (100.0 - 116.779)).abs() < 1e-4);
        assert!((tensor[11] - (50.0 - 103.939)).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_image_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("face.png");
        solid(60, 30, [10, 20, 30]).save(&path).unwrap();

        let tensor = preprocess_image(&path, 16).unwrap();
        assert_eq!(tensor.len(), 3 * 16 * 16);
        // Solid color survives resizing, so every red value is equal
        assert!((tensor[0] - (10.0 - 123.68)).abs() < 1.0);
    }

    #[test]
    fn test_preprocess_image_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        assert!(matches!(
            preprocess_image(&path, 16),
            Err(EmotionError::Image(_, _))
        ));
    }

    #[test]
    fn test_read_k_patches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("face.png");
        solid(50, 40, [0, 0, 0]).save(&path).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let patches = read_k_patches(&path, 4, 32, 24, &mut rng).unwrap();
        assert_eq!(patches.len(), 4);
        assert!(patches.iter().all(|p| p.len() == 3 * 24 * 24));

        assert!(read_k_patches(&path, 1, 16, 24, &mut rng).is_err());
    }
}

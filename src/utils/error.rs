//! Error Handling Module
//!
//! Defines the error type for the emotion classifier library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for training, data loading and inference
#[derive(Error, Debug)]
pub enum EmotionError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error opening or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    Image(PathBuf, String),

    /// A class directory exists but holds no image files
    #[error("No images found in class directory: {0}")]
    EmptyClassDir(PathBuf),

    /// Label index outside the class range
    #[error("Invalid label index {index} (expected < {num_classes})")]
    InvalidLabel { index: usize, num_classes: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Saving or restoring a checkpoint failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Every loader worker has exited and the queue is drained
    #[error("Example queue closed: all loader workers have exited")]
    QueueClosed,

    /// A loader worker failed or panicked
    #[error("Loader worker '{name}' failed: {message}")]
    Worker { name: String, message: String },

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),
}

/// Convenience Result type for library operations
pub type Result<T> = std::result::Result<T, EmotionError>;

impl From<serde_json::Error> for EmotionError {
    fn from(err: serde_json::Error) -> Self {
        EmotionError::Checkpoint(err.to_string())
    }
}

impl From<burn::record::RecorderError> for EmotionError {
    fn from(err: burn::record::RecorderError) -> Self {
        EmotionError::Checkpoint(format!("{:?}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EmotionError::Config("batch_size must be positive".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: batch_size must be positive"
        );
    }

    #[test]
    fn test_image_error_mentions_path() {
        let err = EmotionError::Image(PathBuf::from("/faces/joy_out/a.jpg"), "bad".to_string());
        assert!(format!("{}", err).contains("a.jpg"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EmotionError = io_err.into();
        assert!(matches!(err, EmotionError::Io(_)));
    }

    #[test]
    fn test_invalid_label_display() {
        let err = EmotionError::InvalidLabel {
            index: 7,
            num_classes: 6,
        };
        assert_eq!(format!("{}", err), "Invalid label index 7 (expected < 6)");
    }
}

//! Error types for subject segmentation operations

use thiserror::Error;

/// Result type alias for segmentation operations
pub type Result<T> = std::result::Result<T, SegmentationError>;

/// Error types for segmentation, compositing and frame decoding
#[derive(Error, Debug)]
pub enum SegmentationError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed input data (mask buffers, camera frames)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Mask generation or compositing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Unexpected internal state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SegmentationError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = SegmentationError::invalid_config("test config error");
        assert!(matches!(err, SegmentationError::InvalidConfig(_)));

        let err = SegmentationError::invalid_input("short mask buffer");
        assert!(matches!(err, SegmentationError::InvalidInput(_)));
    }

    #[test]
    fn test_error_display() {
        let err = SegmentationError::invalid_config("Invalid model path");
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model path");
    }

    #[test]
    fn test_enhanced_error_context() {
        let err = SegmentationError::model_error_with_context(
            "load",
            Path::new("/models/isnet.onnx"),
            "file not found",
            &["check file path", "verify permissions"],
        );
        let error_string = err.to_string();
        assert!(error_string.contains("load"));
        assert!(error_string.contains("/models/isnet.onnx"));
        assert!(error_string.contains("Suggestions"));

        let err = SegmentationError::config_value_error("input size", 8, "32-4096", Some(1024));
        let error_string = err.to_string();
        assert!(error_string.contains("input size"));
        assert!(error_string.contains("32-4096"));
        assert!(error_string.contains("Recommended: 1024"));

        let err = SegmentationError::processing_stage_error(
            "compositing",
            "mask data shorter than extent",
            Some("4x4 RGBA"),
        );
        let error_string = err.to_string();
        assert!(error_string.contains("compositing"));
        assert!(error_string.contains("4x4 RGBA"));
    }
}

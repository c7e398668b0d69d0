//! Model file loading

use crate::error::{Result, SegmentationError};
use std::fs;
use std::path::{Path, PathBuf};

/// Basic information about a loaded model
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub path: PathBuf,
}

/// An ONNX model file on disk
#[derive(Debug, Clone)]
pub struct ModelFile {
    path: PathBuf,
}

impl ModelFile {
    /// Reference a model file, checking it exists and looks like ONNX
    ///
    /// # Errors
    /// - File missing
    /// - Extension other than `.onnx`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SegmentationError::model_error_with_context(
                "locate",
                path,
                "file not found",
                &["check the --model path", "verify read permissions"],
            ));
        }
        let is_onnx = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("onnx"));
        if !is_onnx {
            return Err(SegmentationError::model_error_with_context(
                "open",
                path,
                "expected an .onnx file",
                &[],
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Resolve the configured model path
    ///
    /// # Errors
    /// - No model path configured
    /// - See [`ModelFile::new`]
    pub fn from_config(config: &crate::config::SegmenterConfig) -> Result<Self> {
        let path = config.model_path.as_ref().ok_or_else(|| {
            SegmentationError::invalid_config("No model path configured. Use --model <FILE.onnx>")
        })?;
        Self::new(path)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the model bytes
    ///
    /// # Errors
    /// - File I/O errors
    pub fn load(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| {
            SegmentationError::model_error_with_context("read", &self.path, &e.to_string(), &[])
        })
    }

    /// Model metadata from the file system
    ///
    /// # Errors
    /// - File metadata unavailable
    pub fn info(&self) -> Result<ModelInfo> {
        let metadata = fs::metadata(&self.path)?;
        let name = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        Ok(ModelInfo {
            name,
            size_bytes: usize::try_from(metadata.len()).unwrap_or(usize::MAX),
            path: self.path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_model_rejected() {
        let err = ModelFile::new("/definitely/not/here.onnx").unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_wrong_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        fs::write(&path, b"not a model").unwrap();
        assert!(ModelFile::new(&path).is_err());
    }

    #[test]
    fn test_model_info_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("isnet-general.onnx");
        fs::write(&path, [1u8, 2, 3, 4]).unwrap();

        let model = ModelFile::new(&path).unwrap();
        let info = model.info().unwrap();
        assert_eq!(info.name, "isnet-general");
        assert_eq!(info.size_bytes, 4);
        assert_eq!(model.load().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_from_config_requires_path() {
        let config = crate::config::SegmenterConfig::default();
        assert!(matches!(
            ModelFile::from_config(&config),
            Err(SegmentationError::InvalidConfig(_))
        ));
    }
}

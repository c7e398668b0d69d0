//! Mock backend implementation for testing and debugging

use crate::config::SegmenterConfig;
use crate::error::{Result, SegmentationError};
use crate::inference::InferenceBackend;
use instant::Duration;
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock backend for testing without model files
///
/// Marks a pixel as foreground when the mean of its normalized channels is
/// above zero, so with the default `0.5` mean anything brighter than mid gray
/// becomes a subject.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    initialized: bool,
    fail_inference: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose every inference call fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_inference: true,
            ..Self::default()
        }
    }

    /// Sleep for `delay` inside every inference call
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of inference calls, readable after the backend is moved
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &SegmenterConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::ZERO))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail_inference {
            return Err(SegmentationError::inference("mock inference failure"));
        }

        let (n, c, h, w) = input.dim();
        if c == 0 {
            return Err(SegmentationError::inference("input tensor has no channels"));
        }

        let mut output = Array4::<f32>::zeros((n, 1, h, w));
        #[allow(clippy::cast_precision_loss)]
        let channels = c as f32;
        for ((batch, _, y, x), elem) in output.indexed_iter_mut() {
            let mean = (0..c).map(|ch| input[[batch, ch, y, x]]).sum::<f32>() / channels;
            *elem = if mean > 0.0 { 1.0 } else { 0.0 };
        }
        Ok(output)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightness_mask() {
        let mut input = Array4::<f32>::from_elem((1, 3, 2, 2), -0.5);
        for ch in 0..3 {
            input[[0, ch, 1, 1]] = 0.5;
        }
        let mut backend = MockBackend::new();
        let output = backend.infer(&input).unwrap();

        assert_eq!(output.shape(), &[1, 1, 2, 2]);
        assert!((output[[0, 0, 1, 1]] - 1.0).abs() < f32::EPSILON);
        assert!(output[[0, 0, 0, 0]].abs() < f32::EPSILON);
    }

    #[test]
    fn test_initialize_once() {
        let mut backend = MockBackend::new();
        let config = SegmenterConfig::default();
        assert!(backend.initialize(&config).unwrap().is_some());
        assert!(backend.initialize(&config).unwrap().is_none());
        assert!(backend.is_initialized());
    }

    #[test]
    fn test_failing_backend_counts_calls() {
        let mut backend = MockBackend::failing();
        let counter = backend.call_counter();
        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(backend.infer(&input).is_err());
        assert!(backend.infer(&input).is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}

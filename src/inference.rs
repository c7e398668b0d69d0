//! Inference backend abstraction

use crate::{config::SegmenterConfig, error::Result};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for segmentation model backends
///
/// A backend maps a normalized `1x3xSxS` input tensor to a `1x1xHxW` tensor of
/// foreground probabilities.
pub trait InferenceBackend: Send {
    /// Load the model; returns the load time on first initialization
    ///
    /// # Errors
    /// - Missing or unreadable model file
    /// - Session creation failures
    fn initialize(&mut self, config: &SegmenterConfig) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output tensor of unexpected rank
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Distance outside `[0, 1]` still read as float rounding of a probability
pub const LOGIT_TOLERANCE: f32 = 1e-3;

/// Output tensors may carry logits or probabilities
///
/// The tensor is treated as logits only when some value lies outside `[0, 1]`
/// by more than [`LOGIT_TOLERANCE`]; otherwise it is clamped to `[0, 1]`.
#[must_use]
pub fn normalize_probabilities(mut output: Array4<f32>) -> Array4<f32> {
    let is_logits = output
        .iter()
        .any(|&v| v < -LOGIT_TOLERANCE || v > 1.0 + LOGIT_TOLERANCE);
    if is_logits {
        output.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp()));
    } else {
        output.mapv_inplace(|v| v.clamp(0.0, 1.0));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probabilities_left_alone() {
        let output = Array4::from_elem((1, 1, 2, 2), 0.75_f32);
        let normalized = normalize_probabilities(output);
        assert!(normalized.iter().all(|&v| (v - 0.75).abs() < f32::EPSILON));
    }

    #[test]
    fn test_logits_squashed() {
        let mut output = Array4::<f32>::zeros((1, 1, 1, 2));
        output[[0, 0, 0, 0]] = 8.0;
        output[[0, 0, 0, 1]] = -8.0;
        let normalized = normalize_probabilities(output);
        assert!(normalized[[0, 0, 0, 0]] > 0.99);
        assert!(normalized[[0, 0, 0, 1]] < 0.01);
    }

    #[test]
    fn test_rounding_overshoot_is_clamped() {
        let mut output = Array4::from_elem((1, 1, 4, 4), 0.1_f32);
        output[[0, 0, 0, 0]] = 1.000_000_1;
        output[[0, 0, 0, 1]] = -0.000_000_1;
        let normalized = normalize_probabilities(output);

        assert!((normalized[[0, 0, 3, 3]] - 0.1).abs() < f32::EPSILON);
        assert!((normalized[[0, 0, 0, 0]] - 1.0).abs() < f32::EPSILON);
        assert!(normalized[[0, 0, 0, 1]].abs() < f32::EPSILON);
    }
}

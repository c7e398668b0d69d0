//! Capture session state
//!
//! Holds what a capture screen needs between user actions: the latest result,
//! the selected display mode and whether a capture is in flight. Segmentation
//! runs on the blocking thread pool; a capture started while another is
//! running is ignored.

use crate::{
    error::{Result, SegmentationError},
    frame::Nv21Frame,
    processor::SubjectSegmenter,
    types::{DisplayMode, ResultSummary, SegmentationResult},
};
use image::{DynamicImage, RgbaImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

/// Result of a capture request
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// Segmentation ran and the session now shows the new result
    Completed(ResultSummary),
    /// Another capture was in flight; this one was ignored
    Busy,
}

#[derive(Debug, Default)]
struct SessionState {
    result: Option<Arc<SegmentationResult>>,
    display_mode: DisplayMode,
}

/// Clears the busy flag when dropped
///
/// The guard travels into the blocking worker and back, so a caller that
/// stops waiting does not release the session while the worker still runs.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Shared capture state; clones refer to the same session
#[derive(Debug, Clone)]
pub struct CaptureSession {
    segmenter: Arc<Mutex<SubjectSegmenter>>,
    busy: Arc<AtomicBool>,
    state: Arc<RwLock<SessionState>>,
}

impl CaptureSession {
    #[must_use]
    pub fn new(segmenter: SubjectSegmenter) -> Self {
        Self {
            segmenter: Arc::new(Mutex::new(segmenter)),
            busy: Arc::new(AtomicBool::new(false)),
            state: Arc::new(RwLock::new(SessionState::default())),
        }
    }

    /// Whether a capture is currently running
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> Option<BusyGuard> {
        if self.busy.swap(true, Ordering::SeqCst) {
            debug!("Capture ignored, another capture is in flight");
            return None;
        }
        Some(BusyGuard(Arc::clone(&self.busy)))
    }

    /// Segment a captured image and make it the current result
    ///
    /// # Errors
    /// - The blocking worker panicked or was cancelled
    #[instrument(skip_all, fields(dimensions = %format!("{}x{}", image.width(), image.height())))]
    pub async fn capture(&self, image: DynamicImage) -> Result<CaptureOutcome> {
        let Some(guard) = self.try_begin() else {
            return Ok(CaptureOutcome::Busy);
        };

        let segmenter = Arc::clone(&self.segmenter);
        let (result, _guard) = tokio::task::spawn_blocking(move || {
            let result = segmenter.blocking_lock().process_image(&image);
            (result, guard)
        })
        .await
        .map_err(|e| SegmentationError::internal(format!("Capture worker failed: {e}")))?;

        Ok(self.store(result).await)
    }

    /// Decode and segment a camera frame and make it the current result
    ///
    /// # Errors
    /// - Segmentation failures (the current result is kept)
    /// - The blocking worker panicked or was cancelled
    #[instrument(skip_all, fields(rotation = frame.rotation().degrees()))]
    pub async fn capture_frame(&self, frame: Nv21Frame) -> Result<CaptureOutcome> {
        let Some(guard) = self.try_begin() else {
            return Ok(CaptureOutcome::Busy);
        };

        let segmenter = Arc::clone(&self.segmenter);
        let (result, _guard) = tokio::task::spawn_blocking(move || {
            let result = segmenter.blocking_lock().process_frame(&frame);
            (result, guard)
        })
        .await
        .map_err(|e| SegmentationError::internal(format!("Capture worker failed: {e}")))?;

        Ok(self.store(result?).await)
    }

    async fn store(&self, result: SegmentationResult) -> CaptureOutcome {
        let summary = result.summary();
        info!(
            subjects = summary.subject_count,
            foreground = summary.foreground_detected,
            "Capture complete"
        );
        self.state.write().await.result = Some(Arc::new(result));
        CaptureOutcome::Completed(summary)
    }

    pub async fn set_display_mode(&self, mode: DisplayMode) {
        self.state.write().await.display_mode = mode;
    }

    pub async fn display_mode(&self) -> DisplayMode {
        self.state.read().await.display_mode
    }

    /// Drop the current result and go back to showing the original
    pub async fn clear_result(&self) {
        let mut state = self.state.write().await;
        state.result = None;
        state.display_mode = DisplayMode::Original;
    }

    pub async fn current_result(&self) -> Option<Arc<SegmentationResult>> {
        self.state.read().await.result.clone()
    }

    /// Image for the current display mode, `None` before the first capture
    pub async fn displayed_image(&self) -> Option<RgbaImage> {
        let state = self.state.read().await;
        state
            .result
            .as_ref()
            .map(|result| result.image_for(state.display_mode).clone())
    }

    pub async fn summary(&self) -> Option<ResultSummary> {
        self.state
            .read()
            .await
            .result
            .as_ref()
            .map(|result| result.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;
    use crate::config::SegmenterConfig;
    use image::Rgba;

    fn session_with(backend: MockBackend) -> CaptureSession {
        let config = SegmenterConfig::builder()
            .input_size(32)
            .min_subject_area(4)
            .build()
            .unwrap();
        CaptureSession::new(SubjectSegmenter::with_backend(config, Box::new(backend)).unwrap())
    }

    fn bright_square() -> DynamicImage {
        let mut image = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 255]));
        for y in 8..16 {
            for x in 8..16 {
                image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        DynamicImage::ImageRgba8(image)
    }

    #[tokio::test]
    async fn test_capture_then_display_modes() {
        let session = session_with(MockBackend::new());
        assert!(session.displayed_image().await.is_none());

        let outcome = session.capture(bright_square()).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Completed(ref s) if s.subject_count == 1));
        assert!(!session.is_busy());

        let original = bright_square().to_rgba8();
        assert_eq!(session.displayed_image().await.unwrap(), original);

        session.set_display_mode(DisplayMode::Highlighted).await;
        assert_ne!(session.displayed_image().await.unwrap(), original);

        session.clear_result().await;
        assert!(session.current_result().await.is_none());
        assert_eq!(session.display_mode().await, DisplayMode::Original);
    }

    #[tokio::test]
    async fn test_frame_capture_error_clears_busy() {
        let session = session_with(MockBackend::failing());
        let frame = Nv21Frame::new(
            4,
            4,
            vec![200; Nv21Frame::expected_len(4, 4)],
            crate::frame::Rotation::None,
        )
        .unwrap();

        assert!(session.capture_frame(frame).await.is_err());
        assert!(!session.is_busy());
        assert!(session.current_result().await.is_none());
    }
}

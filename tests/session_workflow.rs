//! Capture session behaviour: result state, display modes and busy handling

use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::atomic::Ordering;
use std::time::Duration;
use subject_highlight::{
    CaptureOutcome, CaptureSession, DisplayMode, MockBackend, SegmenterConfig, SubjectSegmenter,
};

fn session_with(backend: MockBackend) -> CaptureSession {
    let config = SegmenterConfig::builder()
        .input_size(32)
        .min_subject_area(4)
        .build()
        .unwrap();
    CaptureSession::new(SubjectSegmenter::with_backend(config, Box::new(backend)).unwrap())
}

fn scene(squares: &[(u32, u32)]) -> DynamicImage {
    let image = RgbaImage::from_fn(32, 32, |x, y| {
        let inside = squares
            .iter()
            .any(|&(sx, sy)| x >= sx && x < sx + 6 && y >= sy && y < sy + 6);
        if inside {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    });
    DynamicImage::ImageRgba8(image)
}

#[tokio::test]
async fn second_capture_replaces_result() {
    let session = session_with(MockBackend::new());

    session.capture(scene(&[(2, 2)])).await.unwrap();
    assert_eq!(session.summary().await.unwrap().subject_count, 1);

    session.capture(scene(&[(2, 2), (20, 20)])).await.unwrap();
    let summary = session.summary().await.unwrap();
    assert_eq!(summary.subject_count, 2);
    assert_eq!(summary.subject_boxes[1].start_x, 20);
}

#[tokio::test]
async fn display_mode_survives_new_capture() {
    let session = session_with(MockBackend::new());
    session.set_display_mode(DisplayMode::Foreground).await;
    session.capture(scene(&[(4, 4)])).await.unwrap();

    assert_eq!(session.display_mode().await, DisplayMode::Foreground);
    let shown = session.displayed_image().await.unwrap();
    assert_eq!(shown.get_pixel(0, 0)[3], 0);
    assert_eq!(shown.get_pixel(5, 5)[3], 255);
}

#[tokio::test]
async fn capture_while_busy_is_ignored() {
    let backend = MockBackend::new().with_delay(Duration::from_millis(300));
    let calls = backend.call_counter();
    let session = session_with(backend);

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.capture(scene(&[(2, 2)])).await }
    });

    for _ in 0..200 {
        if session.is_busy() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(session.is_busy());

    let second = session.capture(scene(&[(20, 20)])).await.unwrap();
    assert!(matches!(second, CaptureOutcome::Busy));

    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, CaptureOutcome::Completed(_)));
    assert!(!session.is_busy());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let boxes = session.summary().await.unwrap().subject_boxes;
    assert_eq!(boxes[0].start_x, 2);
}

#[tokio::test]
async fn failed_segmentation_still_shows_original() {
    let session = session_with(MockBackend::failing());
    let image = scene(&[(2, 2)]);
    let outcome = session.capture(image.clone()).await.unwrap();

    let CaptureOutcome::Completed(summary) = outcome else {
        panic!("capture should complete");
    };
    assert_eq!(summary.subject_count, 0);
    assert!(!summary.foreground_detected);

    session.set_display_mode(DisplayMode::Highlighted).await;
    assert_eq!(session.displayed_image().await.unwrap(), image.to_rgba8());
}

#[tokio::test]
async fn clear_result_resets_session() {
    let session = session_with(MockBackend::new());
    session.capture(scene(&[(2, 2)])).await.unwrap();
    session.set_display_mode(DisplayMode::Subjects).await;

    session.clear_result().await;
    assert!(session.summary().await.is_none());
    assert!(session.displayed_image().await.is_none());
    assert_eq!(session.display_mode().await, DisplayMode::Original);
}

#[tokio::test]
async fn abandoned_capture_keeps_session_busy_until_worker_finishes() {
    let backend = MockBackend::new().with_delay(Duration::from_millis(300));
    let calls = backend.call_counter();
    let session = session_with(backend);

    let abandoned = tokio::spawn({
        let session = session.clone();
        async move { session.capture(scene(&[(2, 2)])).await }
    });
    for _ in 0..200 {
        if calls.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    abandoned.abort();
    assert!(abandoned.await.unwrap_err().is_cancelled());

    assert!(session.is_busy());
    let outcome = session.capture(scene(&[(20, 20)])).await.unwrap();
    assert!(matches!(outcome, CaptureOutcome::Busy));

    for _ in 0..200 {
        if !session.is_busy() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!session.is_busy());

    let outcome = session.capture(scene(&[(20, 20)])).await.unwrap();
    assert!(matches!(outcome, CaptureOutcome::Completed(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

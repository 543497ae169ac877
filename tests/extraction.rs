//! End-to-end single-video extraction tests over synthetic sources.

mod common;

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{SyntheticVideo, entry_count, lecture_bounds, lecture_settings, page_count};
use image::RgbImage;
use lecture2slides::{
    CancellationToken, ErrorClass, ExtractOptions, ProgressCallback, ProgressInfo, SlideBounds,
    SlideError, SlideExtractor, SlideSettings, VideoTask,
};
use tempfile::TempDir;

struct Workspace {
    root: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        fs::create_dir(root.path().join("scratch")).expect("Failed to create scratch root");
        Self { root }
    }

    fn task(&self, settings: SlideSettings) -> VideoTask {
        VideoTask::new(
            self.root.path().join("lecture.mp4"),
            self.root.path().join("out/lecture.pdf"),
            settings,
        )
    }

    fn options(&self) -> ExtractOptions {
        ExtractOptions::new().with_scratch_root(self.scratch())
    }

    fn scratch(&self) -> std::path::PathBuf {
        self.root.path().join("scratch")
    }

    fn output(&self) -> std::path::PathBuf {
        self.root.path().join("out/lecture.pdf")
    }
}

// ── Retention ──────────────────────────────────────────────────────

#[test]
fn abrupt_change_without_save_initial_keeps_one_slide() {
    let workspace = Workspace::new();
    let summary = SlideExtractor::new(workspace.task(lecture_settings(false)))
        .with_options(workspace.options())
        .extract_from(SyntheticVideo::lecture())
        .expect("Failed to extract");

    assert_eq!(summary.frame_step, 10);
    assert_eq!(summary.samples, 10);
    assert_eq!(summary.slides, 1);
    assert_eq!(page_count(&workspace.output()), 1);
}

#[test]
fn abrupt_change_with_save_initial_keeps_two_slides() {
    let workspace = Workspace::new();
    let summary = SlideExtractor::new(workspace.task(lecture_settings(true)))
        .with_options(workspace.options())
        .extract_from(SyntheticVideo::lecture())
        .expect("Failed to extract");

    assert_eq!(summary.slides, 2);
    assert_eq!(page_count(&workspace.output()), 2);
}

#[test]
fn identical_frames_keep_at_most_the_first() {
    for threshold in [0.1, 0.5, 0.85, 0.99] {
        for save_initial in [false, true] {
            let workspace = Workspace::new();
            let settings = lecture_settings(save_initial).with_threshold(threshold);
            let summary = SlideExtractor::new(workspace.task(settings))
                .with_options(workspace.options())
                .extract_from(SyntheticVideo::still(80))
                .expect("Failed to extract");
            assert_eq!(
                summary.slides,
                u64::from(save_initial),
                "threshold {threshold}, save_initial {save_initial}"
            );
        }
    }
}

#[test]
fn empty_retention_writes_zero_page_document() {
    let workspace = Workspace::new();
    let summary = SlideExtractor::new(workspace.task(lecture_settings(false)))
        .with_options(workspace.options())
        .extract_from(SyntheticVideo::still(100))
        .expect("Failed to extract");

    assert_eq!(summary.slides, 0);
    assert!(workspace.output().is_file());
    assert_eq!(page_count(&workspace.output()), 0);
}

#[test]
fn halving_the_interval_doubles_the_samples() {
    let workspace = Workspace::new();
    let one_second = SlideExtractor::new(workspace.task(lecture_settings(false)))
        .with_options(workspace.options())
        .extract_from(SyntheticVideo::lecture())
        .expect("Failed to extract");

    let settings = lecture_settings(false).with_interval(Duration::from_millis(500));
    let half_second = SlideExtractor::new(workspace.task(settings))
        .with_options(workspace.options())
        .extract_from(SyntheticVideo::lecture())
        .expect("Failed to extract");

    assert_eq!(half_second.frame_step, 5);
    assert_eq!(half_second.samples, one_second.samples * 2);
    assert_eq!(half_second.slides, one_second.slides);
}

// ── Scratch directory lifecycle ────────────────────────────────────

#[test]
fn scratch_directory_is_removed_after_success() {
    let workspace = Workspace::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let scratch_root = workspace.scratch();
    let recorder = Arc::clone(&seen);
    let source = SyntheticVideo::lecture().with_read_hook(move |_| {
        for entry in fs::read_dir(&scratch_root).expect("list scratch root") {
            let path = entry.expect("entry").path();
            let mut seen = recorder.lock().unwrap();
            if !seen.contains(&path) {
                seen.push(path);
            }
        }
    });

    let summary = SlideExtractor::new(workspace.task(lecture_settings(true)))
        .with_options(workspace.options())
        .extract_from(source)
        .expect("Failed to extract");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1, "exactly one scratch directory per video");
    assert_eq!(seen[0], summary.scratch_dir);
    let name = summary.scratch_dir.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("frames_lecture_"), "{name}");
    assert!(!summary.scratch_dir.exists());
    assert_eq!(entry_count(&workspace.scratch()), 0);
}

#[test]
fn scratch_directory_is_removed_after_decode_failure() {
    let workspace = Workspace::new();
    let result = SlideExtractor::new(workspace.task(lecture_settings(true)))
        .with_options(workspace.options())
        .extract_from(SyntheticVideo::lecture().failing_at(60));

    let error = result.expect_err("decode failure should surface");
    assert!(matches!(error, SlideError::VideoDecodeError(_)));
    assert_eq!(error.class(), ErrorClass::PerVideo);
    assert_eq!(entry_count(&workspace.scratch()), 0);
    assert!(!workspace.output().exists());
}

#[test]
fn resolution_change_is_a_crop_error() {
    let workspace = Workspace::new();
    let source = SyntheticVideo::new(10.0, 100, common::WIDTH, common::HEIGHT, |frame| {
        if frame < 40 {
            common::horizontal_stripes(common::WIDTH, common::HEIGHT)
        } else {
            RgbImage::new(160, 120)
        }
    });

    let result = SlideExtractor::new(workspace.task(lecture_settings(true)))
        .with_options(workspace.options())
        .extract_from(source);

    match result {
        Err(SlideError::CropOutOfBounds { width, height, .. }) => {
            assert_eq!((width, height), (160, 120));
        }
        other => panic!("Expected CropOutOfBounds, got {other:?}"),
    }
    assert_eq!(entry_count(&workspace.scratch()), 0);
}

#[test]
fn bounds_outside_the_frame_are_rejected_up_front() {
    let workspace = Workspace::new();
    let settings = lecture_settings(false).with_bounds(SlideBounds::default());
    let result = SlideExtractor::new(workspace.task(settings))
        .with_options(workspace.options())
        .extract_from(SyntheticVideo::lecture());

    assert!(matches!(result, Err(SlideError::CropOutOfBounds { .. })));
    assert_eq!(entry_count(&workspace.scratch()), 0);
}

#[test]
fn unwritable_output_is_a_per_video_error() {
    let workspace = Workspace::new();
    let blocker = workspace.root.path().join("blocker");
    fs::write(&blocker, b"not a directory").expect("write blocker");
    let task = VideoTask::new(
        workspace.root.path().join("lecture.mp4"),
        blocker.join("deck.pdf"),
        lecture_settings(true),
    );

    let result = SlideExtractor::new(task)
        .with_options(workspace.options())
        .extract_from(SyntheticVideo::lecture());

    let error = result.expect_err("writing below a file must fail");
    assert!(matches!(error, SlideError::OutputWrite { .. }), "{error}");
    assert_eq!(error.class(), ErrorClass::PerVideo);
    assert_eq!(entry_count(&workspace.scratch()), 0);
}

#[test]
fn invalid_threshold_is_a_configuration_error() {
    let workspace = Workspace::new();
    let result = SlideExtractor::new(workspace.task(lecture_settings(false).with_threshold(1.5)))
        .with_options(workspace.options())
        .extract_from(SyntheticVideo::lecture());

    let error = result.expect_err("threshold above 1 must be rejected");
    assert!(matches!(error, SlideError::InvalidThreshold(_)));
    assert_eq!(error.class(), ErrorClass::Configuration);
}

// ── Cancellation ───────────────────────────────────────────────────

#[test]
fn cancelled_before_start_writes_nothing() {
    let workspace = Workspace::new();
    let token = CancellationToken::new();
    token.cancel();

    let result = SlideExtractor::new(workspace.task(lecture_settings(true)))
        .with_options(workspace.options().with_cancellation(token))
        .extract_from(SyntheticVideo::lecture());

    assert!(matches!(result, Err(SlideError::Cancelled)));
    assert!(!workspace.output().exists());
    assert_eq!(entry_count(&workspace.scratch()), 0);
}

#[test]
fn cancelled_mid_video_stops_sampling_and_cleans_up() {
    let workspace = Workspace::new();
    let token = CancellationToken::new();
    let trigger = token.clone();
    let source = SyntheticVideo::lecture().with_read_hook(move |frame| {
        if frame == 30 {
            trigger.cancel();
        }
    });
    let progress = Arc::new(CountingProgress::default());

    let result = SlideExtractor::new(workspace.task(lecture_settings(true)))
        .with_options(
            workspace
                .options()
                .with_cancellation(token)
                .with_progress(progress.clone()),
        )
        .extract_from(source);

    assert!(matches!(result, Err(SlideError::Cancelled)));
    assert_eq!(*progress.updates.lock().unwrap(), 4);
    assert_eq!(*progress.finished.lock().unwrap(), 0);
    assert!(!workspace.output().exists());
    assert_eq!(entry_count(&workspace.scratch()), 0);
}

// ── Progress ───────────────────────────────────────────────────────

#[derive(Default)]
struct CountingProgress {
    updates: Mutex<u64>,
    finished: Mutex<u64>,
    last: Mutex<Option<ProgressInfo>>,
}

impl ProgressCallback for CountingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        *self.updates.lock().unwrap() += 1;
        *self.last.lock().unwrap() = Some(info.clone());
    }

    fn on_finish(&self, _info: &ProgressInfo) {
        *self.finished.lock().unwrap() += 1;
    }
}

#[test]
fn progress_is_reported_per_sample() {
    let workspace = Workspace::new();
    let progress = Arc::new(CountingProgress::default());

    SlideExtractor::new(workspace.task(lecture_settings(false)))
        .with_options(workspace.options().with_progress(progress.clone()))
        .extract_from(SyntheticVideo::lecture())
        .expect("Failed to extract");

    assert_eq!(*progress.updates.lock().unwrap(), 10);
    assert_eq!(*progress.finished.lock().unwrap(), 1);
    let last = progress.last.lock().unwrap().clone().expect("progress info");
    assert_eq!(last.current, 10);
    assert_eq!(last.total, Some(10));
    assert_eq!(last.percentage, Some(100.0));
    assert_eq!(last.retained, 1);
    assert_eq!(last.current_frame, Some(90));
}

#[test]
fn default_bounds_fit_a_960x720_recording() {
    let workspace = Workspace::new();
    let source = SyntheticVideo::new(25.0, 250, 960, 720, |frame| {
        if frame < 125 {
            common::horizontal_stripes(960, 720)
        } else {
            common::vertical_stripes(960, 720)
        }
    });
    let settings = SlideSettings::new().with_save_initial(true);
    assert_ne!(settings.bounds, lecture_bounds());

    let summary = SlideExtractor::new(workspace.task(settings))
        .with_options(workspace.options())
        .extract_from(source)
        .expect("Failed to extract");
    assert_eq!(summary.slides, 2);
}

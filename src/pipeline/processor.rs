use std::{io::Cursor, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use image::{codecs::jpeg::JpegEncoder, RgbImage};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::FrameError;
use crate::gait::{BilateralExtractor, BilateralResult, PhaseAnnotator, PhaseLabel};
use crate::pose::{LandmarkSet, PoseEstimator, Side};
use crate::render::{draw_joint_angles, draw_no_person, draw_phase_banner, draw_skeleton, VideoSink};

use super::frames::{Frame, FrameSource};
use super::report::{CsvReportWriter, FrameRecord};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const JPEG_QUALITY: u8 = 90;

/// How far the analysis of one frame got.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    NoDetection,
    /// Person found but at least one leg chain was not visible enough.
    Partial,
    /// Both chains measured and classified.
    Full,
    FrameError(String),
}

/// Annotated frame plus its row in the angle table.
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub index: usize,
    pub timestamp: f64,
    pub phase: PhaseLabel,
    pub right: [i32; 3],
    pub left: [i32; 3],
    pub outcome: FrameOutcome,
    pub image: RgbImage,
}

impl FrameResult {
    pub fn record(&self) -> FrameRecord {
        FrameRecord {
            timestamp: self.timestamp,
            phase: self.phase.clone(),
            right: self.right,
            left: self.left,
        }
    }
}

/// Counts from one pass over a frame source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Files in the source, decodable or not.
    pub frames_total: usize,
    /// Rows written to both artifacts.
    pub frames_processed: usize,
    pub no_detection: usize,
    pub partial: usize,
    pub full: usize,
    pub errors: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn count(&mut self, outcome: &FrameOutcome) {
        self.frames_processed += 1;
        match outcome {
            FrameOutcome::NoDetection => self.no_detection += 1,
            FrameOutcome::Partial => self.partial += 1,
            FrameOutcome::Full => self.full += 1,
            FrameOutcome::FrameError(_) => self.errors += 1,
        }
    }
}

enum Analysis {
    NoPerson,
    Detected {
        landmarks: LandmarkSet,
        bilateral: BilateralResult,
        phase: Option<PhaseLabel>,
    },
}

/// Turns frames into annotated images and table rows.
#[derive(Clone)]
pub struct FrameProcessor {
    estimator: Arc<dyn PoseEstimator>,
    extractor: BilateralExtractor,
    annotator: PhaseAnnotator,
}

impl FrameProcessor {
    pub fn new(
        estimator: Arc<dyn PoseEstimator>,
        extractor: BilateralExtractor,
        annotator: PhaseAnnotator,
    ) -> Self {
        Self {
            estimator,
            extractor,
            annotator,
        }
    }

    fn analyze(&self, frame: &Frame, estimator: &dyn PoseEstimator) -> Result<Analysis, FrameError> {
        let landmarks = match estimator
            .estimate(frame)
            .map_err(|err| FrameError::Estimator(format!("{err:#}")))?
        {
            Some(landmarks) => landmarks,
            None => return Ok(Analysis::NoPerson),
        };

        let bilateral = self.extractor.extract(&landmarks, frame.width(), frame.height())?;
        let phase = match &bilateral.features {
            Some(features) => Some(self.annotator.annotate(features)?),
            None => None,
        };

        Ok(Analysis::Detected {
            landmarks,
            bilateral,
            phase,
        })
    }

    /// Analyze and annotate one frame. Failures never escape: the frame comes
    /// back unannotated with a zero row labeled as an error.
    pub fn process(&self, frame: Frame, fps: f64) -> FrameResult {
        self.process_with(frame, fps, self.estimator.as_ref())
    }

    fn process_with(&self, frame: Frame, fps: f64, estimator: &dyn PoseEstimator) -> FrameResult {
        let timestamp = frame.index as f64 / fps;
        let analysis = self.analyze(&frame, estimator);
        let Frame {
            index,
            path,
            mut image,
        } = frame;

        let (phase, right, left, outcome) = match analysis {
            Ok(Analysis::NoPerson) => {
                draw_no_person(&mut image);
                (PhaseLabel::NoPerson, [0; 3], [0; 3], FrameOutcome::NoDetection)
            }
            Ok(Analysis::Detected {
                landmarks,
                bilateral,
                phase,
            }) => {
                draw_skeleton(&mut image, &landmarks, self.extractor.visibility_threshold());
                draw_joint_angles(&mut image, &bilateral);
                let right = bilateral.degrees(Side::Right);
                let left = bilateral.degrees(Side::Left);
                match phase {
                    Some(label) => {
                        draw_phase_banner(&mut image, label.as_str());
                        (label, right, left, FrameOutcome::Full)
                    }
                    None => (PhaseLabel::NoPhase, right, left, FrameOutcome::Partial),
                }
            }
            Err(err) => {
                log_warn!("frame {} ({}) failed: {err}", index, path.display());
                (
                    PhaseLabel::FrameError,
                    [0; 3],
                    [0; 3],
                    FrameOutcome::FrameError(err.to_string()),
                )
            }
        };

        FrameResult {
            index,
            timestamp,
            phase,
            right,
            left,
            outcome,
            image,
        }
    }

    /// Process every decodable frame of `source` in order, writing one video
    /// frame and one table row each. Stops early once `cancel` fires.
    pub fn run(
        &self,
        source: &FrameSource,
        fps: f64,
        video: &mut dyn VideoSink,
        report: &mut CsvReportWriter,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary {
            frames_total: source.len(),
            ..RunSummary::default()
        };

        for frame in source.frames() {
            if cancel.is_cancelled() {
                log_info!("run cancelled after {} frames", summary.frames_processed);
                summary.cancelled = true;
                break;
            }

            let result = self.process(frame, fps);
            video
                .write_frame(&result.image)
                .with_context(|| format!("failed to write frame {} to video", result.index))?;
            report.write_row(&result.record())?;
            log_debug!("frame {} -> {}", result.index, result.phase);
            summary.count(&result.outcome);
        }

        Ok(summary)
    }

    /// Annotate a single still image and return it as JPEG bytes.
    ///
    /// An uploaded image has no file beside it, so its landmarks come from
    /// `landmarks` when given. Without them the configured estimator must be
    /// able to work from pixels alone; a per-frame failure is an error here.
    pub fn analyze_image(
        &self,
        bytes: &[u8],
        landmarks: Option<&dyn PoseEstimator>,
    ) -> Result<(FrameResult, Vec<u8>)> {
        let image = image::load_from_memory(bytes)
            .context("failed to decode image")?
            .to_rgb8();
        let frame = Frame {
            index: 0,
            path: PathBuf::new(),
            image,
        };

        let estimator = landmarks.unwrap_or(self.estimator.as_ref());
        let result = self.process_with(frame, 1.0, estimator);
        if let FrameOutcome::FrameError(message) = &result.outcome {
            bail!("image analysis failed: {message}");
        }

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(Cursor::new(&mut encoded), JPEG_QUALITY)
            .encode_image(&result.image)
            .context("failed to encode annotated image")?;
        Ok((result, encoded))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gait::{FeatureScaler, FeatureVector, GaitPhase, PhaseClassifier};
    use crate::pose::{FixedPoseEstimator, Landmark, LandmarkPoint, SidecarPoseEstimator};
    use crate::render::GifVideoWriter;
    use anyhow::anyhow;
    use image::Rgb;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Pose keyed by frame index; indices not listed have nobody in view.
    #[derive(Default)]
    pub(crate) struct ScriptedEstimator {
        pub(crate) poses: HashMap<usize, Result<LandmarkSet, String>>,
    }

    impl PoseEstimator for ScriptedEstimator {
        fn estimate(&self, frame: &Frame) -> Result<Option<LandmarkSet>> {
            match self.poses.get(&frame.index) {
                None => Ok(None),
                Some(Ok(set)) => Ok(Some(set.clone())),
                Some(Err(msg)) => Err(anyhow!(msg.clone())),
            }
        }
    }

    pub(crate) struct CountingClassifier {
        pub(crate) calls: AtomicUsize,
        pub(crate) label: &'static str,
    }

    impl CountingClassifier {
        pub(crate) fn new(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                label,
            })
        }
    }

    impl PhaseClassifier for CountingClassifier {
        fn classify(&self, _scaled: &[f64; FeatureVector::LEN]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label.to_string())
        }
    }

    pub(crate) fn full_pose() -> LandmarkSet {
        let pts = [
            (Landmark::Nose, 0.55, 0.1),
            (Landmark::LeftShoulder, 0.5, 0.25),
            (Landmark::RightShoulder, 0.5, 0.25),
            (Landmark::LeftHip, 0.5, 0.5),
            (Landmark::RightHip, 0.5, 0.5),
            (Landmark::LeftKnee, 0.45, 0.7),
            (Landmark::RightKnee, 0.55, 0.7),
            (Landmark::LeftAnkle, 0.4, 0.9),
            (Landmark::RightAnkle, 0.55, 0.9),
            (Landmark::LeftToe, 0.45, 0.92),
            (Landmark::RightToe, 0.6, 0.92),
        ];
        pts.into_iter().fold(LandmarkSet::new(), |set, (landmark, x, y)| {
            set.with(landmark, LandmarkPoint::new(x, y, 0.9))
        })
    }

    /// Right chain only: the left hip is barely visible.
    fn right_only_pose() -> LandmarkSet {
        let mut set = full_pose();
        set.insert(Landmark::LeftHip, LandmarkPoint::new(0.5, 0.5, 0.2));
        set
    }

    fn processor(estimator: ScriptedEstimator, classifier: Arc<CountingClassifier>) -> FrameProcessor {
        FrameProcessor::new(
            Arc::new(estimator),
            BilateralExtractor::new(0.5),
            PhaseAnnotator::new(FeatureScaler::identity(), classifier),
        )
    }

    fn frame(index: usize) -> Frame {
        Frame {
            index,
            path: PathBuf::from(format!("Frame_{index}.png")),
            image: RgbImage::from_pixel(160, 120, Rgb([60, 60, 60])),
        }
    }

    fn write_frames(dir: &std::path::Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("Frame_{i}.png"));
                RgbImage::from_pixel(160, 120, Rgb([i as u8 * 10, 0, 0]))
                    .save(&path)
                    .unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn no_detection_yields_no_person_row() {
        let classifier = CountingClassifier::new("APOYO MEDIO");
        let processor = processor(ScriptedEstimator::default(), classifier.clone());

        let result = processor.process(frame(12), 24.0);
        assert_eq!(result.outcome, FrameOutcome::NoDetection);
        assert_eq!(result.phase, PhaseLabel::NoPerson);
        assert_eq!(result.right, [0; 3]);
        assert_eq!(result.left, [0; 3]);
        assert!((result.timestamp - 0.5).abs() < 1e-12);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert!(result.image.pixels().any(|p| *p == Rgb([255, 0, 0])));
    }

    #[test]
    fn single_chain_is_measured_but_not_classified() {
        let classifier = CountingClassifier::new("APOYO MEDIO");
        let mut estimator = ScriptedEstimator::default();
        estimator.poses.insert(0, Ok(right_only_pose()));
        let processor = processor(estimator, classifier.clone());

        let result = processor.process(frame(0), 24.0);
        assert_eq!(result.outcome, FrameOutcome::Partial);
        assert_eq!(result.phase, PhaseLabel::NoPhase);
        assert!(result.right.iter().any(|&d| d != 0));
        assert_eq!(result.left, [0; 3]);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn full_pose_is_classified_and_mapped() {
        let classifier = CountingClassifier::new("APOYO MEDIO");
        let mut estimator = ScriptedEstimator::default();
        estimator.poses.insert(0, Ok(full_pose()));
        let processor = processor(estimator, classifier.clone());

        let result = processor.process(frame(0), 24.0);
        assert_eq!(result.outcome, FrameOutcome::Full);
        assert_eq!(result.phase, PhaseLabel::Phase(GaitPhase::MidStance));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        // Banner corner.
        assert_eq!(*result.image.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn estimator_failure_is_recorded_not_raised() {
        let classifier = CountingClassifier::new("APOYO MEDIO");
        let mut estimator = ScriptedEstimator::default();
        estimator.poses.insert(3, Err("backend crashed".into()));
        let processor = processor(estimator, classifier);

        let input = frame(3);
        let raw = input.image.clone();
        let result = processor.process(input, 24.0);
        assert!(matches!(result.outcome, FrameOutcome::FrameError(ref msg) if msg.contains("backend crashed")));
        assert_eq!(result.phase, PhaseLabel::FrameError);
        assert_eq!(result.image, raw);
    }

    #[test]
    fn run_writes_one_row_and_frame_per_input() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("frames");
        std::fs::create_dir(&frames_dir).unwrap();
        write_frames(&frames_dir, 10);

        let source = FrameSource::open(&frames_dir, "Frame_", "png").unwrap();
        let classifier = CountingClassifier::new("APOYO MEDIO");
        let processor = processor(ScriptedEstimator::default(), classifier.clone());

        let video_path = dir.path().join("out.gif");
        let csv_path = dir.path().join("out.csv");
        let mut video = GifVideoWriter::create(&video_path, 160, 120, 24.0).unwrap();
        let mut report = CsvReportWriter::create(&csv_path).unwrap();

        let summary = processor
            .run(&source, 24.0, &mut video, &mut report, &CancellationToken::new())
            .unwrap();
        Box::new(video).finish().unwrap();
        report.finish().unwrap();

        assert_eq!(summary.frames_processed, 10);
        assert_eq!(summary.no_detection, 10);
        assert!(!summary.cancelled);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let rows: Vec<&str> = csv.lines().skip(1).collect();
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|row| row.ends_with("NO PERSON,0,0,0,0,0,0")));
        let frames = crate::render::video::tests::read_frames(&video_path);
        assert_eq!(frames.len(), 10);
        // Every frame carries the red no-person warning.
        for frame in &frames {
            assert!(frame.pixels().any(|p| p[0] > 200 && p[1] < 60 && p[2] < 60));
        }
    }

    #[test]
    fn undecodable_frames_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("frames");
        std::fs::create_dir(&frames_dir).unwrap();
        write_frames(&frames_dir, 6);
        std::fs::write(frames_dir.join("Frame_2.png"), b"not a png").unwrap();
        std::fs::write(frames_dir.join("Frame_4.png"), b"").unwrap();

        let source = FrameSource::open(&frames_dir, "Frame_", "png").unwrap();
        let processor = processor(ScriptedEstimator::default(), CountingClassifier::new("X"));
        let video_path = dir.path().join("v.gif");
        let mut video = GifVideoWriter::create(&video_path, 160, 120, 24.0).unwrap();
        let csv_path = dir.path().join("v.csv");
        let mut report = CsvReportWriter::create(&csv_path).unwrap();

        let summary = processor
            .run(&source, 24.0, &mut video, &mut report, &CancellationToken::new())
            .unwrap();
        Box::new(video).finish().unwrap();
        report.finish().unwrap();

        assert_eq!(summary.frames_total, 6);
        assert_eq!(summary.frames_processed, 4);
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let times: Vec<&str> = csv
            .lines()
            .skip(1)
            .map(|row| row.split(',').next().unwrap())
            .collect();
        // Timestamps keep the original positions.
        assert_eq!(times, ["0", "0.041666666666666664", "0.125", "0.20833333333333334"]);
        assert_eq!(crate::render::video::tests::read_frames(&video_path).len(), 4);
    }

    #[test]
    fn cancelled_run_stops_before_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_frames(dir.path(), 3);
        let source = FrameSource::from_files(files).unwrap();
        let processor = processor(ScriptedEstimator::default(), CountingClassifier::new("X"));
        let mut video = GifVideoWriter::create(&dir.path().join("v.gif"), 160, 120, 24.0).unwrap();
        let mut report = CsvReportWriter::create(&dir.path().join("v.csv")).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = processor
            .run(&source, 24.0, &mut video, &mut report, &cancel)
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.frames_processed, 0);
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut png = Vec::new();
        RgbImage::from_pixel(width, height, Rgb([10, 20, 30]))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        png
    }

    #[test]
    fn analyze_image_returns_jpeg() {
        let processor = processor(ScriptedEstimator::default(), CountingClassifier::new("X"));

        let (result, jpeg) = processor.analyze_image(&png(64, 48), None).unwrap();
        assert_eq!(result.outcome, FrameOutcome::NoDetection);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));

        assert!(processor.analyze_image(b"junk", None).is_err());
    }

    #[test]
    fn uploaded_image_needs_landmarks_with_sidecar_estimator() {
        let classifier = CountingClassifier::new("APOYO MEDIO");
        let processor = FrameProcessor::new(
            Arc::new(SidecarPoseEstimator::new()),
            BilateralExtractor::new(0.5),
            PhaseAnnotator::new(FeatureScaler::identity(), classifier.clone()),
        );

        let err = processor.analyze_image(&png(160, 120), None).unwrap_err();
        assert!(err.to_string().contains("no file to read landmarks"));

        let supplied = FixedPoseEstimator::new(Some(full_pose()));
        let (result, jpeg) = processor
            .analyze_image(&png(160, 120), Some(&supplied))
            .unwrap();
        assert_eq!(result.outcome, FrameOutcome::Full);
        assert_eq!(result.phase, PhaseLabel::Phase(GaitPhase::MidStance));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}

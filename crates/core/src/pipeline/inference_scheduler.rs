use std::collections::HashMap;
use std::time::Instant;

use crate::classification::domain::emotion_classifier::EmotionClassifier;
use crate::detection::domain::face_locator::FaceLocator;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::shared::constants::PENDING_LABEL;
use crate::shared::emotion::{now_seconds, Classification, EmotionReading};
use crate::shared::frame::Frame;
use crate::shared::region::{FaceRegion, Region};

/// What a face slot shows after one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SlotStatus {
    Classified(Classification),
    /// Detected since the last classification pass; no reading yet.
    Pending,
}

/// Per-face result of one cycle, for multi-face display.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceAnnotation {
    pub slot: usize,
    pub region: Region,
    pub status: SlotStatus,
}

impl FaceAnnotation {
    pub fn label(&self) -> &'static str {
        match self.status {
            SlotStatus::Classified(c) => c.emotion.as_str(),
            SlotStatus::Pending => PENDING_LABEL,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self.status {
            SlotStatus::Classified(c) => c.confidence,
            SlotStatus::Pending => 0.0,
        }
    }
}

/// Result of scheduling one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleOutcome {
    /// Counter value this frame was processed under.
    pub frame_count: usize,
    /// Whether the classifier was due this cycle.
    pub classified: bool,
    pub faces: Vec<FaceAnnotation>,
    /// The aggregate reading to store and broadcast, if any. `None` when
    /// detection failed or slot 0 is still pending.
    pub reading: Option<EmotionReading>,
}

#[derive(Clone, Copy, Debug)]
struct CacheEntry {
    reading: EmotionReading,
    frame_count: usize,
}

/// Frame counter and slot cache of one frame source.
///
/// Every source keeps its own, so one camera or push session never sees the
/// skip phase or cached readings of another.
#[derive(Debug, Default)]
pub struct SourceState {
    frame_count: usize,
    cache: HashMap<usize, CacheEntry>,
}

impl SourceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames processed so far for this source.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

/// Decides per frame whether to classify or reuse cached per-slot readings.
///
/// Detection runs on every frame. Classification runs when
/// `frame_count % skip_interval == 0`, for every detected slot. Slots are
/// positional: slot 0 is whatever face the locator lists first, so a face
/// can inherit another face's cached reading if detection order shifts.
///
/// The scheduler owns the capabilities; counter and cache live in the
/// caller's [`SourceState`].
pub struct InferenceScheduler {
    locator: Box<dyn FaceLocator>,
    classifier: Box<dyn EmotionClassifier>,
    skip_interval: usize,
    logger: Box<dyn PipelineLogger>,
}

impl InferenceScheduler {
    pub fn new(
        locator: Box<dyn FaceLocator>,
        classifier: Box<dyn EmotionClassifier>,
        skip_interval: usize,
    ) -> Result<Self, &'static str> {
        if skip_interval < 1 {
            return Err("skip_interval must be >= 1");
        }
        Ok(Self {
            locator,
            classifier,
            skip_interval,
            logger: Box::new(NullPipelineLogger),
        })
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn skip_interval(&self) -> usize {
        self.skip_interval
    }

    /// Runs one scheduling cycle. Never fails: capability errors are logged
    /// and the affected slots keep their last cached reading.
    pub fn process(&mut self, state: &mut SourceState, frame: &Frame) -> CycleOutcome {
        let cycle_start = Instant::now();
        let frame_count = state.frame_count;
        state.frame_count += 1;
        let classify_now = frame_count % self.skip_interval == 0;

        let detect_start = Instant::now();
        let located = self.locator.locate(frame);
        self.logger
            .timing("detect", detect_start.elapsed().as_secs_f64() * 1000.0);

        let faces = match located {
            Ok(regions) => FaceRegion::from_detections(regions),
            Err(e) => {
                log::warn!("Face detection failed on frame {frame_count}: {e}");
                self.finish_cycle(frame_count, cycle_start);
                return CycleOutcome {
                    frame_count,
                    classified: false,
                    faces: Vec::new(),
                    reading: None,
                };
            }
        };
        self.logger.metric("faces", faces.len() as f64);

        if faces.is_empty() {
            state.cache.clear();
            self.finish_cycle(frame_count, cycle_start);
            return CycleOutcome {
                frame_count,
                classified: classify_now,
                faces: Vec::new(),
                reading: Some(EmotionReading::no_face(now_seconds())),
            };
        }

        if classify_now {
            let classify_start = Instant::now();
            for face in &faces {
                self.classify_slot(state, frame, face, frame_count);
            }
            self.logger
                .timing("classify", classify_start.elapsed().as_secs_f64() * 1000.0);
        }
        state.cache.retain(|slot, _| *slot < faces.len());

        let annotations = faces
            .iter()
            .map(|face| FaceAnnotation {
                slot: face.slot,
                region: face.region,
                status: match state.cache.get(&face.slot) {
                    Some(entry) => SlotStatus::Classified(Classification {
                        emotion: entry.reading.emotion,
                        confidence: entry.reading.confidence,
                    }),
                    None => SlotStatus::Pending,
                },
            })
            .collect();

        let reading = state.cache.get(&0).map(|entry| entry.reading);
        self.finish_cycle(frame_count, cycle_start);
        CycleOutcome {
            frame_count,
            classified: classify_now,
            faces: annotations,
            reading,
        }
    }

    /// Detects and classifies the first usable face of a single frame. No
    /// source state is read or written.
    ///
    /// Regions lying outside the frame are skipped; if none is usable the
    /// no-face sentinel is returned.
    pub fn analyze(&mut self, frame: &Frame) -> Result<EmotionReading, Box<dyn std::error::Error>> {
        let regions = self.locator.locate(frame)?;
        let Some(face) = regions.iter().find_map(|region| frame.crop(region)) else {
            if !regions.is_empty() {
                log::warn!("All {} detected regions lie outside the frame", regions.len());
            }
            return Ok(EmotionReading::no_face(now_seconds()));
        };
        let classification = self.classifier.classify(&face)?;
        Ok(EmotionReading::from_classification(
            classification,
            now_seconds(),
        ))
    }

    /// Logs the end-of-run summary.
    pub fn summary(&self) {
        self.logger.summary();
    }

    fn classify_slot(
        &mut self,
        state: &mut SourceState,
        frame: &Frame,
        face: &FaceRegion,
        frame_count: usize,
    ) {
        let Some(crop) = frame.crop(&face.region) else {
            log::warn!("Slot {} region lies outside the frame", face.slot);
            return;
        };
        match self.classifier.classify(&crop) {
            Ok(classification) => {
                let previous = state.cache.insert(
                    face.slot,
                    CacheEntry {
                        reading: EmotionReading::from_classification(classification, now_seconds()),
                        frame_count,
                    },
                );
                if let Some(prev) = previous {
                    log::debug!(
                        "Slot {} reclassified after {} frames",
                        face.slot,
                        frame_count - prev.frame_count
                    );
                }
            }
            Err(e) => log::warn!("Classification failed for slot {}: {e}", face.slot),
        }
    }

    fn finish_cycle(&mut self, frame_count: usize, started: Instant) {
        self.logger
            .timing("cycle", started.elapsed().as_secs_f64() * 1000.0);
        self.logger.progress(frame_count + 1, 0);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::shared::emotion::Emotion;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replays scripted detection results; `None` entries fail.
    pub(crate) struct FakeLocator {
        pub results: Vec<Option<Vec<Region>>>,
        pub call_count: usize,
    }

    impl FakeLocator {
        pub(crate) fn new(results: Vec<Option<Vec<Region>>>) -> Self {
            Self {
                results,
                call_count: 0,
            }
        }

        pub(crate) fn always(regions: Vec<Region>) -> Self {
            Self::new(vec![Some(regions)])
        }
    }

    impl FaceLocator for FakeLocator {
        fn locate(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            let result = self.results[self.call_count % self.results.len()].clone();
            self.call_count += 1;
            result.ok_or_else(|| "detector crashed".into())
        }
    }

    /// Replays scripted labels and counts calls; `None` entries fail.
    pub(crate) struct FakeClassifier {
        pub results: Vec<Option<Classification>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeClassifier {
        pub(crate) fn new(results: Vec<Option<Classification>>) -> Self {
            Self {
                results,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl EmotionClassifier for FakeClassifier {
        fn classify(&mut self, _face: &Frame) -> Result<Classification, Box<dyn std::error::Error>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.results[n % self.results.len()].ok_or_else(|| "model crashed".into())
        }
    }

    pub(crate) fn c(emotion: Emotion, confidence: f32) -> Classification {
        Classification {
            emotion,
            confidence,
        }
    }

    pub(crate) fn face(x: i32) -> Region {
        Region::new(x, 10, 30, 30)
    }

    pub(crate) fn frame(index: usize) -> Frame {
        Frame::new(vec![0u8; 100 * 100 * 3], 100, 100, 3, index)
    }

    fn scheduler(
        locator: FakeLocator,
        classifier: FakeClassifier,
        skip: usize,
    ) -> (InferenceScheduler, Arc<AtomicUsize>) {
        let calls = classifier.calls.clone();
        let s = InferenceScheduler::new(Box::new(locator), Box::new(classifier), skip).unwrap();
        (s, calls)
    }

    #[test]
    fn test_skip_interval_0_errors() {
        let result = InferenceScheduler::new(
            Box::new(FakeLocator::always(vec![])),
            Box::new(FakeClassifier::new(vec![None])),
            0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_interval_2_classifies_even_cycles_and_reuses_on_odd() {
        let classifier = FakeClassifier::new(vec![
            Some(c(Emotion::Happy, 0.9)),
            Some(c(Emotion::Sad, 0.6)),
            Some(c(Emotion::Angry, 0.7)),
        ]);
        let (mut s, calls) = scheduler(FakeLocator::always(vec![face(10)]), classifier, 2);
        let mut st = SourceState::new();

        let outcomes: Vec<_> = (0..6).map(|i| s.process(&mut st, &frame(i))).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let classified: Vec<bool> = outcomes.iter().map(|o| o.classified).collect();
        assert_eq!(classified, vec![true, false, true, false, true, false]);
        for pair in outcomes.chunks(2) {
            assert!(pair[0].reading.is_some());
            assert_eq!(pair[1].reading, pair[0].reading);
        }
        let labels: Vec<Emotion> = outcomes
            .iter()
            .step_by(2)
            .map(|o| o.reading.unwrap().emotion)
            .collect();
        assert_eq!(labels, vec![Emotion::Happy, Emotion::Sad, Emotion::Angry]);
    }

    #[test]
    fn test_interval_1_classifies_every_frame() {
        let (mut s, calls) = scheduler(
            FakeLocator::always(vec![face(10)]),
            FakeClassifier::new(vec![Some(c(Emotion::Fear, 0.4))]),
            1,
        );
        let mut st = SourceState::new();
        for i in 0..4 {
            assert!(s.process(&mut st, &frame(i)).classified);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_no_face_published_on_skip_cycle() {
        let locator = FakeLocator::new(vec![Some(vec![face(10)]), Some(vec![])]);
        let (mut s, _) = scheduler(
            locator,
            FakeClassifier::new(vec![Some(c(Emotion::Happy, 0.9))]),
            2,
        );
        let mut st = SourceState::new();

        let first = s.process(&mut st, &frame(0));
        let second = s.process(&mut st, &frame(1)); // skip phase, face gone

        assert!(first.reading.unwrap().face_detected);
        let sentinel = second.reading.unwrap();
        assert!(!sentinel.face_detected);
        assert_eq!(sentinel.emotion, Emotion::Neutral);
        assert_eq!(sentinel.confidence, 0.0);
    }

    #[test]
    fn test_new_slot_on_skip_cycle_is_pending() {
        let locator = FakeLocator::new(vec![
            Some(vec![face(10)]),
            Some(vec![face(10), face(60)]),
        ]);
        let (mut s, _) = scheduler(
            locator,
            FakeClassifier::new(vec![Some(c(Emotion::Happy, 0.8))]),
            2,
        );
        let mut st = SourceState::new();

        s.process(&mut st, &frame(0));
        let outcome = s.process(&mut st, &frame(1));

        assert_eq!(outcome.faces.len(), 2);
        assert_eq!(outcome.faces[0].label(), "Happy");
        assert_eq!(outcome.faces[1].status, SlotStatus::Pending);
        assert_eq!(outcome.faces[1].label(), PENDING_LABEL);
        assert_eq!(outcome.faces[1].confidence(), 0.0);
        assert_eq!(outcome.reading.unwrap().emotion, Emotion::Happy);
    }

    #[test]
    fn test_pending_slot_zero_publishes_nothing() {
        let locator = FakeLocator::new(vec![Some(vec![]), Some(vec![face(10)])]);
        let (mut s, calls) = scheduler(
            locator,
            FakeClassifier::new(vec![Some(c(Emotion::Happy, 0.8))]),
            2,
        );
        let mut st = SourceState::new();

        s.process(&mut st, &frame(0)); // classify phase, no face
        let outcome = s.process(&mut st, &frame(1)); // skip phase, face appears

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.faces[0].status, SlotStatus::Pending);
        assert!(outcome.reading.is_none());
    }

    #[test]
    fn test_each_slot_classified_in_detection_order() {
        let classifier = FakeClassifier::new(vec![
            Some(c(Emotion::Happy, 0.9)),
            Some(c(Emotion::Surprise, 0.5)),
        ]);
        let (mut s, calls) = scheduler(
            FakeLocator::always(vec![face(60), face(0)]),
            classifier,
            2,
        );
        let mut st = SourceState::new();

        let outcome = s.process(&mut st, &frame(0));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.faces[0].region.x, 60);
        assert_eq!(outcome.faces[0].label(), "Happy");
        assert_eq!(outcome.faces[1].label(), "Surprise");
        assert_eq!(outcome.reading.unwrap().emotion, Emotion::Happy);
    }

    #[test]
    fn test_classifier_failure_keeps_last_known_reading() {
        let classifier = FakeClassifier::new(vec![Some(c(Emotion::Sad, 0.66)), None]);
        let (mut s, _) = scheduler(FakeLocator::always(vec![face(10)]), classifier, 1);
        let mut st = SourceState::new();

        let good = s.process(&mut st, &frame(0)).reading.unwrap();
        let after_failure = s.process(&mut st, &frame(1));

        assert_eq!(after_failure.reading, Some(good));
        assert_eq!(st.frame_count(), 2);
    }

    #[test]
    fn test_classifier_failure_on_new_slot_stays_pending() {
        let (mut s, _) = scheduler(
            FakeLocator::always(vec![face(10)]),
            FakeClassifier::new(vec![None]),
            1,
        );
        let mut st = SourceState::new();
        let outcome = s.process(&mut st, &frame(0));
        assert_eq!(outcome.faces[0].status, SlotStatus::Pending);
        assert!(outcome.reading.is_none());
    }

    #[test]
    fn test_detector_failure_publishes_nothing_and_advances_counter() {
        let locator = FakeLocator::new(vec![Some(vec![face(10)]), None, Some(vec![face(10)])]);
        let classifier = FakeClassifier::new(vec![
            Some(c(Emotion::Happy, 0.9)),
            Some(c(Emotion::Sad, 0.3)),
        ]);
        let (mut s, _) = scheduler(locator, classifier, 2);
        let mut st = SourceState::new();

        let first = s.process(&mut st, &frame(0));
        let failed = s.process(&mut st, &frame(1));
        let third = s.process(&mut st, &frame(2));

        assert!(failed.reading.is_none());
        assert!(failed.faces.is_empty());
        assert_eq!(st.frame_count(), 3);
        assert!(third.classified);
        assert_ne!(third.reading, first.reading);
    }

    #[test]
    fn test_vanished_slots_are_forgotten() {
        let locator = FakeLocator::new(vec![
            Some(vec![face(0), face(60)]),
            Some(vec![face(0)]),
            Some(vec![face(0), face(60)]),
        ]);
        let (mut s, _) = scheduler(
            locator,
            FakeClassifier::new(vec![Some(c(Emotion::Neutral, 0.5))]),
            3,
        );
        let mut st = SourceState::new();

        s.process(&mut st, &frame(0));
        s.process(&mut st, &frame(1));
        let outcome = s.process(&mut st, &frame(2));

        assert!(matches!(outcome.faces[0].status, SlotStatus::Classified(_)));
        assert_eq!(outcome.faces[1].status, SlotStatus::Pending);
    }

    #[test]
    fn test_region_outside_frame_is_skipped() {
        let (mut s, calls) = scheduler(
            FakeLocator::always(vec![Region::new(500, 500, 20, 20)]),
            FakeClassifier::new(vec![Some(c(Emotion::Happy, 0.9))]),
            1,
        );
        let mut st = SourceState::new();
        let outcome = s.process(&mut st, &frame(0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(outcome.reading.is_none());
    }

    #[test]
    fn test_analyze_leaves_counter_and_cache_alone() {
        let classifier = FakeClassifier::new(vec![
            Some(c(Emotion::Happy, 0.9)),
            Some(c(Emotion::Disgust, 0.2)),
        ]);
        let (mut s, _) = scheduler(FakeLocator::always(vec![face(10)]), classifier, 2);
        let mut st = SourceState::new();

        let cached = s.process(&mut st, &frame(0)).reading;
        let analyzed = s.analyze(&frame(99)).unwrap();
        let skipped = s.process(&mut st, &frame(1));

        assert_eq!(analyzed.emotion, Emotion::Disgust);
        assert_eq!(st.frame_count(), 2);
        assert!(!skipped.classified);
        assert_eq!(skipped.reading, cached);
    }

    #[test]
    fn test_analyze_without_face_returns_sentinel() {
        let (mut s, _) = scheduler(
            FakeLocator::always(vec![]),
            FakeClassifier::new(vec![Some(c(Emotion::Happy, 0.9))]),
            2,
        );
        assert!(!s.analyze(&frame(0)).unwrap().face_detected);
    }

    #[test]
    fn test_analyze_propagates_classifier_error() {
        let (mut s, _) = scheduler(
            FakeLocator::always(vec![face(10)]),
            FakeClassifier::new(vec![None]),
            2,
        );
        assert!(s.analyze(&frame(0)).is_err());
    }

    #[test]
    fn test_analyze_skips_regions_outside_frame() {
        let (mut s, calls) = scheduler(
            FakeLocator::always(vec![Region::new(500, 500, 20, 20), face(10)]),
            FakeClassifier::new(vec![Some(c(Emotion::Sad, 0.6))]),
            2,
        );

        let reading = s.analyze(&frame(0)).unwrap();

        assert_eq!(reading.emotion, Emotion::Sad);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_analyze_with_only_unusable_regions_returns_sentinel() {
        let (mut s, calls) = scheduler(
            FakeLocator::always(vec![Region::new(500, 500, 20, 20)]),
            FakeClassifier::new(vec![Some(c(Emotion::Sad, 0.6))]),
            2,
        );

        let reading = s.analyze(&frame(0)).unwrap();

        assert!(!reading.face_detected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sources_keep_separate_counters_and_caches() {
        let locator = FakeLocator::new(vec![
            Some(vec![face(10)]), // camera, cycle 0
            Some(vec![face(10)]), // session, cycle 0
            Some(vec![]),         // session, cycle 1: face gone
            Some(vec![face(10)]), // camera, cycle 1
        ]);
        let classifier = FakeClassifier::new(vec![
            Some(c(Emotion::Happy, 0.9)),
            Some(c(Emotion::Sad, 0.6)),
        ]);
        let (mut s, calls) = scheduler(locator, classifier, 2);
        let mut camera = SourceState::new();
        let mut session = SourceState::new();

        let camera_first = s.process(&mut camera, &frame(0));
        let session_first = s.process(&mut session, &frame(0));
        let session_gone = s.process(&mut session, &frame(1));
        let camera_second = s.process(&mut camera, &frame(1));

        assert!(camera_first.classified);
        assert!(session_first.classified);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(session_first.reading.unwrap().emotion, Emotion::Sad);
        assert!(!session_gone.reading.unwrap().face_detected);
        assert!(!camera_second.classified);
        assert_eq!(camera_second.reading, camera_first.reading);
        assert_eq!(camera.frame_count(), 2);
        assert_eq!(session.frame_count(), 2);
    }
}

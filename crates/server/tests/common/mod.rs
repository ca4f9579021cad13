#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use emotion_relay_core::classification::domain::emotion_classifier::EmotionClassifier;
use emotion_relay_core::detection::domain::face_locator::FaceLocator;
use emotion_relay_core::pipeline::emotion_pipeline::EmotionPipeline;
use emotion_relay_core::pipeline::inference_scheduler::InferenceScheduler;
use emotion_relay_core::query::query_service::QueryService;
use emotion_relay_core::shared::emotion::{Classification, Emotion};
use emotion_relay_core::shared::frame::Frame;
use emotion_relay_core::shared::region::Region;
use emotion_relay_core::state::broadcaster::Broadcaster;
use emotion_relay_core::state::emotion_state_store::EmotionStateStore;
use emotion_relay_server::AppState;

/// Reports one face covering the top-left corner, or none.
pub struct FixedLocator {
    pub face: bool,
}

impl FaceLocator for FixedLocator {
    fn locate(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        Ok(if self.face {
            vec![Region::new(0, 0, 4, 4)]
        } else {
            vec![]
        })
    }
}

/// Reports a box entirely outside any test frame.
pub struct OffFrameLocator;

impl FaceLocator for OffFrameLocator {
    fn locate(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        Ok(vec![Region::new(500, 500, 10, 10)])
    }
}

pub struct FixedClassifier(pub Emotion, pub f32);

impl EmotionClassifier for FixedClassifier {
    fn classify(&mut self, _face: &Frame) -> Result<Classification, Box<dyn std::error::Error>> {
        Ok(Classification {
            emotion: self.0,
            confidence: self.1,
        })
    }
}

pub fn pipeline(face: bool, emotion: Emotion, confidence: f32) -> Arc<EmotionPipeline> {
    let store = Arc::new(EmotionStateStore::new());
    let broadcaster = Arc::new(Broadcaster::new(store.clone(), 8));
    let scheduler = InferenceScheduler::new(
        Box::new(FixedLocator { face }),
        Box::new(FixedClassifier(emotion, confidence)),
        1,
    )
    .unwrap();
    Arc::new(EmotionPipeline::new(scheduler, store, broadcaster))
}

pub fn available_state(face: bool) -> (AppState, Arc<EmotionPipeline>) {
    let p = pipeline(face, Emotion::Happy, 0.9);
    (AppState::new(p.clone()), p)
}

pub fn off_frame_state() -> AppState {
    let store = Arc::new(EmotionStateStore::new());
    let broadcaster = Arc::new(Broadcaster::new(store.clone(), 8));
    let scheduler = InferenceScheduler::new(
        Box::new(OffFrameLocator),
        Box::new(FixedClassifier(Emotion::Happy, 0.9)),
        1,
    )
    .unwrap();
    AppState::new(Arc::new(EmotionPipeline::new(scheduler, store, broadcaster)))
}

pub fn unavailable_state() -> (AppState, Arc<EmotionStateStore>) {
    let store = Arc::new(EmotionStateStore::new());
    let broadcaster = Arc::new(Broadcaster::new(store.clone(), 8));
    let query = QueryService::new(store.clone(), false);
    (AppState::unavailable(query, broadcaster), store)
}

/// An 8x8 PNG as a browser would send it.
pub fn data_url_png() -> String {
    let image = image::RgbImage::from_pixel(8, 8, image::Rgb([120, 80, 40]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner()))
}

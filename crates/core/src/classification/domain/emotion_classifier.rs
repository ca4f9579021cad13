use crate::shared::emotion::Classification;
use crate::shared::frame::Frame;

/// Domain interface for facial expression classification.
///
/// Receives a single cropped face and reports the arg-max class with its
/// probability. No thresholding is applied here.
pub trait EmotionClassifier: Send {
    fn classify(&mut self, face: &Frame) -> Result<Classification, Box<dyn std::error::Error>>;
}

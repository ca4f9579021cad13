use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for face localisation.
///
/// Returns face boxes in detection order; the order defines slot indices.
/// Implementations may keep state between frames, hence `&mut self`.
pub trait FaceLocator: Send {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}

use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum FrameSourceError {
    /// Nothing to read right now; the caller should back off and retry.
    #[error("no frame available")]
    Unavailable,
    /// The source produced bytes that are not a usable image.
    #[error("frame could not be decoded: {0}")]
    Decode(String),
    /// The underlying device failed in a way retrying may not fix.
    #[error("capture device error: {0}")]
    Device(String),
}

/// Where frames come from.
///
/// The pipeline consumes every implementation the same way, so local capture
/// and remotely pushed frames go through identical scheduling.
pub trait FrameSource: Send {
    /// Returns the next frame, `Ok(None)` when the source has nothing more
    /// to give (a push source between pushes, or a closed device).
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError>;

    /// Releases any resources held by the source.
    fn close(&mut self);
}

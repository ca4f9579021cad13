use crate::shared::frame::Frame;

/// A live camera. Exclusively owned by the capture loop.
pub trait CaptureDevice: Send {
    /// Blocks until the device hands over one RGB frame.
    ///
    /// `Ok(None)` means the device had nothing this time and may recover.
    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases the device. Further reads return an error.
    fn close(&mut self);
}

use crate::ingestion::domain::capture_device::CaptureDevice;
use crate::ingestion::domain::frame_source::{FrameSource, FrameSourceError};
use crate::shared::frame::Frame;

/// Pull variant: adapts a capture device to the frame source interface.
///
/// An empty read maps to [`FrameSourceError::Unavailable`] so the loop backs
/// off instead of treating the camera as finished.
pub struct CaptureFrameSource {
    device: Box<dyn CaptureDevice>,
    closed: bool,
}

impl CaptureFrameSource {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device,
            closed: false,
        }
    }
}

impl FrameSource for CaptureFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        if self.closed {
            return Ok(None);
        }
        match self.device.read_frame() {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => Err(FrameSourceError::Unavailable),
            Err(e) => Err(FrameSourceError::Device(e.to_string())),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.device.close();
            self.closed = true;
        }
    }
}

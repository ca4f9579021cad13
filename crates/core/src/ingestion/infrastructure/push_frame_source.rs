use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingestion::domain::frame_source::{FrameSource, FrameSourceError};
use crate::shared::emotion::now_seconds;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum FrameDecodeError {
    #[error("No frame data provided")]
    EmptyPayload,
    #[error("frame is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("frame is not a decodable image: {0}")]
    Image(#[from] image::ImageError),
}

/// One frame pushed by a remote producer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PushedFrame {
    /// Base64 image, optionally behind a `data:<media>;base64,` marker.
    #[serde(default)]
    pub frame: String,
    /// Producer clock; only used when present.
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Push variant: frames arrive one at a time from a single session.
///
/// Each accepted push is yielded exactly once by `next_frame`.
pub struct PushFrameSource {
    session_id: String,
    pending: Option<Frame>,
    received: usize,
}

impl PushFrameSource {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            pending: None,
            received: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Decodes a pushed message and queues it for the next `next_frame` call.
    ///
    /// A malformed payload is returned to the caller and leaves the source as
    /// it was.
    pub fn offer(&mut self, message: &PushedFrame) -> Result<(), FrameDecodeError> {
        let timestamp = message.timestamp.unwrap_or_else(now_seconds);
        let frame = decode_frame(&message.frame, self.received)?.with_timestamp(timestamp);
        self.received += 1;
        self.pending = Some(frame);
        Ok(())
    }
}

impl FrameSource for PushFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        Ok(self.pending.take())
    }

    fn close(&mut self) {
        self.pending = None;
    }
}

/// Decodes a transport-encoded image into an RGB frame.
pub fn decode_frame(payload: &str, index: usize) -> Result<Frame, FrameDecodeError> {
    let encoded = strip_media_prefix(payload.trim());
    if encoded.is_empty() {
        return Err(FrameDecodeError::EmptyPayload);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    let image = image::load_from_memory(&bytes)?.to_rgb8();
    Ok(Frame::from_rgb_image(image, index))
}

/// Drops a leading `data:image/jpeg;base64,` style marker, if any.
fn strip_media_prefix(payload: &str) -> &str {
    if payload.starts_with("data:") {
        payload.split_once(',').map_or("", |(_, data)| data)
    } else {
        payload
    }
}

impl From<FrameDecodeError> for FrameSourceError {
    fn from(e: FrameDecodeError) -> Self {
        FrameSourceError::Decode(e.to_string())
    }
}

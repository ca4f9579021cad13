use emotion_relay_core::ingestion::infrastructure::push_frame_source::PushedFrame;
use emotion_relay_core::pipeline::inference_scheduler::FaceAnnotation;
use emotion_relay_core::shared::emotion::{Emotion, EmotionReading};
use serde::{Deserialize, Serialize};

/// Acknowledgement for one processed frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameAck {
    pub status: String,
    pub emotion: Emotion,
    pub confidence: f32,
    pub face_detected: bool,
    /// Every face of the frame in slot order. Empty for single-frame
    /// analysis and for frames without a face.
    #[serde(default)]
    pub faces: Vec<FaceReport>,
}

impl FrameAck {
    pub fn success(reading: &EmotionReading) -> Self {
        Self {
            status: "success".to_string(),
            emotion: reading.emotion,
            confidence: reading.confidence,
            face_detected: reading.face_detected,
            faces: Vec::new(),
        }
    }

    pub fn with_faces(mut self, faces: &[FaceAnnotation]) -> Self {
        self.faces = faces.iter().map(FaceReport::from).collect();
        self
    }
}

/// One face slot as shown to a client: the cached label, or the pending
/// label while the slot waits for its first classification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceReport {
    pub slot: usize,
    pub label: String,
    pub confidence: f32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl From<&FaceAnnotation> for FaceReport {
    fn from(face: &FaceAnnotation) -> Self {
        Self {
            slot: face.slot,
            label: face.label().to_string(),
            confidence: face.confidence(),
            x: face.region.x,
            y: face.region.y,
            width: face.region.width,
            height: face.region.height,
        }
    }
}

/// Body of `POST /api/conversation/prompt`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub prompt: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Server → client WebSocket messages, as `{"event": ..., "data": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    EmotionUpdate(EmotionReading),
    EmotionProcessed(FrameAck),
    EmotionError(ErrorBody),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::EmotionError(ErrorBody {
            error: message.into(),
        })
    }
}

/// Client → server WebSocket messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    VideoFrame(PushedFrame),
}

#[cfg(test)]
mod tests {
    use super::*;
    use emotion_relay_core::pipeline::inference_scheduler::SlotStatus;
    use emotion_relay_core::shared::constants::PENDING_LABEL;
    use emotion_relay_core::shared::emotion::Classification;
    use emotion_relay_core::shared::region::Region;

    #[test]
    fn test_update_wire_shape() {
        let event = ServerEvent::EmotionUpdate(EmotionReading::no_face(3.0));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "emotion_update");
        assert_eq!(value["data"]["emotion"], "Neutral");
        assert_eq!(value["data"]["face_detected"], false);
    }

    #[test]
    fn test_error_wire_shape() {
        let value = serde_json::to_value(ServerEvent::error("No frame data provided")).unwrap();
        assert_eq!(value["event"], "emotion_error");
        assert_eq!(value["data"]["error"], "No frame data provided");
    }

    #[test]
    fn test_parse_video_frame() {
        let text = r#"{"event": "video_frame", "data": {"frame": "abc", "timestamp": 12.5}}"#;
        let ClientEvent::VideoFrame(frame) = serde_json::from_str(text).unwrap();
        assert_eq!(frame.frame, "abc");
        assert_eq!(frame.timestamp, Some(12.5));
    }

    #[test]
    fn test_ack_lists_pending_and_classified_faces() {
        let faces = [
            FaceAnnotation {
                slot: 0,
                region: Region::new(1, 2, 30, 40),
                status: SlotStatus::Classified(Classification {
                    emotion: Emotion::Happy,
                    confidence: 0.9,
                }),
            },
            FaceAnnotation {
                slot: 1,
                region: Region::new(50, 2, 30, 40),
                status: SlotStatus::Pending,
            },
        ];
        let reading = EmotionReading::from_classification(
            Classification {
                emotion: Emotion::Happy,
                confidence: 0.9,
            },
            1.0,
        );

        let value = serde_json::to_value(FrameAck::success(&reading).with_faces(&faces)).unwrap();

        assert_eq!(value["faces"][0]["label"], "Happy");
        assert_eq!(value["faces"][0]["width"], 30);
        assert_eq!(value["faces"][1]["label"], PENDING_LABEL);
        assert_eq!(value["faces"][1]["confidence"], 0.0);
    }

    #[test]
    fn test_ack_without_faces_field_parses() {
        let text = r#"{"status": "success", "emotion": "Sad", "confidence": 0.5, "face_detected": true}"#;
        let ack: FrameAck = serde_json::from_str(text).unwrap();
        assert!(ack.faces.is_empty());
    }

    #[test]
    fn test_unknown_client_event_is_rejected() {
        let text = r#"{"event": "shutdown", "data": {}}"#;
        assert!(serde_json::from_str::<ClientEvent>(text).is_err());
    }
}

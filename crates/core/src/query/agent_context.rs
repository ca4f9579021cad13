use serde::{Deserialize, Serialize};

use crate::shared::emotion::{Emotion, EmotionReading};

pub const NO_FACE_CONTEXT: &str = "No face detected. Proceed with neutral conversation.";
pub const UNAVAILABLE_CONTEXT: &str = "Emotion detection unavailable. Proceed with neutral conversation.";
const UNKNOWN_STATE: &str = "unknown";

/// Emotion summary shaped for injection into a conversational prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub emotion: Emotion,
    pub confidence: f32,
    pub face_detected: bool,
    pub context: String,
    pub emotional_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl AgentContext {
    /// Maps a reading to its context. Total: every label has a sentence and
    /// every face-less reading gets the same neutral answer.
    pub fn from_reading(reading: &EmotionReading) -> Self {
        if !reading.face_detected {
            return Self::neutral(NO_FACE_CONTEXT);
        }
        Self {
            emotion: reading.emotion,
            confidence: reading.confidence,
            face_detected: true,
            context: narrative(reading.emotion, reading.confidence),
            emotional_state: reading.emotion.as_str().to_lowercase(),
            timestamp: Some(reading.timestamp),
        }
    }

    /// Answer given when no classifier could be loaded.
    pub fn unavailable() -> Self {
        Self::neutral(UNAVAILABLE_CONTEXT)
    }

    fn neutral(context: &str) -> Self {
        Self {
            emotion: Emotion::Neutral,
            confidence: 0.0,
            face_detected: false,
            context: context.to_string(),
            emotional_state: UNKNOWN_STATE.to_string(),
            timestamp: None,
        }
    }
}

fn narrative(emotion: Emotion, confidence: f32) -> String {
    let pct = format!("{:.0}%", confidence * 100.0);
    match emotion {
        Emotion::Happy => {
            format!("The user appears happy (confidence: {pct}). They seem in a positive mood.")
        }
        Emotion::Sad => format!(
            "The user appears sad (confidence: {pct}). They may need empathy and support."
        ),
        Emotion::Angry => format!(
            "The user appears angry (confidence: {pct}). Approach with care and validation."
        ),
        Emotion::Fear => format!(
            "The user appears fearful or anxious (confidence: {pct}). Provide reassurance."
        ),
        Emotion::Surprise => format!(
            "The user appears surprised (confidence: {pct}). They may be processing new information."
        ),
        Emotion::Disgust => format!(
            "The user appears uncomfortable or disgusted (confidence: {pct}). Be gentle and understanding."
        ),
        Emotion::Neutral => format!("The user appears calm and neutral (confidence: {pct})."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::emotion::Classification;
    use rstest::rstest;

    fn face_reading(emotion: Emotion, confidence: f32) -> EmotionReading {
        EmotionReading::from_classification(
            Classification {
                emotion,
                confidence,
            },
            123.0,
        )
    }

    #[test]
    fn test_every_label_has_a_sentence() {
        for emotion in Emotion::ALL {
            let ctx = AgentContext::from_reading(&face_reading(emotion, 0.5));
            assert!(!ctx.context.is_empty());
            assert!(ctx.context.contains("50%"), "{}", ctx.context);
            assert_eq!(ctx.emotional_state, emotion.as_str().to_lowercase());
            assert!(ctx.face_detected);
            assert_eq!(ctx.timestamp, Some(123.0));
        }
    }

    #[rstest]
    #[case(Emotion::Happy, 0.85, "The user appears happy (confidence: 85%). They seem in a positive mood.")]
    #[case(Emotion::Neutral, 0.4, "The user appears calm and neutral (confidence: 40%).")]
    #[case(Emotion::Fear, 0.996, "The user appears fearful or anxious (confidence: 100%). Provide reassurance.")]
    fn test_sentence_text(#[case] emotion: Emotion, #[case] confidence: f32, #[case] expected: &str) {
        assert_eq!(AgentContext::from_reading(&face_reading(emotion, confidence)).context, expected);
    }

    #[test]
    fn test_no_face_ignores_label_and_confidence() {
        let mut reading = face_reading(Emotion::Angry, 0.99);
        reading.face_detected = false;

        let ctx = AgentContext::from_reading(&reading);

        assert_eq!(ctx.emotion, Emotion::Neutral);
        assert_eq!(ctx.confidence, 0.0);
        assert_eq!(ctx.context, NO_FACE_CONTEXT);
        assert_eq!(ctx.emotional_state, "unknown");
        assert!(ctx.timestamp.is_none());
    }

    #[test]
    fn test_no_face_wire_shape_omits_timestamp() {
        let value = serde_json::to_value(AgentContext::from_reading(&EmotionReading::no_face(1.0))).unwrap();
        assert_eq!(value["emotion"], "Neutral");
        assert_eq!(value["face_detected"], false);
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn test_unavailable_sentinel() {
        let ctx = AgentContext::unavailable();
        assert_eq!(ctx.context, UNAVAILABLE_CONTEXT);
        assert!(!ctx.face_detected);
    }
}

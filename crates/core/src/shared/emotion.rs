use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// The seven facial expression classes, in classifier output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    /// Maps a classifier output index to its label.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
            Emotion::Neutral => "Neutral",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one classifier call: arg-max label and its softmax probability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub emotion: Emotion,
    pub confidence: f32,
}

/// The unit stored in the state store and published to subscribers.
///
/// `face_detected == false` is the "no face" sentinel; its `emotion` is
/// always `Neutral` and its confidence 0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    pub emotion: Emotion,
    pub confidence: f32,
    pub timestamp: f64,
    pub face_detected: bool,
}

impl EmotionReading {
    pub fn from_classification(classification: Classification, timestamp: f64) -> Self {
        Self {
            emotion: classification.emotion,
            confidence: classification.confidence,
            timestamp,
            face_detected: true,
        }
    }

    pub fn no_face(timestamp: f64) -> Self {
        Self {
            emotion: Emotion::Neutral,
            confidence: 0.0,
            timestamp,
            face_detected: false,
        }
    }
}

/// Wall-clock seconds since the Unix epoch.
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

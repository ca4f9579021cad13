use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::shared::emotion::{Emotion, EmotionReading};

const HISTORY_LEN: usize = 10;

/// Readings above this confidence are mentioned in the prompt.
const PROMPT_CONFIDENCE: f32 = 0.7;

/// Session statistics over the recent face-present readings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EmotionSummary {
    pub total_readings: usize,
    pub emotion_distribution: HashMap<Emotion, usize>,
    pub most_common_emotion: Option<Emotion>,
    pub average_confidence: f32,
}

/// Read side of the conversational consumer: turns the current reading into
/// a prompt prefix and remembers the last few readings.
#[derive(Debug, Default)]
pub struct ConversationContext {
    history: VecDeque<EmotionReading>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `reading` and returns the sentence to put before the user's
    /// message. Empty when no face is present or confidence is low.
    pub fn observe(&mut self, reading: &EmotionReading) -> String {
        if !reading.face_detected {
            return String::new();
        }
        self.history.push_back(*reading);
        if self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }

        if reading.confidence > PROMPT_CONFIDENCE {
            format!(
                "The patient appears to be feeling {}. ",
                reading.emotion.as_str().to_lowercase()
            )
        } else {
            String::new()
        }
    }

    /// Full prompt for one user turn.
    pub fn prompt(&mut self, reading: &EmotionReading, user_message: &str) -> String {
        let prefix = self.observe(reading);
        format!("{prefix}Patient: {user_message}\nTherapist:")
    }

    pub fn summary(&self) -> EmotionSummary {
        let mut counts: HashMap<Emotion, usize> = HashMap::new();
        let mut first_seen: Vec<Emotion> = Vec::new();
        for reading in &self.history {
            let count = counts.entry(reading.emotion).or_insert(0);
            if *count == 0 {
                first_seen.push(reading.emotion);
            }
            *count += 1;
        }

        // Ties go to the label that appeared first.
        let most_common = first_seen
            .iter()
            .copied()
            .fold(None::<(Emotion, usize)>, |best, e| {
                let n = counts[&e];
                match best {
                    Some((_, m)) if m >= n => best,
                    _ => Some((e, n)),
                }
            })
            .map(|(e, _)| e);

        let average_confidence = if self.history.is_empty() {
            0.0
        } else {
            self.history.iter().map(|r| r.confidence).sum::<f32>() / self.history.len() as f32
        };

        EmotionSummary {
            total_readings: self.history.len(),
            emotion_distribution: counts,
            most_common_emotion: most_common,
            average_confidence,
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

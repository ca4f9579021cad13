use std::sync::{PoisonError, RwLock};

use crate::shared::emotion::{Emotion, EmotionReading};

/// Holds the single current emotion reading.
///
/// Readings are `Copy` and replaced whole, so a reader always sees one
/// complete write. Concurrent writers race; the last `set` wins.
pub struct EmotionStateStore {
    current: RwLock<EmotionReading>,
}

impl EmotionStateStore {
    pub fn new() -> Self {
        Self::with_reading(EmotionReading {
            emotion: Emotion::Neutral,
            confidence: 0.0,
            timestamp: 0.0,
            face_detected: false,
        })
    }

    pub fn with_reading(reading: EmotionReading) -> Self {
        Self {
            current: RwLock::new(reading),
        }
    }

    /// Copies out the current reading.
    ///
    /// Wait-bounded rather than wait-free: the lock is only ever held for one
    /// copy of a reading, so a reader waits at most that long for a writer.
    /// No caller holds it across detection or classification.
    pub fn get(&self) -> EmotionReading {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, reading: EmotionReading) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = reading;
    }
}

impl Default for EmotionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

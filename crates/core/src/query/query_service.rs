use std::sync::Arc;

use serde::Serialize;

use crate::query::agent_context::AgentContext;
use crate::shared::constants::SERVICE_NAME;
use crate::shared::emotion::{now_seconds, EmotionReading};
use crate::state::emotion_state_store::EmotionStateStore;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: f64,
    /// Whether an emotion classifier is loaded.
    pub emotion_detection: bool,
}

/// Read-only surface over the state store. Holds no state of its own.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<EmotionStateStore>,
    classifier_available: bool,
}

impl QueryService {
    pub fn new(store: Arc<EmotionStateStore>, classifier_available: bool) -> Self {
        Self {
            store,
            classifier_available,
        }
    }

    pub fn current_emotion(&self) -> EmotionReading {
        self.store.get()
    }

    pub fn agent_context(&self) -> AgentContext {
        if !self.classifier_available {
            return AgentContext::unavailable();
        }
        AgentContext::from_reading(&self.store.get())
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            service: SERVICE_NAME,
            timestamp: now_seconds(),
            emotion_detection: self.classifier_available,
        }
    }
}

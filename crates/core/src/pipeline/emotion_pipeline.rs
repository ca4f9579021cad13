use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ingestion::domain::frame_source::{FrameSource, FrameSourceError};
use crate::pipeline::inference_scheduler::{CycleOutcome, InferenceScheduler, SourceState};
use crate::shared::emotion::EmotionReading;
use crate::shared::frame::Frame;
use crate::state::broadcaster::Broadcaster;
use crate::state::emotion_state_store::EmotionStateStore;

/// Scheduler → store → broadcaster, shared by every frame source.
///
/// The capabilities are shared; each source brings its own [`SourceState`].
/// Store and broadcaster have their own locks, so queries and subscriptions
/// never wait on a classification in progress.
pub struct EmotionPipeline {
    scheduler: Mutex<InferenceScheduler>,
    store: Arc<EmotionStateStore>,
    broadcaster: Arc<Broadcaster>,
}

impl EmotionPipeline {
    pub fn new(
        scheduler: InferenceScheduler,
        store: Arc<EmotionStateStore>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            scheduler: Mutex::new(scheduler),
            store,
            broadcaster,
        }
    }

    pub fn store(&self) -> &Arc<EmotionStateStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Schedules one frame and publishes its reading, if it produced one.
    ///
    /// Set and publish happen under the scheduler lock, so readings from one
    /// source reach subscribers in frame order.
    pub fn process(&self, state: &mut SourceState, frame: &Frame) -> CycleOutcome {
        let mut scheduler = self.scheduler();
        let outcome = scheduler.process(state, frame);
        if let Some(reading) = outcome.reading {
            self.store.set(reading);
            let delivered = self.broadcaster.publish(reading);
            log::debug!(
                "Published {} ({:.2}) to {delivered} subscribers",
                reading.emotion,
                reading.confidence
            );
        }
        outcome
    }

    /// Classifies one frame for an immediate answer. Publishes nothing.
    pub fn analyze(&self, frame: &Frame) -> Result<EmotionReading, Box<dyn std::error::Error>> {
        self.scheduler().analyze(frame)
    }

    /// Drains every frame `source` has ready right now.
    ///
    /// Returns the last cycle's outcome. Decode and device errors go back to
    /// the caller; nothing is published for them.
    pub fn pump(
        &self,
        source: &mut dyn FrameSource,
        state: &mut SourceState,
    ) -> Result<Option<CycleOutcome>, FrameSourceError> {
        let mut last = None;
        while let Some(frame) = source.next_frame()? {
            last = Some(self.process(state, &frame));
        }
        Ok(last)
    }

    /// Logs the scheduler's run summary.
    pub fn summary(&self) {
        self.scheduler().summary();
    }

    fn scheduler(&self) -> MutexGuard<'_, InferenceScheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

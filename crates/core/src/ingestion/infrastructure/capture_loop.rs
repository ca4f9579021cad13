use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::CaptureConfig;
use crate::ingestion::domain::frame_source::{FrameSource, FrameSourceError};
use crate::pipeline::emotion_pipeline::EmotionPipeline;
use crate::pipeline::inference_scheduler::SourceState;

/// Longest uninterrupted sleep, so cancellation is noticed promptly.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Counters reported when the loop stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: usize,
    pub retries: usize,
}

/// Drives a pull source on a dedicated thread.
///
/// One frame per iteration, then a fixed pause independent of the camera's
/// own rate. Read failures back off and retry; they never end the loop.
pub struct CaptureLoop {
    frame_interval: Duration,
    retry_backoff: Duration,
}

impl CaptureLoop {
    pub fn new(frame_interval: Duration, retry_backoff: Duration) -> Self {
        Self {
            frame_interval,
            retry_backoff,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(
            Duration::from_millis(config.frame_interval_ms),
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    pub fn spawn(
        self,
        source: Box<dyn FrameSource>,
        pipeline: Arc<EmotionPipeline>,
    ) -> std::io::Result<CaptureHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let thread = std::thread::Builder::new()
            .name("capture".into())
            .spawn(move || self.run(source, &pipeline, &flag))?;
        Ok(CaptureHandle {
            cancelled,
            thread: Some(thread),
        })
    }

    fn run(
        &self,
        mut source: Box<dyn FrameSource>,
        pipeline: &EmotionPipeline,
        cancelled: &AtomicBool,
    ) -> CaptureStats {
        let mut stats = CaptureStats::default();
        let mut state = SourceState::new();
        log::info!("Capture loop started");

        while !cancelled.load(Ordering::Relaxed) {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    pipeline.process(&mut state, &frame);
                    stats.frames += 1;
                    pause(cancelled, self.frame_interval);
                }
                Ok(None) => {
                    log::info!("Capture source closed");
                    break;
                }
                Err(FrameSourceError::Unavailable) => {
                    stats.retries += 1;
                    log::debug!("No frame available, retrying");
                    pause(cancelled, self.retry_backoff);
                }
                Err(e) => {
                    stats.retries += 1;
                    log::warn!("Capture read failed: {e}");
                    pause(cancelled, self.retry_backoff);
                }
            }
        }

        source.close();
        pipeline.summary();
        log::info!(
            "Capture loop stopped after {} frames ({} retries)",
            stats.frames,
            stats.retries
        );
        stats
    }
}

/// Owner of a running capture loop. Dropping it stops the loop too.
pub struct CaptureHandle {
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<CaptureStats>>,
}

impl CaptureHandle {
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the loop, waits for the device to be released and returns the
    /// run's counters. Subscribers are left connected.
    pub fn shutdown(mut self) -> Option<CaptureStats> {
        self.stop()
    }

    fn stop(&mut self) -> Option<CaptureStats> {
        self.cancelled.store(true, Ordering::Relaxed);
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                log::error!("Capture thread panicked");
                None
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pause(cancelled: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !cancelled.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(CANCEL_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::inference_scheduler::tests::{c, face, frame, FakeClassifier, FakeLocator};
    use crate::pipeline::inference_scheduler::InferenceScheduler;
    use crate::shared::emotion::Emotion;
    use crate::shared::frame::Frame;
    use crate::state::broadcaster::Broadcaster;
    use crate::state::emotion_state_store::EmotionStateStore;
    use std::sync::atomic::AtomicUsize;

    enum Step {
        Frame,
        Unavailable,
        Broken,
        End,
    }

    struct ScriptedSource {
        script: Vec<Step>,
        cursor: usize,
        closes: Arc<AtomicUsize>,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError> {
            let step = self.script.get(self.cursor).unwrap_or(&Step::Unavailable);
            self.cursor += 1;
            match step {
                Step::Frame => Ok(Some(frame(self.cursor))),
                Step::Unavailable => Err(FrameSourceError::Unavailable),
                Step::Broken => Err(FrameSourceError::Device("unplugged".into())),
                Step::End => Ok(None),
            }
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pipeline() -> Arc<EmotionPipeline> {
        let store = Arc::new(EmotionStateStore::new());
        let broadcaster = Arc::new(Broadcaster::new(store.clone(), 8));
        let scheduler = InferenceScheduler::new(
            Box::new(FakeLocator::always(vec![face(10)])),
            Box::new(FakeClassifier::new(vec![Some(c(Emotion::Happy, 0.9))])),
            2,
        )
        .unwrap();
        Arc::new(EmotionPipeline::new(scheduler, store, broadcaster))
    }

    fn source(script: Vec<Step>) -> (Box<dyn FrameSource>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            script,
            cursor: 0,
            closes: closes.clone(),
        };
        (Box::new(source), closes)
    }

    fn fast_loop() -> CaptureLoop {
        CaptureLoop::new(Duration::from_millis(1), Duration::from_millis(1))
    }

    #[test]
    fn test_failures_are_retried_until_source_ends() {
        let p = pipeline();
        let (src, closes) = source(vec![
            Step::Frame,
            Step::Unavailable,
            Step::Broken,
            Step::Frame,
            Step::End,
        ]);

        let handle = fast_loop().spawn(src, p.clone()).unwrap();
        while handle.is_running() {
            std::thread::sleep(Duration::from_millis(5));
        }
        let stats = handle.shutdown().unwrap();

        assert_eq!(stats, CaptureStats { frames: 2, retries: 2 });
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(p.store().get().emotion, Emotion::Happy);
    }

    #[test]
    fn test_shutdown_releases_source_and_keeps_subscribers() {
        let p = pipeline();
        let mut subscriber = p.broadcaster().subscribe();
        let (src, closes) = source(vec![Step::Frame]);

        let handle = CaptureLoop::new(Duration::from_millis(1), Duration::from_secs(60))
            .spawn(src, p.clone())
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        let stats = handle.shutdown().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(stats.frames, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(p.broadcaster().subscriber_count(), 1);
        assert!(subscriber.try_recv().is_some());
    }

    #[test]
    fn test_dropping_handle_stops_loop() {
        let p = pipeline();
        let (src, closes) = source(vec![]);
        let handle = fast_loop().spawn(src, p).unwrap();
        drop(handle);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pause_returns_early_when_cancelled() {
        let cancelled = AtomicBool::new(true);
        let started = Instant::now();
        pause(&cancelled, Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

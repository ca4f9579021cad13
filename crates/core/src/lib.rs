//! Real-time facial emotion relay.
//!
//! Frames arrive from a local camera or from remote pushes, go through the
//! [`pipeline::inference_scheduler::InferenceScheduler`], and the resulting
//! reading lands in the [`state::emotion_state_store::EmotionStateStore`] and
//! is fanned out by the [`state::broadcaster::Broadcaster`].

pub mod classification;
pub mod config;
pub mod detection;
pub mod ingestion;
pub mod pipeline;
pub mod query;
pub mod shared;
pub mod state;

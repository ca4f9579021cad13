pub mod broadcaster;
pub mod emotion_state_store;

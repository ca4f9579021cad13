pub mod emotion_pipeline;
pub mod inference_scheduler;
pub mod pipeline_logger;

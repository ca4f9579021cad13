pub mod capture_frame_source;
pub mod capture_loop;
pub mod ffmpeg_capture_device;
pub mod push_frame_source;

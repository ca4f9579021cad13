pub const FACE_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Run the classifier on every Nth processed frame.
pub const DEFAULT_SKIP_INTERVAL: usize = 2;

/// Outbound readings buffered per subscriber before the oldest is dropped.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 8;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5000";

pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
pub const DEFAULT_CAPTURE_FPS: u32 = 30;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 33;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;

/// Label shown for a face slot that has not been classified yet.
pub const PENDING_LABEL: &str = "Processing...";

pub const SERVICE_NAME: &str = "emotion-relay";

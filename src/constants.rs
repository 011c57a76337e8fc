//! Application constants

/// Default bind address (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTP + WebSocket port
pub const DEFAULT_PORT: u16 = 5000;

/// Default location of the detection log
pub const DEFAULT_DETECTION_LOG_PATH: &str = "data/detection_log.json";

/// Default location of the pretrained frontal-face cascade
pub const DEFAULT_FACE_CASCADE_PATH: &str = "models/haarcascade_frontalface_default.xml";

/// Default directory holding the single-page client
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Maximum size of one inbound WebSocket message (16 MB, base64 frames are large)
pub const DEFAULT_MAX_FRAME_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Pyramid step between detection scales
pub const DETECTION_SCALE_FACTOR: f64 = 1.3;

/// Minimum number of overlapping hits for a face to be reported
pub const DETECTION_MIN_NEIGHBORS: usize = 5;

/// Relative tolerance when clustering overlapping hits
pub const DETECTION_GROUP_EPS: f64 = 0.2;

/// Expression recorded when the client sends none
pub const DEFAULT_EXPRESSION: &str = "None";

/// Default page size for the detection listing endpoint
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Maximum page size for the detection listing endpoint
pub const MAX_PAGE_SIZE: usize = 100;

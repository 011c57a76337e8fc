pub mod cascade;
pub mod decoder;
pub mod error;
pub mod face_detector;
pub mod frame_session;
pub mod report;

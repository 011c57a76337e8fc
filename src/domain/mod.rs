pub mod detection_log;

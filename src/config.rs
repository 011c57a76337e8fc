//! Runtime configuration read from the environment at start-up.

use std::env;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_DETECTION_LOG_PATH, DEFAULT_FACE_CASCADE_PATH, DEFAULT_HOST,
    DEFAULT_MAX_FRAME_MESSAGE_BYTES, DEFAULT_PORT, DEFAULT_STATIC_DIR,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub detection_log_path: PathBuf,
    pub face_cascade_path: PathBuf,
    pub static_dir: PathBuf,
    pub max_frame_message_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    /// Unparseable numbers fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: non_empty("PORT")
                .and_then(|v| v.parse().ok())
                .filter(|p| *p > 0)
                .unwrap_or(DEFAULT_PORT),
            detection_log_path: non_empty("DETECTION_LOG_PATH")
                .unwrap_or_else(|| DEFAULT_DETECTION_LOG_PATH.to_string())
                .into(),
            face_cascade_path: non_empty("FACE_CASCADE_PATH")
                .unwrap_or_else(|| DEFAULT_FACE_CASCADE_PATH.to_string())
                .into(),
            static_dir: non_empty("STATIC_DIR")
                .unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string())
                .into(),
            max_frame_message_bytes: non_empty("MAX_FRAME_MESSAGE_BYTES")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_MAX_FRAME_MESSAGE_BYTES),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
        assert_eq!(
            config.detection_log_path,
            PathBuf::from("data/detection_log.json")
        );
        assert_eq!(config.static_dir, PathBuf::from("static"));
        assert_eq!(config.max_frame_message_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("DETECTION_LOG_PATH", "/tmp/log.json"),
            ("FACE_CASCADE_PATH", "/opt/cascade.xml"),
        ]);
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.detection_log_path, PathBuf::from("/tmp/log.json"));
        assert_eq!(config.face_cascade_path, PathBuf::from("/opt/cascade.xml"));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config_from(&[("PORT", "not-a-port"), ("MAX_FRAME_MESSAGE_BYTES", "0")]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_frame_message_bytes, 16 * 1024 * 1024);
    }
}

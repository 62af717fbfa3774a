use std::env;
use std::time::Duration;

use rally_shared::constants::{NOTIFICATION_DEDUPE_SECS, TYPING_TIMEOUT_MS};

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub upload_dir: String,
    pub max_upload_bytes: u64,
    pub typing_timeout_ms: u64,
    pub chunk_session_timeout_secs: u64,
    pub chunk_sweep_interval_secs: u64,
    pub notification_dedupe_secs: i64,
    pub classifier_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            database_path: "./rally.db".into(),
            upload_dir: "./uploads".into(),
            max_upload_bytes: 104_857_600, // 100MB
            typing_timeout_ms: TYPING_TIMEOUT_MS,
            chunk_session_timeout_secs: 300,
            chunk_sweep_interval_secs: 30,
            notification_dedupe_secs: NOTIFICATION_DEDUPE_SECS,
            classifier_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT").unwrap_or(defaults.port),
            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or(defaults.upload_dir),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
            typing_timeout_ms: parse_var("TYPING_TIMEOUT_MS").unwrap_or(defaults.typing_timeout_ms),
            chunk_session_timeout_secs: parse_var("CHUNK_SESSION_TIMEOUT_SECS")
                .unwrap_or(defaults.chunk_session_timeout_secs),
            chunk_sweep_interval_secs: parse_var("CHUNK_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.chunk_sweep_interval_secs),
            notification_dedupe_secs: parse_var("NOTIFICATION_DEDUPE_SECS")
                .unwrap_or(defaults.notification_dedupe_secs),
            classifier_url: env::var("CLASSIFIER_URL").ok().filter(|u| !u.is_empty()),
        }
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    pub fn chunk_session_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_session_timeout_secs)
    }

    pub fn chunk_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.chunk_sweep_interval_secs.max(1))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

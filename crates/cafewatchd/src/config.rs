use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
///
/// Monitor thresholds live in the TOML file at `config_path`; these are
/// the runtime wiring settings.
pub struct Config {
    /// JSON-lines frame stream, `-` for stdin.
    pub frame_source: String,
    /// Required face descriptor length in the frame stream; 0 accepts any
    /// non-empty descriptor. Must match the roster encoder.
    pub descriptor_dim: usize,
    /// Monitor tuning file. Missing means built-in defaults.
    pub config_path: PathBuf,
    /// Directory of staff face photos.
    pub roster_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Text-to-speech command; the text is appended as the last argument.
    /// Empty disables speech and only logs announcements.
    pub speech_command: String,
    pub roster_poll_secs: u64,
    /// Pause after a roster directory change before reloading.
    pub roster_settle_ms: u64,
    pub sink_capacity: usize,
    pub drain_timeout_secs: u64,
    /// Whether to serve the status interface on D-Bus.
    pub dbus_enabled: bool,
    /// Use the system bus instead of the session bus.
    pub dbus_system: bool,
}

impl Config {
    /// Load configuration from `CAFEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            frame_source: std::env::var("CAFEWATCH_FRAME_SOURCE").unwrap_or_else(|_| "-".to_string()),
            descriptor_dim: env_usize("CAFEWATCH_DESCRIPTOR_DIM", cafewatch_core::ARCFACE_EMBEDDING_DIM),
            config_path: env_path("CAFEWATCH_CONFIG", || PathBuf::from("cafewatch.toml")),
            roster_dir: env_path("CAFEWATCH_ROSTER_DIR", || PathBuf::from("data_wajah")),
            model_dir: cafewatch_core::default_model_dir(),
            db_path: cafewatch_store::default_db_path(),
            speech_command: std::env::var("CAFEWATCH_SPEECH_COMMAND")
                .unwrap_or_else(|_| "espeak".to_string()),
            roster_poll_secs: env_u64("CAFEWATCH_ROSTER_POLL_SECS", 5),
            roster_settle_ms: env_u64("CAFEWATCH_ROSTER_SETTLE_MS", 1000),
            sink_capacity: env_usize("CAFEWATCH_SINK_CAPACITY", 1024),
            drain_timeout_secs: env_u64("CAFEWATCH_DRAIN_TIMEOUT_SECS", 5),
            dbus_enabled: env_flag("CAFEWATCH_DBUS", true),
            dbus_system: env_flag("CAFEWATCH_DBUS_SYSTEM", false),
        }
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join(cafewatch_core::ARCFACE_MODEL_FILE)
    }

    pub fn roster_poll(&self) -> Duration {
        Duration::from_secs(self.roster_poll_secs.max(1))
    }

    pub fn roster_settle(&self) -> Duration {
        Duration::from_millis(self.roster_settle_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

fn env_path(key: &str, default: impl FnOnce() -> PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| default())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

use rollcall_core::TrackerConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite enrollment database.
    pub db_path: PathBuf,
    /// Euclidean distance threshold for accepting a match.
    pub match_threshold: f32,
    /// How long an unseen unknown face stays counted.
    pub unknown_ttl: Duration,
    /// Unknown-face correlation radius in pixels at 640×480.
    pub unknown_radius_px: f32,
    /// Session frame resolution; scales the correlation radius.
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("enrollments.db"));

        Self {
            db_path,
            match_threshold: env_f32(
                "ROLLCALL_MATCH_THRESHOLD",
                rollcall_core::DEFAULT_MATCH_THRESHOLD,
            ),
            unknown_ttl: Duration::from_millis(env_u64(
                "ROLLCALL_UNKNOWN_TTL_MS",
                rollcall_core::DEFAULT_TTL.as_millis() as u64,
            )),
            unknown_radius_px: env_f32(
                "ROLLCALL_UNKNOWN_RADIUS_PX",
                rollcall_core::DEFAULT_RADIUS_PX,
            ),
            frame_width: env_u32("ROLLCALL_FRAME_WIDTH", 640),
            frame_height: env_u32("ROLLCALL_FRAME_HEIGHT", 480),
        }
    }

    /// Tracker tuning with the radius scaled to the session resolution.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            radius_px: self.unknown_radius_px,
            ttl: self.unknown_ttl,
        }
        .scaled_to(self.frame_width, self.frame_height)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

//! Engine configuration loaded from the environment

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Shortest finite timer a question may be created with
    pub timer_min_secs: u32,
    /// Longest finite timer a question may be created with
    pub timer_max_secs: u32,
    /// Upper bound on options per question
    pub max_options: usize,
    /// Cadence of the expiry watcher and timer heartbeat
    pub watch_interval: Duration,
    /// Snapshot file backing the store (None = memory only)
    pub snapshot_path: Option<PathBuf>,
    pub bind_addr: SocketAddr,
    /// Directory with a prebuilt UI bundle, served as fallback
    pub static_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timer_min_secs: 5,
            timer_max_secs: 3600,
            max_options: 26,
            watch_interval: Duration::from_millis(1000),
            snapshot_path: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 6574)),
            static_dir: PathBuf::from("static"),
        }
    }
}

impl EngineConfig {
    /// Load config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timer_min_secs = parse_var("QUIZ_TIMER_MIN_SECS").unwrap_or(defaults.timer_min_secs);
        let timer_max_secs = parse_var("QUIZ_TIMER_MAX_SECS").unwrap_or(defaults.timer_max_secs);
        let max_options = parse_var::<usize>("QUIZ_MAX_OPTIONS")
            .map(|n| n.clamp(1, 26))
            .unwrap_or(defaults.max_options);
        let watch_interval = parse_var::<u64>("QUIZ_WATCH_INTERVAL_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.watch_interval);
        let snapshot_path = std::env::var("QUIZ_SNAPSHOT_PATH")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let bind_addr = parse_var("QUIZ_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let static_dir = std::env::var("QUIZ_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        let (timer_min_secs, timer_max_secs) = if timer_min_secs > timer_max_secs {
            tracing::warn!(
                timer_min_secs,
                timer_max_secs,
                "QUIZ_TIMER_MIN_SECS exceeds QUIZ_TIMER_MAX_SECS, using defaults"
            );
            (defaults.timer_min_secs, defaults.timer_max_secs)
        } else {
            (timer_min_secs, timer_max_secs)
        };

        if snapshot_path.is_none() {
            tracing::warn!("QUIZ_SNAPSHOT_PATH not set, votes will not survive a restart");
        }

        tracing::info!(
            timer_min_secs,
            timer_max_secs,
            max_options,
            watch_interval_ms = watch_interval.as_millis() as u64,
            %bind_addr,
            "Engine config loaded"
        );

        Self {
            timer_min_secs,
            timer_max_secs,
            max_options,
            watch_interval,
            snapshot_path,
            bind_addr,
            static_dir,
        }
    }
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Invalid {} value {:?}, using default", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "QUIZ_TIMER_MIN_SECS",
            "QUIZ_TIMER_MAX_SECS",
            "QUIZ_MAX_OPTIONS",
            "QUIZ_WATCH_INTERVAL_MS",
            "QUIZ_SNAPSHOT_PATH",
            "QUIZ_BIND_ADDR",
            "QUIZ_STATIC_DIR",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = EngineConfig::from_env();
        assert_eq!(config.timer_min_secs, 5);
        assert_eq!(config.timer_max_secs, 3600);
        assert_eq!(config.watch_interval, Duration::from_millis(1000));
        assert!(config.snapshot_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("QUIZ_TIMER_MIN_SECS", "10");
        std::env::set_var("QUIZ_WATCH_INTERVAL_MS", "250");
        std::env::set_var("QUIZ_SNAPSHOT_PATH", "/tmp/quiz.json");
        std::env::set_var("QUIZ_MAX_OPTIONS", "99");

        let config = EngineConfig::from_env();
        assert_eq!(config.timer_min_secs, 10);
        assert_eq!(config.watch_interval, Duration::from_millis(250));
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/tmp/quiz.json")));
        assert_eq!(config.max_options, 26);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back() {
        clear_env();
        std::env::set_var("QUIZ_TIMER_MIN_SECS", "soon");
        std::env::set_var("QUIZ_TIMER_MAX_SECS", "2");

        let config = EngineConfig::from_env();
        // min falls back to 5, which exceeds max=2, so both revert
        assert_eq!(config.timer_min_secs, 5);
        assert_eq!(config.timer_max_secs, 3600);
        clear_env();
    }
}

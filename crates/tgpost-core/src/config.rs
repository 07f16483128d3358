use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{album::clamp_radius, errors::Error, retry::RetryPolicy, Result};

/// Typed runtime configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram API credentials
    pub api_id: i32,
    pub api_hash: String,
    pub session_path: PathBuf,

    // Cache
    pub cache_dir: PathBuf,

    // Album reconstruction
    pub album_search_radius: i64,
    pub album_lookup_radius: i64,

    // Retry
    pub entity_retry_attempts: u32,
    pub entity_retry_delay: Duration,
    pub message_retry_attempts: u32,
    pub message_retry_delay: Duration,

    // Runtime
    pub request_timeout: Duration,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let api_id = env_str("API_ID")
            .and_then(non_empty)
            .ok_or_else(|| Error::Config("API_ID environment variable is required".to_string()))?;
        let api_id = api_id
            .trim()
            .parse::<i32>()
            .map_err(|_| Error::Config(format!("API_ID must be an integer, got {api_id:?}")))?;

        let api_hash = env_str("API_HASH").and_then(non_empty).ok_or_else(|| {
            Error::Config("API_HASH environment variable is required".to_string())
        })?;

        let session_path =
            env_path("SESSION_PATH").unwrap_or_else(|| PathBuf::from("tele_session.session"));
        let cache_dir = env_path("CACHE_DIR").unwrap_or_else(|| PathBuf::from("media_cache"));

        let album_search_radius = clamp_radius(env_i64("ALBUM_SEARCH_RADIUS").unwrap_or(200));
        let album_lookup_radius = clamp_radius(env_i64("ALBUM_LOOKUP_RADIUS").unwrap_or(50));

        let entity_retry_attempts = env_u32("ENTITY_RETRY_ATTEMPTS").unwrap_or(3).max(1);
        let entity_retry_delay =
            Duration::from_millis(env_u64("ENTITY_RETRY_DELAY_MS").unwrap_or(1000));
        let message_retry_attempts = env_u32("MESSAGE_RETRY_ATTEMPTS").unwrap_or(3).max(1);
        let message_retry_delay =
            Duration::from_millis(env_u64("MESSAGE_RETRY_DELAY_MS").unwrap_or(500));

        let request_timeout = Duration::from_secs(env_u64("REQUEST_TIMEOUT_SECS").unwrap_or(30));
        let log_file = env_path("LOG_FILE");

        Ok(Self {
            api_id,
            api_hash,
            session_path,
            cache_dir,
            album_search_radius,
            album_lookup_radius,
            entity_retry_attempts,
            entity_retry_delay,
            message_retry_attempts,
            message_retry_delay,
            request_timeout,
            log_file,
        })
    }

    pub fn entity_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.entity_retry_attempts, self.entity_retry_delay)
    }

    pub fn message_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.message_retry_attempts, self.message_retry_delay)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }
        out.push((key.to_string(), val));
    }
    out
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_str(key).and_then(non_empty).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

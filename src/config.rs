use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "data/FPL_DB.db";
pub const DEFAULT_API_BASE: &str = "https://fantasy.premierleague.com/api";
pub const DEFAULT_WORKERS: usize = 8;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_WORKERS: usize = 32;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub db_path: PathBuf,
    pub api_base: String,
    /// Size of the worker pool used for per-player history fetches.
    pub workers: usize,
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            api_base: DEFAULT_API_BASE.to_string(),
            workers: DEFAULT_WORKERS,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl SyncConfig {
    /// Flags win over environment, environment over defaults.
    /// `.env.local` and `.env` are loaded first so they feed the environment layer.
    pub fn load(args: &[String]) -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        let mut config = Self::from_env();
        config.apply_args(args);
        config
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = non_empty_env("FPL_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(base) = non_empty_env("FPL_API_BASE") {
            config.api_base = base;
        }
        if let Some(workers) = non_empty_env("FETCH_PARALLELISM").and_then(|v| v.parse().ok()) {
            config.workers = clamp_workers(workers);
        }
        if let Some(secs) =
            non_empty_env("FPL_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }
        config
    }

    pub fn apply_args(&mut self, args: &[String]) {
        if let Some(path) = flag_value(args, "--db") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(base) = flag_value(args, "--api-base") {
            self.api_base = base;
        }
        if let Some(workers) = flag_value(args, "--workers").and_then(|v| v.parse().ok()) {
            self.workers = clamp_workers(workers);
        }
    }

    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }
}

fn clamp_workers(workers: usize) -> usize {
    workers.clamp(1, MAX_WORKERS)
}

fn non_empty_env(key: &str) -> Option<String> {
    let raw = env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Accepts both `--name value` and `--name=value`.
fn flag_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

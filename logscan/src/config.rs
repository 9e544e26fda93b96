//! Application configuration.
//!
//! Plain configuration records with defaults matching the documented
//! contract, loaded once at startup and passed by value. Environment
//! variables override individual keys; the CLI (see `server::config`)
//! overrides the listen port and temp directory on top.

use std::time::Duration;

/// Upload and temp-file limits.
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Maximum accepted upload size in bytes (`APP_FILE_MAX_SIZE`).
    pub max_size: u64,
    /// Accepted upload extensions, lower-cased (`APP_FILE_ALLOWED_TYPES`,
    /// comma separated).
    pub allowed_types: Vec<String>,
    /// Directory uploads are spooled into before ingestion.
    pub temp_dir: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            max_size: 52_428_800,
            allowed_types: vec!["log".to_string(), "txt".to_string()],
            temp_dir: None,
        }
    }
}

impl FileConfig {
    pub fn is_allowed_extension(&self, file_name: &str) -> bool {
        let extension = file_name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        !extension.is_empty() && self.allowed_types.iter().any(|t| *t == extension)
    }
}

/// Worker pool bounds for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Concurrent ingestion workers
    /// (`APP_PROCESSING_THREAD_POOL_CORE_SIZE`).
    pub core_size: usize,
    /// Submission queue depth; submits beyond it are rejected
    /// (`APP_PROCESSING_THREAD_POOL_MAX_SIZE`).
    pub max_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_size: 4,
            max_size: 10,
        }
    }
}

/// Ingestion pipeline tuning.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    /// Entries per bulk write (`APP_PROCESSING_BATCH_SIZE`).
    pub batch_size: usize,
    /// Read buffer size in bytes (`APP_PROCESSING_BUFFER_SIZE`).
    pub buffer_size: usize,
    /// Lines exceeding this many characters are truncated.
    pub max_line_length: usize,
    /// Progress is reported every this many lines.
    pub progress_interval: u64,
    pub pool: PoolConfig,
    /// Retention window for stored entries, for operator-driven cleanup
    /// (`APP_PROCESSING_RETENTION_DAYS`).
    pub retention_days: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            buffer_size: 8192,
            max_line_length: 100_000,
            progress_interval: 1000,
            pool: PoolConfig::default(),
            retention_days: 30,
        }
    }
}

/// Store client behavior.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
    /// Terminal job statuses are reclaimed after this long.
    pub status_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            socket_timeout: Duration::from_secs(30),
            status_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub file: FileConfig,
    pub processing: ProcessingConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Loads defaults and applies environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(max_size) = env_parse::<u64>("APP_FILE_MAX_SIZE") {
            config.file.max_size = max_size;
        }
        if let Ok(types) = std::env::var("APP_FILE_ALLOWED_TYPES") {
            let parsed: Vec<String> = types
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.file.allowed_types = parsed;
            }
        }
        if let Some(batch_size) = env_parse::<usize>("APP_PROCESSING_BATCH_SIZE") {
            config.processing.batch_size = batch_size.max(1);
        }
        if let Some(buffer_size) = env_parse::<usize>("APP_PROCESSING_BUFFER_SIZE") {
            config.processing.buffer_size = buffer_size.max(1024);
        }
        if let Some(core) = env_parse::<usize>("APP_PROCESSING_THREAD_POOL_CORE_SIZE") {
            config.processing.pool.core_size = core.max(1);
        }
        if let Some(max) = env_parse::<usize>("APP_PROCESSING_THREAD_POOL_MAX_SIZE") {
            config.processing.pool.max_size = max.max(config.processing.pool.core_size);
        }
        if let Some(days) = env_parse::<u32>("APP_PROCESSING_RETENTION_DAYS") {
            config.processing.retention_days = days;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}

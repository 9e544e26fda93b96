//! CLI configuration for the server binary.

use clap::Parser;

use crate::config::AppConfig;

/// CLI arguments for the log service.
#[derive(Debug, Parser)]
#[command(name = "logscan")]
#[command(about = "Log file ingestion and search service")]
pub struct CliArgs {
    /// HTTP server port.
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Directory uploads are spooled into.
    #[arg(long)]
    pub temp_dir: Option<String>,

    /// Ingestion worker count override.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Entries per bulk write override.
    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl CliArgs {
    /// Environment-derived configuration with CLI overrides applied.
    pub fn to_app_config(&self) -> AppConfig {
        let mut config = AppConfig::from_env();
        if let Some(temp_dir) = &self.temp_dir {
            config.file.temp_dir = Some(temp_dir.clone());
        }
        if let Some(workers) = self.workers {
            config.processing.pool.core_size = workers.max(1);
            config.processing.pool.max_size =
                config.processing.pool.max_size.max(workers);
        }
        if let Some(batch_size) = self.batch_size {
            config.processing.batch_size = batch_size.max(1);
        }
        config
    }
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl From<&CliArgs> for ServerConfig {
    fn from(args: &CliArgs) -> Self {
        Self { port: args.port }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CliArgs {
        CliArgs {
            port: 9090,
            temp_dir: Some("/tmp/logscan-test".to_string()),
            workers: Some(8),
            batch_size: Some(250),
        }
    }

    #[test]
    fn should_apply_cli_overrides() {
        let config = args().to_app_config();

        assert_eq!(config.file.temp_dir.as_deref(), Some("/tmp/logscan-test"));
        assert_eq!(config.processing.pool.core_size, 8);
        assert!(config.processing.pool.max_size >= 8);
        assert_eq!(config.processing.batch_size, 250);
    }

    #[test]
    fn should_derive_server_config_from_cli() {
        let server = ServerConfig::from(&args());
        assert_eq!(server.port, 9090);
    }
}

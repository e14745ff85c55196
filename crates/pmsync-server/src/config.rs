//! Configuration management
//!
//! Server and database settings come from plain environment variables (with
//! `.env` support). The topic list, consumer defaults, and retry policy are
//! layered with figment: built-in defaults, then the TOML topics file, then
//! `PMSYNC_CONSUMERS_`-prefixed environment variables (`__` separates nested
//! keys, e.g. `PMSYNC_CONSUMERS_RETRY__MAX_ATTEMPTS=5`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use pmsync_common::PmSyncError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::ingest::retry::RetryPolicy;

// ============================================================================
// Defaults
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/pm_file_sync";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default location of the topics file.
pub const DEFAULT_TOPICS_FILE: &str = "config/topics.toml";

/// Default grace period for in-flight messages when a unit stops.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 5;

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub consumers: ConsumersConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Everything the consumer orchestrator needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumersConfig {
    pub topics: Vec<TopicSpec>,
    pub global_consumer: GlobalConsumerConfig,
    pub security: Option<SecurityConfig>,
    pub retry: RetrySettings,
    /// Seconds to wait for in-flight handlers when stopping a unit
    pub stop_grace_secs: Option<u64>,
}

/// One configured topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSpec {
    pub name: String,
    /// Comma-separated `host:port` bootstrap list
    pub broker: String,
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    pub consumer: TopicConsumerConfig,
    #[serde(default)]
    pub description: Option<String>,
}

/// Per-topic consumer settings; absent values fall back to `global_consumer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicConsumerConfig {
    pub group_id: String,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub auto_offset_reset: Option<OffsetReset>,
}

/// Where a new consumer group starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    Earliest,
    #[default]
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// Defaults shared by every consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConsumerConfig {
    pub threads: usize,
    pub auto_offset_reset: OffsetReset,
    pub session_timeout_ms: u32,
    pub fetch_wait_max_ms: u32,
    pub auto_commit_interval_ms: u32,
}

impl Default for GlobalConsumerConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            auto_offset_reset: OffsetReset::Latest,
            session_timeout_ms: 30_000,
            fetch_wait_max_ms: 500,
            auto_commit_interval_ms: 5_000,
        }
    }
}

/// Broker security settings applied to every consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// `PLAINTEXT`, `SSL`, `SASL_PLAINTEXT` or `SASL_SSL`
    pub protocol: String,
    #[serde(default)]
    pub sasl: Option<SaslConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaslConfig {
    pub mechanism: String,
    pub username: String,
    pub password: String,
}

/// Retry policy for message processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.multiplier,
        )
    }
}

fn default_partitions() -> u32 {
    1
}

impl TopicSpec {
    /// Worker count for this topic
    pub fn threads(&self) -> usize {
        self.consumer.threads.unwrap_or(1)
    }

    pub fn auto_offset_reset(&self) -> OffsetReset {
        self.consumer.auto_offset_reset.unwrap_or_default()
    }

    fn apply_defaults(&mut self, global: &GlobalConsumerConfig) {
        self.consumer.threads.get_or_insert(global.threads);
        self.consumer
            .auto_offset_reset
            .get_or_insert(global.auto_offset_reset);
    }
}

impl ConsumersConfig {
    /// Load from a TOML file layered with `PMSYNC_CONSUMERS_` environment overrides
    pub fn load(path: impl AsRef<Path>) -> pmsync_common::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PmSyncError::config(format!(
                "Topics file not found: {}",
                path.display()
            )));
        }

        let mut config: ConsumersConfig = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("PMSYNC_CONSUMERS_").split("__"))
            .extract()
            .map_err(|e| PmSyncError::config(e.to_string()))?;

        let global = config.global_consumer.clone();
        for topic in &mut config.topics {
            topic.apply_defaults(&global);
        }

        Ok(config)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs.unwrap_or(DEFAULT_STOP_GRACE_SECS))
    }

    /// Validate topic and retry settings
    pub fn validate(&self) -> pmsync_common::Result<()> {
        let mut seen = HashSet::new();
        for topic in &self.topics {
            if topic.name.trim().is_empty() {
                return Err(PmSyncError::config("Topic name cannot be empty"));
            }
            if !seen.insert(topic.name.as_str()) {
                return Err(PmSyncError::config(format!(
                    "Topic '{}' is configured more than once",
                    topic.name
                )));
            }
            if topic.consumer.group_id.trim().is_empty() {
                return Err(PmSyncError::config(format!(
                    "Topic '{}' has an empty consumer group id",
                    topic.name
                )));
            }
            if topic.threads() == 0 {
                return Err(PmSyncError::config(format!(
                    "Topic '{}' must have at least one consumer thread",
                    topic.name
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(PmSyncError::config("retry.max_attempts must be at least 1"));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(PmSyncError::config(
                "retry.multiplier must be a finite number >= 1.0",
            ));
        }

        let backoff = self.retry.policy().max_total_backoff();
        if self.stop_grace() < backoff {
            tracing::warn!(
                stop_grace = ?self.stop_grace(),
                max_backoff = ?backoff,
                "Stop grace is shorter than the retry backoff window; \
                 messages still retrying at shutdown will be abandoned"
            );
        }

        if self.topics.is_empty() {
            tracing::warn!("No topics configured - no consumers will be started");
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from environment and the topics file
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let topics_file =
            std::env::var("PMSYNC_TOPICS_FILE").unwrap_or_else(|_| DEFAULT_TOPICS_FILE.to_string());

        let config = Config {
            server: ServerConfig {
                host: std::env::var("PMSYNC_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("PMSYNC_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "PMSYNC_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            consumers: ConsumersConfig::load(&topics_file)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        self.consumers.validate()?;

        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_topics(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn topic(name: &str) -> TopicSpec {
        TopicSpec {
            name: name.to_string(),
            broker: "localhost:9092".to_string(),
            partitions: 1,
            consumer: TopicConsumerConfig {
                group_id: "group".to_string(),
                threads: Some(1),
                auto_offset_reset: None,
            },
            description: None,
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_load_applies_global_defaults() {
        let file = write_topics(
            r#"
            [global_consumer]
            threads = 4
            auto_offset_reset = "earliest"

            [[topics]]
            name = "du-events"
            broker = "kafka-1:9092,kafka-2:9092"
            partitions = 6
            [topics.consumer]
            group_id = "du-group"

            [[topics]]
            name = "cu-events"
            broker = "kafka-1:9092"
            [topics.consumer]
            group_id = "cu-group"
            threads = 2
            auto_offset_reset = "latest"
            "#,
        );

        let config = ConsumersConfig::load(file.path()).unwrap();
        assert_eq!(config.topics.len(), 2);

        let du = &config.topics[0];
        assert_eq!(du.threads(), 4);
        assert_eq!(du.auto_offset_reset(), OffsetReset::Earliest);
        assert_eq!(du.partitions, 6);

        let cu = &config.topics[1];
        assert_eq!(cu.threads(), 2);
        assert_eq!(cu.auto_offset_reset(), OffsetReset::Latest);
        assert_eq!(cu.partitions, 1);

        assert_eq!(config.retry, RetrySettings::default());
        assert_eq!(config.stop_grace(), Duration::from_secs(DEFAULT_STOP_GRACE_SECS));
    }

    #[test]
    #[serial_test::serial]
    fn test_env_overrides_file() {
        let file = write_topics(
            r#"
            [retry]
            max_attempts = 3

            [[topics]]
            name = "du-events"
            broker = "localhost:9092"
            [topics.consumer]
            group_id = "du-group"
            "#,
        );

        std::env::set_var("PMSYNC_CONSUMERS_RETRY__MAX_ATTEMPTS", "5");
        std::env::set_var("PMSYNC_CONSUMERS_STOP_GRACE_SECS", "12");
        let config = ConsumersConfig::load(file.path());
        std::env::remove_var("PMSYNC_CONSUMERS_RETRY__MAX_ATTEMPTS");
        std::env::remove_var("PMSYNC_CONSUMERS_STOP_GRACE_SECS");

        let config = config.unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.stop_grace(), Duration::from_secs(12));
        assert_eq!(config.topics[0].threads(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConsumersConfig::load("/definitely/not/here/topics.toml");
        assert!(matches!(result, Err(PmSyncError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_topics() {
        let config = ConsumersConfig {
            topics: vec![topic("events"), topic("events")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let mut bad = topic("events");
        bad.consumer.threads = Some(0);
        let config = ConsumersConfig {
            topics: vec![bad],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_retry() {
        let config = ConsumersConfig {
            topics: vec![topic("events")],
            retry: RetrySettings {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_multiplier() {
        for multiplier in [f64::INFINITY, f64::NAN, 0.5] {
            let config = ConsumersConfig {
                topics: vec![topic("events")],
                retry: RetrySettings {
                    max_attempts: 3,
                    initial_delay_ms: 1000,
                    multiplier,
                },
                ..Default::default()
            };
            let result = config.validate();
            assert!(
                matches!(result, Err(PmSyncError::Config(_))),
                "multiplier {multiplier} should be rejected"
            );
        }
    }

    #[test]
    fn test_short_stop_grace_is_allowed() {
        let config = ConsumersConfig {
            topics: vec![topic("events")],
            stop_grace_secs: Some(1),
            ..Default::default()
        };
        assert!(config.stop_grace() < config.retry.policy().max_total_backoff());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_settings_policy() {
        let policy = RetrySettings::default().policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(2000));
    }
}

//! Control-plane configuration management, following a
//! default-then-file-then-env layering for `AppConfig::load()`.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the bootstrap binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub saga: SagaConfig,
    pub logging: LoggingConfig,
}

/// Bind address for whichever transport layer wraps this core (not
/// wired up here — HTTP routing is out of scope).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Circuit-breaker and scheduling-behavior knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_seconds: i64,
    pub prefer_cost_optimization: bool,
    /// Path to a policy document overriding the compiled-in tiers and
    /// candidate pool. `None` uses the compiled-in defaults.
    pub policy_source_path: Option<String>,
}

/// Saga-executor behavior knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SagaConfig {
    pub sagas_enabled: bool,
    pub credential_validation_enabled: bool,
}

/// Logging configuration, consumed by [`atlas_core::logging::init_logging`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            scheduler: SchedulerConfig {
                breaker_failure_threshold: 5,
                breaker_cooldown_seconds: 60,
                prefer_cost_optimization: false,
                policy_source_path: None,
            },
            saga: SagaConfig {
                sagas_enabled: true,
                credential_validation_enabled: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// environment variable overrides — the same layering order as the
    /// teacher's `AppConfig::load()`.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(config_file) = std::env::var("ATLAS_CONFIG_FILE") {
            config.load_from_file(&config_file)?;
        } else {
            for path in &["./config/default.toml", "./atlas-config.toml", "/etc/atlas/config.toml"] {
                if std::path::Path::new(path).exists() {
                    config.load_from_file(path)?;
                    break;
                }
            }
        }

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env(&mut self) {
        if let Ok(host) = std::env::var("ATLAS_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ATLAS_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(threshold) = std::env::var("ATLAS_BREAKER_FAILURE_THRESHOLD") {
            if let Ok(threshold) = threshold.parse() {
                self.scheduler.breaker_failure_threshold = threshold;
            }
        }
        if let Ok(cooldown) = std::env::var("ATLAS_BREAKER_COOLDOWN_SECONDS") {
            if let Ok(cooldown) = cooldown.parse() {
                self.scheduler.breaker_cooldown_seconds = cooldown;
            }
        }
        if let Ok(flag) = std::env::var("ATLAS_PREFER_COST_OPTIMIZATION") {
            self.scheduler.prefer_cost_optimization = flag == "true" || flag == "1";
        }
        if let Ok(path) = std::env::var("ATLAS_POLICY_SOURCE_PATH") {
            self.scheduler.policy_source_path = Some(path);
        }
        if let Ok(flag) = std::env::var("ATLAS_SAGAS_ENABLED") {
            self.saga.sagas_enabled = flag == "true" || flag == "1";
        }
        if let Ok(flag) = std::env::var("ATLAS_CREDENTIAL_VALIDATION_ENABLED") {
            self.saga.credential_validation_enabled = flag == "true" || flag == "1";
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn load_from_file(&mut self, path: &str) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(path)?;
        let file_config: AppConfig = toml::from_str(&content)?;
        *self = file_config;
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server port must be greater than 0");
        }
        if self.scheduler.breaker_failure_threshold == 0 {
            anyhow::bail!("breaker failure threshold must be greater than 0");
        }
        if self.scheduler.breaker_cooldown_seconds <= 0 {
            anyhow::bail!("breaker cooldown must be a positive number of seconds");
        }
        Ok(())
    }
}

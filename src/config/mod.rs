use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

use crate::draw::MAX_COUNTDOWN_TICKS;
use crate::source::FetchRange;
use crate::source::simulator::MAX_BATCH_SIZE;

#[derive(Debug, Clone, Deserialize)]
pub struct RaffleConfig {
    pub server: ServerConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub draw: DrawConfig,
}

impl RaffleConfig {
    pub fn load() -> Result<Self> {
        let configured_path = std::env::var("RAFFLE_API_CONFIG")
            .unwrap_or_else(|_| "config/raffle.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("RAFFLE_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/raffle.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> Result<Self> {
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize raffle configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than zero"));
        }
        self.source.ensure_bounds()?;
        self.ingest.ensure_bounds()?;
        self.draw.ensure_bounds()?;
        if self.ingest.enabled && self.source.kind == SourceKind::Livepix {
            self.ingest
                .fetch_range()
                .context("Invalid ingest date range")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Livepix,
    Simulator,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    #[serde(default)]
    pub base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
    #[serde(default = "SourceConfig::default_max_records")]
    pub max_records: usize,
    #[serde(default = "SourceConfig::default_simulator_batch_size")]
    pub simulator_batch_size: usize,
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(10_000);
        assert!(millis >= 100, "Source timeout must be at least 100ms");
        assert!(millis <= 60_000, "Source timeout cannot exceed 60 seconds");
        Duration::from_millis(millis)
    }

    pub fn base_url(&self) -> Result<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("source.base_url is required for the livepix source"))
    }

    fn ensure_bounds(&self) -> Result<()> {
        if let Some(millis) = self.request_timeout_ms {
            if !(100..=60_000).contains(&millis) {
                return Err(anyhow!(
                    "source.request_timeout_ms must be between 100 and 60000"
                ));
            }
        }
        if self.max_records == 0 || self.max_records > 100_000 {
            return Err(anyhow!("source.max_records must be between 1 and 100000"));
        }
        if self.simulator_batch_size == 0 || self.simulator_batch_size > MAX_BATCH_SIZE {
            return Err(anyhow!(
                "source.simulator_batch_size must be between 1 and {MAX_BATCH_SIZE}"
            ));
        }
        if self.kind == SourceKind::Livepix {
            self.base_url()?;
        }
        Ok(())
    }

    const fn default_max_records() -> usize {
        2_000
    }

    const fn default_simulator_batch_size() -> usize {
        5
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "IngestConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_ms: Self::default_poll_interval_ms(),
            start_date: None,
            end_date: None,
        }
    }
}

impl IngestConfig {
    pub fn poll_interval(&self) -> Duration {
        assert!(
            self.poll_interval_ms >= 1_000,
            "Poll interval must be >= 1 second"
        );
        assert!(
            self.poll_interval_ms <= 3_600_000,
            "Poll interval must be <= 1 hour"
        );
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_range(&self) -> Result<FetchRange> {
        FetchRange::parse(self.start_date.as_deref(), self.end_date.as_deref())
            .map_err(|err| anyhow!(err))
    }

    fn ensure_bounds(&self) -> Result<()> {
        if !(1_000..=3_600_000).contains(&self.poll_interval_ms) {
            return Err(anyhow!(
                "ingest.poll_interval_ms must be between 1000 and 3600000"
            ));
        }
        self.fetch_range()?;
        Ok(())
    }

    const fn default_poll_interval_ms() -> u64 {
        30_000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrawConfig {
    #[serde(default = "DrawConfig::default_countdown_ticks")]
    pub countdown_ticks: u32,
    #[serde(default = "DrawConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "DrawConfig::default_simulator_enabled")]
    pub simulator_enabled: bool,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            countdown_ticks: Self::default_countdown_ticks(),
            tick_interval_ms: Self::default_tick_interval_ms(),
            seed: None,
            simulator_enabled: Self::default_simulator_enabled(),
        }
    }
}

impl DrawConfig {
    pub fn tick_interval(&self) -> Duration {
        assert!(self.tick_interval_ms >= 10, "Tick interval must be >= 10ms");
        assert!(
            self.tick_interval_ms <= 10_000,
            "Tick interval must be <= 10 seconds"
        );
        Duration::from_millis(self.tick_interval_ms)
    }

    fn ensure_bounds(&self) -> Result<()> {
        if self.countdown_ticks == 0 || self.countdown_ticks > MAX_COUNTDOWN_TICKS {
            return Err(anyhow!(
                "draw.countdown_ticks must be between 1 and {MAX_COUNTDOWN_TICKS}"
            ));
        }
        if !(10..=10_000).contains(&self.tick_interval_ms) {
            return Err(anyhow!("draw.tick_interval_ms must be between 10 and 10000"));
        }
        Ok(())
    }

    const fn default_countdown_ticks() -> u32 {
        3
    }

    const fn default_tick_interval_ms() -> u64 {
        1_000
    }

    const fn default_simulator_enabled() -> bool {
        true
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<RaffleConfig> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        RaffleConfig::from_settings(settings)
    }

    #[test]
    fn applies_defaults() {
        let config = parse(
            r#"
            [server]
            port = 8080

            [source]
            kind = "simulator"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.address().to_string(), "127.0.0.1:8080");
        assert_eq!(config.source.max_records, 2_000);
        assert_eq!(config.source.request_timeout(), Duration::from_secs(10));
        assert!(!config.ingest.enabled);
        assert_eq!(config.draw.countdown_ticks, 3);
        assert_eq!(config.draw.tick_interval(), Duration::from_secs(1));
        assert!(config.draw.simulator_enabled);
        assert!(config.draw.seed.is_none());
    }

    #[test]
    fn livepix_requires_base_url() {
        let err = parse(
            r#"
            [server]
            port = 8080

            [source]
            kind = "livepix"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn rejects_out_of_bounds_values() {
        let zero_ticks = parse(
            r#"
            [server]
            port = 8080

            [source]
            kind = "simulator"

            [draw]
            countdown_ticks = 0
            "#,
        );
        assert!(zero_ticks.is_err());

        let inverted = parse(
            r#"
            [server]
            port = 8080

            [source]
            kind = "livepix"
            base_url = "https://proxy.example/api/livepix"

            [ingest]
            enabled = true
            start_date = "2024-06-01"
            end_date = "2024-05-01"
            "#,
        );
        assert!(inverted.is_err());
    }

    #[test]
    fn reads_full_configuration() {
        let config = parse(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [source]
            kind = "livepix"
            base_url = "https://proxy.example/api/livepix"
            request_timeout_ms = 5000
            max_records = 500

            [ingest]
            enabled = true
            poll_interval_ms = 60000
            start_date = "2024-05-01"

            [draw]
            countdown_ticks = 5
            tick_interval_ms = 250
            seed = 42
            simulator_enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.server.address().to_string(), "0.0.0.0:9000");
        assert_eq!(config.source.kind, SourceKind::Livepix);
        assert_eq!(
            config.source.base_url().unwrap(),
            "https://proxy.example/api/livepix"
        );
        assert_eq!(config.ingest.poll_interval(), Duration::from_secs(60));
        assert!(config.ingest.fetch_range().unwrap().start.is_some());
        assert_eq!(config.draw.seed, Some(42));
        assert!(!config.draw.simulator_enabled);
    }
}

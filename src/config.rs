use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

/// The trading parameters supplied at startup.
/// Immutable per run.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub starting_balance: Decimal,
    #[serde(default = "default_min_edge_to_enter")]
    pub min_edge_to_enter: Decimal,
    #[serde(default = "default_max_edge_to_exit")]
    pub max_edge_to_exit: Decimal,
    #[serde(default = "default_base_position_size")]
    pub base_position_size: Decimal,
    #[serde(default = "default_edge_multiplier")]
    pub edge_multiplier: Decimal,
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,
    #[serde(default = "default_max_total_exposure")]
    pub max_total_exposure: Decimal,
    /// Tick period in seconds; minimum recommended 60s.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_positions_per_market")]
    pub max_positions_per_market: u32,
    /// Minimum days-to-expiry to enter a new position.
    #[serde(default = "default_min_time_to_expiry_days")]
    pub min_time_to_expiry_days: i64,
    pub dry_run: bool,
}

fn default_min_edge_to_enter() -> Decimal {
    dec!(0.05)
}
fn default_max_edge_to_exit() -> Decimal {
    dec!(0.05)
}
fn default_base_position_size() -> Decimal {
    dec!(25)
}
fn default_edge_multiplier() -> Decimal {
    dec!(500)
}
fn default_max_position_size() -> Decimal {
    dec!(100)
}
fn default_max_total_exposure() -> Decimal {
    dec!(1000)
}
fn default_poll_interval_secs() -> u64 {
    60
}
fn default_max_positions_per_market() -> u32 {
    1
}
fn default_min_time_to_expiry_days() -> i64 {
    1
}

impl BotConfig {
    /// Cross-field validation. Returns every violation rather than failing
    /// on the first.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.starting_balance <= Decimal::ZERO {
            errors.push("starting_balance must be positive".to_string());
        }
        if self.min_edge_to_enter <= Decimal::ZERO {
            errors.push("min_edge_to_enter must be positive".to_string());
        }
        if self.max_edge_to_exit <= Decimal::ZERO {
            errors.push("max_edge_to_exit must be positive".to_string());
        }
        if self.max_position_size <= Decimal::ZERO {
            errors.push("max_position_size must be positive".to_string());
        }
        if self.base_position_size > self.max_position_size {
            errors.push("base_position_size must not exceed max_position_size".to_string());
        }
        if self.max_total_exposure < self.max_position_size {
            errors.push("max_total_exposure must be at least max_position_size".to_string());
        }
        if self.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be positive".to_string());
        }
        if self.max_positions_per_market != 1 {
            errors.push("max_positions_per_market must be 1 in this core".to_string());
        }
        if self.min_time_to_expiry_days < 0 {
            errors.push("min_time_to_expiry_days must not be negative".to_string());
        }
        errors
    }
}

/// Ambient process-level settings the distilled `BotConfig` omits
///: paths, upstream URLs, log settings, credential
/// source.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub bot: BotConfig,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_gamma_base_url")]
    pub gamma_base_url: String,
    #[serde(default = "default_clob_base_url")]
    pub clob_base_url: String,
    #[serde(default = "default_options_base_url")]
    pub options_base_url: String,
    #[serde(default = "default_oracle_base_url")]
    pub oracle_base_url: String,
}

fn default_gamma_base_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}
fn default_clob_base_url() -> String {
    "https://clob.polymarket.com".to_string()
}
fn default_options_base_url() -> String {
    "https://www.deribit.com/api/v2/public".to_string()
}
fn default_oracle_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            gamma_base_url: default_gamma_base_url(),
            clob_base_url: default_clob_base_url(),
            options_base_url: default_options_base_url(),
            oracle_base_url: default_oracle_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl RuntimeConfig {
    /// Load from `{dir}/default.toml` plus an optional `{dir}/{env}.toml`
    /// overlay, then environment overrides with prefix `CRYPTOEDGE` and
    /// `__` as the nested-key separator.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P, env_name: &str) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let mut builder = Config::builder()
            .add_source(File::from(dir.join("default.toml")).required(false));

        let env_file = dir.join(format!("{env_name}.toml"));
        if env_file.exists() {
            builder = builder.add_source(File::from(env_file).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("CRYPTOEDGE")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }

    /// Load a single explicit TOML file, still layered with env overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()).required(true))
            .add_source(
                Environment::with_prefix("CRYPTOEDGE")
                    .prefix_separator("_")
                    .separator("__"),
            );
        builder.build()?.try_deserialize()
    }

    /// Hardcoded defaults for smoke-testing without a config file.
    pub fn default_config(dry_run: bool) -> Self {
        Self {
            bot: BotConfig {
                starting_balance: dec!(1000),
                min_edge_to_enter: default_min_edge_to_enter(),
                max_edge_to_exit: default_max_edge_to_exit(),
                base_position_size: default_base_position_size(),
                edge_multiplier: default_edge_multiplier(),
                max_position_size: default_max_position_size(),
                max_total_exposure: default_max_total_exposure(),
                poll_interval_secs: default_poll_interval_secs(),
                max_positions_per_market: default_max_positions_per_market(),
                min_time_to_expiry_days: default_min_time_to_expiry_days(),
                dry_run,
            },
            data_dir: None,
            endpoints: EndpointsConfig::default(),
            logging: LoggingConfig::default(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }

    pub fn data_dir(&self) -> String {
        self.data_dir.clone().unwrap_or_else(|| "./data".to_string())
    }
}

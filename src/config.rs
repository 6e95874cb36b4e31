use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::devices::sds::{Sds, Timing, DEFAULT_CHANNEL_COUNT, DEFAULT_TIMEOUT_MS};

pub const DEFAULT_CONFIG_FILE:&str = "scopelink.toml";
pub const ENV_PREFIX:&str = "SCOPELINK";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
	pub scope: ScopeConfig,
	pub timing: TimingConfig,
	pub logging: LoggingConfig,
	pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScopeConfig {
	pub address: String,
	pub timeout_ms: u64,
	pub channel_count: u8,
}

// Settle and transfer times, all in milliseconds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TimingConfig {
	pub auto_setup_settle_ms: u64,
	pub reset_settle_ms: u64,
	pub screen_settle_ms: u64,
	pub screen_timeout_ms: u64,
	pub waveform_setup_settle_ms: u64,
	pub waveform_transfer_settle_ms: u64,
	pub waveform_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
	pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
	Claude,
	#[serde(alias = "hf")]
	HuggingFace,
}

// Only the choice of language-model backend is carried; the backends live elsewhere
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AgentConfig {
	pub backend: Backend,
	pub model: Option<String>,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			scope: ScopeConfig::default(),
			timing: TimingConfig::default(),
			logging: LoggingConfig::default(),
			agent: AgentConfig::default(),
		}
	}
}

impl Default for ScopeConfig {
	fn default() -> Self {
		Self {
			address: "TCPIP0::192.168.1.100::inst0::INSTR".to_owned(),
			timeout_ms: DEFAULT_TIMEOUT_MS,
			channel_count: DEFAULT_CHANNEL_COUNT,
		}
	}
}

fn ms(d:Duration) -> u64 { d.as_millis() as u64 }

impl Default for TimingConfig {
	fn default() -> Self { Self::from(&Timing::default()) }
}

impl From<&Timing> for TimingConfig {
	fn from(t:&Timing) -> Self {
		Self {
			auto_setup_settle_ms:        ms(t.auto_setup_settle),
			reset_settle_ms:             ms(t.reset_settle),
			screen_settle_ms:            ms(t.screen_settle),
			screen_timeout_ms:           ms(t.screen_timeout),
			waveform_setup_settle_ms:    ms(t.waveform_setup_settle),
			waveform_transfer_settle_ms: ms(t.waveform_transfer_settle),
			waveform_timeout_ms:         ms(t.waveform_timeout),
		}
	}
}

impl From<&TimingConfig> for Timing {
	fn from(c:&TimingConfig) -> Self {
		Self {
			auto_setup_settle:        Duration::from_millis(c.auto_setup_settle_ms),
			reset_settle:             Duration::from_millis(c.reset_settle_ms),
			screen_settle:            Duration::from_millis(c.screen_settle_ms),
			screen_timeout:           Duration::from_millis(c.screen_timeout_ms),
			waveform_setup_settle:    Duration::from_millis(c.waveform_setup_settle_ms),
			waveform_transfer_settle: Duration::from_millis(c.waveform_transfer_settle_ms),
			waveform_timeout:         Duration::from_millis(c.waveform_timeout_ms),
		}
	}
}

impl Default for LoggingConfig {
	fn default() -> Self { Self{ log_level: "info".to_owned() } }
}

impl Default for AgentConfig {
	fn default() -> Self { Self{ backend: Backend::Claude, model: None } }
}

impl AppConfig {

	// An unconnected driver set up from the `scope` and `timing` sections.
	pub fn driver(&self) -> Sds {
		Sds::new(&self.scope.address, Duration::from_millis(self.scope.timeout_ms))
			.with_timing(Timing::from(&self.timing))
			.with_channel_count(self.scope.channel_count)
	}

}

// Load configuration from file with layered fallbacks: defaults, then the file, then
// `SCOPELINK__SECTION__KEY` environment variables.
pub fn load_config(config_path:Option<&Path>) -> Result<AppConfig, ConfigError> {
	let mut builder = Config::builder()
		.add_source(Config::try_from(&AppConfig::default())?);

	match config_path {
		Some(path) if path.exists() => builder = builder.add_source(File::from(path)),
		Some(path) => return Err(ConfigError::Message(format!("Config file not found: {}", path.display()))),
		None => {
			if Path::new(DEFAULT_CONFIG_FILE).exists() {
				builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
			}
		},
	}

	builder = builder.add_source(
		Environment::with_prefix(ENV_PREFIX)
			.prefix_separator("__")
			.separator("__")
			.try_parsing(true),
	);

	builder.build()?.try_deserialize::<AppConfig>()
}

pub fn load_config_or_default(config_path:Option<&Path>) -> AppConfig {
	match load_config(config_path) {
		Ok(config) => {
			log::info!("Configuration loaded successfully");
			config
		},
		Err(e) => {
			log::warn!("Failed to load config ({}), using defaults", e);
			AppConfig::default()
		},
	}
}

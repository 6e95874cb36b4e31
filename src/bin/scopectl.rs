use std::convert::TryFrom;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use config::ConfigError;
use env_logger::Env;
use log::{info, warn, LevelFilter};
use serde_json::Value;

use scopelink::tools::{self, ToolOutput};
use scopelink::{load_config, AppConfig, Channel, ImageFormat, Sds};

/// Command-line control of a Siglent SDS oscilloscope
#[derive(Parser, Debug)]
#[command(name = "scopectl")]
#[command(about = "Configure, measure and capture from a Siglent SDS oscilloscope", long_about = None)]
struct Args {
	/// Path to configuration file (default: ./scopelink.toml if present)
	#[arg(short, long, value_name = "FILE")]
	config: Option<PathBuf>,

	/// Resource address, overriding the configuration file
	#[arg(short, long, value_name = "ADDRESS")]
	address: Option<String>,

	/// Override log level (trace, debug, info, warn, error)
	#[arg(short, long, value_name = "LEVEL")]
	log_level: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print identity and configuration
	Status,
	/// Measure one channel
	Measure { channel: u8 },
	/// Capture a waveform and write it as JSON
	Waveform {
		channel: u8,
		#[arg(short, long, default_value_t = tools::DEFAULT_WAVEFORM_POINTS)]
		points: usize,
		#[arg(short, long, value_name = "FILE")]
		output: Option<PathBuf>,
	},
	/// Save the display to an image file
	Screenshot {
		#[arg(short, long, value_name = "FILE", default_value = "screen")]
		output: PathBuf,
	},
	/// Run a named operation with JSON arguments
	Run { operation: String, args: Option<String> },
	/// Run a named operation with free-text arguments, e.g. `ask set_timebase "100 microseconds"`
	Ask { operation: String, text: String },
	/// List operations and resources
	List,
	/// Read a resource such as scope://status
	Read { uri: String },
}

fn initialize_logging(log_level:&str) {
	let level = match log_level.to_lowercase().as_str() {
		"trace" => LevelFilter::Trace,
		"debug" => LevelFilter::Debug,
		"info"  => LevelFilter::Info,
		"warn"  => LevelFilter::Warn,
		"error" => LevelFilter::Error,
		_ => {
			eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
			LevelFilter::Info
		},
	};

	env_logger::Builder::from_env(Env::default())
		.filter_level(level)
		.format_timestamp_millis()
		.init();
}

// The log level can come from the file, so a load error is held until logging is up
fn load(path:Option<&Path>) -> (AppConfig, Option<ConfigError>) {
	match load_config(path) {
		Ok(config) => (config, None),
		Err(e) => (AppConfig::default(), Some(e)),
	}
}

fn print_output(output:&ToolOutput) { println!("{}", output.to_text()); }

fn list(channel_count:u8) {
	for op in tools::OPERATIONS {
		println!("{:<20} {}", op.name, op.description);
	}
	for r in tools::resources(channel_count) {
		println!("{:<34} {}", r.uri, r.description);
	}
}

fn run(scope:&mut Sds, command:Command) -> Result<(), Box<dyn std::error::Error>> {
	match command {
		Command::Status => print_output(&tools::invoke(scope, "get_scope_status", Value::Null)?),
		Command::Measure{ channel } => {
			let m = scope.measure_channel(Channel::try_from(channel)?)?;
			println!("{}", serde_json::to_string_pretty(&m)?);
		},
		Command::Waveform{ channel, points, output } => {
			let waveform = scope.capture_waveform(Channel::try_from(channel)?, points)?;
			match output {
				Some(path) => {
					fs::write(&path, serde_json::to_string(&waveform)?)?;
					info!("Wrote {} points to {}", waveform.num_points(), path.display());
				},
				None => println!("{}", serde_json::to_string_pretty(&waveform.summary())?),
			}
		},
		Command::Screenshot{ output } => {
			let capture = scope.capture_screen_image()?;
			let path = if output.extension().is_none() && capture.format != ImageFormat::Unknown {
				output.with_extension(capture.format.extension())
			} else {
				output
			};
			fs::write(&path, &capture.data)?;
			println!("Saved {} bytes to {}", capture.data.len(), path.display());
		},
		Command::Run{ operation, args } => {
			let args:Value = match args {
				Some(text) => serde_json::from_str(&text)?,
				None => Value::Null,
			};
			print_output(&tools::invoke(scope, &operation, args)?);
		},
		Command::Ask{ operation, text } => print_output(&tools::invoke_text(scope, &operation, &text)?),
		Command::Read{ uri } => println!("{}", serde_json::to_string_pretty(&tools::read_resource(scope, &uri)?)?),
		Command::List => list(scope.channel_count()),
	}
	Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();
	let (mut config, load_error) = load(args.config.as_deref());
	if let Some(address) = args.address { config.scope.address = address; }

	let log_level = args.log_level.unwrap_or_else(|| config.logging.log_level.clone());
	initialize_logging(&log_level);
	match load_error {
		Some(e) => warn!("Failed to load config ({}), using defaults", e),
		None => info!("Configuration loaded successfully"),
	}

	// Listing needs no instrument
	if let Command::List = args.command {
		list(config.scope.channel_count);
		return Ok(());
	}

	let mut scope = config.driver();
	scope.connect()?;
	let result = run(&mut scope, args.command);
	scope.disconnect();
	result
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_config_file_falls_back_and_keeps_the_error() {
		let (config, error) = load(Some(Path::new("/nonexistent/scopelink.toml")));
		assert_eq!(config, AppConfig::default());
		assert!(error.unwrap().to_string().contains("/nonexistent/scopelink.toml"));
	}

	#[test]
	fn log_level_flag_is_parsed_before_any_config_is_read() {
		let args = Args::parse_from(["scopectl", "--log-level", "debug", "--config", "/nonexistent/scopelink.toml", "list"]);
		assert_eq!(args.log_level.as_deref(), Some("debug"));
		assert!(matches!(args.command, Command::List));
	}
}

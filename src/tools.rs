// Named operations over a connected Sds. Arguments are JSON deserialized into the driver's config
// types; free-text decoders from intent produce the same JSON.

use std::convert::TryFrom;

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::devices::sds::models::{Channel, ChannelConfig, Measurements, ScreenCapture, TimebaseConfig, TriggerConfig};
use crate::devices::sds::Sds;
use crate::error::{IntentError, ToolError};
use crate::intent;

pub const DEFAULT_WAVEFORM_POINTS:usize = 1400;

lazy_static! {
	static ref CHANNEL_URI_RE: Regex = Regex::new(r"^scope://channels/(\d+)/(config|measurements)$").unwrap();
	static ref WAVEFORM_URI_RE: Regex = Regex::new(r"^scope://waveform/(\d+)$").unwrap();
}

type Handler = fn(&mut Sds, Value) -> Result<ToolOutput, ToolError>;
type Decoder = fn(&str) -> Result<Value, IntentError>;

pub struct Operation {
	pub name: &'static str,
	pub description: &'static str,
	schema: fn() -> Value,
	handler: Handler,
	decoder: Option<Decoder>,
}

impl Operation {
	pub fn input_schema(&self) -> Value { (self.schema)() }
	pub fn accepts_text(&self) -> bool { self.decoder.is_some() }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
	Message(String),
	Json(Value),
	Image(ScreenCapture),
}

impl ToolOutput {
	pub fn to_text(&self) -> String {
		match self {
			ToolOutput::Message(m) => m.clone(),
			ToolOutput::Json(v)    => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
			ToolOutput::Image(img) => format!("Captured {} screen image ({} bytes)", img.format.extension(), img.data.len()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceInfo {
	pub uri: String,
	pub name: String,
	pub description: String,
	pub mime_type: &'static str,
}

pub static OPERATIONS:&[Operation] = &[
	Operation {
		name: "set_channel_config",
		description: "Configure oscilloscope channel settings (voltage scale, coupling, etc.)",
		schema: channel_config_schema,
		handler: set_channel_config,
		decoder: Some(decode_channel_config),
	},
	Operation {
		name: "set_timebase",
		description: "Configure oscilloscope timebase (time scale and delay)",
		schema: timebase_schema,
		handler: set_timebase,
		decoder: Some(decode_timebase),
	},
	Operation {
		name: "set_trigger",
		description: "Configure oscilloscope trigger settings",
		schema: trigger_schema,
		handler: set_trigger,
		decoder: Some(decode_trigger),
	},
	Operation {
		name: "measure_channel",
		description: "Get all measurements from a specified channel (frequency, voltage, etc.)",
		schema: channel_only_schema,
		handler: measure_channel,
		decoder: Some(decode_channel_only),
	},
	Operation {
		name: "capture_waveform",
		description: "Capture waveform data from a channel",
		schema: waveform_schema,
		handler: capture_waveform,
		decoder: Some(decode_waveform),
	},
	Operation {
		name: "get_channel_config",
		description: "Read back a channel's voltage scale, coupling, probe ratio and offset",
		schema: channel_only_schema,
		handler: get_channel_config,
		decoder: Some(decode_channel_only),
	},
	Operation {
		name: "get_timebase",
		description: "Read back the current time scale and delay",
		schema: empty_schema,
		handler: get_timebase,
		decoder: Some(no_arguments),
	},
	Operation {
		name: "auto_setup",
		description: "Automatically configure oscilloscope for optimal viewing of signal",
		schema: empty_schema,
		handler: auto_setup,
		decoder: Some(no_arguments),
	},
	Operation {
		name: "reset_scope",
		description: "Reset oscilloscope to default factory settings",
		schema: empty_schema,
		handler: reset_scope,
		decoder: Some(no_arguments),
	},
	Operation {
		name: "arm_single_trigger",
		description: "Arm oscilloscope for single trigger acquisition",
		schema: empty_schema,
		handler: arm_single_trigger,
		decoder: Some(no_arguments),
	},
	Operation {
		name: "stop_acquisition",
		description: "Stop oscilloscope acquisition",
		schema: empty_schema,
		handler: stop_acquisition,
		decoder: Some(no_arguments),
	},
	Operation {
		name: "get_scope_status",
		description: "Get complete oscilloscope status and configuration",
		schema: empty_schema,
		handler: get_scope_status,
		decoder: Some(no_arguments),
	},
	Operation {
		name: "capture_screen",
		description: "Capture the oscilloscope display as an image",
		schema: empty_schema,
		handler: capture_screen,
		decoder: None,
	},
];

pub fn find(name:&str) -> Option<&'static Operation> { OPERATIONS.iter().find(|op| op.name == name) }

// Runs `name` with JSON arguments.
pub fn invoke(scope:&mut Sds, name:&str, args:Value) -> Result<ToolOutput, ToolError> {
	let op = find(name).ok_or_else(|| ToolError::UnknownOperation(name.to_owned()))?;
	debug!("Invoking {} with {}", name, args);
	// Missing arguments deserialize the same as an empty object
	let args = if args.is_null() { json!({}) } else { args };
	(op.handler)(scope, args)
}

// Runs `name` with arguments decoded from free text.
pub fn invoke_text(scope:&mut Sds, name:&str, text:&str) -> Result<ToolOutput, ToolError> {
	let op = find(name).ok_or_else(|| ToolError::UnknownOperation(name.to_owned()))?;
	let decoder = op.decoder.ok_or_else(|| IntentError::Unsupported(name.to_owned()))?;
	let args:Value = decoder(text)?;
	info!("Decoded \"{}\" for {} as {}", text, name, args);
	(op.handler)(scope, args)
}

// Schemas

fn empty_schema() -> Value { json!({ "type": "object", "properties": {} }) }

fn channel_property(description:&str) -> Value {
	json!({ "type": "integer", "description": description, "minimum": 1, "maximum": Channel::MAX })
}

fn channel_only_schema() -> Value {
	json!({
		"type": "object",
		"properties": { "channel": channel_property("Channel number (1-4)") },
		"required": ["channel"]
	})
}

fn channel_config_schema() -> Value {
	json!({
		"type": "object",
		"properties": {
			"channel": channel_property("Channel number (1-4)"),
			"enabled": { "type": "boolean", "description": "Enable or disable the channel", "default": true },
			"voltage_div": { "type": "string", "description": "Volts per division (e.g., '1V', '500MV', '2V')", "default": "1V" },
			"offset": { "type": "string", "description": "Vertical offset (e.g., '0V', '-2V')", "default": "0V" },
			"coupling": { "type": "string", "enum": ["DC_1M", "AC_1M", "DC_50", "GND"], "description": "Coupling mode", "default": "DC_1M" },
			"probe_ratio": { "type": "integer", "enum": [1, 10, 100, 1000], "description": "Probe attenuation", "default": 1 },
			"bandwidth_limit": { "type": "boolean", "description": "20 MHz bandwidth limit", "default": false }
		},
		"required": ["channel"]
	})
}

fn timebase_schema() -> Value {
	json!({
		"type": "object",
		"properties": {
			"time_div": { "type": "string", "description": "Time per division (e.g., '1MS', '500US', '10US')" },
			"delay": { "type": "string", "description": "Horizontal delay (e.g., '0S', '100MS')", "default": "0S" }
		},
		"required": ["time_div"]
	})
}

fn trigger_schema() -> Value {
	json!({
		"type": "object",
		"properties": {
			"source": channel_property("Trigger source channel (1-4)"),
			"mode": { "type": "string", "enum": ["AUTO", "NORMAL", "SINGLE", "STOP"], "description": "Trigger mode", "default": "AUTO" },
			"trigger_type": { "type": "string", "enum": ["EDGE", "PULSE", "VIDEO", "PATTERN"], "description": "Trigger type", "default": "EDGE" },
			"slope": { "type": "string", "enum": ["RISING", "FALLING", "BOTH"], "description": "Trigger slope/edge", "default": "RISING" },
			"level": { "type": "string", "description": "Trigger level (e.g., '0V', '1.5V')", "default": "0V" },
			"holdoff": { "type": "string", "description": "Trigger holdoff time (e.g., '100NS')" }
		},
		"required": ["source"]
	})
}

fn waveform_schema() -> Value {
	json!({
		"type": "object",
		"properties": {
			"channel": channel_property("Channel number (1-4)"),
			"num_points": { "type": "integer", "description": "Number of data points to capture", "default": DEFAULT_WAVEFORM_POINTS }
		},
		"required": ["channel"]
	})
}

// Handlers

#[derive(Deserialize)]
struct ChannelArgs {
	channel: Channel,
}

fn default_points() -> usize { DEFAULT_WAVEFORM_POINTS }

#[derive(Deserialize)]
struct WaveformArgs {
	channel: Channel,
	#[serde(default = "default_points")]
	num_points: usize,
}

#[derive(Deserialize)]
struct TimebaseArgs {
	time_div: String,
	#[serde(default)]
	delay: Option<String>,
}

fn measurements_json(m:&Measurements) -> Value {
	json!({
		"channel": m.channel,
		"frequency_hz": m.frequency,
		"period_s": m.period,
		"peak_to_peak_v": m.peak_to_peak,
		"amplitude_v": m.amplitude,
		"maximum_v": m.maximum,
		"minimum_v": m.minimum,
		"mean_v": m.mean,
		"rms_v": m.rms,
		"rise_time_s": m.rise_time,
		"fall_time_s": m.fall_time,
		"positive_width_s": m.positive_width,
		"negative_width_s": m.negative_width,
	})
}

fn set_channel_config(scope:&mut Sds, args:Value) -> Result<ToolOutput, ToolError> {
	let config:ChannelConfig = serde_json::from_value(args)?;
	scope.configure_channel(&config)?;
	Ok(ToolOutput::Message(format!("Channel {} configured: {}/div, {} coupling", config.channel, config.voltage_div, config.coupling.mnemonic())))
}

fn set_timebase(scope:&mut Sds, args:Value) -> Result<ToolOutput, ToolError> {
	let args:TimebaseArgs = serde_json::from_value(args)?;
	let mut config = TimebaseConfig::new(args.time_div);
	if let Some(delay) = args.delay { config = config.delay(delay); }
	scope.configure_timebase(&config)?;
	Ok(ToolOutput::Message(format!("Timebase configured: {}/div", config.time_div)))
}

fn set_trigger(scope:&mut Sds, args:Value) -> Result<ToolOutput, ToolError> {
	let config:TriggerConfig = serde_json::from_value(args)?;
	scope.configure_trigger(&config)?;
	Ok(ToolOutput::Message(format!(
		"Trigger configured: Channel {}, {} mode, {} edge at {}",
		config.source, config.mode.mnemonic(), config.slope.mnemonic(), config.level
	)))
}

fn measure_channel(scope:&mut Sds, args:Value) -> Result<ToolOutput, ToolError> {
	let args:ChannelArgs = serde_json::from_value(args)?;
	let m = scope.measure_channel(args.channel)?;
	Ok(ToolOutput::Json(measurements_json(&m)))
}

fn capture_waveform(scope:&mut Sds, args:Value) -> Result<ToolOutput, ToolError> {
	let args:WaveformArgs = serde_json::from_value(args)?;
	let waveform = scope.capture_waveform(args.channel, args.num_points)?;
	let mut summary = serde_json::to_value(waveform.summary())?;
	summary["note"] = json!("Full waveform data available through the driver's capture_waveform");
	Ok(ToolOutput::Json(summary))
}

fn get_channel_config(scope:&mut Sds, args:Value) -> Result<ToolOutput, ToolError> {
	let args:ChannelArgs = serde_json::from_value(args)?;
	let readback = scope.get_channel_config(args.channel)?;
	let mut v = serde_json::to_value(readback)?;
	v["channel"] = json!(args.channel);
	Ok(ToolOutput::Json(v))
}

fn get_timebase(scope:&mut Sds, _args:Value) -> Result<ToolOutput, ToolError> {
	Ok(ToolOutput::Json(serde_json::to_value(scope.get_timebase()?)?))
}

fn auto_setup(scope:&mut Sds, _args:Value) -> Result<ToolOutput, ToolError> {
	scope.auto_setup()?;
	Ok(ToolOutput::Message("Auto setup completed".to_owned()))
}

fn reset_scope(scope:&mut Sds, _args:Value) -> Result<ToolOutput, ToolError> {
	scope.reset()?;
	Ok(ToolOutput::Message("Oscilloscope reset to factory defaults".to_owned()))
}

fn arm_single_trigger(scope:&mut Sds, _args:Value) -> Result<ToolOutput, ToolError> {
	scope.arm_trigger()?;
	Ok(ToolOutput::Message("Oscilloscope armed for single trigger".to_owned()))
}

fn stop_acquisition(scope:&mut Sds, _args:Value) -> Result<ToolOutput, ToolError> {
	scope.stop_acquisition()?;
	Ok(ToolOutput::Message("Acquisition stopped".to_owned()))
}

fn get_scope_status(scope:&mut Sds, _args:Value) -> Result<ToolOutput, ToolError> {
	let status = scope.get_status()?;
	Ok(ToolOutput::Json(json!({
		"connected": status.connected,
		"manufacturer": status.manufacturer,
		"model": status.model,
		"serial_number": status.serial_number,
		"firmware_version": status.firmware_version,
		"acquisition_running": status.acquisition_running,
		"memory_depth": status.memory_depth,
		"num_channels": status.channels.len(),
		"timebase": {
			"time_div": status.timebase.time_div,
			"delay": status.timebase.delay,
			"sample_rate": status.timebase.sample_rate,
		},
		"trigger": {
			"source": status.trigger.source,
			"mode": status.trigger.mode,
			"level": status.trigger.level,
		},
	})))
}

fn capture_screen(scope:&mut Sds, _args:Value) -> Result<ToolOutput, ToolError> {
	Ok(ToolOutput::Image(scope.capture_screen_image()?))
}

// Free-text decoders

fn no_arguments(_text:&str) -> Result<Value, IntentError> { Ok(json!({})) }

fn decode_channel_only(text:&str) -> Result<Value, IntentError> {
	Ok(json!({ "channel": intent::decode_channel(text)? }))
}

// An unnamed channel means channel 1 here, as it does on the front panel
fn decode_channel_config(text:&str) -> Result<Value, IntentError> {
	let channel:u8 = intent::decode_channel(text).unwrap_or(1);
	let vdiv = intent::decode_voltage_div(text)?;
	Ok(json!({ "channel": channel, "voltage_div": vdiv.token }))
}

fn decode_timebase(text:&str) -> Result<Value, IntentError> {
	Ok(json!({ "time_div": intent::decode_time_div(text)?.token }))
}

fn decode_trigger(text:&str) -> Result<Value, IntentError> {
	let mut args = json!({ "source": intent::decode_channel(text).unwrap_or(1) });
	if let Ok(level) = intent::decode_trigger_level(text) { args["level"] = json!(level); }
	if let Some(slope) = intent::decode_trigger_slope(text) { args["slope"] = json!(slope); }
	if let Some(mode) = intent::decode_trigger_mode(text) { args["mode"] = json!(mode); }
	Ok(args)
}

fn decode_waveform(text:&str) -> Result<Value, IntentError> {
	let mut args = decode_channel_only(text)?;
	if let Some(n) = intent::decode_point_count(text) { args["num_points"] = json!(n); }
	Ok(args)
}

// Resources

fn resource(uri:&str, name:&str, description:&str) -> ResourceInfo {
	ResourceInfo{ uri: uri.to_owned(), name: name.to_owned(), description: description.to_owned(), mime_type: "application/json" }
}

// Readable resources for a scope with `channel_count` channels.
pub fn resources(channel_count:u8) -> Vec<ResourceInfo> {
	let mut list = vec![resource("scope://status", "Oscilloscope Status", "Current status and configuration of the oscilloscope")];
	for ch in Channel::first(channel_count) {
		list.push(resource(&format!("scope://channels/{}/config", ch), &format!("Channel {} Configuration", ch), &format!("Configuration settings for channel {}", ch)));
		list.push(resource(&format!("scope://channels/{}/measurements", ch), &format!("Channel {} Measurements", ch), &format!("Measurements from channel {}", ch)));
		list.push(resource(&format!("scope://waveform/{}", ch), &format!("Channel {} Waveform", ch), &format!("Waveform summary from channel {}", ch)));
	}
	list.push(resource("scope://trigger/status", "Trigger Status", "Current trigger configuration and status"));
	list.push(resource("scope://timebase/config", "Timebase Configuration", "Current timebase settings"));
	list
}

fn uri_channel(uri:&str, digits:&str) -> Result<Channel, ToolError> {
	digits.parse::<u8>().ok()
		.and_then(|n| Channel::try_from(n).ok())
		.ok_or_else(|| ToolError::UnknownResource(uri.to_owned()))
}

pub fn read_resource(scope:&mut Sds, uri:&str) -> Result<Value, ToolError> {
	if uri == "scope://status" {
		let status = scope.get_status()?;
		return Ok(json!({
			"connected": status.connected,
			"model": status.model,
			"serial_number": status.serial_number,
			"firmware_version": status.firmware_version,
			"acquisition_running": status.acquisition_running,
			"memory_depth": status.memory_depth,
		}));
	}

	if uri == "scope://trigger/status" {
		let status = scope.get_status()?;
		return Ok(serde_json::to_value(status.trigger)?);
	}

	if uri == "scope://timebase/config" {
		return Ok(serde_json::to_value(scope.get_timebase()?)?);
	}

	if let Some(caps) = CHANNEL_URI_RE.captures(uri) {
		let ch = uri_channel(uri, &caps[1])?;
		return match &caps[2] {
			"config" => {
				let mut v = serde_json::to_value(scope.get_channel_config(ch)?)?;
				v["channel"] = json!(ch);
				Ok(v)
			},
			_ => Ok(measurements_json(&scope.measure_channel(ch)?)),
		};
	}

	if let Some(caps) = WAVEFORM_URI_RE.captures(uri) {
		let ch = uri_channel(uri, &caps[1])?;
		let waveform = scope.capture_waveform(ch, DEFAULT_WAVEFORM_POINTS)?;
		return Ok(serde_json::to_value(waveform.summary())?);
	}

	Err(ToolError::UnknownResource(uri.to_owned()))
}

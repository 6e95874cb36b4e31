// Pulls typed arguments out of phrases like "set channel 2 to 150 millivolts".
// Ladder values snap to the nearest rung.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::devices::sds::commands::{TIME_SCALES, VOLTAGE_SCALES};
use crate::devices::sds::measure::parse_measurement;
use crate::devices::sds::models::{TriggerMode, TriggerSlope};
use crate::error::IntentError;

lazy_static! {
	static ref CHANNEL_RE: Regex = Regex::new(r"(?i)\b(?:channel|chan|ch|c)\s*(?:=|:|#)?\s*(\d+)\b").unwrap();
	static ref BARE_NUMBER_RE: Regex = Regex::new(r"^\s*['\x22]?(\d+)['\x22]?\s*$").unwrap();
	static ref VOLTAGE_RE: Regex = Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(millivolts?|microvolts?|volts?|mv|uv|µv|v)\b").unwrap();
	static ref LEVEL_RE: Regex = Regex::new(r"(?i)(-?\d+(?:\.\d+)?)\s*(millivolts?|volts?|mv|v)\b").unwrap();
	static ref TIME_RE: Regex = Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(nanoseconds?|microseconds?|milliseconds?|seconds?|ns|us|µs|ms|s)\b").unwrap();
	static ref POINTS_RE: Regex = Regex::new(r"(?i)(\d+)\s*(?:points?|samples?|pts)\b").unwrap();
}

// A ladder value chosen for a requested quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapped {
	pub token: &'static str,
	pub requested: f64,
	pub adjusted: bool,
}

fn volts_exponent(unit:&str) -> i32 {
	match unit.to_lowercase().as_str() {
		"mv" | "millivolt" | "millivolts" => -3,
		"uv" | "µv" | "microvolt" | "microvolts" => -6,
		_ => 0,
	}
}

fn seconds_exponent(unit:&str) -> i32 {
	match unit.to_lowercase().as_str() {
		"ns" | "nanosecond" | "nanoseconds" => -9,
		"us" | "µs" | "microsecond" | "microseconds" => -6,
		"ms" | "millisecond" | "milliseconds" => -3,
		_ => 0,
	}
}

fn with_exponent(value:f64, exponent:i32) -> f64 {
	if exponent >= 0 { value * 10f64.powi(exponent) } else { value / 10f64.powi(-exponent) }
}

// Nearest ladder rung on a log scale, so 150 mV lands on 200 mV rather than tying with 100 mV.
pub fn snap(value:f64, ladder:&[&'static str]) -> Option<Snapped> {
	if !(value > 0.0) || !value.is_finite() { return None; }

	let mut best:Option<(&'static str, f64, f64)> = None;
	for &token in ladder {
		let rung = match parse_measurement(token) { Some(r) => r, None => continue };
		let distance = (value / rung).ln().abs();
		match best {
			Some((_, _, d)) if d <= distance => (),
			_ => best = Some((token, rung, distance)),
		}
	}

	best.map(|(token, rung, _)| Snapped {
		token,
		requested: value,
		adjusted: ((rung - value) / rung).abs() > 1e-9,
	})
}

// "channel 2", "ch2", "C3", or just "2".
pub fn decode_channel(text:&str) -> Result<u8, IntentError> {
	let caps = CHANNEL_RE.captures(text).or_else(|| BARE_NUMBER_RE.captures(text));
	caps.and_then(|c| c[1].parse::<u8>().ok())
		.ok_or_else(|| IntentError::NoChannel(text.to_owned()))
}

// Volts per division, snapped to the instrument's 1-2-5 ladder.
pub fn decode_voltage_div(text:&str) -> Result<Snapped, IntentError> {
	let no_voltage = || IntentError::NoVoltage(text.to_owned());
	let caps = VOLTAGE_RE.captures(text).ok_or_else(no_voltage)?;
	let value:f64 = caps[1].parse::<f64>().map_err(|_| no_voltage())?;
	snap(with_exponent(value, volts_exponent(&caps[2])), &VOLTAGE_SCALES).ok_or_else(no_voltage)
}

// Time per division, snapped to the 1 ns .. 100 s ladder.
pub fn decode_time_div(text:&str) -> Result<Snapped, IntentError> {
	let no_time = || IntentError::NoTime(text.to_owned());
	let caps = TIME_RE.captures(text).ok_or_else(no_time)?;
	let value:f64 = caps[1].parse::<f64>().map_err(|_| no_time())?;
	snap(with_exponent(value, seconds_exponent(&caps[2])), &TIME_SCALES).ok_or_else(no_time)
}

// Trigger level as an instrument token, e.g. "1.5 volts" -> "1.5V", "-200mV" -> "-200MV".
// Levels are continuous so nothing is snapped.
pub fn decode_trigger_level(text:&str) -> Result<String, IntentError> {
	let caps = LEVEL_RE.captures(text).ok_or_else(|| IntentError::NoLevel(text.to_owned()))?;
	let unit = if volts_exponent(&caps[2]) == -3 { "MV" } else { "V" };
	Ok(format!("{}{}", &caps[1], unit))
}

pub fn decode_trigger_slope(text:&str) -> Option<TriggerSlope> {
	let lower = text.to_lowercase();
	if lower.contains("both") || lower.contains("either") { Some(TriggerSlope::Both) }
	else if lower.contains("falling") || lower.contains("negative") { Some(TriggerSlope::Falling) }
	else if lower.contains("rising") || lower.contains("positive") { Some(TriggerSlope::Rising) }
	else { None }
}

pub fn decode_trigger_mode(text:&str) -> Option<TriggerMode> {
	let lower = text.to_lowercase();
	if lower.contains("single") { Some(TriggerMode::Single) }
	else if lower.contains("normal") { Some(TriggerMode::Normal) }
	else if lower.contains("auto") { Some(TriggerMode::Auto) }
	else if lower.contains("stop") { Some(TriggerMode::Stop) }
	else { None }
}

pub fn decode_point_count(text:&str) -> Option<usize> {
	POINTS_RE.captures(text).and_then(|c| c[1].parse::<usize>().ok())
}

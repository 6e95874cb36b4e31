use std::convert::TryFrom;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::error::ScopeError;
use super::measure::WaveformStats;

lazy_static! {
	static ref IDN_RE: Regex = Regex::new(r"^\s*([^,]+),([^,]+),([^,]+),([^,\s]+)").unwrap();
}

const UNKNOWN:&str = "Unknown";

// Channel number, 1 through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
	pub const MAX:u8 = 4;

	pub fn number(self) -> u8 { self.0 }

	// Channels 1..=count, clamped to the channels the family has.
	pub fn first(count:u8) -> impl Iterator<Item=Channel> { (1..=count.min(Self::MAX)).map(Channel) }
}

impl TryFrom<u8> for Channel {
	type Error = ScopeError;

	fn try_from(n:u8) -> Result<Self, ScopeError> {
		if (1..=Self::MAX).contains(&n) { Ok(Channel(n)) }
		else { Err(ScopeError::InvalidChannel(n)) }
	}
}

impl From<Channel> for u8 {
	fn from(ch:Channel) -> u8 { ch.0 }
}

impl Default for Channel {
	fn default() -> Self { Channel(1) }
}

// Bare number, so "C{}" in command templates reads "C1"
impl fmt::Display for Channel {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coupling {
	#[serde(rename = "DC_1M", alias = "D1M")]
	Dc1M,
	#[serde(rename = "AC_1M", alias = "A1M")]
	Ac1M,
	#[serde(rename = "DC_50", alias = "D50")]
	Dc50,
	#[serde(rename = "GND")]
	Ground,
}

impl Coupling {
	pub fn mnemonic(self) -> &'static str {
		match self {
			Coupling::Dc1M   => "D1M",
			Coupling::Ac1M   => "A1M",
			Coupling::Dc50   => "D50",
			Coupling::Ground => "GND",
		}
	}

	pub fn from_mnemonic(s:&str) -> Option<Self> {
		match s.trim().to_ascii_uppercase().as_str() {
			"D1M" | "DC_1M" => Some(Coupling::Dc1M),
			"A1M" | "AC_1M" => Some(Coupling::Ac1M),
			"D50" | "DC_50" => Some(Coupling::Dc50),
			"GND"           => Some(Coupling::Ground),
			_               => None,
		}
	}
}

impl Default for Coupling {
	fn default() -> Self { Coupling::Dc1M }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum ProbeRatio { X1, X10, X100, X1000 }

impl ProbeRatio {
	pub fn value(self) -> u16 {
		match self {
			ProbeRatio::X1    => 1,
			ProbeRatio::X10   => 10,
			ProbeRatio::X100  => 100,
			ProbeRatio::X1000 => 1000,
		}
	}
}

impl TryFrom<u16> for ProbeRatio {
	type Error = String;

	fn try_from(n:u16) -> Result<Self, String> {
		match n {
			1    => Ok(ProbeRatio::X1),
			10   => Ok(ProbeRatio::X10),
			100  => Ok(ProbeRatio::X100),
			1000 => Ok(ProbeRatio::X1000),
			_    => Err(format!("Unsupported probe ratio {} (expected 1, 10, 100 or 1000)", n)),
		}
	}
}

impl From<ProbeRatio> for u16 {
	fn from(r:ProbeRatio) -> u16 { r.value() }
}

impl Default for ProbeRatio {
	fn default() -> Self { ProbeRatio::X1 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerMode {
	Auto,
	#[serde(alias = "NORM")]
	Normal,
	Single,
	Stop,
}

impl TriggerMode {
	pub fn mnemonic(self) -> &'static str {
		match self {
			TriggerMode::Auto   => "AUTO",
			TriggerMode::Normal => "NORM",
			TriggerMode::Single => "SINGLE",
			TriggerMode::Stop   => "STOP",
		}
	}

	pub fn from_mnemonic(s:&str) -> Option<Self> {
		match s.trim().to_ascii_uppercase().as_str() {
			"AUTO"           => Some(TriggerMode::Auto),
			"NORM" | "NORMAL" => Some(TriggerMode::Normal),
			"SINGLE"         => Some(TriggerMode::Single),
			"STOP"           => Some(TriggerMode::Stop),
			_                => None,
		}
	}
}

impl Default for TriggerMode {
	fn default() -> Self { TriggerMode::Auto }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerType { Edge, Pulse, Video, Pattern }

impl TriggerType {
	pub fn mnemonic(self) -> &'static str {
		match self {
			TriggerType::Edge    => "EDGE",
			TriggerType::Pulse   => "PULSE",
			TriggerType::Video   => "VIDEO",
			TriggerType::Pattern => "PATTERN",
		}
	}

	pub fn from_mnemonic(s:&str) -> Option<Self> {
		match s.trim().to_ascii_uppercase().as_str() {
			"EDGE"    => Some(TriggerType::Edge),
			"PULSE"   => Some(TriggerType::Pulse),
			"VIDEO"   => Some(TriggerType::Video),
			"PATTERN" => Some(TriggerType::Pattern),
			_         => None,
		}
	}
}

impl Default for TriggerType {
	fn default() -> Self { TriggerType::Edge }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSlope {
	#[serde(rename = "RISING", alias = "POS")]
	Rising,
	#[serde(rename = "FALLING", alias = "NEG")]
	Falling,
	#[serde(rename = "BOTH", alias = "WINDOW")]
	Both,
}

impl TriggerSlope {
	pub fn mnemonic(self) -> &'static str {
		match self {
			TriggerSlope::Rising  => "POS",
			TriggerSlope::Falling => "NEG",
			TriggerSlope::Both    => "WINDOW",
		}
	}

	pub fn from_mnemonic(s:&str) -> Option<Self> {
		match s.trim().to_ascii_uppercase().as_str() {
			"POS" | "RISING"    => Some(TriggerSlope::Rising),
			"NEG" | "FALLING"   => Some(TriggerSlope::Falling),
			"WINDOW" | "BOTH"   => Some(TriggerSlope::Both),
			_                   => None,
		}
	}
}

impl Default for TriggerSlope {
	fn default() -> Self { TriggerSlope::Rising }
}

fn default_true() -> bool { true }
fn default_voltage_div() -> String { "1V".to_owned() }
fn default_offset() -> String { "0V".to_owned() }
fn default_time_div() -> String { "1MS".to_owned() }
fn default_delay() -> String { "0S".to_owned() }
fn default_level() -> String { "0V".to_owned() }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
	pub channel: Channel,
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_voltage_div")]
	pub voltage_div: String,
	#[serde(default = "default_offset")]
	pub offset: String,
	#[serde(default)]
	pub coupling: Coupling,
	#[serde(default)]
	pub probe_ratio: ProbeRatio,
	#[serde(default)]
	pub bandwidth_limit: bool,
}

impl ChannelConfig {

	pub fn new(channel:Channel) -> Self {
		Self {
			channel,
			enabled: true,
			voltage_div: default_voltage_div(),
			offset: default_offset(),
			coupling: Coupling::default(),
			probe_ratio: ProbeRatio::default(),
			bandwidth_limit: false,
		}
	}

	pub fn enabled(mut self, b:bool) -> Self { self.enabled = b; self }
	pub fn voltage_div(mut self, v:impl Into<String>) -> Self { self.voltage_div = v.into(); self }
	pub fn offset(mut self, v:impl Into<String>) -> Self { self.offset = v.into(); self }
	pub fn coupling(mut self, c:Coupling) -> Self { self.coupling = c; self }
	pub fn probe_ratio(mut self, r:ProbeRatio) -> Self { self.probe_ratio = r; self }
	pub fn bandwidth_limit(mut self, b:bool) -> Self { self.bandwidth_limit = b; self }

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimebaseConfig {
	#[serde(default = "default_time_div")]
	pub time_div: String,
	#[serde(default = "default_delay")]
	pub delay: String,
	// Read back only, never written to the instrument
	#[serde(default)]
	pub sample_rate: Option<String>,
}

impl TimebaseConfig {
	pub fn new(time_div:impl Into<String>) -> Self {
		Self{ time_div: time_div.into(), delay: default_delay(), sample_rate: None }
	}

	pub fn delay(mut self, d:impl Into<String>) -> Self { self.delay = d.into(); self }
}

impl Default for TimebaseConfig {
	fn default() -> Self { Self::new(default_time_div()) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
	#[serde(default)]
	pub source: Channel,
	#[serde(default)]
	pub mode: TriggerMode,
	#[serde(default)]
	pub trigger_type: TriggerType,
	#[serde(default)]
	pub slope: TriggerSlope,
	#[serde(default = "default_level")]
	pub level: String,
	#[serde(default)]
	pub holdoff: Option<String>,
}

impl TriggerConfig {
	pub fn new(source:Channel) -> Self {
		Self {
			source,
			mode: TriggerMode::default(),
			trigger_type: TriggerType::default(),
			slope: TriggerSlope::default(),
			level: default_level(),
			holdoff: None,
		}
	}

	pub fn mode(mut self, m:TriggerMode) -> Self { self.mode = m; self }
	pub fn trigger_type(mut self, t:TriggerType) -> Self { self.trigger_type = t; self }
	pub fn slope(mut self, s:TriggerSlope) -> Self { self.slope = s; self }
	pub fn level(mut self, l:impl Into<String>) -> Self { self.level = l.into(); self }
	pub fn holdoff(mut self, h:impl Into<String>) -> Self { self.holdoff = Some(h.into()); self }
}

impl Default for TriggerConfig {
	fn default() -> Self { Self::new(Channel::default()) }
}

// One measurement pass over a channel. `None` means the instrument had no valid reading,
// which is not the same thing as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
	pub channel: Channel,
	pub frequency: Option<f64>,
	pub period: Option<f64>,
	pub peak_to_peak: Option<f64>,
	pub amplitude: Option<f64>,
	pub maximum: Option<f64>,
	pub minimum: Option<f64>,
	pub mean: Option<f64>,
	pub rms: Option<f64>,
	pub rise_time: Option<f64>,
	pub fall_time: Option<f64>,
	pub positive_width: Option<f64>,
	pub negative_width: Option<f64>,
}

impl Measurements {
	pub fn new(channel:Channel) -> Self { Self{ channel, ..Self::default() } }
}

// Decoded waveform. Sample and timestamp vectors always have `num_points` entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformData {
	channel: Channel,
	num_points: usize,
	sample_rate: f64,
	voltage_scale: f64,
	voltage_offset: f64,
	time_scale: f64,
	data_points: Vec<f64>,
	time_points: Vec<f64>,
}

impl WaveformData {

	// Timestamps are `i / sample_rate`; a non-positive rate yields zeros rather than infinities.
	pub fn new(channel:Channel, sample_rate:f64, voltage_scale:f64, voltage_offset:f64, time_scale:f64, data_points:Vec<f64>) -> Self {
		let dt:f64 = if sample_rate > 0.0 { 1.0 / sample_rate } else { 0.0 };
		let time_points:Vec<f64> = (0..data_points.len()).map(|i| i as f64 * dt).collect();
		Self{ channel, num_points: data_points.len(), sample_rate, voltage_scale, voltage_offset, time_scale, data_points, time_points }
	}

	pub fn channel(&self) -> Channel { self.channel }
	pub fn num_points(&self) -> usize { self.num_points }
	pub fn sample_rate(&self) -> f64 { self.sample_rate }
	pub fn voltage_scale(&self) -> f64 { self.voltage_scale }
	pub fn voltage_offset(&self) -> f64 { self.voltage_offset }
	pub fn time_scale(&self) -> f64 { self.time_scale }
	pub fn data_points(&self) -> &[f64] { &self.data_points }
	pub fn time_points(&self) -> &[f64] { &self.time_points }
	pub fn is_empty(&self) -> bool { self.num_points == 0 }

	pub fn into_samples(self) -> Vec<f64> { self.data_points }

	// Everything but the sample vectors, which can run to thousands of points.
	pub fn summary(&self) -> WaveformSummary {
		let range = |v:&[f64]| -> Option<[f64; 2]> {
			let stats = WaveformStats::from_samples(v)?;
			Some([stats.minimum, stats.maximum])
		};
		WaveformSummary {
			channel: self.channel,
			num_points: self.num_points,
			sample_rate_hz: self.sample_rate,
			voltage_scale: self.voltage_scale,
			voltage_offset: self.voltage_offset,
			time_scale: self.time_scale,
			time_range_s: range(&self.time_points),
			voltage_range_v: range(&self.data_points),
			statistics: WaveformStats::from_samples(&self.data_points),
		}
	}

}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformSummary {
	pub channel: Channel,
	pub num_points: usize,
	pub sample_rate_hz: f64,
	pub voltage_scale: f64,
	pub voltage_offset: f64,
	pub time_scale: f64,
	pub time_range_s: Option<[f64; 2]>,
	pub voltage_range_v: Option<[f64; 2]>,
	pub statistics: Option<WaveformStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeStatus {
	pub connected: bool,
	pub manufacturer: String,
	pub model: String,
	pub serial_number: String,
	pub firmware_version: String,
	pub channels: Vec<ChannelConfig>,
	pub timebase: TimebaseConfig,
	pub trigger: TriggerConfig,
	pub acquisition_running: bool,
	pub memory_depth: Option<u64>,
}

// Raw replies, units untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReadback {
	pub voltage_div: String,
	pub coupling: String,
	pub probe_ratio: String,
	pub offset: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimebaseReadback {
	pub time_div: String,
	pub delay: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_number: String,
	pub firmware_version: String,
}

impl Identity {

	// Decodes an `*IDN?` reply, e.g. `Siglent Technologies,SDS1104X-E,SDSMMEBD3R1234,8.2.6.1.37R2`.
	// Fields the instrument leaves out come back as "Unknown".
	pub fn parse(idn:&str) -> Self {
		if let Some(caps) = IDN_RE.captures(idn) {
			return Self {
				manufacturer:     caps[1].trim().to_owned(),
				model:            caps[2].trim().to_owned(),
				serial_number:    caps[3].trim().to_owned(),
				firmware_version: caps[4].trim().to_owned(),
			};
		}

		let mut parts = idn.split(',').map(str::trim).filter(|s| !s.is_empty());
		let mut next = || parts.next().unwrap_or(UNKNOWN).to_owned();
		let manufacturer = next();
		let model = next();
		let serial_number = next();
		let firmware_version = next();
		Self{ manufacturer, model, serial_number, firmware_version }
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat { Png, Bmp, Unknown }

pub const PNG_SIGNATURE:&[u8] = b"\x89PNG";
pub const BMP_SIGNATURE:&[u8] = b"BM";

impl ImageFormat {

	pub fn sniff(data:&[u8]) -> Self {
		if data.starts_with(PNG_SIGNATURE) { ImageFormat::Png }
		else if data.starts_with(BMP_SIGNATURE) { ImageFormat::Bmp }
		else { ImageFormat::Unknown }
	}

	pub fn mime_type(self) -> &'static str {
		match self {
			ImageFormat::Png     => "image/png",
			ImageFormat::Bmp     => "image/bmp",
			ImageFormat::Unknown => "application/octet-stream",
		}
	}

	pub fn extension(self) -> &'static str {
		match self {
			ImageFormat::Png     => "png",
			ImageFormat::Bmp     => "bmp",
			ImageFormat::Unknown => "bin",
		}
	}

}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenCapture {
	pub format: ImageFormat,
	#[serde(skip)]
	pub data: Vec<u8>,
}

impl ScreenCapture {
	pub fn new(data:Vec<u8>) -> Self { Self{ format: ImageFormat::sniff(&data), data } }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn channel_bounds() {
		assert!(Channel::try_from(0).is_err());
		assert_eq!(Channel::try_from(4).unwrap().number(), 4);
		match Channel::try_from(5) {
			Err(ScopeError::InvalidChannel(5)) => (),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(Channel::first(8).count(), 4);
	}

	#[test]
	fn channel_config_deserializes_with_defaults() {
		let cfg:ChannelConfig = serde_json::from_str(r#"{"channel": 2, "voltage_div": "500MV"}"#).unwrap();
		assert_eq!(cfg, ChannelConfig::new(Channel::try_from(2).unwrap()).voltage_div("500MV"));
		assert!(serde_json::from_str::<ChannelConfig>(r#"{"channel": 7}"#).is_err());
	}

	#[test]
	fn enum_names_and_mnemonics() {
		let cfg:ChannelConfig = serde_json::from_str(r#"{"channel": 1, "coupling": "AC_1M", "probe_ratio": 10}"#).unwrap();
		assert_eq!(cfg.coupling, Coupling::Ac1M);
		assert_eq!(cfg.probe_ratio, ProbeRatio::X10);
		assert!(serde_json::from_str::<ChannelConfig>(r#"{"channel": 1, "probe_ratio": 3}"#).is_err());

		let trig:TriggerConfig = serde_json::from_str(r#"{"source": 2, "mode": "NORMAL", "slope": "FALLING"}"#).unwrap();
		assert_eq!(trig.mode.mnemonic(), "NORM");
		assert_eq!(trig.slope.mnemonic(), "NEG");
		assert_eq!(trig.level, "0V");
		assert_eq!(TriggerMode::from_mnemonic("norm"), Some(TriggerMode::Normal));
	}

	#[test]
	fn waveform_lengths_match() {
		let ch = Channel::try_from(1).unwrap();
		let w = WaveformData::new(ch, 1000.0, 1.0, 0.0, 1e-3, vec![0.0, 0.5, 1.0]);
		assert_eq!(w.num_points(), 3);
		assert_eq!(w.time_points(), &[0.0, 0.001, 0.002]);

		let empty = WaveformData::new(ch, 0.0, 1.0, 0.0, 0.0, vec![]);
		assert!(empty.is_empty());
		assert!(empty.time_points().is_empty());
		assert_eq!(empty.summary().voltage_range_v, None);
	}

	#[test]
	fn waveform_summary_ranges() {
		let w = WaveformData::new(Channel::try_from(2).unwrap(), 10.0, 0.5, 0.0, 0.1, vec![-0.2, 0.4, 0.1]);
		let s = w.summary();
		assert_eq!(s.voltage_range_v, Some([-0.2, 0.4]));
		assert_eq!(s.time_range_s, Some([0.0, 0.2]));
		assert_eq!(s.num_points, 3);
	}

	#[test]
	fn identity_parsing() {
		let id = Identity::parse("Siglent Technologies,SDS1104X-E,SDSMMEBD3R1234,8.2.6.1.37R2\n");
		assert_eq!(id.model, "SDS1104X-E");
		assert_eq!(id.firmware_version, "8.2.6.1.37R2");

		let partial = Identity::parse("Siglent,SDS1202X");
		assert_eq!(partial.model, "SDS1202X");
		assert_eq!(partial.serial_number, "Unknown");
	}

	#[test]
	fn image_sniffing() {
		assert_eq!(ImageFormat::sniff(b"\x89PNG\r\n\x1a\n"), ImageFormat::Png);
		assert_eq!(ImageFormat::sniff(b"BM\x36\x00"), ImageFormat::Bmp);
		assert_eq!(ImageFormat::sniff(b"GIF8"), ImageFormat::Unknown);
	}
}

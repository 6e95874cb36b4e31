// Parameter measurements with the instrument's "****" sentinel treated as "no reading".
// When every voltage parameter comes back empty the statistics are computed from a short capture.

use log::{debug, info, warn};
use serde::{Serialize, Deserialize};

use crate::error::ScopeError;
use super::commands::{self, Parameter};
use super::models::{Channel, Measurements};
use super::Sds;

// Reported by `PAVA?` when a parameter can't be measured on the current signal.
pub const SENTINEL:&str = "****";

pub const FALLBACK_POINTS:usize = 1000;

const VOLTAGE_PARAMETERS:[Parameter; 6] = [
	Parameter::PeakToPeak, Parameter::Amplitude, Parameter::Maximum,
	Parameter::Minimum, Parameter::Mean, Parameter::Rms,
];

const TIMING_PARAMETERS:[Parameter; 4] = [
	Parameter::RiseTime, Parameter::FallTime, Parameter::PositiveWidth, Parameter::NegativeWidth,
];

const FREQUENCY_UNITS:[(&str, i32); 4] = [("GHZ", 9), ("MHZ", 6), ("KHZ", 3), ("HZ", 0)];

fn scale(value:f64, exponent:i32) -> f64 {
	// Dividing keeps "500MV" at exactly 0.5
	if exponent >= 0 { value * 10f64.powi(exponent) } else { value / 10f64.powi(-exponent) }
}

// Decodes replies like `C1:PAVA FREQ,1.5KHZ`, `2.5V` or `500MV` into base units.
// `M` means milli after a `V`/`S` unit and mega on a bare number. Anything unparseable,
// including the `****` sentinel, is `None`.
pub fn parse_measurement(reply:&str) -> Option<f64> {
	let text:&str = match reply.find(',') {
		Some(i) => &reply[i+1..],
		None    => reply,
	};
	let text:String = text.trim().to_ascii_uppercase();
	if text.contains('*') { return None; }

	let mut rest:&str = &text;
	let mut exponent:i32 = 0;
	let mut had_unit = false;

	if let Some((unit, exp)) = FREQUENCY_UNITS.iter().find(|(unit, _)| rest.ends_with(unit)) {
		rest = &rest[..rest.len() - unit.len()];
		exponent = *exp;
	} else if rest.ends_with('V') || rest.ends_with('S') {
		rest = &rest[..rest.len() - 1];
		had_unit = true;
	}

	let prefix:Option<i32> = match rest.chars().last() {
		Some('G') => Some(9),
		Some('M') => Some(if had_unit { -3 } else { 6 }),
		Some('K') => Some(3),
		Some('U') => Some(-6),
		Some('N') => Some(-9),
		_         => None,
	};
	if let Some(p) = prefix {
		rest = &rest[..rest.len() - 1];
		exponent += p;
	}

	let value:f64 = rest.trim().parse::<f64>().ok()?;
	if !value.is_finite() { return None; }
	Some(scale(value, exponent))
}

pub fn is_sentinel(reply:&str) -> bool { reply.contains(SENTINEL) }

// "CYMT 1.00KHz"; without the tag there is no reading
fn parse_cymometer(reply:&str) -> Option<f64> {
	let mut parts = reply.split_whitespace();
	match parts.next() {
		Some(tag) if tag.eq_ignore_ascii_case(commands::CYMOMETER_TAG) => parts.next().and_then(parse_measurement),
		_ => None,
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformStats {
	pub maximum: f64,
	pub minimum: f64,
	pub peak_to_peak: f64,
	pub amplitude: f64,
	pub mean: f64,
	pub rms: f64,
}

impl WaveformStats {

	// `None` for an empty sample set.
	pub fn from_samples(samples:&[f64]) -> Option<Self> {
		if samples.is_empty() { return None; }

		let n = samples.len() as f64;
		let maximum:f64 = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
		let minimum:f64 = samples.iter().cloned().fold(f64::INFINITY, f64::min);
		let mean:f64 = samples.iter().sum::<f64>() / n;
		let rms:f64 = (samples.iter().map(|x| x*x).sum::<f64>() / n).sqrt();
		let peak_to_peak = maximum - minimum;

		Some(Self{ maximum, minimum, peak_to_peak, amplitude: peak_to_peak / 2.0, mean, rms })
	}

	pub fn apply_to(&self, m:&mut Measurements) {
		m.maximum      = Some(self.maximum);
		m.minimum      = Some(self.minimum);
		m.peak_to_peak = Some(self.peak_to_peak);
		m.amplitude    = Some(self.amplitude);
		m.mean         = Some(self.mean);
		m.rms          = Some(self.rms);
	}

}

fn slot(m:&mut Measurements, param:Parameter) -> &mut Option<f64> {
	match param {
		Parameter::Frequency     => &mut m.frequency,
		Parameter::Period        => &mut m.period,
		Parameter::PeakToPeak    => &mut m.peak_to_peak,
		Parameter::Amplitude     => &mut m.amplitude,
		Parameter::Maximum       => &mut m.maximum,
		Parameter::Minimum       => &mut m.minimum,
		Parameter::Mean          => &mut m.mean,
		Parameter::Rms           => &mut m.rms,
		Parameter::RiseTime      => &mut m.rise_time,
		Parameter::FallTime      => &mut m.fall_time,
		Parameter::PositiveWidth => &mut m.positive_width,
		Parameter::NegativeWidth => &mut m.negative_width,
	}
}

impl Sds {

	// Reads every parameter the instrument will give for `ch`. Individual failures leave the
	// field empty; only a disconnected driver is an error.
	pub fn measure_channel(&mut self, ch:Channel) -> Result<Measurements, ScopeError> {
		self.ensure_connected()?;
		let mut m = Measurements::new(ch);

		match self.query(commands::CYMOMETER) {
			Ok(reply) => {
				m.frequency = parse_cymometer(&reply);
				m.period = m.frequency.filter(|f| *f > 0.0).map(|f| 1.0 / f);
			},
			Err(e) => debug!("Frequency counter unavailable: {}", e),
		}

		let mut any_voltage = false;
		for &param in VOLTAGE_PARAMETERS.iter() {
			if let Some(v) = self.query_parameter(ch, param) {
				*slot(&mut m, param) = Some(v);
				any_voltage = true;
			}
		}

		for &param in TIMING_PARAMETERS.iter() {
			*slot(&mut m, param) = self.query_parameter(ch, param);
		}

		if !any_voltage {
			info!("No voltage parameters on C{}, computing them from a waveform", ch);
			match self.capture_waveform(ch, FALLBACK_POINTS) {
				Ok(w) => match WaveformStats::from_samples(w.data_points()) {
					Some(stats) => stats.apply_to(&mut m),
					None => warn!("Fallback waveform on C{} had no samples", ch),
				},
				Err(ScopeError::NotConnected) => return Err(ScopeError::NotConnected),
				Err(e) => warn!("Fallback waveform on C{} failed: {}", ch, e),
			}
		}

		Ok(m)
	}

	fn query_parameter(&mut self, ch:Channel, param:Parameter) -> Option<f64> {
		match self.query(&commands::parameter_value(ch, param)) {
			Ok(ref reply) if is_sentinel(reply) => {
				debug!("{} on C{} has no valid reading", param.mnemonic(), ch);
				None
			},
			Ok(reply) => {
				let value = parse_measurement(&reply);
				if value.is_none() { debug!("Couldn't parse {} reply \"{}\"", param.mnemonic(), reply); }
				value
			},
			Err(e) => {
				warn!("{} on C{} failed: {}", param.mnemonic(), ch, e);
				None
			},
		}
	}

}

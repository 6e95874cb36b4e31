// DAT2 waveform transfer. The payload is a "#9" block: nine ASCII digits giving the length,
// then that many signed bytes, 25 counts per vertical division.

use std::str;
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use crate::error::ScopeError;
use super::commands;
use super::measure::parse_measurement;
use super::models::{Channel, WaveformData};
use super::{capture_error, reply_value, Sds, Timing};

pub const BLOCK_MARKER:&[u8] = b"#9";
pub const BLOCK_DIGITS:usize = 9;

// Used when SARA? can't be read
pub const PLACEHOLDER_SAMPLE_RATE:f64 = 1e9;

const FALLBACK_VOLTS_PER_DIV:f64 = 1.0;

// Decimation applied by `WFSU SP,n`. Fewer requested points means a larger interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseInterval(u32);

impl SparseInterval {
	pub const OFF:SparseInterval = SparseInterval(0);

	pub fn for_points(num_points:usize) -> Self {
		match num_points {
			0..=200    => SparseInterval(10),
			201..=500  => SparseInterval(6),
			501..=1000 => SparseInterval(4),
			_          => SparseInterval(2),
		}
	}

	pub fn value(self) -> u32 { self.0 }

	pub fn divisor(self) -> f64 { self.0.max(1) as f64 }
}

// Pulls the signed samples out of a `#9` block. No marker or a bad length gives no samples;
// a short payload gives whatever arrived.
pub fn decode_block(raw:&[u8]) -> Vec<i8> {
	let start:usize = match raw.windows(BLOCK_MARKER.len()).position(|w| w == BLOCK_MARKER) {
		Some(i) => i + BLOCK_MARKER.len(),
		None => {
			warn!("No #9 block marker in {} byte waveform reply", raw.len());
			return vec![];
		},
	};

	let digits:&[u8] = match raw.get(start..start + BLOCK_DIGITS) {
		Some(d) => d,
		None => {
			warn!("Waveform block header truncated");
			return vec![];
		},
	};

	let length:usize = match str::from_utf8(digits).ok().and_then(|s| s.parse::<usize>().ok()) {
		Some(n) => n,
		None => {
			warn!("Invalid waveform block length {:?}", String::from_utf8_lossy(digits));
			return vec![];
		},
	};

	let body:&[u8] = &raw[start + BLOCK_DIGITS..];
	if body.len() < length {
		warn!("Waveform block truncated: expected {} bytes, got {}", length, body.len());
	}

	body.iter().take(length).map(|&b| b as i8).collect()
}

pub fn samples_to_volts(samples:&[i8], volts_per_div:f64) -> Vec<f64> {
	samples.iter().map(|&s| s as f64 / commands::SAMPLES_PER_DIVISION * volts_per_div).collect()
}

// SARA replies: "SARA 1.00GSa/s", "SARA 500MSa/s"
pub fn parse_sample_rate(reply:&str) -> Option<f64> {
	let value:&str = reply_value(reply);
	let upper:String = value.to_ascii_uppercase();
	let number:&str = match upper.find("SA/S") {
		Some(i) => &value[..i],
		None    => value,
	};
	parse_measurement(number).filter(|r| *r > 0.0)
}

impl Sds {

	// Captures one channel at roughly `num_points` resolution.
	pub fn capture_waveform(&mut self, ch:Channel, num_points:usize) -> Result<WaveformData, ScopeError> {
		self.ensure_connected()?;
		let sparse = SparseInterval::for_points(num_points);
		let timing:Timing = self.timing;
		info!("Capturing waveform on C{} ({} points requested, sparse interval {})", ch, num_points, sparse.value());

		let raw = self.transfer_waveform(ch, sparse, &timing);

		if let Err(e) = self.write(&commands::waveform_setup(SparseInterval::OFF.value())) {
			debug!("Unable to turn waveform decimation back off: {}", e);
		}

		let raw:Vec<u8> = raw?;
		let samples:Vec<i8> = decode_block(&raw);

		let volts_per_div:f64 = self.volts_per_div(ch)?;
		let voltage_offset:f64 = self.query_number(&commands::channel_query(ch, "OFST")).unwrap_or(0.0);
		let time_scale:f64 = self.query_number(commands::TIME_DIV_QUERY).unwrap_or(0.0);
		let sample_rate:f64 = match self.query(commands::SAMPLE_RATE).ok().and_then(|r| parse_sample_rate(&r)) {
			Some(rate) => rate / sparse.divisor(),
			None => {
				debug!("Sample rate unavailable, using {} Sa/s", PLACEHOLDER_SAMPLE_RATE);
				PLACEHOLDER_SAMPLE_RATE
			},
		};

		let data_points:Vec<f64> = samples_to_volts(&samples, volts_per_div);
		info!("Captured {} points from C{}", data_points.len(), ch);
		Ok(WaveformData::new(ch, sample_rate, volts_per_div, voltage_offset, time_scale, data_points))
	}

	fn transfer_waveform(&mut self, ch:Channel, sparse:SparseInterval, timing:&Timing) -> Result<Vec<u8>, ScopeError> {
		self.write(&commands::waveform_setup(sparse.value()))?;
		thread::sleep(timing.waveform_setup_settle);
		self.write(commands::WAVEFORM_MEMORY_DEPTH)?;
		thread::sleep(timing.waveform_setup_settle);

		let settle = timing.waveform_transfer_settle;
		self.with_timeout(timing.waveform_timeout, |scope| {
			scope.write(&commands::waveform_data(ch))?;
			thread::sleep(settle);
			let started = Instant::now();
			let raw:Vec<u8> = scope.read_raw()?;
			debug!("Waveform transfer: {} bytes in {:?}", raw.len(), started.elapsed());
			Ok(raw)
		}).map_err(capture_error)
	}

	fn volts_per_div(&mut self, ch:Channel) -> Result<f64, ScopeError> {
		let reply:String = self.query(&commands::channel_query(ch, "VDIV"))?;
		match parse_measurement(reply_value(&reply)) {
			Some(v) if v > 0.0 => Ok(v),
			_ => {
				warn!("Couldn't read V/div from \"{}\", assuming {} V/div", reply, FALLBACK_VOLTS_PER_DIV);
				Ok(FALLBACK_VOLTS_PER_DIV)
			},
		}
	}

	fn query_number(&mut self, cmd:&str) -> Option<f64> {
		match self.query(cmd) {
			Ok(reply) => parse_measurement(reply_value(&reply)),
			Err(e) => {
				debug!("{} failed: {}", cmd, e);
				None
			},
		}
	}

}

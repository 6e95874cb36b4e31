// Siglent SDS oscilloscopes. One blocking request/response at a time over the owned link.

use std::convert::TryFrom;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::ScopeError;
use crate::transport::{Connector, NetConnector, Resource, Transport};

pub mod commands;
pub mod measure;
pub mod models;
pub mod waveform;

use self::models::*;

pub const DEFAULT_TIMEOUT_MS:u64 = 5000;
pub const DEFAULT_CHANNEL_COUNT:u8 = 2;

// Blocking pauses the instrument needs after certain commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
	pub auto_setup_settle: Duration,
	pub reset_settle: Duration,
	pub screen_settle: Duration,
	pub screen_timeout: Duration,
	pub waveform_setup_settle: Duration,
	pub waveform_transfer_settle: Duration,
	pub waveform_timeout: Duration,
}

impl Default for Timing {
	fn default() -> Self {
		Self {
			auto_setup_settle:        Duration::from_secs(3),
			reset_settle:             Duration::from_secs(4),
			screen_settle:            Duration::from_millis(500),
			screen_timeout:           Duration::from_secs(10),
			waveform_setup_settle:    Duration::from_millis(300),
			waveform_transfer_settle: Duration::from_secs(2),
			waveform_timeout:         Duration::from_secs(60),
		}
	}
}

impl Timing {
	// No settling at all. Only sensible against a simulated instrument.
	pub fn immediate() -> Self {
		Self {
			auto_setup_settle:        Duration::from_secs(0),
			reset_settle:             Duration::from_secs(0),
			screen_settle:            Duration::from_secs(0),
			waveform_setup_settle:    Duration::from_secs(0),
			waveform_transfer_settle: Duration::from_secs(0),
			..Self::default()
		}
	}
}

pub struct Sds {
	address: String,
	timeout: Duration,
	channel_count: u8,
	timing: Timing,
	connector: Box<dyn Connector>,
	transport: Option<Box<dyn Transport>>,
	connected: bool,
	identity: Option<Identity>,
}

// "C1:VDIV 2.00E+00V" -> "2.00E+00V"; replies without a header come back whole
pub(crate) fn reply_value(reply:&str) -> &str {
	let reply = reply.trim();
	match reply.find(char::is_whitespace) {
		Some(i) => reply[i..].trim(),
		None    => reply,
	}
}

fn capture_error(e:ScopeError) -> ScopeError {
	match e {
		ScopeError::NotConnected => e,
		other => ScopeError::Capture(other.into_io()),
	}
}

impl Sds {

	// Creates an unconnected driver for a resource address such as `TCPIP0::192.168.1.5::inst0::INSTR`.
	pub fn new(address:&str, timeout:Duration) -> Self {
		Self {
			address: address.to_owned(),
			timeout,
			channel_count: DEFAULT_CHANNEL_COUNT,
			timing: Timing::default(),
			connector: Box::new(NetConnector),
			transport: None,
			connected: false,
			identity: None,
		}
	}

	pub fn with_connector<C:Connector + 'static>(mut self, connector:C) -> Self { self.connector = Box::new(connector); self }
	pub fn with_timing(mut self, timing:Timing) -> Self { self.timing = timing; self }
	pub fn with_channel_count(mut self, n:u8) -> Self { self.channel_count = n.max(1).min(Channel::MAX); self }

	pub fn address(&self) -> &str { &self.address }
	pub fn timeout(&self) -> Duration { self.timeout }
	pub fn timing(&self) -> &Timing { &self.timing }
	pub fn channel_count(&self) -> u8 { self.channel_count }
	pub fn is_connected(&self) -> bool { self.connected }
	pub fn identity(&self) -> Option<&Identity> { self.identity.as_ref() }

	pub fn connect(&mut self) -> Result<(), ScopeError> {
		if self.connected {
			debug!("Already connected to {}", self.address);
			return Ok(());
		}

		info!("Connecting to oscilloscope at {}", self.address);
		match self.open_and_identify() {
			Ok(identity) => {
				info!("Connected to {} {} (serial {}, firmware {})", identity.manufacturer, identity.model, identity.serial_number, identity.firmware_version);
				self.identity = Some(identity);
				Ok(())
			},
			Err(e) => {
				self.connected = false;
				if let Some(mut t) = self.transport.take() {
					if let Err(close_err) = t.close() { debug!("Closing half-open transport failed: {}", close_err); }
				}
				warn!("Connection to {} failed: {}", self.address, e);
				Err(ScopeError::Connection{ address: self.address.clone(), source: e.into_io() })
			},
		}
	}

	fn open_and_identify(&mut self) -> Result<Identity, ScopeError> {
		let resource = Resource::parse(&self.address)?;
		let transport = self.connector.open(&resource, self.timeout)?;
		self.transport = Some(transport);
		// query() checks the flag, so it has to be up before the identity check
		self.connected = true;
		let idn:String = self.query(commands::IDENTIFY)?;
		Ok(Identity::parse(&idn))
	}

	// Always leaves the driver disconnected; safe to call repeatedly.
	pub fn disconnect(&mut self) {
		if let Some(mut t) = self.transport.take() {
			match t.close() {
				Ok(()) => info!("Disconnected from {}", self.address),
				Err(e) => warn!("Error while closing connection to {}: {}", self.address, e),
			}
		}
		self.connected = false;
		self.identity = None;
	}

	fn link(&mut self) -> Result<&mut (dyn Transport + 'static), ScopeError> {
		if !self.connected { return Err(ScopeError::NotConnected); }
		self.transport.as_deref_mut().ok_or(ScopeError::NotConnected)
	}

	pub(crate) fn ensure_connected(&self) -> Result<(), ScopeError> {
		if self.connected && self.transport.is_some() { Ok(()) } else { Err(ScopeError::NotConnected) }
	}

	pub fn write(&mut self, cmd:&str) -> Result<(), ScopeError> {
		self.link()?.write(cmd.as_bytes())?;
		debug!("Sent: {}", cmd);
		Ok(())
	}

	pub fn query(&mut self, cmd:&str) -> Result<String, ScopeError> {
		let link = self.link()?;
		link.write(cmd.as_bytes())?;
		let reply:Vec<u8> = link.read()?;
		let text:String = String::from_utf8_lossy(&reply).trim().to_owned();
		debug!("Query: {} -> {}", cmd, text);
		Ok(text)
	}

	pub fn read_raw(&mut self) -> Result<Vec<u8>, ScopeError> {
		let data:Vec<u8> = self.link()?.read()?;
		debug!("Read {} raw bytes", data.len());
		Ok(data)
	}

	// Runs `f` with the transport timeout raised to `timeout`; the previous timeout is put back
	// whether or not `f` succeeds.
	pub(crate) fn with_timeout<T, F>(&mut self, timeout:Duration, f:F) -> Result<T, ScopeError>
	where F: FnOnce(&mut Self) -> Result<T, ScopeError> {
		let previous:Duration = {
			let link = self.link()?;
			let previous = link.timeout();
			link.set_timeout(timeout)?;
			previous
		};

		let result = f(self);

		if let Some(link) = self.transport.as_deref_mut() {
			if let Err(e) = link.set_timeout(previous) {
				warn!("Unable to restore timeout to {:?}: {}", previous, e);
			}
		}
		result
	}

	// Configuration

	pub fn configure_channel(&mut self, config:&ChannelConfig) -> Result<(), ScopeError> {
		let ch = config.channel;
		self.write(&commands::channel_trace(ch, config.enabled))?;
		self.write(&commands::channel_vdiv(ch, &config.voltage_div))?;
		self.write(&commands::channel_offset(ch, &config.offset))?;
		self.write(&commands::channel_coupling(ch, config.coupling))?;
		self.write(&commands::channel_probe(ch, config.probe_ratio))?;
		self.write(&commands::channel_bwl(ch, config.bandwidth_limit))?;
		info!("Configured channel {}: {}/div, {} coupling", ch, config.voltage_div, config.coupling.mnemonic());
		Ok(())
	}

	pub fn configure_timebase(&mut self, config:&TimebaseConfig) -> Result<(), ScopeError> {
		self.write(&commands::time_div(&config.time_div))?;
		self.write(&commands::time_delay(&config.delay))?;
		info!("Configured timebase: {}/div, delay {}", config.time_div, config.delay);
		Ok(())
	}

	pub fn configure_trigger(&mut self, config:&TriggerConfig) -> Result<(), ScopeError> {
		let ch = config.source;
		self.write(&commands::trigger_select(config.trigger_type, ch, config.slope))?;
		self.write(&commands::trigger_mode(config.mode))?;
		self.write(&commands::trigger_level(ch, &config.level))?;
		if let Some(holdoff) = &config.holdoff {
			self.write(&commands::trigger_holdoff(holdoff))?;
		}
		info!("Configured trigger: C{} {} {} at {}", ch, config.mode.mnemonic(), config.slope.mnemonic(), config.level);
		Ok(())
	}

	// Single-field setters
	pub fn enable_channel(&mut self, ch:Channel, enabled:bool) -> Result<(), ScopeError> { self.write(&commands::channel_trace(ch, enabled)) }
	pub fn set_voltage_scale(&mut self, ch:Channel, vdiv:&str) -> Result<(), ScopeError>  { self.write(&commands::channel_vdiv(ch, vdiv)) }
	pub fn set_voltage_offset(&mut self, ch:Channel, ofst:&str) -> Result<(), ScopeError> { self.write(&commands::channel_offset(ch, ofst)) }
	pub fn set_time_scale(&mut self, tdiv:&str) -> Result<(), ScopeError>                 { self.write(&commands::time_div(tdiv)) }
	pub fn set_trigger_mode(&mut self, mode:TriggerMode) -> Result<(), ScopeError>        { self.write(&commands::trigger_mode(mode)) }

	// One-liners
	pub fn arm_trigger(&mut self) -> Result<(), ScopeError>      { self.write(commands::ARM_ACQUISITION) }
	pub fn stop_acquisition(&mut self) -> Result<(), ScopeError> { self.write(commands::STOP_ACQUISITION) }
	pub fn clear_status(&mut self) -> Result<(), ScopeError>     { self.write(commands::CLEAR_STATUS) }

	pub fn auto_setup(&mut self) -> Result<(), ScopeError> {
		self.write(commands::AUTO_SETUP)?;
		thread::sleep(self.timing.auto_setup_settle);
		info!("Auto setup completed");
		Ok(())
	}

	pub fn reset(&mut self) -> Result<(), ScopeError> {
		self.write(commands::RESET)?;
		thread::sleep(self.timing.reset_settle);
		info!("Oscilloscope reset to defaults");
		Ok(())
	}

	// Readback

	pub fn get_channel_config(&mut self, ch:Channel) -> Result<ChannelReadback, ScopeError> {
		Ok(ChannelReadback {
			voltage_div: self.query(&commands::channel_query(ch, "VDIV"))?,
			coupling:    self.query(&commands::channel_query(ch, "CPL"))?,
			probe_ratio: self.query(&commands::channel_query(ch, "ATTN"))?,
			offset:      self.query(&commands::channel_query(ch, "OFST"))?,
		})
	}

	pub fn get_timebase(&mut self) -> Result<TimebaseReadback, ScopeError> {
		Ok(TimebaseReadback {
			time_div: self.query(commands::TIME_DIV_QUERY)?,
			delay:    self.query(commands::TIME_DELAY_QUERY)?,
		})
	}

	fn query_value(&mut self, cmd:&str) -> Result<String, ScopeError> {
		let reply:String = self.query(cmd)?;
		Ok(reply_value(&reply).to_owned())
	}

	// Full snapshot of identity and configuration. Replies that don't decode fall back to defaults.
	pub fn get_status(&mut self) -> Result<ScopeStatus, ScopeError> {
		let identity = Identity::parse(&self.query(commands::IDENTIFY)?);

		let mut channels:Vec<ChannelConfig> = vec![];
		for ch in Channel::first(self.channel_count) {
			channels.push(self.read_channel_state(ch)?);
		}

		let mut timebase = TimebaseConfig::new(self.query_value(commands::TIME_DIV_QUERY)?);
		timebase.delay = self.query_value(commands::TIME_DELAY_QUERY)?;
		timebase.sample_rate = Some(self.query_value(commands::SAMPLE_RATE)?);

		let trigger = self.read_trigger_state()?;

		let sample_status:String = self.query_value(commands::SAMPLE_STATUS)?;
		let acquisition_running:bool = !sample_status.eq_ignore_ascii_case("Stop");

		let depth:String = self.query_value(commands::MEMORY_DEPTH_QUERY)?;
		let memory_depth:Option<u64> = measure::parse_measurement(&depth).filter(|d| *d >= 0.0).map(|d| d.round() as u64);
		if memory_depth.is_none() { debug!("Unrecognised memory depth \"{}\"", depth); }

		Ok(ScopeStatus {
			connected: true,
			manufacturer: identity.manufacturer,
			model: identity.model,
			serial_number: identity.serial_number,
			firmware_version: identity.firmware_version,
			channels,
			timebase,
			trigger,
			acquisition_running,
			memory_depth,
		})
	}

	fn read_channel_state(&mut self, ch:Channel) -> Result<ChannelConfig, ScopeError> {
		let trace:String = self.query_value(&commands::channel_query(ch, "TRA"))?;
		let vdiv:String  = self.query_value(&commands::channel_query(ch, "VDIV"))?;
		let ofst:String  = self.query_value(&commands::channel_query(ch, "OFST"))?;
		let cpl:String   = self.query_value(&commands::channel_query(ch, "CPL"))?;
		let attn:String  = self.query_value(&commands::channel_query(ch, "ATTN"))?;
		let bwl:String   = self.query_value(&commands::channel_query(ch, "BWL"))?;

		let coupling = Coupling::from_mnemonic(&cpl).unwrap_or_else(|| {
			debug!("Unrecognised coupling \"{}\" on C{}", cpl, ch);
			Coupling::default()
		});
		let probe_ratio = attn.parse::<f64>().ok()
			.and_then(|r| ProbeRatio::try_from(r.round() as u16).ok())
			.unwrap_or_else(|| {
				debug!("Unrecognised probe ratio \"{}\" on C{}", attn, ch);
				ProbeRatio::default()
			});

		Ok(ChannelConfig::new(ch)
			.enabled(trace.eq_ignore_ascii_case("ON"))
			.voltage_div(vdiv)
			.offset(ofst)
			.coupling(coupling)
			.probe_ratio(probe_ratio)
			.bandwidth_limit(bwl.eq_ignore_ascii_case("ON")))
	}

	// TRSE replies look like "TRSE EDGE,SR,C1,HT,OFF"
	fn read_trigger_state(&mut self) -> Result<TriggerConfig, ScopeError> {
		let select:String = self.query_value(commands::TRIGGER_SELECT_QUERY)?;
		let fields:Vec<&str> = select.split(',').map(str::trim).collect();

		let trigger_type = fields.first().and_then(|f| TriggerType::from_mnemonic(f)).unwrap_or_default();
		let source = fields.iter()
			.filter_map(|f| f.strip_prefix('C').or_else(|| f.strip_prefix('c')))
			.filter_map(|n| n.parse::<u8>().ok())
			.find_map(|n| Channel::try_from(n).ok())
			.unwrap_or_else(|| {
				debug!("No source channel in \"{}\"", select);
				Channel::default()
			});

		let mode_reply:String = self.query_value(commands::TRIGGER_MODE_QUERY)?;
		let mode = TriggerMode::from_mnemonic(&mode_reply).unwrap_or_default();
		let level:String = self.query_value(&commands::channel_query(source, "TRLV"))?;
		let slope_reply:String = self.query_value(&commands::channel_query(source, "TRSL"))?;
		let slope = TriggerSlope::from_mnemonic(&slope_reply).unwrap_or_default();

		Ok(TriggerConfig::new(source).mode(mode).trigger_type(trigger_type).slope(slope).level(level))
	}

	// Screen

	// Dumps the display. The instrument decides the image format; see `ImageFormat::sniff`.
	pub fn capture_screen(&mut self) -> Result<Vec<u8>, ScopeError> {
		self.ensure_connected()?;
		let timing:Timing = self.timing;

		info!("Requesting screen capture");
		let data:Vec<u8> = self.with_timeout(timing.screen_timeout, |scope| {
			scope.write(commands::SCREEN_DUMP)?;
			thread::sleep(timing.screen_settle);
			scope.read_raw()
		}).map_err(capture_error)?;

		info!("Received screen capture: {} bytes", data.len());
		Ok(data)
	}

	pub fn capture_screen_image(&mut self) -> Result<ScreenCapture, ScopeError> {
		self.capture_screen().map(ScreenCapture::new)
	}

}

impl Drop for Sds {
	fn drop(&mut self) { self.disconnect(); }
}

mod common;

use std::convert::TryFrom;
use std::io::ErrorKind;
use std::time::Duration;

use serde_json::json;

use common::{dat2_block, MockInstrument, TIMEOUT};
use scopelink::devices::sds::measure::parse_measurement;
use scopelink::tools::{self, ToolOutput};
use scopelink::{
	Channel, ChannelConfig, Coupling, ImageFormat, ProbeRatio, ScopeError, TimebaseConfig, ToolError,
	TriggerConfig, TriggerMode, TriggerSlope,
};

fn ch(n:u8) -> Channel { Channel::try_from(n).unwrap() }

fn sine(n:usize) -> Vec<i8> {
	(0..n).map(|i| (100.0 * (2.0 * std::f64::consts::PI * i as f64 / 250.0).sin()).round() as i8).collect()
}

const VOLTAGE_PARAMS:[&str; 6] = ["PKPK", "AMPL", "MAX", "MIN", "MEAN", "RMS"];

#[test]
fn configure_channel_sends_fields_verbatim_in_order() {
	let mock = MockInstrument::new();
	let mut scope = mock.connected_scope();

	let config = ChannelConfig::new(ch(1)).voltage_div("2V").coupling(Coupling::Dc1M);
	scope.configure_channel(&config).unwrap();

	assert_eq!(mock.writes(), vec!["C1:TRA ON", "C1:VDIV 2V", "C1:OFST 0V", "C1:CPL D1M", "C1:ATTN 1", "C1:BWL OFF"]);
}

#[test]
fn configure_timebase_and_trigger() {
	let mock = MockInstrument::new();
	let mut scope = mock.connected_scope();

	scope.configure_timebase(&TimebaseConfig::new("500US").delay("-1MS")).unwrap();
	let trigger = TriggerConfig::new(ch(2)).mode(TriggerMode::Normal).slope(TriggerSlope::Falling).level("1.5V");
	scope.configure_trigger(&trigger).unwrap();
	scope.configure_trigger(&trigger.clone().holdoff("100NS")).unwrap();

	assert_eq!(mock.writes(), vec![
		"TDIV 500US", "TRDL -1MS",
		"TRSE EDGE,SR,C2,NEG,OFF", "TRMD NORM", "C2:TRLV 1.5V",
		"TRSE EDGE,SR,C2,NEG,OFF", "TRMD NORM", "C2:TRLV 1.5V", "TRHLD 100NS",
	]);
}

#[test]
fn single_field_setters_and_acquisition_control() {
	let mock = MockInstrument::new();
	let mut scope = mock.connected_scope();

	scope.enable_channel(ch(3), false).unwrap();
	scope.set_voltage_scale(ch(3), "200MV").unwrap();
	scope.set_voltage_offset(ch(3), "-1V").unwrap();
	scope.set_time_scale("10US").unwrap();
	scope.set_trigger_mode(TriggerMode::Single).unwrap();
	scope.arm_trigger().unwrap();
	scope.stop_acquisition().unwrap();
	scope.clear_status().unwrap();
	scope.auto_setup().unwrap();
	scope.reset().unwrap();

	assert_eq!(mock.writes(), vec![
		"C3:TRA OFF", "C3:VDIV 200MV", "C3:OFST -1V", "TDIV 10US", "TRMD SINGLE",
		"ARM", "STOP", "*CLS", "ASET", "*RST",
	]);
}

#[test]
fn configure_then_measure_falls_back_to_waveform_statistics() {
	let mock = MockInstrument::new();
	mock.reply("CYMOMETER?", "CYMT ****");
	for p in VOLTAGE_PARAMS.iter() {
		mock.reply(&format!("C1:PAVA? {}", p), &format!("C1:PAVA {},****", p));
	}
	let samples = sine(2500);
	mock.reply_bytes("C1:WF? DAT2", dat2_block(1, &samples));
	mock.reply("C1:VDIV?", "C1:VDIV 2.00E+00V");
	mock.reply("SARA?", "SARA 1.00GSa/s");

	let mut scope = mock.connected_scope();
	scope.configure_channel(&ChannelConfig::new(ch(1)).voltage_div("2V").coupling(Coupling::Dc1M)).unwrap();
	let m = scope.measure_channel(ch(1)).unwrap();

	let volts:Vec<f64> = samples.iter().map(|&s| s as f64 / 25.0 * 2.0).collect();
	let max = volts.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
	let min = volts.iter().cloned().fold(f64::INFINITY, f64::min);
	let mean = volts.iter().sum::<f64>() / volts.len() as f64;
	let rms = (volts.iter().map(|v| v * v).sum::<f64>() / volts.len() as f64).sqrt();

	assert_eq!(m.peak_to_peak, Some(max - min));
	assert_eq!(m.peak_to_peak, Some(16.0));
	assert_eq!(m.amplitude, Some((max - min) / 2.0));
	assert_eq!(m.maximum, Some(max));
	assert_eq!(m.minimum, Some(min));
	assert_eq!(m.mean, Some(mean));
	assert_eq!(m.rms, Some(rms));
	assert_eq!(m.frequency, None);
	assert_eq!(m.period, None);
	assert_eq!(m.rise_time, None);

	let writes = mock.writes();
	let setup = writes.iter().position(|w| w == "WFSU SP,4,NP,0,FP,0").expect("sparse setup");
	let reset = writes.iter().position(|w| w == "WFSU SP,0,NP,0,FP,0").expect("sparse reset");
	assert!(setup < reset);
}

#[test]
fn valid_parameters_skip_the_fallback() {
	let mock = MockInstrument::new();
	mock.reply("CYMOMETER?", "CYMT 1.00KHz");
	mock.reply("C1:PAVA? PKPK", "C1:PAVA PKPK,3.20E+00V");
	mock.reply("C1:PAVA? AMPL", "C1:PAVA AMPL,****");
	mock.reply("C1:PAVA? RISE", "C1:PAVA RISE,2.00E-06S");

	let mut scope = mock.connected_scope();
	let m = scope.measure_channel(ch(1)).unwrap();

	assert_eq!(m.frequency, Some(1000.0));
	assert_eq!(m.period, Some(0.001));
	assert_eq!(m.peak_to_peak, Some(3.2));
	assert_eq!(m.amplitude, None);
	assert_eq!(m.rise_time, Some(2.0e-6));
	assert!(!mock.writes().iter().any(|w| w.contains("WF?")));
}

#[test]
fn sentinel_amplitude_is_absent_not_an_error() {
	assert_eq!(parse_measurement("C2:PAVA AMPL,****"), None);

	let mock = MockInstrument::new();
	mock.reply("C2:PAVA? AMPL", "C2:PAVA AMPL,****");
	mock.reply("C2:PAVA? MEAN", "C2:PAVA MEAN,1.20E-01V");

	let mut scope = mock.connected_scope();
	let m = scope.measure_channel(ch(2)).unwrap();
	assert_eq!(m.channel, ch(2));
	assert_eq!(m.amplitude, None);
	assert_eq!(m.mean, Some(0.12));
}

#[test]
fn broken_link_mid_configure_keeps_earlier_commands() {
	let mock = MockInstrument::new();
	mock.fail_write("C1:OFST");
	let mut scope = mock.connected_scope();

	let config = ChannelConfig::new(ch(1)).voltage_div("2V");
	match scope.configure_channel(&config) {
		Err(ScopeError::Transport(e)) => assert_eq!(e.kind(), ErrorKind::BrokenPipe),
		other => panic!("expected a transport error, got {:?}", other),
	}
	assert_eq!(mock.writes(), vec!["C1:TRA ON", "C1:VDIV 2V"]);
	assert!(scope.is_connected());
}

#[test]
fn transport_failures_surface_from_io_calls() {
	let mock = MockInstrument::new();
	mock.fail_write("ARM");
	let mut scope = mock.connected_scope();

	assert!(matches!(scope.write("ARM"), Err(ScopeError::Transport(_))));
	assert!(matches!(scope.query("ARM"), Err(ScopeError::Transport(_))));
	match scope.read_raw() {
		Err(ScopeError::Transport(e)) => assert_eq!(e.kind(), ErrorKind::TimedOut),
		other => panic!("expected a transport error, got {:?}", other),
	}
}

#[test]
fn one_failed_parameter_only_loses_that_field() {
	let mock = MockInstrument::new();
	mock.fail_write("C1:PAVA? PKPK");
	mock.reply("C1:PAVA? AMPL", "C1:PAVA AMPL,1.60E+00V");
	mock.reply("C1:PAVA? MEAN", "C1:PAVA MEAN,-2.00E-02V");

	let mut scope = mock.connected_scope();
	let m = scope.measure_channel(ch(1)).unwrap();

	assert_eq!(m.peak_to_peak, None);
	assert_eq!(m.amplitude, Some(1.6));
	assert_eq!(m.mean, Some(-0.02));
	assert!(mock.writes().iter().any(|w| w == "C1:PAVA? RMS"));
	assert!(!mock.writes().iter().any(|w| w.contains("WF?")));
}

#[test]
fn screen_capture_restores_timeout() {
	let mock = MockInstrument::new();
	let png:Vec<u8> = b"\x89PNG\r\n\x1a\n\0\0\0\0IEND\xae\x42\x60\x82".to_vec();
	mock.reply_bytes("SCDP", png.clone());

	let mut scope = mock.connected_scope();
	let image = scope.capture_screen_image().unwrap();

	assert_eq!(image.data, png);
	assert_eq!(image.format, ImageFormat::Png);
	assert_eq!(mock.timeout_history(), vec![Duration::from_secs(10), TIMEOUT]);
	assert_eq!(mock.current_timeout(), TIMEOUT);
}

#[test]
fn failed_screen_capture_still_restores_timeout() {
	let mock = MockInstrument::new();
	mock.fail("SCDP");

	let mut scope = mock.connected_scope();
	assert!(matches!(scope.capture_screen(), Err(ScopeError::Capture(_))));
	assert_eq!(mock.current_timeout(), TIMEOUT);
	assert!(scope.is_connected());
}

#[test]
fn disconnected_driver_never_touches_the_transport() {
	let mock = MockInstrument::new();
	let mut scope = mock.scope();

	assert!(matches!(scope.query("*IDN?"), Err(ScopeError::NotConnected)));
	assert!(matches!(scope.write("ARM"), Err(ScopeError::NotConnected)));
	assert!(matches!(scope.read_raw(), Err(ScopeError::NotConnected)));
	assert!(matches!(scope.measure_channel(ch(1)), Err(ScopeError::NotConnected)));
	assert!(matches!(scope.capture_waveform(ch(1), 500), Err(ScopeError::NotConnected)));
	assert!(matches!(scope.get_status(), Err(ScopeError::NotConnected)));
	assert_eq!(mock.opens(), 0);
	assert!(mock.writes().is_empty());
}

#[test]
fn failed_identification_leaves_driver_disconnected() {
	let mock = MockInstrument::new();
	mock.fail("*IDN?");
	let mut scope = mock.scope();

	match scope.connect() {
		Err(ScopeError::Connection{ address, source }) => {
			assert_eq!(address, common::ADDRESS);
			assert_eq!(source.kind(), std::io::ErrorKind::TimedOut);
		},
		other => panic!("unexpected {:?}", other),
	}
	assert!(!scope.is_connected());
	assert_eq!(mock.closes(), 1);
	assert!(matches!(scope.write("ARM"), Err(ScopeError::NotConnected)));
}

#[test]
fn refused_connection() {
	let mock = MockInstrument::new();
	mock.refuse_connections();
	let mut scope = mock.scope();
	assert!(matches!(scope.connect(), Err(ScopeError::Connection{ .. })));
	assert!(!scope.is_connected());
}

#[test]
fn connect_records_identity_and_disconnect_is_idempotent() {
	let mock = MockInstrument::new();
	let mut scope = mock.scope();
	scope.connect().unwrap();

	assert!(scope.is_connected());
	assert_eq!(scope.identity().unwrap().model, "SDS1104X-E");

	scope.disconnect();
	scope.disconnect();
	assert!(!scope.is_connected());
	assert_eq!(mock.closes(), 1);
}

#[test]
fn waveform_decodes_block_and_reads_scaling() {
	let mock = MockInstrument::new();
	mock.reply_bytes("C1:WF? DAT2", dat2_block(1, &[0, 25, -25, 50]));
	mock.reply("C1:VDIV?", "C1:VDIV 5.00E-01V");
	mock.reply("C1:OFST?", "C1:OFST -1.00E+00V");
	mock.reply("TDIV?", "TDIV 1.00E-03S");
	mock.reply("SARA?", "SARA 1.00GSa/s");

	let mut scope = mock.connected_scope();
	let w = scope.capture_waveform(ch(1), 100).unwrap();

	assert_eq!(w.data_points(), &[0.0, 0.5, -0.5, 1.0]);
	assert_eq!(w.num_points(), 4);
	assert_eq!(w.time_points().len(), 4);
	assert_eq!(w.voltage_scale(), 0.5);
	assert_eq!(w.voltage_offset(), -1.0);
	assert_eq!(w.time_scale(), 1e-3);
	assert_eq!(w.sample_rate(), 1e8);

	assert_eq!(&mock.writes()[..3], &["WFSU SP,10,NP,0,FP,0", "MSIZ 7K", "C1:WF? DAT2"]);
	assert_eq!(mock.timeout_history(), vec![Duration::from_secs(60), TIMEOUT]);
}

#[test]
fn waveform_without_scaling_replies_uses_fallbacks() {
	let mock = MockInstrument::new();
	mock.reply_bytes("C3:WF? DAT2", dat2_block(3, &[25, -25]));
	mock.reply("C3:VDIV?", "C3:VDIV ????");

	let mut scope = mock.connected_scope();
	let w = scope.capture_waveform(ch(3), 1400).unwrap();

	assert_eq!(w.data_points(), &[1.0, -1.0]);
	assert_eq!(w.sample_rate(), 1e9);
	assert_eq!(w.voltage_offset(), 0.0);
	assert_eq!(w.time_points(), &[0.0, 1e-9]);
}

#[test]
fn failed_waveform_transfer_is_a_capture_error() {
	let mock = MockInstrument::new();
	mock.fail("C1:WF? DAT2");

	let mut scope = mock.connected_scope();
	assert!(matches!(scope.capture_waveform(ch(1), 1000), Err(ScopeError::Capture(_))));
	assert_eq!(mock.current_timeout(), TIMEOUT);
	assert_eq!(mock.writes().last().map(String::as_str), Some("WFSU SP,0,NP,0,FP,0"));
}

#[test]
fn garbage_waveform_reply_gives_empty_waveform() {
	let mock = MockInstrument::new();
	mock.reply("C1:WF? DAT2", "C1:WF ALL,nothing here");
	mock.reply("C1:VDIV?", "C1:VDIV 1.00E+00V");

	let mut scope = mock.connected_scope();
	let w = scope.capture_waveform(ch(1), 1000).unwrap();
	assert!(w.is_empty());
	assert!(w.time_points().is_empty());
}

#[test]
fn readbacks_are_raw_strings() {
	let mock = MockInstrument::new();
	mock.reply("C1:VDIV?", "C1:VDIV 2.00E+00V");
	mock.reply("C1:CPL?", "C1:CPL D1M");
	mock.reply("C1:ATTN?", "C1:ATTN 10");
	mock.reply("C1:OFST?", "C1:OFST 0.00E+00V");
	mock.reply("TDIV?", "TDIV 1.00E-03S");
	mock.reply("TRDL?", "TRDL 0.00E+00S");

	let mut scope = mock.connected_scope();
	let c = scope.get_channel_config(ch(1)).unwrap();
	assert_eq!(c.voltage_div, "C1:VDIV 2.00E+00V");
	assert_eq!(c.probe_ratio, "C1:ATTN 10");
	assert_eq!(scope.get_timebase().unwrap().time_div, "TDIV 1.00E-03S");
}

fn script_status(mock:&MockInstrument) {
	for n in 1..=2u8 {
		mock.reply(&format!("C{}:TRA?", n), &format!("C{}:TRA {}", n, if n == 1 { "ON" } else { "OFF" }));
		mock.reply(&format!("C{}:VDIV?", n), &format!("C{}:VDIV 5.00E-01V", n));
		mock.reply(&format!("C{}:OFST?", n), &format!("C{}:OFST 0.00E+00V", n));
		mock.reply(&format!("C{}:CPL?", n), &format!("C{}:CPL A1M", n));
		mock.reply(&format!("C{}:ATTN?", n), &format!("C{}:ATTN 10", n));
		mock.reply(&format!("C{}:BWL?", n), &format!("C{}:BWL OFF", n));
	}
	mock.reply("TDIV?", "TDIV 1.00E-03S");
	mock.reply("TRDL?", "TRDL 0.00E+00S");
	mock.reply("SARA?", "SARA 500MSa/s");
	mock.reply("TRSE?", "TRSE EDGE,SR,C2,HT,OFF");
	mock.reply("TRMD?", "TRMD NORM");
	mock.reply("C2:TRLV?", "C2:TRLV 1.50E+00V");
	mock.reply("C2:TRSL?", "C2:TRSL NEG");
	mock.reply("SAST?", "SAST Trig'd");
	mock.reply("MSIZ?", "MSIZ 14K");
}

#[test]
fn status_snapshot() {
	let mock = MockInstrument::new();
	script_status(&mock);

	let mut scope = mock.connected_scope();
	let status = scope.get_status().unwrap();

	assert!(status.connected);
	assert_eq!(status.model, "SDS1104X-E");
	assert_eq!(status.channels.len(), 2);
	assert!(status.channels[0].enabled);
	assert!(!status.channels[1].enabled);
	assert_eq!(status.channels[0].coupling, Coupling::Ac1M);
	assert_eq!(status.channels[0].probe_ratio, ProbeRatio::X10);
	assert_eq!(status.timebase.time_div, "1.00E-03S");
	assert_eq!(status.timebase.sample_rate.as_deref(), Some("500MSa/s"));
	assert_eq!(status.trigger.source, ch(2));
	assert_eq!(status.trigger.mode, TriggerMode::Normal);
	assert_eq!(status.trigger.slope, TriggerSlope::Falling);
	assert_eq!(status.trigger.level, "1.50E+00V");
	assert!(status.acquisition_running);
	assert_eq!(status.memory_depth, Some(14000));
}

#[test]
fn stopped_acquisition_in_status() {
	let mock = MockInstrument::new();
	script_status(&mock);
	mock.reply("SAST?", "SAST Stop");

	let mut scope = mock.connected_scope();
	assert!(!scope.get_status().unwrap().acquisition_running);
}

#[test]
fn tools_dispatch_to_the_driver() {
	let mock = MockInstrument::new();
	let mut scope = mock.connected_scope();

	let out = tools::invoke(&mut scope, "set_channel_config", json!({ "channel": 1, "voltage_div": "500MV", "coupling": "AC_1M" })).unwrap();
	assert_eq!(out, ToolOutput::Message("Channel 1 configured: 500MV/div, A1M coupling".to_owned()));
	assert!(mock.writes().contains(&"C1:VDIV 500MV".to_owned()));
	assert!(mock.writes().contains(&"C1:CPL A1M".to_owned()));

	tools::invoke_text(&mut scope, "set_timebase", "100 microseconds please").unwrap();
	assert!(mock.writes().contains(&"TDIV 100US".to_owned()));

	assert!(matches!(tools::invoke(&mut scope, "self_destruct", json!({})), Err(ToolError::UnknownOperation(_))));
	assert!(matches!(tools::invoke(&mut scope, "measure_channel", json!({ "channel": 9 })), Err(ToolError::InvalidArguments(_))));
	assert!(matches!(tools::invoke_text(&mut scope, "capture_screen", "now"), Err(ToolError::Intent(_))));
}

#[test]
fn tool_errors_wrap_driver_errors() {
	let mock = MockInstrument::new();
	let mut scope = mock.scope();
	assert!(matches!(tools::invoke(&mut scope, "auto_setup", json!(null)), Err(ToolError::Scope(ScopeError::NotConnected))));
}

#[test]
fn resources_read_through_the_driver() {
	let mock = MockInstrument::new();
	mock.reply("C1:VDIV?", "C1:VDIV 2.00E+00V");
	mock.reply("C1:CPL?", "C1:CPL D1M");
	mock.reply("C1:ATTN?", "C1:ATTN 1");
	mock.reply("C1:OFST?", "C1:OFST 0.00E+00V");

	let mut scope = mock.connected_scope();
	let config = tools::read_resource(&mut scope, "scope://channels/1/config").unwrap();
	assert_eq!(config["channel"], 1);
	assert_eq!(config["coupling"], "C1:CPL D1M");

	assert!(matches!(tools::read_resource(&mut scope, "scope://channels/7/config"), Err(ToolError::UnknownResource(_))));
	assert!(matches!(tools::read_resource(&mut scope, "scope://nowhere"), Err(ToolError::UnknownResource(_))));
}

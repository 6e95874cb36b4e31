// Command catalog for the SDS series. Fixed commands are constants; anything scoped to a channel
// or carrying a value is built by a function so the channel token and value land verbatim.

use super::models::{Channel, Coupling, ProbeRatio, TriggerMode, TriggerSlope, TriggerType};

// System
pub const IDENTIFY:&str     = "*IDN?";
pub const RESET:&str        = "*RST";
pub const CLEAR_STATUS:&str = "*CLS";

// Timebase
pub const TIME_DIV_QUERY:&str   = "TDIV?";
pub const TIME_DELAY_QUERY:&str = "TRDL?";
pub const SAMPLE_RATE:&str      = "SARA?";

// Trigger
pub const TRIGGER_MODE_QUERY:&str   = "TRMD?";
pub const TRIGGER_SELECT_QUERY:&str = "TRSE?";

// Measurement. The frequency counter is more dependable than PAVA? FREQ on this family
pub const CYMOMETER:&str     = "CYMOMETER?";
pub const CYMOMETER_TAG:&str = "CYMT";

// Acquisition
pub const ARM_ACQUISITION:&str  = "ARM";
pub const STOP_ACQUISITION:&str = "STOP";
pub const AUTO_SETUP:&str       = "ASET";
pub const SAMPLE_STATUS:&str    = "SAST?";
pub const MEMORY_DEPTH_QUERY:&str = "MSIZ?";

// Smallest memory depth; keeps DAT2 transfers short
pub const WAVEFORM_MEMORY_DEPTH:&str = "MSIZ 7K";

// Screen capture
pub const SCREEN_DUMP:&str = "SCDP";

// Raw samples per vertical division in DAT2 data
pub const SAMPLES_PER_DIVISION:f64 = 25.0;

pub const VOLTAGE_SCALES:[&str; 14] = [
	"500UV", "1MV", "2MV", "5MV", "10MV", "20MV", "50MV",
	"100MV", "200MV", "500MV", "1V", "2V", "5V", "10V",
];

pub const TIME_SCALES:[&str; 34] = [
	"1NS", "2NS", "5NS", "10NS", "20NS", "50NS", "100NS", "200NS", "500NS",
	"1US", "2US", "5US", "10US", "20US", "50US", "100US", "200US", "500US",
	"1MS", "2MS", "5MS", "10MS", "20MS", "50MS", "100MS", "200MS", "500MS",
	"1S", "2S", "5S", "10S", "20S", "50S", "100S",
];

// Parameters readable through `C<n>:PAVA?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
	Frequency,
	Period,
	PeakToPeak,
	Amplitude,
	Maximum,
	Minimum,
	Mean,
	Rms,
	RiseTime,
	FallTime,
	PositiveWidth,
	NegativeWidth,
}

impl Parameter {
	pub fn mnemonic(self) -> &'static str {
		match self {
			Parameter::Frequency     => "FREQ",
			Parameter::Period        => "PERI",
			Parameter::PeakToPeak    => "PKPK",
			Parameter::Amplitude     => "AMPL",
			Parameter::Maximum       => "MAX",
			Parameter::Minimum       => "MIN",
			Parameter::Mean          => "MEAN",
			Parameter::Rms           => "RMS",
			Parameter::RiseTime      => "RISE",
			Parameter::FallTime      => "FALL",
			Parameter::PositiveWidth => "PWID",
			Parameter::NegativeWidth => "NWID",
		}
	}
}

fn on_off(b:bool) -> &'static str { if b { "ON" } else { "OFF" } }

// Channel
pub fn channel_trace(ch:Channel, enabled:bool) -> String      { format!("C{}:TRA {}", ch, on_off(enabled)) }
pub fn channel_vdiv(ch:Channel, value:&str) -> String         { format!("C{}:VDIV {}", ch, value) }
pub fn channel_offset(ch:Channel, value:&str) -> String       { format!("C{}:OFST {}", ch, value) }
pub fn channel_coupling(ch:Channel, mode:Coupling) -> String  { format!("C{}:CPL {}", ch, mode.mnemonic()) }
pub fn channel_probe(ch:Channel, ratio:ProbeRatio) -> String  { format!("C{}:ATTN {}", ch, ratio.value()) }
pub fn channel_bwl(ch:Channel, limited:bool) -> String        { format!("C{}:BWL {}", ch, on_off(limited)) }

// e.g. channel_query(ch, "VDIV") -> "C1:VDIV?"
pub fn channel_query(ch:Channel, header:&str) -> String { format!("C{}:{}?", ch, header) }

// Timebase
pub fn time_div(value:&str) -> String   { format!("TDIV {}", value) }
pub fn time_delay(value:&str) -> String { format!("TRDL {}", value) }

// Trigger
pub fn trigger_select(kind:TriggerType, ch:Channel, slope:TriggerSlope) -> String {
	format!("TRSE {},SR,C{},{},OFF", kind.mnemonic(), ch, slope.mnemonic())
}
pub fn trigger_mode(mode:TriggerMode) -> String       { format!("TRMD {}", mode.mnemonic()) }
pub fn trigger_level(ch:Channel, level:&str) -> String { format!("C{}:TRLV {}", ch, level) }
pub fn trigger_holdoff(time:&str) -> String            { format!("TRHLD {}", time) }

// Measurement
pub fn parameter_value(ch:Channel, param:Parameter) -> String { format!("C{}:PAVA? {}", ch, param.mnemonic()) }

// Waveform transfer
pub fn waveform_setup(sparse:u32) -> String { format!("WFSU SP,{},NP,0,FP,0", sparse) }
pub fn waveform_data(ch:Channel) -> String  { format!("C{}:WF? DAT2", ch) }

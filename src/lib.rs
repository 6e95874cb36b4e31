// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol built on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// VXI-11 links and raw SCPI sockets behind one trait
pub mod transport;

// Instrument drivers
pub mod devices;

pub mod error;
pub mod config;

// Named operations and free-text argument decoding for agents and control-protocol servers
pub mod intent;
pub mod tools;
pub mod session;

pub use config::{load_config, load_config_or_default, AppConfig, Backend};
pub use devices::sds::{Sds, Timing};
pub use devices::sds::models::{
	Channel, ChannelConfig, ChannelReadback, Coupling, Identity, ImageFormat, Measurements,
	ProbeRatio, ScopeStatus, ScreenCapture, TimebaseConfig, TimebaseReadback, TriggerConfig,
	TriggerMode, TriggerSlope, TriggerType, WaveformData,
};
pub use error::{IntentError, ScopeError, ToolError};
pub use session::{ScreenshotState, Session};
pub use transport::{Connector, NetConnector, Resource, Transport};

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScopeError {
	#[error("Connection to {address} failed: {source}")]
	Connection { address: String, #[source] source: io::Error },
	#[error("Not connected to oscilloscope")]
	NotConnected,
	#[error("Transport error: {0}")]
	Transport(#[from] io::Error),
	#[error("Capture failed: {0}")]
	Capture(#[source] io::Error),
	#[error("Channel {0} out of range (1-4)")]
	InvalidChannel(u8),
}

impl ScopeError {
	// Flattens to the io cause so connect and capture can re-wrap whatever went wrong underneath
	pub(crate) fn into_io(self) -> io::Error {
		match self {
			ScopeError::Transport(e) | ScopeError::Capture(e) => e,
			ScopeError::Connection{ source, .. } => source,
			ScopeError::NotConnected => io::Error::new(io::ErrorKind::NotConnected, "Not connected to oscilloscope"),
			other @ ScopeError::InvalidChannel(_) => io::Error::new(io::ErrorKind::InvalidInput, other.to_string()),
		}
	}
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntentError {
	#[error("No channel number found in \"{0}\"")]
	NoChannel(String),
	#[error("No voltage found in \"{0}\"; try e.g. \"100mV\" or \"2 volts\"")]
	NoVoltage(String),
	#[error("No time found in \"{0}\"; try e.g. \"500us\" or \"1 millisecond\"")]
	NoTime(String),
	#[error("No trigger level found in \"{0}\"")]
	NoLevel(String),
	#[error("Operation {0} has no free-text form")]
	Unsupported(String),
}

#[derive(Error, Debug)]
pub enum ToolError {
	#[error("Unknown operation: {0}")]
	UnknownOperation(String),
	#[error("Unknown resource: {0}")]
	UnknownResource(String),
	#[error("Invalid arguments: {0}")]
	InvalidArguments(#[from] serde_json::Error),
	#[error(transparent)]
	Intent(#[from] IntentError),
	#[error(transparent)]
	Scope(#[from] ScopeError),
}

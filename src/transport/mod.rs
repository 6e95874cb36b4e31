// Links to an instrument: VXI-11 (TCPIP::host::inst0::INSTR) or a raw SCPI socket (TCPIP::host::5025::SOCKET)

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::vxi11::CoreClient;

pub mod socket;

pub const DEFAULT_VXI11_DEVICE:&str = "inst0";

lazy_static! {
	static ref SOCKET_RE: Regex = Regex::new(r"(?i)^TCPIP\d*::([^:]+)::(\d+)::SOCKET$").unwrap();
	static ref VXI11_RE: Regex  = Regex::new(r"(?i)^TCPIP\d*::([^:]+)(?:::([^:]+))?(?:::INSTR)?$").unwrap();
	static ref HOST_PORT_RE: Regex = Regex::new(r"^([A-Za-z0-9.\-]+):(\d+)$").unwrap();
	static ref HOST_RE: Regex   = Regex::new(r"^[A-Za-z0-9.\-]+$").unwrap();
}

// A request/response byte channel to one instrument.
// Implementations are used from one thread by one owner; a `read` always returns one
// complete reply.
pub trait Transport {
	fn write(&mut self, data:&[u8]) -> io::Result<()>;
	fn read(&mut self) -> io::Result<Vec<u8>>;
	fn timeout(&self) -> Duration;
	fn set_timeout(&mut self, timeout:Duration) -> io::Result<()>;
	fn close(&mut self) -> io::Result<()>;
}

// Opens transports. Swapped out in tests for one that hands back a scripted instrument.
pub trait Connector {
	fn open(&self, resource:&Resource, timeout:Duration) -> io::Result<Box<dyn Transport>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
	Vxi11 { host: String, device: String },
	Socket { host: String, port: u16 },
}

impl Resource {

	pub fn parse(address:&str) -> io::Result<Self> {
		let address = address.trim();

		if let Some(caps) = SOCKET_RE.captures(address) {
			let port = caps[2].parse::<u16>().map_err(|_| Error::new(ErrorKind::InvalidInput, "Socket port out of range"))?;
			return Ok(Resource::Socket{ host: caps[1].to_owned(), port });
		}

		if let Some(caps) = VXI11_RE.captures(address) {
			let device = caps.get(2).map(|m| m.as_str()).unwrap_or(DEFAULT_VXI11_DEVICE);
			// "TCPIP0::host::INSTR" puts INSTR in the device slot
			let device = if device.eq_ignore_ascii_case("INSTR") { DEFAULT_VXI11_DEVICE } else { device };
			return Ok(Resource::Vxi11{ host: caps[1].to_owned(), device: device.to_owned() });
		}

		if let Some(caps) = HOST_PORT_RE.captures(address) {
			let port = caps[2].parse::<u16>().map_err(|_| Error::new(ErrorKind::InvalidInput, "Socket port out of range"))?;
			return Ok(Resource::Socket{ host: caps[1].to_owned(), port });
		}

		if HOST_RE.is_match(address) {
			return Ok(Resource::Vxi11{ host: address.to_owned(), device: DEFAULT_VXI11_DEVICE.to_owned() });
		}

		Err(Error::new(ErrorKind::Unsupported, format!("Unsupported resource address \"{}\"", address)))
	}

}

// Opens real network transports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetConnector;

impl Connector for NetConnector {
	fn open(&self, resource:&Resource, timeout:Duration) -> io::Result<Box<dyn Transport>> {
		match resource {
			Resource::Vxi11{ host, device } => {
				debug!("Opening VXI-11 link to {} ({})", host, device);
				Ok(Box::new(CoreClient::open(host, device, timeout)?))
			},
			Resource::Socket{ host, port } => {
				debug!("Opening raw socket to {}:{}", host, port);
				Ok(Box::new(socket::SocketTransport::connect(host, *port, timeout)?))
			},
		}
	}
}

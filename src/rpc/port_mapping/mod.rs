pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_NULL:u32    = 0;     // (void) -> void
pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use log::debug;

use super::{IPPROTO_TCP, IPPROTO_UDP};
use super::xdr_pack;
use super::tcp_clients::TcpClient;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Protocol {
	TCP,
	UDP,
}

impl Protocol {
	pub fn to_u32(self) -> u32 { match self {
		Protocol::TCP => IPPROTO_TCP,
		Protocol::UDP => IPPROTO_UDP,
	}}
}

#[derive(Debug, Clone)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub protocol: Protocol,
	pub port: u32,				// XDR encodes ports as u32
}

pub struct TcpPortMapperClient {
	pub host: String,
	client: TcpClient,
}

impl TcpPortMapperClient {

	pub fn new(host:&str, timeout:Duration) -> io::Result<Self> {
		let client = TcpClient::connect((host, PMAP_PORT), PMAP_PROG, PMAP_VERS, timeout)?;
		Ok(Self{ host: host.to_owned(), client })
	}

	pub fn get_port(&mut self, m:&Mapping) -> io::Result<u16> {
		self.client.start_call(PMAPPROC_GETPORT)?;
		xdr_pack::pack_mapping(&mut self.client.packer, m.program, m.version, m.protocol.to_u32(), m.port)?;
		self.client.do_call()?;

		let port:u32 = self.client.unpacker.unpack_u32()?;
		if !self.client.unpacker.all_data_consumed() {
			return Err(Error::new(ErrorKind::InvalidData, "Data unexpectedly left over in unpacker after unpacking port"));
		}

		// The portmapper answers zero for programs it doesn't know about
		match port {
			0 => Err(Error::new(ErrorKind::NotFound, format!("{} has no mapping for program {:#x} v{}", self.host, m.program, m.version))),
			p if p > u16::MAX as u32 => Err(Error::new(ErrorKind::InvalidData, "Portmapper returned a port out of range")),
			p => {
				debug!("Portmapper on {} maps program {:#x} to port {}", self.host, m.program, p);
				Ok(p as u16)
			}
		}
	}

}

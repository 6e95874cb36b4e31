// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_LOCK_TIMEOUT:u32 = 10000;

pub const OPERATION_FLAGS_END:i32 = 8;

// Reason bits in a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

// Slack on the socket timeout so the instrument's own I/O timeout fires first
const RPC_TIMEOUT_MARGIN:Duration = Duration::from_secs(2);

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use log::{debug, warn};

use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping, Protocol};
use crate::rpc::tcp_clients::TcpClient;
use crate::transport::Transport;

pub mod xdr_pack;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

fn device_error(code:i32) -> io::Error {
	match code {
		1  => Error::new(ErrorKind::InvalidInput, "Syntax error"),
		3  => Error::new(ErrorKind::NotFound, "Device not accessible"),
		4  => Error::new(ErrorKind::NotConnected, "Invalid link identifier"),
		5  => Error::new(ErrorKind::InvalidInput, "Parameter error"),
		6  => err("Channel not established"),
		8  => err("Operation not supported"),
		9  => err("Out of resources"),
		11 => Error::new(ErrorKind::WouldBlock, "Device locked by another link"),
		12 => err("No lock held by this link"),
		15 => Error::new(ErrorKind::TimedOut, "I/O timeout"),
		17 => err("I/O error"),
		21 => Error::new(ErrorKind::InvalidInput, "Invalid address"),
		23 => Error::new(ErrorKind::Interrupted, "Abort"),
		29 => err("Channel already established"),
		_  => Error::new(ErrorKind::Other, format!("Unknown VXI-11 error code {}", code)),
	}
}

fn millis(d:Duration) -> u32 {
	let ms = d.as_millis();
	if ms > u32::MAX as u128 { u32::MAX } else { ms as u32 }
}

pub struct CoreClient {
	client: TcpClient,
	opt_link: Option<Link>,
	io_timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
	pub link_id: i32,
	pub abort_port: u16,
	pub max_recv_size: u32,
}

impl CoreClient {

	fn get_link(&self) -> io::Result<Link> {
		self.opt_link.ok_or_else(|| Error::new(ErrorKind::NotConnected, "No VXI-11 link"))
	}

	pub fn new(host:&str, io_timeout:Duration) -> io::Result<Self> {
		// Find the port to use for the core program
		let mut pmap_client = TcpPortMapperClient::new(host, io_timeout)?;

		let mapping = Mapping {
			program: DEVICE_CORE_PROG,
			version: DEVICE_CORE_VERS,
			protocol: Protocol::TCP,
			port: 0,
		};

		let port = pmap_client.get_port(&mapping)?;
		let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, io_timeout + RPC_TIMEOUT_MARGIN)?;

		Ok(CoreClient{ client, opt_link: None, io_timeout })
	}

	// Port mapping plus create_link in one go
	pub fn open(host:&str, device:&str, io_timeout:Duration) -> io::Result<Self> {
		let mut core = Self::new(host, io_timeout)?;
		core.create_link(device)?;
		Ok(core)
	}

	pub fn create_link(&mut self, device:&str) -> io::Result<()> {
		if self.opt_link.is_some() {
			return Err(Error::new(ErrorKind::AlreadyExists, "Already connected to a link"));
		}

		self.client.start_call(CREATE_LINK)?;
		xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, DEFAULT_LOCK_TIMEOUT, device)?;
		self.client.do_call()?;

		let error:i32         = self.client.unpacker.unpack_i32()?;
		let link_id:i32       = self.client.unpacker.unpack_i32()?;
		let abort_port:u32    = self.client.unpacker.unpack_u32()?;
		let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

		if error != 0 { return Err(device_error(error)); }

		debug!("Created VXI-11 link {} to {} (max_recv_size={})", link_id, device, max_recv_size);
		self.opt_link = Some(Link{ link_id, abort_port: abort_port as u16, max_recv_size });
		Ok(())
	}

	pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
		let link = self.get_link()?;
		let io_timeout = millis(self.io_timeout);

		// The instrument advertises how much it accepts per call; END goes on the final chunk only
		let chunk_size = if link.max_recv_size == 0 { data.len().max(1) } else { link.max_recv_size as usize };
		let chunks:Vec<&[u8]> = if data.is_empty() { vec![data] } else { data.chunks(chunk_size).collect() };
		let last = chunks.len() - 1;

		for (idx, chunk) in chunks.into_iter().enumerate() {
			let flags = if idx == last { OPERATION_FLAGS_END } else { 0 };

			self.client.start_call(DEVICE_WRITE)?;
			xdr_pack::pack_device_write_parms(&mut self.client.packer, link.link_id, io_timeout, DEFAULT_LOCK_TIMEOUT, flags, chunk)?;
			self.client.do_call()?;

			let error:i32 = self.client.unpacker.unpack_i32()?;
			let size:u32  = self.client.unpacker.unpack_u32()?;

			if error != 0 { return Err(device_error(error)); }
			if size as usize != chunk.len() {
				return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
			}
		}

		Ok(())
	}

	// Keeps issuing device_read until the instrument flags END, so large blocks arrive whole
	pub fn read(&mut self) -> io::Result<Vec<u8>> {
		let link = self.get_link()?;
		let io_timeout = millis(self.io_timeout);
		let mut ans:Vec<u8> = vec![];

		loop {
			self.client.start_call(DEVICE_READ)?;
			xdr_pack::pack_device_read_parms(&mut self.client.packer, link.link_id, u32::MAX, io_timeout, DEFAULT_LOCK_TIMEOUT, 0, 0)?;
			self.client.do_call()?;

			let error:i32    = self.client.unpacker.unpack_i32()?;
			let reason:i32   = self.client.unpacker.unpack_i32()?;
			let data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;

			if error != 0 { return Err(device_error(error)); }
			ans.extend_from_slice(&data);

			if reason & (REASON_END | REASON_CHR) != 0 {
				return Ok(ans);
			} else if reason & REASON_REQCNT == 0 {
				return Err(err("device_read returned without any reason bit set"));
			}
		}
	}

	pub fn io_timeout(&self) -> Duration { self.io_timeout }

	pub fn set_io_timeout(&mut self, timeout:Duration) -> io::Result<()> {
		self.client.set_read_timeout(timeout + RPC_TIMEOUT_MARGIN)?;
		self.io_timeout = timeout;
		Ok(())
	}

	pub fn destroy_link(&mut self) -> io::Result<()> {
		let link = self.get_link()?;

		// Forget the link even if the instrument complains; it's unusable either way
		self.opt_link = None;
		self.client.start_call(DESTROY_LINK)?;
		self.client.packer.pack_i32(link.link_id)?;
		self.client.do_call()?;

		match self.client.unpacker.unpack_i32()? {
			0 => Ok(()),
			e => Err(device_error(e)),
		}
	}

}

impl Transport for CoreClient {
	fn write(&mut self, data:&[u8]) -> io::Result<()> { CoreClient::write(self, data) }
	fn read(&mut self) -> io::Result<Vec<u8>> { CoreClient::read(self) }
	fn timeout(&self) -> Duration { self.io_timeout }
	fn set_timeout(&mut self, timeout:Duration) -> io::Result<()> { self.set_io_timeout(timeout) }

	fn close(&mut self) -> io::Result<()> {
		if self.opt_link.is_some() { self.destroy_link() } else { Ok(()) }
	}
}

impl Drop for CoreClient {

	fn drop(&mut self) {
		if self.opt_link.is_some() {
			if let Err(e) = self.destroy_link() { warn!("Unable to destroy VXI-11 link: {}", e); }
		}
	}

}

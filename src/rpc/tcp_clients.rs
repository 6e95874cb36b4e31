use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::{debug, trace};

use crate::xdr;
use super::{xdr_pack, xdr_unpack};

const LAST_FRAGMENT:u32 = 0x8000_0000;

pub struct TcpClient {
	stream: TcpStream,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: xdr::Packer,
	pub unpacker: xdr::Unpacker,
}

impl TcpClient {

	pub fn connect<A: ToSocketAddrs>(addr:A, prog:u32, vers:u32, timeout:Duration) -> io::Result<Self> {
		let sock_addr = addr.to_socket_addrs()?
			.next()
			.ok_or_else(|| Error::new(ErrorKind::AddrNotAvailable, "Host did not resolve to any address"))?;

		let stream = TcpStream::connect_timeout(&sock_addr, timeout)?;
		stream.set_read_timeout(Some(timeout))?;
		stream.set_nodelay(true)?;
		debug!("RPC client for program {:#x} v{} connected to {}", prog, vers, sock_addr);

		Ok(Self{ stream, prog, vers, lastxid: 0, packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() })
	}

	pub fn set_read_timeout(&mut self, timeout:Duration) -> io::Result<()> {
		self.stream.set_read_timeout(Some(timeout))
	}

	// Resets the packer and writes a call header; procedure arguments get packed after this
	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	// Sends the packed call as a single record and loads the matching reply into the unpacker
	pub fn do_call(&mut self) -> io::Result<()> {
		let call:&[u8] = self.packer.as_bytes();
		let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
		send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
		send_bytes.extend_from_slice(call);
		self.stream.write_all(&send_bytes)?;

		loop {
			let reply:Vec<u8> = self.read_record()?;
			self.unpacker.reset(&reply);

			let (xid, _) = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(());
			} else if xid < self.lastxid {
				// Reply to a call we already gave up on
				trace!("Discarding stale RPC reply xid={} (expecting {})", xid, self.lastxid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::InvalidData, "Received an RPC reply for a call not yet made"));
			}
		}
	}

	fn read_record(&mut self) -> io::Result<Vec<u8>> {
		let mut reply:Vec<u8> = vec![];
		loop {
			let marker:u32 = self.stream.read_u32::<BigEndian>()?;
			let n = (marker & !LAST_FRAGMENT) as usize;

			let start = reply.len();
			reply.resize(start + n, 0);
			self.stream.read_exact(&mut reply[start..])?;

			if marker & LAST_FRAGMENT != 0 { return Ok(reply); }
		}
	}

}

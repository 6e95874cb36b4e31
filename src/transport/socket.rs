// SCPI over a plain TCP socket (Siglent listens on 5025). There is no message framing on the
// wire, so replies are delimited by sniffing their shape: a text line, a #9 block, a BMP or a PNG.

use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, LittleEndian, ByteOrder};
use log::trace;

use super::Transport;

pub const PNG_MAGIC:&[u8] = b"\x89PNG\r\n\x1a\n";
pub const BMP_MAGIC:&[u8] = b"BM";

// How far into a reply a "#9" block header may start (after e.g. "C1:WF DAT2,")
const BLOCK_HEADER_SEARCH:usize = 64;
const READ_CHUNK:usize = 64 * 1024;

pub struct SocketTransport {
	stream: TcpStream,
	timeout: Duration,
	pending: Vec<u8>,
}

impl SocketTransport {

	pub fn connect(host:&str, port:u16, timeout:Duration) -> io::Result<Self> {
		let addr = (host, port).to_socket_addrs()?
			.next()
			.ok_or_else(|| Error::new(ErrorKind::AddrNotAvailable, "Host did not resolve to any address"))?;
		let stream = TcpStream::connect_timeout(&addr, timeout)?;
		stream.set_read_timeout(Some(timeout))?;
		stream.set_nodelay(true)?;
		Ok(Self{ stream, timeout, pending: vec![] })
	}

	fn take_frame(&mut self) -> Option<Vec<u8>> {
		// Terminators trailing a previous binary block
		let skip = self.pending.iter().take_while(|b| **b == b'\n' || **b == b'\r').count();
		self.pending.drain(..skip);

		let n = frame_len(&self.pending)?;
		let rest = self.pending.split_off(n);
		Some(std::mem::replace(&mut self.pending, rest))
	}

}

// Length of the first complete reply at the start of `buf`, if it has fully arrived.
pub fn frame_len(buf:&[u8]) -> Option<usize> {
	if buf.starts_with(PNG_MAGIC) {
		return png_len(buf);
	}

	if buf.starts_with(BMP_MAGIC) && buf.len() >= 6 {
		let size = LittleEndian::read_u32(&buf[2..6]) as usize;
		return if buf.len() >= size { Some(size) } else { None };
	}

	let first_line_end = buf.iter().position(|b| *b == b'\n');
	let search_end = first_line_end.unwrap_or(buf.len()).min(BLOCK_HEADER_SEARCH);
	if let Some(start) = buf[..search_end].windows(2).position(|w| w == b"#9") {
		return block_len(buf, start);
	}

	first_line_end.map(|pos| pos + 1)
}

fn block_len(buf:&[u8], start:usize) -> Option<usize> {
	let digits = buf.get(start + 2..start + 11)?;
	let count = std::str::from_utf8(digits).ok()?.parse::<usize>().ok()?;
	let mut end = start + 11 + count;
	if buf.len() < end { return None; }

	while end < buf.len() && buf[end] == b'\n' { end += 1; }
	Some(end)
}

fn png_len(buf:&[u8]) -> Option<usize> {
	let mut pos = PNG_MAGIC.len();
	loop {
		let header = buf.get(pos..pos + 8)?;
		let data_len = BigEndian::read_u32(&header[..4]) as usize;
		let end = pos + 12 + data_len;
		if buf.len() < end { return None; }
		if &header[4..8] == b"IEND" { return Some(end); }
		pos = end;
	}
}

impl Transport for SocketTransport {

	fn write(&mut self, data:&[u8]) -> io::Result<()> {
		self.stream.write_all(data)?;
		if !data.ends_with(b"\n") { self.stream.write_all(b"\n")?; }
		self.stream.flush()
	}

	fn read(&mut self) -> io::Result<Vec<u8>> {
		let mut chunk = vec![0u8; READ_CHUNK];
		loop {
			if let Some(frame) = self.take_frame() { return Ok(frame); }

			let n = match self.stream.read(&mut chunk) {
				Ok(n) => n,
				Err(e) if e.kind() == ErrorKind::WouldBlock => {
					return Err(Error::new(ErrorKind::TimedOut, format!("No complete reply within {:?}", self.timeout)));
				},
				Err(e) => return Err(e),
			};
			if n == 0 {
				return Err(Error::new(ErrorKind::UnexpectedEof, "Instrument closed the connection"));
			}
			trace!("socket read {} bytes ({} pending)", n, self.pending.len());
			self.pending.extend_from_slice(&chunk[..n]);
		}
	}

	fn timeout(&self) -> Duration { self.timeout }

	fn set_timeout(&mut self, timeout:Duration) -> io::Result<()> {
		self.stream.set_read_timeout(Some(timeout))?;
		self.timeout = timeout;
		Ok(())
	}

	fn close(&mut self) -> io::Result<()> {
		self.pending.clear();
		match self.stream.shutdown(std::net::Shutdown::Both) {
			Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
			other => other,
		}
	}

}

// Scripted instrument shared by the integration tests. Replies are keyed by the exact command
// text; a command without a reply is write-only, and reading after it times out.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Error, ErrorKind};
use std::rc::Rc;
use std::time::Duration;

use scopelink::transport::{Connector, Resource, Transport};
use scopelink::{Sds, Timing};

pub const IDN:&str = "Siglent Technologies,SDS1104X-E,SDSMMEBD3R1234,8.2.6.1.37R2";
pub const ADDRESS:&str = "TCPIP0::192.0.2.10::inst0::INSTR";
pub const TIMEOUT:Duration = Duration::from_millis(5000);

#[derive(Default)]
struct Shared {
	replies: HashMap<String, Vec<u8>>,
	failing: HashSet<String>,
	broken: Vec<String>,
	pending: VecDeque<Vec<u8>>,
	writes: Vec<String>,
	timeouts: Vec<Duration>,
	timeout: Duration,
	opens: usize,
	closes: usize,
	refuse: bool,
}

#[derive(Clone, Default)]
pub struct MockInstrument {
	state: Rc<RefCell<Shared>>,
}

struct MockTransport {
	state: Rc<RefCell<Shared>>,
}

pub struct MockConnector {
	state: Rc<RefCell<Shared>>,
}

impl MockInstrument {

	pub fn new() -> Self {
		let mock = Self::default();
		mock.reply("*IDN?", IDN);
		mock
	}

	pub fn reply(&self, cmd:&str, reply:&str) -> &Self { self.reply_bytes(cmd, reply.as_bytes().to_vec()) }

	pub fn reply_bytes(&self, cmd:&str, reply:Vec<u8>) -> &Self {
		self.state.borrow_mut().replies.insert(cmd.to_owned(), reply);
		self
	}

	// Writing `cmd` succeeds but nothing ever comes back
	pub fn fail(&self, cmd:&str) -> &Self {
		self.state.borrow_mut().failing.insert(cmd.to_owned());
		self
	}

	// Any write starting with `prefix` fails with a broken pipe and never reaches the instrument
	pub fn fail_write(&self, prefix:&str) -> &Self {
		self.state.borrow_mut().broken.push(prefix.to_owned());
		self
	}

	pub fn refuse_connections(&self) { self.state.borrow_mut().refuse = true; }

	pub fn writes(&self) -> Vec<String> { self.state.borrow().writes.clone() }
	pub fn clear_writes(&self) { self.state.borrow_mut().writes.clear(); }
	pub fn timeout_history(&self) -> Vec<Duration> { self.state.borrow().timeouts.clone() }
	pub fn current_timeout(&self) -> Duration { self.state.borrow().timeout }
	pub fn opens(&self) -> usize { self.state.borrow().opens }
	pub fn closes(&self) -> usize { self.state.borrow().closes }

	pub fn connector(&self) -> MockConnector { MockConnector{ state: self.state.clone() } }

	pub fn scope(&self) -> Sds {
		Sds::new(ADDRESS, TIMEOUT).with_connector(self.connector()).with_timing(Timing::immediate())
	}

	pub fn connected_scope(&self) -> Sds {
		let mut scope = self.scope();
		scope.connect().expect("mock connect");
		self.clear_writes();
		scope
	}

}

impl Connector for MockConnector {
	fn open(&self, _resource:&Resource, timeout:Duration) -> io::Result<Box<dyn Transport>> {
		let mut s = self.state.borrow_mut();
		if s.refuse { return Err(Error::new(ErrorKind::ConnectionRefused, "refused")); }
		s.opens += 1;
		s.timeout = timeout;
		s.pending.clear();
		Ok(Box::new(MockTransport{ state: self.state.clone() }))
	}
}

impl Transport for MockTransport {

	fn write(&mut self, data:&[u8]) -> io::Result<()> {
		let cmd = String::from_utf8_lossy(data).trim().to_owned();
		let mut s = self.state.borrow_mut();
		if s.broken.iter().any(|p| cmd.starts_with(p.as_str())) {
			return Err(Error::new(ErrorKind::BrokenPipe, "link dropped"));
		}
		if !s.failing.contains(&cmd) {
			if let Some(reply) = s.replies.get(&cmd).cloned() { s.pending.push_back(reply); }
		}
		s.writes.push(cmd);
		Ok(())
	}

	fn read(&mut self) -> io::Result<Vec<u8>> {
		self.state.borrow_mut().pending.pop_front()
			.ok_or_else(|| Error::new(ErrorKind::TimedOut, "no reply from instrument"))
	}

	fn timeout(&self) -> Duration { self.state.borrow().timeout }

	fn set_timeout(&mut self, timeout:Duration) -> io::Result<()> {
		let mut s = self.state.borrow_mut();
		s.timeout = timeout;
		s.timeouts.push(timeout);
		Ok(())
	}

	fn close(&mut self) -> io::Result<()> {
		self.state.borrow_mut().closes += 1;
		Ok(())
	}

}

// DAT2 reply carrying `samples`
pub fn dat2_block(channel:u8, samples:&[i8]) -> Vec<u8> {
	let mut v:Vec<u8> = format!("C{}:WF DAT2,#9{:09}", channel, samples.len()).into_bytes();
	v.extend(samples.iter().map(|&s| s as u8));
	v.extend_from_slice(b"\n\n");
	v
}

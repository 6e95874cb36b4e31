mod common;

use std::convert::TryFrom;
use std::error::Error;

use common::MockInstrument;
use scopelink::session::{ChatMessage, Responder, Role};
use scopelink::{Backend, Channel, ScreenCapture, ScreenshotState, Session};

const BMP:&[u8] = b"BM\x1e\x00\x00\x00\x00\x00\x00\x00\x1a\x00\x00\x00\x0c\x00\x00\x00\x01\x00\x01\x00\x01\x00\x18\x00\xff\xff\xff\x00";

#[derive(Default)]
struct Recorder {
	images_seen: usize,
	turns: usize,
}

impl Responder for Recorder {
	fn generate(&mut self, messages:&[ChatMessage], image:Option<&ScreenCapture>) -> Result<String, Box<dyn Error>> {
		self.turns += 1;
		if image.is_some() { self.images_seen += 1; }
		Ok(format!("reply to {}", messages.last().map(|m| m.content.as_str()).unwrap_or("")))
	}
}

struct Broken;

impl Responder for Broken {
	fn generate(&mut self, _messages:&[ChatMessage], _image:Option<&ScreenCapture>) -> Result<String, Box<dyn Error>> {
		Err("backend offline".into())
	}
}

fn session(backend:Backend) -> (MockInstrument, Session) {
	let mock = MockInstrument::new();
	mock.reply_bytes("SCDP", BMP.to_vec());
	let mut session = Session::new(mock.scope(), backend);
	session.connect().unwrap();
	(mock, session)
}

#[test]
fn screenshot_is_sent_exactly_once() {
	let (_mock, mut session) = session(Backend::Claude);
	let mut backend = Recorder::default();

	assert_eq!(session.screenshot_state(), ScreenshotState::Empty);
	assert!(!session.share_screenshot());

	session.capture_screenshot().unwrap();
	assert_eq!(session.screenshot_state(), ScreenshotState::Captured);

	// Captured but not shared: text only
	session.ask(&mut backend, "what's the frequency?");
	assert_eq!(backend.images_seen, 0);

	assert!(session.share_screenshot());
	assert_eq!(session.screenshot_state(), ScreenshotState::PendingSend);

	session.ask(&mut backend, "describe the trace");
	session.ask(&mut backend, "and now?");
	assert_eq!(backend.images_seen, 1);
	assert_eq!(session.screenshot_state(), ScreenshotState::Sent);
	assert!(!session.share_screenshot());

	assert_eq!(session.history().len(), 6);
	assert_eq!(session.history()[3], ChatMessage{ role: Role::Assistant, content: "reply to describe the trace".to_owned() });
}

#[test]
fn new_capture_can_be_sent_again() {
	let (_mock, mut session) = session(Backend::Claude);
	let mut backend = Recorder::default();

	session.capture_screenshot().unwrap();
	session.share_screenshot();
	session.ask(&mut backend, "first");

	session.capture_screenshot().unwrap();
	assert!(session.share_screenshot());
	session.ask(&mut backend, "second");
	assert_eq!(backend.images_seen, 2);
}

#[test]
fn text_only_backend_never_gets_images() {
	let (_mock, mut session) = session(Backend::HuggingFace);
	let mut backend = Recorder::default();

	session.capture_screenshot().unwrap();
	session.share_screenshot();
	session.ask(&mut backend, "look at this");

	assert_eq!(backend.images_seen, 0);
	assert_eq!(session.screenshot_state(), ScreenshotState::PendingSend);
}

#[test]
fn backend_failure_is_recorded_as_reply() {
	let (_mock, mut session) = session(Backend::Claude);
	let reply = session.ask(&mut Broken, "hello");
	assert_eq!(reply, "Error: backend offline");
	assert_eq!(session.history().len(), 2);
}

#[test]
fn disconnect_clears_captured_state() {
	let (mock, mut session) = session(Backend::Claude);
	mock.reply("C1:PAVA? PKPK", "C1:PAVA PKPK,1.00E+00V");

	session.capture_screenshot().unwrap();
	assert_eq!(session.measure(Channel::try_from(1).unwrap()).unwrap().peak_to_peak, Some(1.0));

	session.disconnect();
	assert_eq!(session.screenshot_state(), ScreenshotState::Empty);
	assert!(session.screenshot().is_none());
	assert!(session.last_measurements().is_none());
	assert!(!session.scope().is_connected());
}

// State a UI or agent front end keeps around one driver: the chat transcript, the last
// measurements, and a screenshot that is handed to a vision-capable backend exactly once.

use std::error::Error;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::Backend;
use crate::devices::sds::models::{Channel, Measurements, ScreenCapture};
use crate::devices::sds::Sds;
use crate::error::ScopeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenshotState {
	Empty,
	// Captured and viewable, not offered to the agent.
	Captured,
	// Goes out with the next message.
	PendingSend,
	// Already sent; later messages are text only.
	Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { User, Assistant }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: Role,
	pub content: String,
}

// A language-model backend. Implementations live with the front end; only the selection is
// configured here.
pub trait Responder {
	fn generate(&mut self, messages:&[ChatMessage], image:Option<&ScreenCapture>) -> Result<String, Box<dyn Error>>;
}

pub struct Session {
	scope: Sds,
	backend: Backend,
	screenshot: Option<ScreenCapture>,
	state: ScreenshotState,
	history: Vec<ChatMessage>,
	measurements: Option<Measurements>,
}

impl Session {

	pub fn new(scope:Sds, backend:Backend) -> Self {
		Self{ scope, backend, screenshot: None, state: ScreenshotState::Empty, history: vec![], measurements: None }
	}

	pub fn scope(&self) -> &Sds { &self.scope }
	pub fn scope_mut(&mut self) -> &mut Sds { &mut self.scope }
	pub fn backend(&self) -> Backend { self.backend }
	pub fn screenshot_state(&self) -> ScreenshotState { self.state }
	pub fn screenshot(&self) -> Option<&ScreenCapture> { self.screenshot.as_ref() }
	pub fn history(&self) -> &[ChatMessage] { &self.history }
	pub fn last_measurements(&self) -> Option<&Measurements> { self.measurements.as_ref() }

	pub fn connect(&mut self) -> Result<(), ScopeError> { self.scope.connect() }

	// Disconnecting also forgets anything captured from the instrument.
	pub fn disconnect(&mut self) {
		self.scope.disconnect();
		self.clear_screenshot();
		self.measurements = None;
	}

	pub fn measure(&mut self, ch:Channel) -> Result<&Measurements, ScopeError> {
		let m = self.scope.measure_channel(ch)?;
		Ok(&*self.measurements.insert(m))
	}

	// Replaces any earlier screenshot, including one already sent.
	pub fn capture_screenshot(&mut self) -> Result<&ScreenCapture, ScopeError> {
		let capture = self.scope.capture_screen_image()?;
		info!("Screenshot captured ({:?}, {} bytes)", capture.format, capture.data.len());
		self.state = ScreenshotState::Captured;
		Ok(&*self.screenshot.insert(capture))
	}

	// Queues the current screenshot for the next message. False if there is nothing to queue
	// or it has already gone out.
	pub fn share_screenshot(&mut self) -> bool {
		match self.state {
			ScreenshotState::Captured | ScreenshotState::PendingSend => {
				self.state = ScreenshotState::PendingSend;
				true
			},
			ScreenshotState::Empty | ScreenshotState::Sent => false,
		}
	}

	// Records a user message and returns the image to send with it, if any. An image goes out
	// at most once, and only to a backend that accepts images.
	pub fn submit(&mut self, prompt:&str) -> Option<ScreenCapture> {
		self.history.push(ChatMessage{ role: Role::User, content: prompt.to_owned() });

		let send = self.state == ScreenshotState::PendingSend && self.backend == Backend::Claude;
		debug!("Screenshot state {:?}, backend {:?}, sending image: {}", self.state, self.backend, send);
		if !send { return None; }

		self.state = ScreenshotState::Sent;
		self.screenshot.clone()
	}

	pub fn record_reply(&mut self, reply:&str) {
		self.history.push(ChatMessage{ role: Role::Assistant, content: reply.to_owned() });
	}

	// One chat turn: record the prompt, attach the queued screenshot if it is due, record the reply.
	// A failed turn is recorded as the assistant's reply so the transcript stays paired.
	pub fn ask(&mut self, responder:&mut dyn Responder, prompt:&str) -> String {
		let image = self.submit(prompt);
		let reply = match responder.generate(&self.history, image.as_ref()) {
			Ok(text) => text,
			Err(e) => {
				warn!("Backend {:?} failed: {}", self.backend, e);
				format!("Error: {}", e)
			},
		};
		self.record_reply(&reply);
		reply
	}

	pub fn clear_screenshot(&mut self) {
		self.screenshot = None;
		self.state = ScreenshotState::Empty;
	}

	pub fn clear_history(&mut self) { self.history.clear(); }

}

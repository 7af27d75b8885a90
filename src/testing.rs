// In-memory stand-ins for instrument links

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use crate::session::Transport;
use crate::socket::ReadTimeout;
use crate::usbtmc::BulkPipe;
use crate::{Error, Result};

// Replays a fixed byte script and records everything written
pub struct ScriptedStream {
	input: Cursor<Vec<u8>>,
	pub written: Vec<u8>,
}

impl ScriptedStream {
	pub fn new(input: Vec<u8>) -> Self {
		Self { input: Cursor::new(input), written: vec![] }
	}
}

impl Read for ScriptedStream {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> { self.input.read(buf) }
}

impl Write for ScriptedStream {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.written.write(buf) }
	fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

// The script never stalls, so there is nothing to time out
impl ReadTimeout for ScriptedStream {
	fn set_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> { Ok(()) }
}

// Bulk endpoints that hand out queued packets and record what was sent
#[derive(Default)]
pub struct MockPipe {
	pub sent: Vec<Vec<u8>>,
	packets: VecDeque<Vec<u8>>,
}

impl MockPipe {
	pub fn new(packets: Vec<Vec<u8>>) -> Self {
		MockPipe { sent: vec![], packets: packets.into() }
	}
}

impl BulkPipe for MockPipe {
	fn bulk_out(&mut self, data: Vec<u8>) -> Result<()> {
		self.sent.push(data);
		Ok(())
	}

	fn bulk_in(&mut self, max_len: usize) -> Result<Vec<u8>> {
		let mut packet = self.packets.pop_front().ok_or(Error::Timeout)?;
		packet.truncate(max_len);
		Ok(packet)
	}
}

// One last-fragment record
pub fn record(body: &[u8]) -> Vec<u8> {
	let mut out = (body.len() as u32 | 0x8000_0000).to_be_bytes().to_vec();
	out.extend_from_slice(body);
	out
}

#[derive(Default)]
pub struct MockState {
	pub sent: Vec<String>,
	pub replies: VecDeque<Result<Vec<u8>>>,
	pub closes: usize,
	pub fail_close: bool,
}

// Answers from a queue of canned replies; state is shared with the test
#[derive(Clone, Default)]
pub struct MockTransport(pub Rc<RefCell<MockState>>);

impl MockTransport {
	pub fn with_replies(replies: &[&[u8]]) -> Self {
		let mock = Self::default();
		mock.0.borrow_mut().replies = replies.iter().map(|r| Ok(r.to_vec())).collect();
		mock
	}

	pub fn push_reply(&self, reply: Result<Vec<u8>>) {
		self.0.borrow_mut().replies.push_back(reply);
	}

	pub fn sent(&self) -> Vec<String> { self.0.borrow().sent.clone() }

	pub fn closes(&self) -> usize { self.0.borrow().closes }
}

impl Transport for MockTransport {
	fn write(&mut self, data: &[u8]) -> Result<()> {
		self.0.borrow_mut().sent.push(String::from_utf8_lossy(data).into_owned());
		Ok(())
	}

	fn read(&mut self) -> Result<Vec<u8>> {
		self.0.borrow_mut().replies.pop_front().unwrap_or(Err(Error::Timeout))
	}

	fn close(&mut self) -> Result<()> {
		let mut state = self.0.borrow_mut();
		state.closes += 1;
		if state.fail_close {
			Err(Error::Communication(io::Error::new(io::ErrorKind::BrokenPipe, "link dropped")))
		} else {
			Ok(())
		}
	}
}

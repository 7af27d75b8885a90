// A connection to one instrument, speaking text commands over whichever transport its
// resource address selects

use std::time::Duration;

use log::{debug, info, warn};

use crate::address::ResourceAddress;
use crate::error::{Error, Result};
use crate::socket::SocketClient;
use crate::usbtmc::UsbtmcClient;
use crate::vxi11::CoreClient;

pub const DEFAULT_TIMEOUT:Duration = Duration::from_millis(5000);

// Upper bounds on what an instrument can make us buffer or loop on for one reply
pub const MAX_REPLY_LEN:usize = 0x0400_0000;
pub const MAX_EMPTY_READS:usize = 16;

pub trait Transport {
	fn write(&mut self, data:&[u8]) -> Result<()>;
	// One complete text or block response
	fn read(&mut self) -> Result<Vec<u8>>;
	// One complete response, binary data with no line framing included
	fn read_raw(&mut self) -> Result<Vec<u8>> { self.read() }
	fn close(&mut self) -> Result<()>;
}

pub enum Link {
	Vxi11(CoreClient),
	Socket(SocketClient),
	Usb(UsbtmcClient),
}

impl Transport for Link {
	fn write(&mut self, data:&[u8]) -> Result<()> {
		match self {
			Link::Vxi11(c) => Transport::write(c, data),
			Link::Socket(c) => c.write(data),
			Link::Usb(c) => Transport::write(c, data),
		}
	}

	fn read(&mut self) -> Result<Vec<u8>> {
		match self {
			Link::Vxi11(c) => Transport::read(c),
			Link::Socket(c) => c.read(),
			Link::Usb(c) => Transport::read(c),
		}
	}

	fn read_raw(&mut self) -> Result<Vec<u8>> {
		match self {
			Link::Vxi11(c) => Transport::read_raw(c),
			Link::Socket(c) => c.read_raw(),
			Link::Usb(c) => Transport::read_raw(c),
		}
	}

	fn close(&mut self) -> Result<()> {
		match self {
			Link::Vxi11(c) => Transport::close(c),
			Link::Socket(c) => c.close(),
			Link::Usb(c) => Transport::close(c),
		}
	}
}

// The transport is closed exactly once, by `close` or, failing that, on drop
pub struct Session<T: Transport = Link> {
	transport: T,
	open: bool,
}

impl Session<Link> {

	pub fn connect(address: &str, timeout: Duration) -> Result<Self> {
		let resource: ResourceAddress = address.parse()?;
		let link = match &resource {
			ResourceAddress::Vxi11 { host, device } => Link::Vxi11(CoreClient::open(host, device, timeout)?),
			ResourceAddress::Socket { host, port } => Link::Socket(SocketClient::connect(host, *port, timeout)?),
			ResourceAddress::Usb { vendor_id, product_id, serial, interface } =>
				Link::Usb(UsbtmcClient::open(*vendor_id, *product_id, serial, *interface, timeout)?),
		};
		info!("connected to {}", resource);
		Ok(Session::new(link))
	}

	// Closes the session whether or not `f` succeeded
	pub fn with<R, F>(address: &str, timeout: Duration, f: F) -> Result<R>
		where F: FnOnce(&mut Session) -> Result<R>
	{
		let mut session = Session::connect(address, timeout)?;
		let result = f(&mut session);
		let closed = session.close();
		let value = result?;
		closed?;
		Ok(value)
	}

}

impl<T: Transport> Session<T> {

	pub fn new(transport: T) -> Self {
		Session { transport, open: true }
	}

	fn transport(&mut self) -> Result<&mut T> {
		if self.open { Ok(&mut self.transport) } else { Err(Error::Closed) }
	}

	pub fn write(&mut self, command: &str) -> Result<()> {
		debug!("> {}", command);
		self.transport()?.write(command.as_bytes())
	}

	pub fn query(&mut self, command: &str) -> Result<String> {
		self.write(command)?;
		let reply = String::from_utf8(self.transport()?.read()?)?;
		let reply = reply.trim_end().to_owned();
		debug!("< {}", reply);
		Ok(reply)
	}

	pub fn identify(&mut self) -> Result<String> {
		self.query("*IDN?")
	}

	// The last token, so a reply echoing its header (`:WFMPRE:YMULT 4.0E-2`) still parses
	pub fn query_float(&mut self, command: &str) -> Result<f64> {
		let reply = self.query(command)?;
		reply
			.split_whitespace()
			.last()
			.and_then(|token| token.parse::<f64>().ok())
			.ok_or_else(|| Error::Parse { command: command.to_owned(), reply })
	}

	pub fn query_raw(&mut self, command: &str) -> Result<Vec<u8>> {
		self.write(command)?;
		let reply = self.transport()?.read_raw()?;
		debug!("< [{} bytes]", reply.len());
		Ok(reply)
	}

	pub fn close(mut self) -> Result<()> {
		self.release()
	}

	fn release(&mut self) -> Result<()> {
		if !self.open {
			return Ok(());
		}
		self.open = false;
		debug!("closing session");
		self.transport.close()
	}

}

impl<T: Transport> Drop for Session<T> {
	fn drop(&mut self) {
		if let Err(e) = self.release() {
			warn!("failed to close instrument session: {}", e);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::testing::MockTransport;
	use crate::ErrorKind;

	#[test]
	fn query_float_parses_plain_and_headed_replies() {
		let mock = MockTransport::with_replies(&[b"4.0E-6\n", b":WFMPRE:YMULT 4.0E-2\n"]);
		let mut session = Session::new(mock.clone());
		assert_eq!(session.query_float("WFMPre:XINcr?").unwrap(), 4.0e-6);
		assert_eq!(session.query_float("WFMPre:YMUlt?").unwrap(), 4.0e-2);
		assert_eq!(mock.sent(), vec!["WFMPre:XINcr?", "WFMPre:YMUlt?"]);
	}

	#[test]
	fn non_numeric_reply_is_a_parse_error() {
		let mock = MockTransport::with_replies(&[b"CH1\n"]);
		let mut session = Session::new(mock);
		match session.query_float("WFMPre:YOFF?") {
			Err(e @ Error::Parse { .. }) => assert_eq!(e.kind(), ErrorKind::Parse),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn missing_reply_is_a_timeout() {
		let mut session = Session::new(MockTransport::default());
		assert_eq!(session.query_float("WFMPre:XZEro?").unwrap_err().kind(), ErrorKind::Timeout);
	}

	#[test]
	fn dropped_link_is_a_communication_error() {
		let mock = MockTransport::default();
		mock.push_reply(Err(Error::Communication(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))));
		let mut session = Session::new(mock);
		assert_eq!(session.query_raw("CURVE?").unwrap_err().kind(), ErrorKind::Communication);
	}

	#[test]
	fn identify_trims_the_reply() {
		let mock = MockTransport::with_replies(&[b"TEKTRONIX,TDS 2012B,C000000,CF:91.1CT FV:v22.11\r\n"]);
		let mut session = Session::new(mock.clone());
		assert_eq!(session.identify().unwrap(), "TEKTRONIX,TDS 2012B,C000000,CF:91.1CT FV:v22.11");
		assert_eq!(mock.sent(), vec!["*IDN?"]);
	}

	#[test]
	fn query_raw_keeps_bytes() {
		let mock = MockTransport::with_replies(&[b"#14\x00\x01\xfe\xff\n"]);
		let mut session = Session::new(mock);
		assert_eq!(session.query_raw("CURVE?").unwrap(), b"#14\x00\x01\xfe\xff\n");
	}

	#[test]
	fn close_happens_once() {
		let mock = MockTransport::default();
		let session = Session::new(mock.clone());
		session.close().unwrap();
		assert_eq!(mock.closes(), 1);
	}

	#[test]
	fn drop_closes_an_open_session() {
		let mock = MockTransport::default();
		{
			let mut session = Session::new(mock.clone());
			let _ = session.query_float("WFMPre:XINcr?");
		}
		assert_eq!(mock.closes(), 1);
	}

	#[test]
	fn failed_close_on_drop_does_not_panic() {
		let mock = MockTransport::default();
		mock.0.borrow_mut().fail_close = true;
		drop(Session::new(mock.clone()));
		assert_eq!(mock.closes(), 1);
	}
}

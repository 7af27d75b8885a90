// Raw SCPI over a TCP socket (`TCPIP::host::port::SOCKET`). Commands and text replies are
// newline terminated; binary replies either carry an IEEE 488.2 block header or end when the
// instrument stops sending.

use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::rpc::tcp_clients::connect_timeout;
use crate::session::{Transport, MAX_REPLY_LEN};

// Quiet time after which an unframed binary reply is taken as complete
pub const IDLE_GAP:Duration = Duration::from_millis(100);

pub trait ReadTimeout {
	fn set_read_timeout(&self, timeout:Option<Duration>) -> io::Result<()>;
}

impl ReadTimeout for TcpStream {
	fn set_read_timeout(&self, timeout:Option<Duration>) -> io::Result<()> {
		TcpStream::set_read_timeout(self, timeout)
	}
}

pub struct SocketClient<S = TcpStream> {
	reader: BufReader<S>,
	timeout: Duration,
	// A definite-length block was read and its terminator may still be in flight
	after_block: bool,
}

impl SocketClient<TcpStream> {

	pub fn connect(host:&str, port:u16, timeout:Duration) -> Result<Self> {
		let stream = connect_timeout((host, port), timeout)
			.map_err(|e| Error::connection(&format!("{}:{}", host, port), e))?;
		debug!("socket: connected to {}:{}", host, port);
		Ok(Self::from_stream(stream, timeout))
	}

}

fn too_long() -> Error {
	io::Error::new(ErrorKind::InvalidData, format!("reply exceeds {} bytes", MAX_REPLY_LEN)).into()
}

fn eof() -> Error {
	Error::Communication(io::Error::new(ErrorKind::UnexpectedEof, "instrument closed the connection"))
}

impl<S: Read + Write + ReadTimeout> SocketClient<S> {

	pub fn from_stream(stream:S, timeout:Duration) -> Self {
		SocketClient { reader: BufReader::new(stream), timeout, after_block: false }
	}

	fn peek(&mut self) -> Result<u8> {
		match self.reader.fill_buf()?.first() {
			Some(b) => Ok(*b),
			None => Err(eof()),
		}
	}

	fn skip_terminators(&mut self) -> Result<u8> {
		loop {
			let first = self.peek()?;
			if first != b'\n' && first != b'\r' {
				return Ok(first);
			}
			self.reader.consume(1);
		}
	}

	// Drops the "\n" or "\r\n" that follows the previous block, and nothing else
	fn skip_block_terminator(&mut self) -> Result<u8> {
		let mut first = self.peek()?;
		if self.after_block {
			self.after_block = false;
			if first == b'\r' {
				self.reader.consume(1);
				first = self.peek()?;
			}
			if first == b'\n' {
				self.reader.consume(1);
				first = self.peek()?;
			}
		}
		Ok(first)
	}

	fn read_line(&mut self, out:&mut Vec<u8>) -> Result<()> {
		let limit = (MAX_REPLY_LEN - out.len()) as u64 + 1;
		if (&mut self.reader).take(limit).read_until(b'\n', out)? == 0 {
			return Err(eof());
		}
		if out.len() > MAX_REPLY_LEN {
			return Err(too_long());
		}
		if out.last() != Some(&b'\n') {
			return Err(eof());
		}
		Ok(())
	}

	fn read_block(&mut self, out:&mut Vec<u8>) -> Result<()> {
		let mut head = [0u8; 2];
		self.reader.read_exact(&mut head)?;
		out.extend_from_slice(&head);

		let digits = match head[1] {
			d @ b'0'..=b'9' => (d - b'0') as usize,
			_ => return Err(io::Error::new(ErrorKind::InvalidData, "block header is missing its digit count").into()),
		};

		if digits == 0 {
			// Indefinite length, runs to the newline
			return self.read_line(out);
		}

		let start = out.len();
		out.resize(start + digits, 0);
		self.reader.read_exact(&mut out[start..])?;
		let len = std::str::from_utf8(&out[start..])
			.ok()
			.and_then(|s| s.parse::<usize>().ok())
			.ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "block header length is not a number"))?;
		if len > MAX_REPLY_LEN {
			return Err(too_long());
		}

		let start = out.len();
		out.resize(start + len, 0);
		self.reader.read_exact(&mut out[start..])?;
		self.after_block = true;
		Ok(())
	}

	// Everything the instrument sends until it goes quiet for IDLE_GAP
	fn read_until_idle(&mut self, out:&mut Vec<u8>) -> Result<()> {
		self.reader.get_ref().set_read_timeout(Some(IDLE_GAP.min(self.timeout)))?;
		let result:Result<()> = loop {
			let n = match self.reader.fill_buf() {
				Ok(buf) if buf.is_empty() => break Ok(()),
				Ok(buf) => {
					out.extend_from_slice(buf);
					buf.len()
				},
				Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => break Ok(()),
				Err(e) if e.kind() == ErrorKind::Interrupted => continue,
				Err(e) => break Err(e.into()),
			};
			self.reader.consume(n);
			if out.len() > MAX_REPLY_LEN {
				break Err(too_long());
			}
		};
		self.reader.get_ref().set_read_timeout(Some(self.timeout))?;
		result
	}

}

impl<S: Read + Write + ReadTimeout> Transport for SocketClient<S> {

	fn write(&mut self, data:&[u8]) -> Result<()> {
		let stream = self.reader.get_mut();
		stream.write_all(data)?;
		if data.last() != Some(&b'\n') {
			stream.write_all(b"\n")?;
		}
		stream.flush()?;
		Ok(())
	}

	fn read(&mut self) -> Result<Vec<u8>> {
		self.after_block = false;
		let mut out = vec![];
		if self.skip_terminators()? == b'#' {
			self.read_block(&mut out)?;
		} else {
			self.read_line(&mut out)?;
		}
		trace!("socket: read {} bytes", out.len());
		Ok(out)
	}

	fn read_raw(&mut self) -> Result<Vec<u8>> {
		let mut out = vec![];
		// Waits out the full timeout for the first byte
		if self.skip_block_terminator()? == b'#' {
			self.read_block(&mut out)?;
		} else {
			self.read_until_idle(&mut out)?;
		}
		trace!("socket: read {} raw bytes", out.len());
		Ok(out)
	}

	fn close(&mut self) -> Result<()> {
		self.reader.get_mut().flush()?;
		Ok(())
	}

}

#[cfg(test)]
mod test {
	use super::*;
	use crate::testing::ScriptedStream;

	fn client(script:&[u8]) -> SocketClient<ScriptedStream> {
		SocketClient::from_stream(ScriptedStream::new(script.to_vec()), Duration::from_millis(5000))
	}

	#[test]
	fn commands_are_newline_terminated() {
		let mut c = client(b"");
		c.write(b"DATA:ENC RPB").unwrap();
		c.write(b"*IDN?\n").unwrap();
		assert_eq!(c.reader.get_ref().written, b"DATA:ENC RPB\n*IDN?\n");
	}

	#[test]
	fn text_reply_ends_at_newline() {
		let mut c = client(b"4.0E-6\n1.0E-3\n");
		assert_eq!(c.read().unwrap(), b"4.0E-6\n");
		assert_eq!(c.read().unwrap(), b"1.0E-3\n");
	}

	#[test]
	fn definite_block_is_read_by_length() {
		// payload contains a newline that must not end the read
		let mut c = client(b"#15ab\ncd\n0.5\n");
		assert_eq!(c.read().unwrap(), b"#15ab\ncd");
		assert_eq!(c.read().unwrap(), b"0.5\n");
	}

	#[test]
	fn indefinite_block_runs_to_newline() {
		let mut c = client(b"#0abc\n");
		assert_eq!(c.read().unwrap(), b"#0abc\n");
	}

	#[test]
	fn raw_reply_keeps_line_ending_bytes() {
		let mut c = client(&[0x0A, 0x00, 0x02, 0x0D, 0x0A, 0x0A, 0x14]);
		assert_eq!(c.read_raw().unwrap(), &[0x0A, 0x00, 0x02, 0x0D, 0x0A, 0x0A, 0x14]);
	}

	#[test]
	fn raw_read_after_block_drops_only_its_terminator() {
		let mut c = client(b"#12ab\r\n\n\x01");
		assert_eq!(c.read_raw().unwrap(), b"#12ab");
		assert_eq!(c.read_raw().unwrap(), b"\n\x01");
	}

	#[test]
	fn oversized_block_is_refused() {
		let mut c = client(b"#9999999999");
		assert_eq!(c.read_raw().unwrap_err().kind(), crate::ErrorKind::Communication);
	}

	#[test]
	fn short_block_is_an_error() {
		let mut c = client(b"#210abc");
		assert_eq!(c.read().unwrap_err().kind(), crate::ErrorKind::Communication);
	}

	#[test]
	fn closed_connection_is_reported() {
		let mut c = client(b"partial");
		assert_eq!(c.read().unwrap_err().kind(), crate::ErrorKind::Communication);
		assert_eq!(client(b"").read_raw().unwrap_err().kind(), crate::ErrorKind::Communication);
	}
}


use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::trace;

use crate::xdr::{Packer, Unpacker};
use super::{xdr_pack, xdr_unpack};

const LAST_FRAGMENT:u32 = 0x8000_0000;

// Largest reassembled record accepted; a device_read reply is at most READ_REQUEST_SIZE plus headers
pub const MAX_RECORD_LEN:usize = 0x0020_0000;

// Reads and writes on the returned stream time out after `timeout` too
pub fn connect_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> io::Result<TcpStream> {
	let mut last_err = Error::new(ErrorKind::AddrNotAvailable, "Host did not resolve to any address");
	for sock_addr in addr.to_socket_addrs()? {
		match TcpStream::connect_timeout(&sock_addr, timeout) {
			Ok(stream) => {
				stream.set_read_timeout(Some(timeout))?;
				stream.set_write_timeout(Some(timeout))?;
				stream.set_nodelay(true)?;
				return Ok(stream);
			},
			Err(e) => last_err = e,
		}
	}
	Err(last_err)
}

pub struct TcpClient<S = TcpStream> {
	stream: S,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: Packer,
	pub unpacker: Unpacker,
}

impl TcpClient<TcpStream> {

	pub fn connect<A: ToSocketAddrs>(addr: A, prog: u32, vers: u32, timeout: Duration) -> io::Result<Self> {
		Ok(Self::from_stream(connect_timeout(addr, timeout)?, prog, vers))
	}

}

impl<S: Read + Write> TcpClient<S> {

	pub fn from_stream(stream: S, prog: u32, vers: u32) -> Self {
		Self{ stream, prog, vers, lastxid: 0, packer: Packer::new(), unpacker: Unpacker::new() }
	}

	// Arguments are packed into self.packer after this returns
	pub fn start_call(&mut self, prc: u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	pub fn do_call(&mut self) -> io::Result<()> {
		let call = self.packer.as_bytes();
		trace!("rpc call xid={} prog={:#x} ({} bytes)", self.lastxid, self.prog, call.len());

		let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
		send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
		send_bytes.extend_from_slice(call);
		self.stream.write_all(&send_bytes)?;
		self.stream.flush()?;

		loop {
			let reply = self.read_record()?;
			self.unpacker.reset(&reply);

			let xid = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(());
			} else if xid < self.lastxid {
				// Reply to an earlier call that we already gave up on
				trace!("discarding stale rpc reply xid={}", xid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::InvalidData, "Got an RPC reply for a call that was never made"));
			}
		}
	}

	fn read_record(&mut self) -> io::Result<Vec<u8>> {
		let mut reply:Vec<u8> = vec![];

		let mut last = false;
		while !last {
			let marker = self.stream.read_u32::<BigEndian>()?;
			last = (marker & LAST_FRAGMENT) != 0;

			let n = (marker & !LAST_FRAGMENT) as usize;
			if reply.len() + n > MAX_RECORD_LEN {
				return Err(Error::new(ErrorKind::InvalidData, "RPC record is too long"));
			}
			let start = reply.len();
			reply.resize(start + n, 0);
			self.stream.read_exact(&mut reply[start..])?;
		}

		Ok(reply)
	}

	#[cfg(test)]
	pub fn stream(&self) -> &S { &self.stream }

}

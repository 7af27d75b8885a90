
// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;

// Operation flags
pub const FLAG_END:i32 = 8;

// Read termination reasons
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

// Largest chunk requested per device_read
pub const READ_REQUEST_SIZE:u32 = 0x0010_0000;

use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use log::{debug, trace};

use crate::error::{DeviceError, Error, Result};
use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping};
use crate::rpc::tcp_clients::TcpClient;
use crate::session::{Transport, MAX_EMPTY_READS, MAX_REPLY_LEN};

pub mod xdr_pack;

fn device_error(code:i32) -> Error {
	match DeviceError::from_code(code) {
		DeviceError::IoTimeout => Error::Timeout,
		other => Error::Device(other),
	}
}

// Core channel holding at most one link
pub struct CoreClient<S = TcpStream> {
	client: TcpClient<S>,
	timeout_ms: u32,
	opt_link: Option<Link>,
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
	pub link_id: i32,
	pub max_recv_size: u32,
}

impl CoreClient<TcpStream> {

	pub fn open(host:&str, device:&str, timeout:Duration) -> Result<Self> {
		let address = format!("{}/{}", host, device);

		let mapping = Mapping {
			program: DEVICE_CORE_PROG,
			version: DEVICE_CORE_VERS,
			port: 0,
		};
		let port = TcpPortMapperClient::new(host, timeout)
			.and_then(|mut pmap| pmap.get_port(&mapping))
			.map_err(|e| Error::connection(&address, e))?;

		let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, timeout)
			.map_err(|e| Error::connection(&address, e))?;

		let mut core = CoreClient::from_client(client, timeout);
		core.create_link(device)?;
		Ok(core)
	}

}

impl<S: Read + Write> CoreClient<S> {

	pub fn from_client(client:TcpClient<S>, timeout:Duration) -> Self {
		let timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
		CoreClient { client, timeout_ms, opt_link: None }
	}

	pub fn link(&self) -> Option<Link> { self.opt_link }

	fn link_id(&self) -> Result<i32> {
		self.opt_link.map(|link| link.link_id).ok_or(Error::Closed)
	}

	pub fn create_link(&mut self, device:&str) -> Result<()> {
		if self.opt_link.is_some() {
			return Err(Error::LinkRefused(DeviceError::ChannelAlreadyEstablished));
		}

		self.client.start_call(CREATE_LINK)?;
		xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, self.timeout_ms, device)?;
		self.client.do_call()?;

		let error:i32         = self.client.unpacker.unpack_i32()?;
		let link_id:i32       = self.client.unpacker.unpack_i32()?;
		let _abort_port:u32   = self.client.unpacker.unpack_u32()?;
		let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

		if error != 0 {
			return Err(Error::LinkRefused(DeviceError::from_code(error)));
		}

		debug!("vxi11: link {} to {} (max_recv_size={})", link_id, device, max_recv_size);
		self.opt_link = Some(Link{ link_id, max_recv_size });
		Ok(())
	}

	// Chunked to max_recv_size, END on the last chunk
	pub fn write(&mut self, data:&[u8]) -> Result<()> {
		let link = self.opt_link.ok_or(Error::Closed)?;
		let chunk_size = match link.max_recv_size as usize { 0 => data.len().max(1), n => n };

		let mut chunks = data.chunks(chunk_size).peekable();
		while let Some(chunk) = chunks.next() {
			let flags = if chunks.peek().is_none() { FLAG_END } else { 0 };

			self.client.start_call(DEVICE_WRITE)?;
			xdr_pack::pack_device_write_parms(&mut self.client.packer, link.link_id, self.timeout_ms, self.timeout_ms, flags, chunk)?;
			self.client.do_call()?;

			let error:i32 = self.client.unpacker.unpack_i32()?;
			let size:u32  = self.client.unpacker.unpack_u32()?;
			if error != 0 {
				return Err(device_error(error));
			}
			if size as usize != chunk.len() {
				return Err(io::Error::new(ErrorKind::InvalidData, "Number of bytes in confirmation doesn't match number of bytes sent").into());
			}
		}

		Ok(())
	}

	pub fn read(&mut self) -> Result<Vec<u8>> {
		let link_id = self.link_id()?;
		let mut ans:Vec<u8> = vec![];
		let mut empty_reads = 0;

		loop {
			self.client.start_call(DEVICE_READ)?;
			xdr_pack::pack_device_read_parms(&mut self.client.packer, link_id, READ_REQUEST_SIZE, self.timeout_ms, self.timeout_ms, 0, 0)?;
			self.client.do_call()?;

			let error:i32    = self.client.unpacker.unpack_i32()?;
			let reason:i32   = self.client.unpacker.unpack_i32()?;
			let data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;
			if error != 0 {
				return Err(device_error(error));
			}

			trace!("vxi11: read {} bytes, reason {:#b}", data.len(), reason);
			if ans.len() + data.len() > MAX_REPLY_LEN {
				return Err(io::Error::new(ErrorKind::InvalidData, "device_read reply is too long").into());
			}
			ans.extend_from_slice(&data);

			if reason & REASON_END != 0 {
				return Ok(ans);
			}
			if reason & (REASON_REQCNT | REASON_CHR) == 0 {
				return Err(io::Error::new(ErrorKind::InvalidData, "device_read returned without a termination reason").into());
			}
			empty_reads = if data.is_empty() { empty_reads + 1 } else { 0 };
			if empty_reads > MAX_EMPTY_READS {
				return Err(io::Error::new(ErrorKind::InvalidData, "device_read keeps returning no data").into());
			}
		}
	}

	pub fn destroy_link(&mut self) -> Result<()> {
		let link_id = self.link_id()?;

		self.client.start_call(DESTROY_LINK)?;
		xdr_pack::pack_device_link(&mut self.client.packer, link_id)?;
		self.client.do_call()?;

		// The link is gone from our side whatever the instrument answers
		self.opt_link = None;
		match self.client.unpacker.unpack_i32()? {
			0 => Ok(()),
			code => Err(device_error(code)),
		}
	}

}

impl<S: Read + Write> Transport for CoreClient<S> {
	fn write(&mut self, data:&[u8]) -> Result<()> { CoreClient::write(self, data) }
	fn read(&mut self) -> Result<Vec<u8>> { CoreClient::read(self) }
	fn close(&mut self) -> Result<()> { self.destroy_link() }
}

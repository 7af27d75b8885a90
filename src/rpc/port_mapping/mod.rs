
pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

use std::io::{self, Error, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use log::debug;

use super::IPPROTO_TCP;
use super::xdr_pack;
use super::tcp_clients::TcpClient;

#[derive(Debug)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub port: u32,				// XDR carries the port as a u32
}

pub struct TcpPortMapperClient<S = TcpStream> {
	client: TcpClient<S>,
}

impl TcpPortMapperClient<TcpStream> {

	pub fn new(host:&str, timeout:Duration) -> io::Result<Self> {
		let client = TcpClient::connect((host, PMAP_PORT), PMAP_PROG, PMAP_VERS, timeout)?;
		Ok(Self{ client })
	}

}

impl<S: Read + Write> TcpPortMapperClient<S> {

	pub fn from_stream(stream:S) -> Self {
		Self{ client: TcpClient::from_stream(stream, PMAP_PROG, PMAP_VERS) }
	}

	pub fn get_port(&mut self, m:&Mapping) -> io::Result<u16> {
		self.client.start_call(PMAPPROC_GETPORT)?;
		xdr_pack::pack_mapping(&mut self.client.packer, m.program, m.version, IPPROTO_TCP, m.port)?;
		self.client.do_call()?;

		let ans:u32 = self.client.unpacker.unpack_u32()?;
		if !self.client.unpacker.all_data_consumed() {
			return Err(Error::new(ErrorKind::InvalidData, "Data unexpectedly left over in unpacker after unpacking port"));
		}

		debug!("port mapper: program {:#x} v{} on tcp port {}", m.program, m.version, ans);
		match ans {
			0 => Err(Error::new(ErrorKind::NotFound, format!("Program {:#x} is not registered with the port mapper", m.program))),
			p if p > u16::MAX as u32 => Err(Error::new(ErrorKind::InvalidData, "Port mapper returned an out of range port")),
			p => Ok(p as u16),
		}
	}

}

#[cfg(test)]
mod test {
	use super::*;
	use crate::rpc::xdr_pack::pack_replyheader;
	use crate::testing::{record, ScriptedStream};
	use crate::xdr::Packer;

	fn port_reply(port:u32) -> Vec<u8> {
		let mut packer = Packer::new();
		pack_replyheader(&mut packer, 1).unwrap();
		packer.pack_u32(port).unwrap();
		record(packer.as_bytes())
	}

	#[test]
	fn returns_registered_port() {
		let mut pmap = TcpPortMapperClient::from_stream(ScriptedStream::new(port_reply(1024)));
		let mapping = Mapping{ program: 0x0607af, version: 1, port: 0 };
		assert_eq!(pmap.get_port(&mapping).unwrap(), 1024);
	}

	#[test]
	fn unregistered_program_is_not_found() {
		let mut pmap = TcpPortMapperClient::from_stream(ScriptedStream::new(port_reply(0)));
		let mapping = Mapping{ program: 0x0607af, version: 1, port: 0 };
		assert_eq!(pmap.get_port(&mapping).unwrap_err().kind(), ErrorKind::NotFound);
	}
}

// USB Test & Measurement Class bulk messaging, the transport behind `USB::...::INSTR`

use std::io::{self, ErrorKind};
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use crate::error::{Error, Result};
use crate::session::{Transport, MAX_EMPTY_READS, MAX_REPLY_LEN};

pub mod device;

pub use device::NusbPipe;

pub const HEADER_SIZE:usize = 12;

// MsgID values
pub const DEV_DEP_MSG_OUT:u8         = 1;
pub const REQUEST_DEV_DEP_MSG_IN:u8  = 2;
pub const DEV_DEP_MSG_IN:u8          = 2;

// bmTransferAttributes
pub const ATTR_EOM:u8 = 0x01;

pub const READ_REQUEST_SIZE:u32 = 0x0001_0000;
pub const BULK_IN_SIZE:usize    = 0x1000;

// Raw bulk endpoints of one claimed USBTMC interface
pub trait BulkPipe {
	fn bulk_out(&mut self, data:Vec<u8>) -> Result<()>;
	fn bulk_in(&mut self, max_len:usize) -> Result<Vec<u8>>;
}

fn invalid(msg:&str) -> Error {
	io::Error::new(ErrorKind::InvalidData, msg.to_owned()).into()
}

pub fn pack_header(msg_id:u8, tag:u8, transfer_size:u32, attributes:u8) -> Vec<u8> {
	let mut header = vec![0u8; HEADER_SIZE];
	header[0] = msg_id;
	header[1] = tag;
	header[2] = !tag;
	LittleEndian::write_u32(&mut header[4..8], transfer_size);
	header[8] = attributes;
	header
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InHeader {
	pub tag: u8,
	pub transfer_size: u32,
	pub eom: bool,
}

pub fn unpack_in_header(bytes:&[u8]) -> Result<InHeader> {
	if bytes.len() < HEADER_SIZE {
		return Err(invalid("bulk-in transfer is shorter than its header"));
	}
	if bytes[0] != DEV_DEP_MSG_IN {
		return Err(invalid("bulk-in transfer is not DEV_DEP_MSG_IN"));
	}
	if bytes[2] != !bytes[1] {
		return Err(invalid("bulk-in bTagInverse does not match bTag"));
	}
	Ok(InHeader {
		tag: bytes[1],
		transfer_size: LittleEndian::read_u32(&bytes[4..8]),
		eom: bytes[8] & ATTR_EOM != 0,
	})
}

pub struct UsbtmcClient<P = NusbPipe> {
	pipe: P,
	tag: u8,
}

impl UsbtmcClient<NusbPipe> {

	pub fn open(vendor_id:u16, product_id:u16, serial:&str, interface:Option<u8>, timeout:Duration) -> Result<Self> {
		let pipe = NusbPipe::open(vendor_id, product_id, serial, interface, timeout)?;
		debug!("usbtmc: opened {:04x}:{:04x} serial {}", vendor_id, product_id, serial);
		Ok(Self::from_pipe(pipe))
	}

}

impl<P: BulkPipe> UsbtmcClient<P> {

	pub fn from_pipe(pipe:P) -> Self {
		UsbtmcClient { pipe, tag: 1 }
	}

	// bTag runs 1..=255, never 0
	fn next_tag(&mut self) -> u8 {
		let tag = self.tag;
		self.tag = if tag == 255 { 1 } else { tag + 1 };
		tag
	}

	// One DEV_DEP_MSG_OUT carrying the whole message with EOM set
	pub fn write(&mut self, data:&[u8]) -> Result<()> {
		let tag = self.next_tag();
		let mut msg = pack_header(DEV_DEP_MSG_OUT, tag, data.len() as u32, ATTR_EOM);
		msg.extend_from_slice(data);
		msg.resize((msg.len() + 3) & !3, 0);
		trace!("usbtmc: write {} bytes, tag {}", data.len(), tag);
		self.pipe.bulk_out(msg)
	}

	// Requests DEV_DEP_MSG_IN transfers until one arrives with EOM set
	pub fn read(&mut self) -> Result<Vec<u8>> {
		let mut ans:Vec<u8> = vec![];
		let mut empty_reads = 0;

		loop {
			let tag = self.next_tag();
			self.pipe.bulk_out(pack_header(REQUEST_DEV_DEP_MSG_IN, tag, READ_REQUEST_SIZE, 0))?;

			let first = self.pipe.bulk_in(BULK_IN_SIZE)?;
			let header = unpack_in_header(&first)?;
			if header.tag != tag {
				return Err(invalid("bulk-in bTag does not match the request"));
			}
			let size = header.transfer_size as usize;
			if size > READ_REQUEST_SIZE as usize {
				return Err(invalid("device sent more than was requested"));
			}
			if ans.len() + size > MAX_REPLY_LEN {
				return Err(invalid("reply is too long"));
			}

			let mut payload = first[HEADER_SIZE..].to_vec();
			while payload.len() < size {
				let more = self.pipe.bulk_in(BULK_IN_SIZE)?;
				if more.is_empty() {
					return Err(invalid("bulk-in transfer ended before its transfer size"));
				}
				payload.extend_from_slice(&more);
			}
			// Alignment bytes
			payload.truncate(size);
			ans.extend_from_slice(&payload);
			trace!("usbtmc: read {} bytes, tag {}, eom {}", size, tag, header.eom);

			if header.eom {
				return Ok(ans);
			}
			empty_reads = if size == 0 { empty_reads + 1 } else { 0 };
			if empty_reads > MAX_EMPTY_READS {
				return Err(invalid("device keeps sending empty transfers"));
			}
		}
	}

}

impl<P: BulkPipe> Transport for UsbtmcClient<P> {
	fn write(&mut self, data:&[u8]) -> Result<()> { UsbtmcClient::write(self, data) }
	fn read(&mut self) -> Result<Vec<u8>> { UsbtmcClient::read(self) }
	// The interface is released when the pipe is dropped
	fn close(&mut self) -> Result<()> { Ok(()) }
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::testing::MockPipe;

	fn msg_in(tag:u8, payload:&[u8], eom:bool) -> Vec<u8> {
		let mut out = pack_header(DEV_DEP_MSG_IN, tag, payload.len() as u32, if eom { ATTR_EOM } else { 0 });
		out.extend_from_slice(payload);
		out.resize((out.len() + 3) & !3, 0);
		out
	}

	fn client(packets:Vec<Vec<u8>>) -> UsbtmcClient<MockPipe> {
		UsbtmcClient::from_pipe(MockPipe::new(packets))
	}

	#[test]
	fn write_is_one_padded_message_with_eom() {
		let mut c = client(vec![]);
		c.write(b"*IDN?\n").unwrap();
		let mut expected = vec![1, 1, 0xFE, 0, 6, 0, 0, 0, 1, 0, 0, 0];
		expected.extend_from_slice(b"*IDN?\n\0\0");
		assert_eq!(c.pipe.sent, vec![expected]);
	}

	#[test]
	fn read_requests_then_collects_one_transfer() {
		let mut c = client(vec![msg_in(1, b"TEKTRONIX,TDS 2012B\n", true)]);
		assert_eq!(c.read().unwrap(), b"TEKTRONIX,TDS 2012B\n");
		assert_eq!(c.pipe.sent, vec![vec![2, 1, 0xFE, 0, 0, 0, 1, 0, 0, 0, 0, 0]]);
	}

	#[test]
	fn binary_payload_is_kept_whole() {
		let mut c = client(vec![msg_in(1, &[0x00, 0x02, 0x0A, 0x0D, 0x0A, 0x14], true)]);
		assert_eq!(c.read().unwrap(), &[0x00, 0x02, 0x0A, 0x0D, 0x0A, 0x14]);
	}

	#[test]
	fn transfer_spanning_packets_is_reassembled() {
		let full = msg_in(1, b"#15abcde\n", true);
		let (head, tail) = full.split_at(HEADER_SIZE + 3);
		let mut c = client(vec![head.to_vec(), tail.to_vec()]);
		assert_eq!(c.read().unwrap(), b"#15abcde\n");
	}

	#[test]
	fn transfers_repeat_until_eom() {
		let mut c = client(vec![msg_in(1, b"#14", false), msg_in(2, b"wxyz\n", true)]);
		assert_eq!(c.read().unwrap(), b"#14wxyz\n");
		assert_eq!(c.pipe.sent.len(), 2);
		assert_eq!(c.pipe.sent[1][1], 2);
	}

	#[test]
	fn mismatched_tag_is_a_communication_error() {
		let mut c = client(vec![msg_in(7, b"1.0\n", true)]);
		assert_eq!(c.read().unwrap_err().kind(), crate::ErrorKind::Communication);
	}

	#[test]
	fn corrupt_header_is_rejected() {
		let mut packet = msg_in(1, b"1.0\n", true);
		packet[2] = 0;
		assert!(client(vec![packet]).read().is_err());
		assert!(client(vec![vec![2, 1]]).read().is_err());
	}

	#[test]
	fn endless_empty_transfers_are_refused() {
		let packets = (1..=40u8).map(|tag| msg_in(tag, b"", false)).collect();
		let mut c = client(packets);
		assert_eq!(c.read().unwrap_err().kind(), crate::ErrorKind::Communication);
		assert_eq!(c.pipe.sent.len(), MAX_EMPTY_READS + 1);
	}

	#[test]
	fn silent_device_times_out() {
		let mut c = client(vec![]);
		assert_eq!(c.read().unwrap_err().kind(), crate::ErrorKind::Timeout);
	}

	#[test]
	fn tag_skips_zero() {
		let mut c = client(vec![]);
		c.tag = 255;
		assert_eq!(c.next_tag(), 255);
		assert_eq!(c.next_tag(), 1);
	}
}

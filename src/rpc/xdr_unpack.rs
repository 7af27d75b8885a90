
use std::io::{self, Error, ErrorKind};

use crate::xdr::Unpacker;
use crate::rpc::{REPLY, MSG_DENIED, RPC_MISMATCH, AUTH_ERROR, MSG_ACCEPTED, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS, SUCCESS};

fn err(msg:String) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub fn unpack_auth(unpacker:&mut Unpacker) -> io::Result<(i32, Vec<u8>)> {
	let flavor:i32    = unpacker.unpack_enum()?;
	let stuff:Vec<u8> = unpacker.unpack_variable_len_opaque()?;
	Ok((flavor, stuff))
}

// Returns the xid; anything but an accepted, successful reply is an error
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> io::Result<u32> {
	let xid:u32 = unpacker.unpack_u32()?;

	let mtype:i32 = unpacker.unpack_enum()?;
	if mtype != REPLY {
		return Err(Error::new(ErrorKind::InvalidData, format!("Expected an RPC reply but got message type {}", mtype)));
	}

	match unpacker.unpack_enum()? {
		MSG_ACCEPTED => { },
		MSG_DENIED => {
			return match unpacker.unpack_enum()? {
				RPC_MISMATCH => {
					let low  = unpacker.unpack_u32()?;
					let high = unpacker.unpack_u32()?;
					Err(err(format!("RPC call denied, server supports versions {} to {}", low, high)))
				},
				AUTH_ERROR => {
					let stat = unpacker.unpack_u32()?;
					Err(err(format!("RPC call denied, authentication error {}", stat)))
				},
				other => Err(err(format!("RPC call denied for unknown reason {}", other))),
			};
		},
		other => return Err(Error::new(ErrorKind::InvalidData, format!("Unknown RPC reply status {}", other))),
	}

	// Verifier is always AUTH_NONE for the servers we talk to
	unpack_auth(unpacker)?;

	match unpacker.unpack_enum()? {
		SUCCESS => Ok(xid),
		PROG_UNAVAIL  => Err(err("RPC program unavailable".to_owned())),
		PROG_MISMATCH => {
			let low  = unpacker.unpack_u32()?;
			let high = unpacker.unpack_u32()?;
			Err(err(format!("RPC program mismatch, server supports versions {} to {}", low, high)))
		},
		PROC_UNAVAIL  => Err(err("RPC procedure unavailable".to_owned())),
		GARBAGE_ARGS  => Err(err("RPC server could not decode the arguments".to_owned())),
		other => Err(err(format!("RPC call failed with accept status {}", other))),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::rpc::xdr_pack::pack_replyheader;
	use crate::xdr::Packer;

	#[test]
	fn accepted_reply_yields_xid() {
		let mut packer = Packer::new();
		pack_replyheader(&mut packer, 42).unwrap();
		packer.pack_u32(7).unwrap();

		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.as_bytes());
		assert_eq!(unpack_replyheader(&mut unpacker).unwrap(), 42);
		assert_eq!(unpacker.unpack_u32().unwrap(), 7);
	}

	#[test]
	fn denied_reply_is_an_error() {
		let mut packer = Packer::new();
		packer.pack_u32(1).unwrap();
		packer.pack_enum(REPLY).unwrap();
		packer.pack_enum(MSG_DENIED).unwrap();
		packer.pack_enum(RPC_MISMATCH).unwrap();
		packer.pack_u32(2).unwrap();
		packer.pack_u32(2).unwrap();

		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.as_bytes());
		let e = unpack_replyheader(&mut unpacker).unwrap_err();
		assert!(e.to_string().contains("versions 2 to 2"));
	}
}

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;

lazy_static! {
	static ref TCPIP_INSTR_RE: Regex  = Regex::new(r"(?i)^TCPIP\d*::([^:]+)(?:::([^:]+))?::INSTR$").unwrap();
	static ref TCPIP_SOCKET_RE: Regex = Regex::new(r"(?i)^TCPIP\d*::([^:]+)::(\d+)::SOCKET$").unwrap();
	static ref USB_INSTR_RE: Regex    = Regex::new(r"(?i)^USB\d*::(0x[0-9a-f]+|\d+)::(0x[0-9a-f]+|\d+)::([^:]+)(?:::(\d+))?::INSTR$").unwrap();
}

pub const DEFAULT_VXI11_DEVICE: &str = "inst0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAddress {
	// TCPIP::host[::device]::INSTR
	Vxi11 { host: String, device: String },
	Socket { host: String, port: u16 },
	Usb { vendor_id: u16, product_id: u16, serial: String, interface: Option<u8> },
}

fn parse_id(s: &str) -> Option<u16> {
	match s.get(..2) {
		Some("0x") | Some("0X") => u16::from_str_radix(&s[2..], 16).ok(),
		_ => s.parse().ok(),
	}
}

impl FromStr for ResourceAddress {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Error> {
		let s = s.trim();
		let invalid = || Error::InvalidAddress(s.to_owned());

		if let Some(caps) = TCPIP_SOCKET_RE.captures(s) {
			let port = caps[2].parse::<u16>().map_err(|_| invalid())?;
			return Ok(ResourceAddress::Socket { host: caps[1].to_owned(), port });
		}

		if let Some(caps) = TCPIP_INSTR_RE.captures(s) {
			let device = caps.get(2).map_or(DEFAULT_VXI11_DEVICE, |m| m.as_str());
			return Ok(ResourceAddress::Vxi11 { host: caps[1].to_owned(), device: device.to_owned() });
		}

		if let Some(caps) = USB_INSTR_RE.captures(s) {
			let vendor_id = parse_id(&caps[1]).ok_or_else(invalid)?;
			let product_id = parse_id(&caps[2]).ok_or_else(invalid)?;
			let interface = match caps.get(4) {
				Some(m) => Some(m.as_str().parse::<u8>().map_err(|_| invalid())?),
				None => None,
			};
			return Ok(ResourceAddress::Usb { vendor_id, product_id, serial: caps[3].to_owned(), interface });
		}

		Err(invalid())
	}
}

impl fmt::Display for ResourceAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResourceAddress::Vxi11 { host, device } => write!(f, "TCPIP0::{}::{}::INSTR", host, device),
			ResourceAddress::Socket { host, port } => write!(f, "TCPIP0::{}::{}::SOCKET", host, port),
			ResourceAddress::Usb { vendor_id, product_id, serial, interface: Some(i) } =>
				write!(f, "USB0::{:#06x}::{:#06x}::{}::{}::INSTR", vendor_id, product_id, serial, i),
			ResourceAddress::Usb { vendor_id, product_id, serial, interface: None } =>
				write!(f, "USB0::{:#06x}::{:#06x}::{}::INSTR", vendor_id, product_id, serial),
		}
	}
}

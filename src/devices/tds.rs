
use std::str;
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::Serialize;

use crate::error::Result;
use crate::session::{Link, Session, Transport};
use crate::waveform::{self, BlockFraming, Scaling, Waveform};

lazy_static! {
	static ref IDN_RE: Regex = Regex::new(r"^([^,]+),([^,]+),([^,]+),([^,]+)$").unwrap();
}

// Transfer setup: channel 1, positive binary, one byte per point
pub const DATA_SOURCE:&str = "DATA:SOURCE CH1";
pub const DATA_ENCODING:&str = "DATA:ENC RPB";
pub const DATA_WIDTH:&str = "DATA:WIDTH 1";

// Waveform preamble
pub const X_INCREMENT:&str = "WFMPre:XINcr?";
pub const X_ORIGIN:&str = "WFMPre:XZEro?";
pub const Y_MULTIPLIER:&str = "WFMPre:YMUlt?";
pub const Y_ORIGIN:&str = "WFMPre:YZEro?";
pub const Y_OFFSET:&str = "WFMPre:YOFF?";

pub const CURVE:&str = "CURVE?";

// `*IDN?` reply split into its four standard fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

impl Identity {
	pub fn parse(idn:&str) -> Option<Self> {
		let caps = IDN_RE.captures(idn.trim())?;
		Some(Identity {
			manufacturer: caps[1].trim().to_owned(),
			model: caps[2].trim().to_owned(),
			serial_num: caps[3].trim().to_owned(),
			fw_version: caps[4].trim().to_owned(),
		})
	}
}

pub struct Tds<T: Transport = Link> {
	session: Session<T>,
	identity: String,
}

impl Tds<Link> {

	pub fn connect(address:&str, timeout:Duration) -> Result<Self> {
		Tds::new(Session::connect(address, timeout)?)
	}

	// Disconnects whether or not `f` succeeded
	pub fn with<R, F>(address:&str, timeout:Duration, f:F) -> Result<R>
		where F: FnOnce(&mut Tds) -> Result<R>
	{
		let mut scope = Tds::connect(address, timeout)?;
		let result = f(&mut scope);
		let closed = scope.close();
		let value = result?;
		closed?;
		Ok(value)
	}

}

impl<T: Transport> Tds<T> {

	pub fn new(mut session:Session<T>) -> Result<Self> {
		let identity = session.identify()?;
		match Identity::parse(&identity) {
			Some(idn) => info!("instrument: {}", serde_json::to_string(&idn).unwrap_or_default()),
			None => info!("instrument: {}", identity),
		}
		Ok(Tds{ session, identity })
	}

	pub fn identity(&self) -> &str { &self.identity }

	pub fn configure_transfer(&mut self) -> Result<()> {
		for cmd in &[DATA_SOURCE, DATA_ENCODING, DATA_WIDTH] {
			self.session.write(cmd)?;
		}
		Ok(())
	}

	pub fn scaling(&mut self) -> Result<Scaling> {
		let scaling = Scaling {
			x_increment:  self.session.query_float(X_INCREMENT)?,
			x_origin:     self.session.query_float(X_ORIGIN)?,
			y_multiplier: self.session.query_float(Y_MULTIPLIER)?,
			y_origin:     self.session.query_float(Y_ORIGIN)?,
			y_offset:     self.session.query_float(Y_OFFSET)?,
		};
		debug!("preamble: {:?}", scaling);
		Ok(scaling)
	}

	pub fn transfer_curve_raw(&mut self) -> Result<Vec<u8>> {
		self.session.query_raw(CURVE)
	}

	pub fn capture(&mut self, framing:BlockFraming) -> Result<Waveform> {
		self.configure_transfer()?;
		let scaling = self.scaling()?;
		let block = self.transfer_curve_raw()?;
		let waveform = waveform::decode_with(&block, &scaling, framing)?;
		info!("captured {} points from a {} byte block", waveform.len(), block.len());
		Ok(waveform)
	}

	pub fn close(self) -> Result<()> { self.session.close() }

}

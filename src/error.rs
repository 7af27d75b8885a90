use std::io;

use thiserror::Error;

use crate::waveform::DecodeError;

// Device_ErrorCode values from the VXI-11 core channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
	#[error("syntax error")]
	Syntax,
	#[error("device not accessible")]
	NotAccessible,
	#[error("invalid link identifier")]
	InvalidLink,
	#[error("parameter error")]
	Parameter,
	#[error("channel not established")]
	ChannelNotEstablished,
	#[error("operation not supported")]
	OperationNotSupported,
	#[error("out of resources")]
	OutOfResources,
	#[error("device locked by another link")]
	Locked,
	#[error("no lock held by this link")]
	NoLockHeld,
	#[error("I/O timeout")]
	IoTimeout,
	#[error("I/O error")]
	Io,
	#[error("invalid address")]
	InvalidAddress,
	#[error("abort")]
	Abort,
	#[error("channel already established")]
	ChannelAlreadyEstablished,
	#[error("unknown device error {0}")]
	Unknown(i32),
}

impl DeviceError {
	pub fn from_code(code: i32) -> Self {
		match code {
			1  => DeviceError::Syntax,
			3  => DeviceError::NotAccessible,
			4  => DeviceError::InvalidLink,
			5  => DeviceError::Parameter,
			6  => DeviceError::ChannelNotEstablished,
			8  => DeviceError::OperationNotSupported,
			9  => DeviceError::OutOfResources,
			11 => DeviceError::Locked,
			12 => DeviceError::NoLockHeld,
			15 => DeviceError::IoTimeout,
			17 => DeviceError::Io,
			21 => DeviceError::InvalidAddress,
			23 => DeviceError::Abort,
			29 => DeviceError::ChannelAlreadyEstablished,
			other => DeviceError::Unknown(other),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	Connection,
	Timeout,
	Communication,
	Instrument,
	Parse,
	Decode,
	Render,
	Config,
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid resource address `{0}`")]
	InvalidAddress(String),
	#[error("unable to connect to {address}: {source}")]
	Connection {
		address: String,
		#[source]
		source: io::Error,
	},
	#[error("instrument refused the link: {0}")]
	LinkRefused(DeviceError),
	#[error("operation timed out")]
	Timeout,
	#[error("communication failure: {0}")]
	Communication(#[source] io::Error),
	#[error("USB transfer failed: {0}")]
	Usb(#[from] nusb::transfer::TransferError),
	#[error("instrument reported an error: {0}")]
	Device(DeviceError),
	#[error("session is already closed")]
	Closed,
	#[error("reply to `{command}` is not a number: {reply:?}")]
	Parse { command: String, reply: String },
	#[error("reply is not valid UTF-8")]
	Utf8(#[from] std::string::FromUtf8Error),
	#[error("malformed sample block: {0}")]
	Decode(#[from] DecodeError),
	#[error("failed to render plot: {0}")]
	Render(String),
	#[error("invalid configuration: {0}")]
	Config(String),
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::InvalidAddress(_)
			| Error::Connection { .. }
			| Error::LinkRefused(_) => ErrorKind::Connection,
			Error::Timeout | Error::Device(DeviceError::IoTimeout) => ErrorKind::Timeout,
			Error::Communication(_) | Error::Usb(_) | Error::Closed => ErrorKind::Communication,
			Error::Device(_) => ErrorKind::Instrument,
			Error::Parse { .. } | Error::Utf8(_) => ErrorKind::Parse,
			Error::Decode(_) => ErrorKind::Decode,
			Error::Render(_) => ErrorKind::Render,
			Error::Config(_) => ErrorKind::Config,
		}
	}

	pub(crate) fn connection(address: &str, source: io::Error) -> Self {
		Error::Connection { address: address.to_owned(), source }
	}
}

impl From<io::Error> for Error {
	fn from(error: io::Error) -> Self {
		match error.kind() {
			// Socket timeouts surface as either kind depending on the platform
			io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
			_ => Error::Communication(error),
		}
	}
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>> for Error {
	fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
		Error::Render(format!("{:?}", value))
	}
}

pub type Result<T> = std::result::Result<T, Error>;

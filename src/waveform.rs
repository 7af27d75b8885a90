
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	#[error("block of {len} bytes is shorter than its {needed} byte header")]
	Truncated { needed: usize, len: usize },
	#[error("block does not start with '#' (found {0:#04x})")]
	MissingMarker(u8),
	#[error("block header digit count {0:#04x} is not an ASCII digit")]
	BadDigitCount(u8),
	#[error("block header length field is not a decimal number")]
	BadLength,
	#[error("block declares {declared} payload bytes but only {available} follow the header")]
	ShortPayload { declared: usize, available: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockFraming {
	// Payload runs from 2 + block[1] to the end, terminator included
	SingleByteLength,
	// #<d><d digits of length><payload>, or #0<payload>\n
	#[serde(rename = "ieee488_2")]
	Ieee4882,
}

impl Default for BlockFraming {
	fn default() -> Self { BlockFraming::SingleByteLength }
}

impl BlockFraming {
	pub fn payload<'a>(&self, block: &'a [u8]) -> Result<&'a [u8], DecodeError> {
		match self {
			BlockFraming::SingleByteLength => {
				let header_len = *block.get(1).ok_or(DecodeError::Truncated { needed: 2, len: block.len() })? as usize;
				let data_start = 2 + header_len;
				block.get(data_start..).ok_or(DecodeError::Truncated { needed: data_start, len: block.len() })
			},
			BlockFraming::Ieee4882 => {
				if block.len() < 2 {
					return Err(DecodeError::Truncated { needed: 2, len: block.len() });
				}
				if block[0] != b'#' {
					return Err(DecodeError::MissingMarker(block[0]));
				}
				let digits = match block[1] {
					d @ b'0'..=b'9' => (d - b'0') as usize,
					other => return Err(DecodeError::BadDigitCount(other)),
				};
				if digits == 0 {
					let body = &block[2..];
					return Ok(body.strip_suffix(b"\n").unwrap_or(body));
				}

				let data_start = 2 + digits;
				let len_field = block.get(2..data_start).ok_or(DecodeError::Truncated { needed: data_start, len: block.len() })?;
				let declared = std::str::from_utf8(len_field)
					.ok()
					.and_then(|s| s.parse::<usize>().ok())
					.ok_or(DecodeError::BadLength)?;

				let available = block.len() - data_start;
				if available < declared {
					return Err(DecodeError::ShortPayload { declared, available });
				}
				Ok(&block[data_start..data_start + declared])
			},
		}
	}
}

// `WFMPre` values mapping sample index to seconds and sample code to volts
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scaling {
	pub x_increment: f64,
	pub x_origin: f64,
	pub y_multiplier: f64,
	pub y_origin: f64,
	pub y_offset: f64,
}

impl Scaling {
	pub fn time(&self, index: usize) -> f64 {
		index as f64 * self.x_increment + self.x_origin
	}

	pub fn voltage(&self, sample: u8) -> f64 {
		(sample as f64 - self.y_offset) * self.y_multiplier + self.y_origin
	}
}

// `time` and `voltage` always have the same length
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Waveform {
	time: Vec<f64>,
	voltage: Vec<f64>,
}

impl Waveform {
	pub fn from_samples(samples: &[u8], scaling: &Scaling) -> Self {
		let time = (0..samples.len()).map(|i| scaling.time(i)).collect();
		let voltage = samples.iter().map(|s| scaling.voltage(*s)).collect();
		Waveform { time, voltage }
	}

	pub fn time(&self) -> &[f64] { &self.time }
	pub fn voltage(&self) -> &[f64] { &self.voltage }

	pub fn len(&self) -> usize { self.time.len() }
	pub fn is_empty(&self) -> bool { self.time.is_empty() }

	pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
		self.time.iter().copied().zip(self.voltage.iter().copied())
	}

	pub fn time_range(&self) -> Option<(f64, f64)> { min_max(&self.time) }
	pub fn voltage_range(&self) -> Option<(f64, f64)> { min_max(&self.voltage) }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
	let first = *values.first()?;
	Some(values.iter().fold((first, first), |(lo, hi), v| (lo.min(*v), hi.max(*v))))
}

pub fn decode(block: &[u8], scaling: &Scaling) -> Result<Waveform, DecodeError> {
	decode_with(block, scaling, BlockFraming::SingleByteLength)
}

pub fn decode_with(block: &[u8], scaling: &Scaling, framing: BlockFraming) -> Result<Waveform, DecodeError> {
	let samples = framing.payload(block)?;
	Ok(Waveform::from_samples(samples, scaling))
}

// Capture settings. Every field has a default, so a file only lists what it changes:
// { "address": "TCPIP0::192.168.2.3::4000::SOCKET", "block_framing": "ieee488_2" }

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::DEFAULT_TIMEOUT;
use crate::waveform::BlockFraming;

pub const CONFIG_ENV: &str = "SCOPEWAVE_CONFIG";

pub const DEFAULT_ADDRESS: &str = "TCPIP0::192.168.1.10::inst0::INSTR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
	pub address: String,
	// Bounds every instrument operation
	pub timeout_ms: u64,
	pub block_framing: BlockFraming,
	pub plot: PlotConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotConfig {
	pub path: PathBuf,
	pub width: u32,
	pub height: u32,
}

impl Default for CaptureConfig {
	fn default() -> Self {
		CaptureConfig {
			address: DEFAULT_ADDRESS.to_owned(),
			timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
			block_framing: BlockFraming::default(),
			plot: PlotConfig::default(),
		}
	}
}

impl Default for PlotConfig {
	fn default() -> Self {
		PlotConfig { path: PathBuf::from("waveform.png"), width: 1000, height: 400 }
	}
}

impl CaptureConfig {

	pub fn load(path: &Path) -> Result<Self> {
		let text = fs::read_to_string(path)
			.map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
		let config: CaptureConfig = serde_json::from_str(&text)
			.map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
		config.validate()?;
		debug!("loaded config from {}", path.display());
		Ok(config)
	}

	// Defaults when SCOPEWAVE_CONFIG is unset
	pub fn from_env() -> Result<Self> {
		match env::var_os(CONFIG_ENV) {
			Some(path) => CaptureConfig::load(Path::new(&path)),
			None => Ok(CaptureConfig::default()),
		}
	}

	pub fn with_address(mut self, address: Option<String>) -> Self {
		if let Some(address) = address {
			self.address = address;
		}
		self
	}

	pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }

	pub fn validate(&self) -> Result<()> {
		if self.address.trim().is_empty() {
			return Err(Error::Config("address is empty".to_owned()));
		}
		if self.timeout_ms == 0 {
			return Err(Error::Config("timeout_ms must be greater than zero".to_owned()));
		}
		if self.plot.width == 0 || self.plot.height == 0 {
			return Err(Error::Config("plot width and height must be greater than zero".to_owned()));
		}
		Ok(())
	}

}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::Write;

	use crate::error::ErrorKind;

	fn load_str(json: &str) -> Result<CaptureConfig> {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(json.as_bytes()).unwrap();
		CaptureConfig::load(file.path())
	}

	#[test]
	fn defaults_match_the_reference_capture() {
		let config = CaptureConfig::default();
		assert_eq!(config.timeout(), Duration::from_millis(5000));
		assert_eq!(config.block_framing, BlockFraming::SingleByteLength);
		assert_eq!((config.plot.width, config.plot.height), (1000, 400));
		config.validate().unwrap();
	}

	#[test]
	fn partial_file_keeps_other_defaults() {
		let config = load_str(r#"{ "address": "TCPIP::10.0.0.5::4000::SOCKET", "block_framing": "ieee488_2" }"#).unwrap();
		assert_eq!(config.address, "TCPIP::10.0.0.5::4000::SOCKET");
		assert_eq!(config.block_framing, BlockFraming::Ieee4882);
		assert_eq!(config.timeout_ms, 5000);
		assert_eq!(config.plot, PlotConfig::default());
	}

	#[test]
	fn bad_values_are_config_errors() {
		for json in &[r#"{ "timeout_ms": 0 }"#, r#"{ "plot": { "width": 0 } }"#, r#"{ "adress": "typo" }"#, "not json"] {
			assert_eq!(load_str(json).unwrap_err().kind(), ErrorKind::Config, "{}", json);
		}
	}

	#[test]
	fn missing_file_is_a_config_error() {
		let dir = tempfile::tempdir().unwrap();
		let e = CaptureConfig::load(&dir.path().join("absent.json")).unwrap_err();
		assert_eq!(e.kind(), ErrorKind::Config);
	}

	#[test]
	fn argument_overrides_address() {
		let config = CaptureConfig::default().with_address(Some("TCPIP::scope::INSTR".to_owned()));
		assert_eq!(config.address, "TCPIP::scope::INSTR");
		let config = config.with_address(None);
		assert_eq!(config.address, "TCPIP::scope::INSTR");
	}
}

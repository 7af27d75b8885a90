use std::env;

use log::error;

use scopewave::{plot, CaptureConfig, Tds};

fn run() -> scopewave::Result<()> {
	let config = CaptureConfig::from_env()?.with_address(env::args().nth(1));
	config.validate()?;

	Tds::with(&config.address, config.timeout(), |scope| {
		println!("Connected to: {}", scope.identity());

		let waveform = scope.capture(config.block_framing)?;
		plot::render(&waveform, &config.plot)?;
		println!("Saved {} points to {}", waveform.len(), config.plot.path.display());
		Ok(())
	})
}

fn main() {
	env_logger::init();

	if let Err(e) = run() {
		error!("capture failed ({:?}): {}", e.kind(), e);
		println!("Error: {}", e);
	}
}

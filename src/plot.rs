use log::info;
use plotters::prelude::*;

use crate::config::PlotConfig;
use crate::error::{Error, Result};
use crate::waveform::Waveform;

pub const TITLE: &str = "Oscilloscope Waveform - Channel 1";
pub const X_LABEL: &str = "Time (s)";
pub const Y_LABEL: &str = "Voltage (V)";

// Axis bounds for a range, widened so a flat trace still gets a visible axis
fn axis_bounds((lo, hi): (f64, f64), margin: f64) -> (f64, f64) {
	let span = hi - lo;
	if span.abs() <= f64::EPSILON * lo.abs().max(1.0) {
		let pad = if lo == 0.0 { 1.0 } else { lo.abs() * 0.1 };
		(lo - pad, hi + pad)
	} else {
		(lo - span * margin, hi + span * margin)
	}
}

pub fn render(waveform: &Waveform, config: &PlotConfig) -> Result<()> {
	let (t_range, v_range) = match (waveform.time_range(), waveform.voltage_range()) {
		(Some(t), Some(v)) => (t, v),
		_ => return Err(Error::Render("waveform has no samples".to_owned())),
	};
	let (t_min, t_max) = axis_bounds(t_range, 0.0);
	let (v_min, v_max) = axis_bounds(v_range, 0.05);

	let root = BitMapBackend::new(&config.path, (config.width, config.height)).into_drawing_area();
	root.fill(&WHITE)?;

	let mut chart = ChartBuilder::on(&root)
		.margin(10)
		.caption(TITLE, ("sans-serif", 20))
		.set_label_area_size(LabelAreaPosition::Left, 60)
		.set_label_area_size(LabelAreaPosition::Bottom, 40)
		.build_cartesian_2d(t_min..t_max, v_min..v_max)?;

	chart
		.configure_mesh()
		.x_desc(X_LABEL)
		.y_desc(Y_LABEL)
		.x_label_formatter(&|t: &f64| format!("{:.2e}", t))
		.light_line_style(&BLACK.mix(0.1))
		.draw()?;

	chart.draw_series(LineSeries::new(waveform.points(), &BLUE))?;
	root.present()?;

	info!("plotted {} points to {}", waveform.len(), config.path.display());
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::error::ErrorKind;
	use crate::waveform::Scaling;

	#[test]
	fn empty_waveform_is_not_rendered() {
		let dir = tempfile::tempdir().unwrap();
		let config = PlotConfig { path: dir.path().join("empty.png"), ..PlotConfig::default() };
		let e = render(&Waveform::default(), &config).unwrap_err();
		assert_eq!(e.kind(), ErrorKind::Render);
		assert!(!config.path.exists());
	}

	#[test]
	fn unwritable_path_is_a_render_error() {
		let dir = tempfile::tempdir().unwrap();
		let config = PlotConfig { path: dir.path().join("missing").join("wf.png"), ..PlotConfig::default() };
		let scaling = Scaling { x_increment: 1e-6, y_multiplier: 0.04, y_offset: 128.0, ..Scaling::default() };
		let wf = Waveform::from_samples(&[100, 128, 156, 128], &scaling);
		assert_eq!(render(&wf, &config).unwrap_err().kind(), ErrorKind::Render);
	}

	#[test]
	fn flat_ranges_are_widened() {
		assert_eq!(axis_bounds((0.0, 0.0), 0.05), (-1.0, 1.0));
		let (lo, hi) = axis_bounds((2.0, 2.0), 0.05);
		assert!(lo < 2.0 && hi > 2.0);
		assert_eq!(axis_bounds((0.0, 1.0), 0.0), (0.0, 1.0));
	}
}

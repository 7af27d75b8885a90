use std::io::{self, ErrorKind};
use std::thread;
use std::time::{Duration, Instant};

use futures_lite::future::{block_on, poll_once};
use log::debug;
use nusb::transfer::{Direction, EndpointType, Queue, RequestBuffer};

use crate::error::{Error, Result};
use super::BulkPipe;

// Interface descriptor of a USBTMC function
const USBTMC_CLASS:u8    = 0xFE;
const USBTMC_SUBCLASS:u8 = 0x03;

const POLL_INTERVAL:Duration = Duration::from_millis(1);

// Bulk endpoints of a claimed interface, driven synchronously with a per-transfer timeout
pub struct NusbPipe {
	bulk_out: Queue<Vec<u8>>,
	bulk_in: Queue<RequestBuffer>,
	timeout: Duration,
}

// nusb's `TransferRequest` bound is not publicly nameable, so this is a macro
// expanding to a closure over the concrete queue type instead of a generic fn
macro_rules! wait {
	($queue:expr, $timeout:expr) => {(|| -> Result<_> {
	let queue = $queue;
	let timeout:Duration = $timeout;
	let deadline = Instant::now() + timeout;
	loop {
		if let Some(done) = block_on(poll_once(queue.next_complete())) {
			return Ok(done.into_result()?);
		}
		if Instant::now() >= deadline {
			queue.cancel_all();
			// A cancelled transfer still completes and has to be reaped
			let _ = block_on(queue.next_complete());
			return Err(Error::Timeout);
		}
		thread::sleep(POLL_INTERVAL);
	}
	})()};
}

impl NusbPipe {

	pub fn open(vendor_id:u16, product_id:u16, serial:&str, interface:Option<u8>, timeout:Duration) -> Result<Self> {
		let address = format!("USB {:04x}:{:04x} {}", vendor_id, product_id, serial);
		let fail = |e:io::Error| Error::connection(&address, e);

		let info = nusb::list_devices()
			.map_err(fail)?
			.find(|d| d.vendor_id() == vendor_id && d.product_id() == product_id && d.serial_number() == Some(serial))
			.ok_or_else(|| fail(io::Error::new(ErrorKind::NotFound, "no such USB device")))?;
		let device = info.open().map_err(fail)?;
		let config = device.active_configuration()
			.map_err(|e| fail(io::Error::new(ErrorKind::Other, e.to_string())))?;

		let mut found = None;
		for group in config.interfaces() {
			if interface.map_or(false, |n| n != group.interface_number()) {
				continue;
			}
			for alt in group.alt_settings() {
				if alt.class() != USBTMC_CLASS || alt.subclass() != USBTMC_SUBCLASS {
					continue;
				}
				let mut ep_in = None;
				let mut ep_out = None;
				for ep in alt.endpoints() {
					match (ep.direction(), ep.transfer_type()) {
						(Direction::In, EndpointType::Bulk) => ep_in = Some(ep.address()),
						(Direction::Out, EndpointType::Bulk) => ep_out = Some(ep.address()),
						_ => {},
					}
				}
				if let (Some(ep_in), Some(ep_out)) = (ep_in, ep_out) {
					found = Some((group.interface_number(), ep_in, ep_out));
				}
			}
		}

		let (number, ep_in, ep_out) = found
			.ok_or_else(|| fail(io::Error::new(ErrorKind::NotFound, "device has no USBTMC interface")))?;
		let claimed = device.detach_and_claim_interface(number).map_err(fail)?;
		debug!("usbtmc: claimed interface {} (in {:#04x}, out {:#04x})", number, ep_in, ep_out);

		Ok(NusbPipe {
			bulk_out: claimed.bulk_out_queue(ep_out),
			bulk_in: claimed.bulk_in_queue(ep_in),
			timeout,
		})
	}

}

impl BulkPipe for NusbPipe {

	fn bulk_out(&mut self, data:Vec<u8>) -> Result<()> {
		self.bulk_out.submit(data);
		wait!(&mut self.bulk_out, self.timeout).map(|_| ())
	}

	fn bulk_in(&mut self, max_len:usize) -> Result<Vec<u8>> {
		self.bulk_in.submit(RequestBuffer::new(max_len));
		wait!(&mut self.bulk_in, self.timeout)
	}

}

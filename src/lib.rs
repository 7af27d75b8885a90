
// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol built on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// Plain SCPI over a TCP socket
pub mod socket;

// USB Test & Measurement Class, for instruments plugged in over USB
pub mod usbtmc;

// Resource strings, the session that talks to one instrument, and the drivers built on it
pub mod address;
pub mod session;
pub mod devices;

// Sample block decoding and rendering
pub mod waveform;
pub mod plot;

pub mod config;
pub mod error;

#[cfg(test)]
mod testing;

pub use address::ResourceAddress;
pub use config::{CaptureConfig, PlotConfig};
pub use devices::tds::{Identity, Tds};
pub use error::{DeviceError, Error, ErrorKind, Result};
pub use session::{Session, Transport};
pub use waveform::{BlockFraming, DecodeError, Scaling, Waveform};

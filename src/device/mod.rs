//! Acquisition device adapters.
//!
//! The pipeline only talks to [`AcquisitionDevice`]; hardware drivers live
//! behind it.

pub mod adapter;
pub mod cyton;
pub mod mock;
pub mod synthetic;

pub use adapter::{AcquisitionDevice, ChannelLayout, DeviceBatch};
pub use cyton::{CytonDaisyBoard, CytonDaisyDecoder};
pub use mock::{MockDevice, MockDeviceCalls, MockDeviceTracker};
pub use synthetic::SyntheticDevice;

use crate::config::{DeviceConfig, DeviceKind};
use crate::error::Result;

/// Builds the data source selected by `config`. Nothing is opened yet.
pub fn open_device(config: &DeviceConfig) -> Result<Box<dyn AcquisitionDevice>> {
    Ok(match config.kind {
        DeviceKind::CytonDaisy => Box::new(CytonDaisyBoard::new(&config.serial_port)),
        DeviceKind::Synthetic => Box::new(SyntheticDevice::new(config.sample_rate)?),
    })
}

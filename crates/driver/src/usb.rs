//! USB device discovery
//!
//! Finds Si4713 boards on the bus, reads their descriptors for listing, and
//! opens one into a [`UsbTransport`]: kernel driver detached from the HID
//! interface, interface claimed. Closing happens when the transport drops.

use crate::error::{DriverError, Result};
use crate::transport::{DEFAULT_TIMEOUT, UsbTransport};
use protocol::{USB_INTERFACE_CLASS, USB_PRODUCT_ID, USB_VENDOR_ID};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which devices to bind and how to talk to them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMatch {
    pub vendor_id: u16,
    pub product_id: u16,
    /// HID interface carrying the control pipe
    pub interface: u8,
    /// Per control transfer
    pub timeout: Duration,
}

impl Default for DeviceMatch {
    fn default() -> Self {
        Self {
            vendor_id: USB_VENDOR_ID,
            product_id: USB_PRODUCT_ID,
            interface: 0,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl DeviceMatch {
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

/// Listing entry for one matching board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub bus_number: u8,
    pub device_address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl DeviceSummary {
    /// Bus location as reported in capabilities
    pub fn bus_info(&self) -> String {
        bus_info(self.bus_number, self.device_address)
    }
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:03} Device {:03}: ID {:04x}:{:04x}",
            self.bus_number, self.device_address, self.vendor_id, self.product_id
        )?;
        if let Some(ref product) = self.product {
            write!(f, " {}", product)?;
        }
        if let Some(ref serial) = self.serial_number {
            write!(f, " (serial {})", serial)?;
        }
        Ok(())
    }
}

pub fn bus_info(bus_number: u8, device_address: u8) -> String {
    format!("usb-{}-{}", bus_number, device_address)
}

/// An opened board, ready to attach
pub struct OpenedDevice {
    pub summary: DeviceSummary,
    pub transport: UsbTransport,
}

fn usb_error(op: &'static str) -> impl FnOnce(rusb::Error) -> DriverError {
    move |source| DriverError::Usb { op, source }
}

/// Create a libusb context
pub fn context() -> Result<Context> {
    Context::new().map_err(usb_error("init"))
}

fn matching_devices(context: &Context, filter: &DeviceMatch) -> Result<Vec<Device<Context>>> {
    let devices = context.devices().map_err(usb_error("enumerate"))?;

    let mut found = Vec::new();
    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                debug!(
                    "Skipping device {}-{}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                continue;
            }
        };
        if filter.matches(descriptor.vendor_id(), descriptor.product_id()) {
            found.push(device);
        }
    }
    Ok(found)
}

/// Describe every board matching `filter`
pub fn list_devices(context: &Context, filter: &DeviceMatch) -> Result<Vec<DeviceSummary>> {
    let devices = matching_devices(context, filter)?;
    let summaries = devices
        .iter()
        .map(describe)
        .collect::<Result<Vec<_>>>()?;
    debug!("Found {} matching device(s)", summaries.len());
    Ok(summaries)
}

fn describe(device: &Device<Context>) -> Result<DeviceSummary> {
    let descriptor = device.device_descriptor().map_err(usb_error("descriptor"))?;

    // String descriptors need an open handle; listing works without them.
    let strings = device.open().ok().map(|handle| {
        (
            handle.read_manufacturer_string_ascii(&descriptor).ok(),
            handle.read_product_string_ascii(&descriptor).ok(),
            handle.read_serial_number_string_ascii(&descriptor).ok(),
        )
    });
    let (manufacturer, product, serial_number) = strings.unwrap_or((None, None, None));

    Ok(DeviceSummary {
        bus_number: device.bus_number(),
        device_address: device.address(),
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        manufacturer,
        product,
        serial_number,
    })
}

/// Open the first matching board
pub fn open_first(context: &Context, filter: &DeviceMatch) -> Result<OpenedDevice> {
    let device = matching_devices(context, filter)?
        .into_iter()
        .next()
        .ok_or(DriverError::Usb {
            op: "find",
            source: rusb::Error::NoDevice,
        })?;
    open(&device, filter)
}

/// Open `device` and claim its HID interface
pub fn open(device: &Device<Context>, filter: &DeviceMatch) -> Result<OpenedDevice> {
    let summary = describe(device)?;
    check_interface_class(device, filter.interface);

    let handle = device.open().map_err(|e| {
        warn!("Failed to open {}: {}", summary.bus_info(), e);
        DriverError::Usb {
            op: "open",
            source: e,
        }
    })?;

    let detached = detach_kernel_driver(&handle, filter.interface);

    if let Err(e) = handle.claim_interface(filter.interface) {
        warn!("Failed to claim interface {}: {}", filter.interface, e);
        if detached {
            reattach_kernel_driver(&handle, filter.interface);
        }
        return Err(DriverError::Usb {
            op: "claim",
            source: e,
        });
    }

    info!("Opened {} ({})", summary, summary.bus_info());
    Ok(OpenedDevice {
        summary,
        transport: UsbTransport::new(handle, filter.interface, filter.timeout, detached),
    })
}

fn detach_kernel_driver(handle: &DeviceHandle<Context>, interface: u8) -> bool {
    match handle.kernel_driver_active(interface) {
        Ok(true) => match handle.detach_kernel_driver(interface) {
            Ok(()) => {
                debug!("Detached kernel driver from interface {}", interface);
                true
            }
            Err(e) => {
                warn!(
                    "Failed to detach kernel driver from interface {}: {}",
                    interface, e
                );
                false
            }
        },
        Ok(false) => false,
        Err(e) => {
            debug!(
                "Could not check kernel driver status for interface {}: {}",
                interface, e
            );
            false
        }
    }
}

pub(crate) fn reattach_kernel_driver(handle: &DeviceHandle<Context>, interface: u8) {
    match handle.attach_kernel_driver(interface) {
        Ok(()) => debug!("Reattached kernel driver to interface {}", interface),
        Err(e) => debug!(
            "Could not reattach kernel driver to interface {}: {}",
            interface, e
        ),
    }
}

fn check_interface_class(device: &Device<Context>, interface: u8) {
    let Ok(config) = device.active_config_descriptor() else {
        return;
    };
    let class = config
        .interfaces()
        .find(|i| i.number() == interface)
        .and_then(|i| i.descriptors().next())
        .map(|d| d.class_code());

    match class {
        Some(USB_INTERFACE_CLASS) => {}
        Some(other) => warn!(
            "Interface {} has class {:#04x}, expected HID",
            interface, other
        ),
        None => warn!("Interface {} not present in active configuration", interface),
    }
}

//! Fixed wire parameters of the Si4713 USB development board
//!
//! These values are bit-exact with the board's HID control interface and must
//! not change when talking to real hardware.

/// USB vendor ID (the board announces itself as Cygnal Integrated Products)
pub const USB_VENDOR_ID: u16 = 0x10c4;

/// USB product ID
pub const USB_PRODUCT_ID: u16 = 0x8244;

/// USB interface class of the control interface (HID)
pub const USB_INTERFACE_CLASS: u8 = 0x03;

/// Size of every frame exchanged with the board
pub const BUFFER_LENGTH: usize = 64;

/// Byte 0 of every outbound frame
pub const FRAME_MARKER: u8 = 0x3f;

/// Byte 1 of a logical command frame
pub const SEND_COMMAND_MARKER: u8 = 0x06;

/// Response payload starts after the marker and status-echo bytes
pub const HEADER_LENGTH: usize = 2;

/// Marker, send marker and the 3-byte command prefix
pub const COMMAND_HEADER_LENGTH: usize = 5;

/// Largest argument payload a single frame can carry
pub const MAX_ARGS: usize = BUFFER_LENGTH - COMMAND_HEADER_LENGTH;

/// Largest read the bridge can serve from one response
pub const MAX_READ: usize = BUFFER_LENGTH - HEADER_LENGTH;

/// Largest startup payload (everything after the frame marker)
pub const MAX_STARTUP_PAYLOAD: usize = BUFFER_LENGTH - 1;

/// Host-to-device control transfer: bRequest (HID SET_REPORT)
pub const REQUEST_OUT: u8 = 0x09;

/// Host-to-device control transfer: bmRequestType (class, interface, OUT)
pub const REQUEST_TYPE_OUT: u8 = 0x21;

/// Device-to-host control transfer: bRequest (HID GET_REPORT)
pub const REQUEST_IN: u8 = 0x01;

/// Device-to-host control transfer: bmRequestType (class, interface, IN)
pub const REQUEST_TYPE_IN: u8 = 0xa1;

/// wValue for both directions (feature report 0x3f)
pub const REQUEST_VALUE: u16 = 0x033f;

/// wIndex for both directions
pub const REQUEST_INDEX: u16 = 0;

/// Clear-to-send bit in the chip status byte
pub const CTS: u8 = 0x80;

/// I2C slave address the chip answers on
pub const DEFAULT_SLAVE_ADDRESS: u16 = 0x63;

//! Web HID keyboard
//!
//! Turns browser key events received over a WebSocket into USB HID boot
//! keyboard reports written to a gadget device.

pub mod config;
pub mod error;
pub mod hid;
pub mod state;
pub mod utils;
pub mod web;

pub use error::{AppError, Result};

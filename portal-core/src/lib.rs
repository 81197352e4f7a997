//! Portal Core - Hardware-independent logic for the ESP32 update portal
//!
//! This crate contains the transactional update logic that can be tested
//! on the host platform without requiring ESP32 hardware: the persisted
//! configuration record, the firmware upload framing parser and the
//! staged Wi-Fi credential commit machine.

pub mod commit;
pub mod form;
pub mod image;
pub mod record;
pub mod upload;

//! usb-barcode host
//!
//! Bridges Android phones running a scanner app to the host. Phones are switched into
//! accessory mode, then each streams framed scan payloads that end up as `ScannerEvent`s on
//! a single event bus.

pub mod config;
pub mod output;
pub mod service;
pub mod usb;

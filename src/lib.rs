//! Home Raspberry Pi administration: folder backups, Bluetooth speakers and
//! USB microphone recording, each wrapping the standard Linux tools.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod logging;
pub mod report;

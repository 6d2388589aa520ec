//! Subcommand implementations.

pub mod ports;
pub mod transfer;

//! Shared building blocks for `lanshare`: address math, interface
//! enumeration and runtime configuration.

pub mod config;
pub mod network;

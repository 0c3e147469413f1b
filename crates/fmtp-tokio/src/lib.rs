//! Tokio-based runtime for FMTP channels
//!
//! This crate drives the sans-IO [`fmtp_core::Channel`] with real TCP
//! transports and timers. One [`Controller`] runs one channel in either the
//! client or the server role.
//!
//! # Features
//!
//! - Client and server TCP transports behind the [`Transport`] trait
//! - Generation-guarded protocol timers
//! - A single event loop per channel, talking to the application through queues
//!
//! # Examples
//!
//! The `fmtp-channel` binary runs a channel from a JSON settings file, and the
//! `client` example drives a client channel from stdin. The `fmtp-http` crate
//! puts an HTTP interface in front of a channel.

mod controller;
mod timer;
pub mod transport;

pub use controller::{ChannelHandle, Controller};
pub use timer::{Expiry, Timer, Timers};
pub use transport::{ClientTransport, RoleTransport, ServerTransport, Transport};

//! Transport trait interfaces for rocc
//!
//! This crate defines the interface between the session layer and whatever
//! carries Diameter messages to and from peers (routing, peer tables, wire
//! encoding). It contains no networking code itself, only a mock used by
//! tests and by the loopback daemon.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;

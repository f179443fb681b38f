//! Ro credit-control session layer
//!
//! This crate is the heart of rocc, containing:
//! - Failure-handling policy (grant or deny when the network misbehaves)
//! - Client session state machine (Idle -> Pending -> Open -> Terminated)
//! - Server session state machine (Idle -> Open -> Terminated)
//! - Tx, Validity and Supervision timers with race-free cancellation
//! - Session factory and registry routing inbound messages to sessions

pub mod client;
mod effect;
mod factory;
mod listener;
mod message_factory;
mod policy;
pub mod server;
mod session;
mod timer;

pub use effect::*;
pub use factory::*;
pub use listener::*;
pub use message_factory::*;
pub use policy::*;
pub use session::*;
pub use timer::*;

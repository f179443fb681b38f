//! Protocol types for the rocc Ro session layer
//!
//! This crate defines the types shared between the session core and its
//! external collaborators (transport, store, application listeners):
//! - Generic Diameter message and AVP model
//! - Credit-Control AVP and command codes
//! - Typed Credit-Control / Re-Auth event views
//! - Session roles, FSM states and failure-handling values

pub mod avp;
mod events;
mod message;
mod types;

pub use events::*;
pub use message::*;
pub use types::*;

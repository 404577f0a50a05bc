//! # Ports Layer
//!
//! Defines the port traits for the Atomic Indexing subsystem.
//!
//! ## Hexagonal Architecture
//!
//! - `inbound.rs` - Driving ports (API exposed to the execution layer and
//!   state-sync consumers)
//! - `outbound.rs` - Driven ports (storage required by the service)

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;

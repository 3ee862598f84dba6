//! # commune-shared
//!
//! Types shared by the Commune store and server: identifiers, the realtime
//! wire protocol, domain errors, and the event admission state machine.

pub mod constants;
pub mod error;
pub mod join;
pub mod protocol;
pub mod types;

pub use error::DomainError;

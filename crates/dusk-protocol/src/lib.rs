//! Dusk Protocol - Core types and message definitions
//!
//! Defines the envelope every coordinator/peer exchange travels in, the
//! closed set of game messages, and the JSON-RPC 2.0 frames used by the
//! TCP transport.

pub mod constants;
pub mod error;
pub mod messages;
pub mod types;

pub use constants::*;
pub use error::*;
pub use messages::*;
pub use types::*;

//! pktwire core library
//!
//! This crate provides the foundation shared by the pktwire codec crates:
//!
//! - [`error`] - the error taxonomy for decode and encode failures
//! - [`bits`] - reading and writing runs of bits that need not be byte aligned
//! - [`types`] - address value types such as [`MacAddress`]

pub mod bits;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use bits::{read_bits, write_bits};
pub use error::{Error, Result};
pub use types::MacAddress;

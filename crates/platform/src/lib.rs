//! # Osprey Platform
//!
//! Shared types for the Osprey SSH transport crates.
//!
//! This crate provides:
//! - The unified error type (`OspreyError`) and its taxonomy (`ErrorKind`)
//! - The `OspreyResult` alias used across the workspace
//!
//! # Examples
//!
//! ```
//! use osprey_platform::{ErrorKind, OspreyError, OspreyResult};
//!
//! fn lookup(name: &str) -> OspreyResult<&'static str> {
//!     match name {
//!         "aes128-ctr" => Ok("aes128-ctr"),
//!         other => Err(OspreyError::Configuration(format!("unknown cipher '{}'", other))),
//!     }
//! }
//!
//! # fn main() {
//! let err = lookup("rot13").unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Configuration);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{ErrorKind, OspreyError, OspreyResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

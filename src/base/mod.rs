//! Base types and error handling.
//!
//! Foundational pieces shared by the rest of the library:
//! - [`ServerError`](error::ServerError): construction and challenge errors
//! - [`DaemonConfig`](config::DaemonConfig): immutable daemon settings

pub mod config;
pub mod error;

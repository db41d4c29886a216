//! HTTP request and response collaborators.
//!
//! The accept loop, parser and send paths live in the host server; the
//! engine sees requests and responses only through these records:
//! - [`request`]: method, decoded URL, GET arguments, Authorization value
//! - [`response`]: header list plus pending digest challenges

pub mod request;
pub mod response;

// Re-exports for convenience
pub use request::Request;
pub use response::Response;

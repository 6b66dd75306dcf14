//! Backend integration
//!
//! HTTP client and wire types for the remote separation/mashup service.

pub mod client;
pub mod types;

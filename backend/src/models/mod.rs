//! # API Models
//!
//! This module defines the request and response structures for the
//! operator HTTP API. These are separate from the database and service
//! types so the wire format can evolve on its own.
//!
//! ## Organization
//!
//! - `requests.rs` - Incoming request bodies
//! - `responses.rs` - Response envelope and endpoint-specific bodies
//!
//! ## Serialization
//!
//! Field names are camelCase on the wire.

pub mod requests;
pub mod responses;

pub use requests::*;
pub use responses::*;

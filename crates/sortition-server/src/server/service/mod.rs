//! HTTP surface of the hub service.
//!
//! - [`handler`] - the request dispatcher ([`handler::HubService`]).
//! - [`error`] - mapping of failures onto status codes.

pub mod error;
pub mod handler;

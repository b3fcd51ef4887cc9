//! Server-side components of the `sortition` redirect service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration.
//! - [`service`] - Request dispatch and error-to-status mapping.
//! - [`telemetry`] - Console logging and optional OpenTelemetry export.

pub mod config;
pub mod service;
pub mod telemetry;

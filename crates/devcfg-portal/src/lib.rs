//! # devcfg-portal
//!
//! The configuration portal, independent of any HTTP server.
//!
//! This crate provides:
//! - Query string parsing and URL decoding
//! - The portal pages and the default form widgets
//! - Request dispatch over a shared settings registry
//! - Start/stop decisions from network events
//!
//! HTTP adapters (axum on Linux, esp-idf on the device) call
//! [`Portal::handle`] and write the returned [`PortalResponse`].

pub mod config;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod pages;
pub mod query;

pub use config::PortalConfig;
pub use error::PortalError;
pub use handler::{DeviceControl, Portal, PortalAction, PortalResponse, NO_CACHE_HEADERS};
pub use lifecycle::{LifecycleAction, PortalLifecycle};
pub use query::{url_decode, DecodeError};

//! # devcfg-server
//!
//! Tokio server hosting the configuration portal while the device is on a
//! network.
//!
//! Feed [`NetworkEvent`]s from the Wi-Fi layer into
//! [`PortalServer::event_sender`]; the portal binds on the first up event and
//! unbinds when the link goes away.

pub mod server;

pub use devcfg_core::NetworkEvent;
pub use server::{PortalServer, ServerConfig, ServerError, ServerEvent};

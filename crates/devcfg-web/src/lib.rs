//! # devcfg-web
//!
//! axum front end for the configuration portal.
//!
//! The router forwards every portal path to [`devcfg_portal::Portal`] on the
//! blocking pool, copies the result into an HTTP response, and schedules a
//! restart through [`DeviceControl`] when the portal asks for one.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use devcfg_web::{create_router, WebState};
//!
//! let app = create_router(WebState::new(portal, control));
//!
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod routes;

pub use routes::create_router;

use std::sync::Arc;

use devcfg_portal::{DeviceControl, Portal};

/// Shared state of the route handlers.
pub struct WebState {
    pub portal: Portal,
    pub control: Arc<dyn DeviceControl>,
}

impl WebState {
    pub fn new(portal: Portal, control: Arc<dyn DeviceControl>) -> AppState {
        Arc::new(Self { portal, control })
    }
}

/// Type alias for shared state in axum handlers.
pub type AppState = Arc<WebState>;

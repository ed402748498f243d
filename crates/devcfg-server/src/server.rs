//! Portal server following the network state.
//!
//! The HTTP listener only exists while the device has an address. Network
//! events arrive on an mpsc channel; [`PortalLifecycle`] decides when to bind
//! and when to shut the listener down.

use std::net::SocketAddr;

use devcfg_core::NetworkEvent;
use axum::Router;
use devcfg_portal::{LifecycleAction, PortalLifecycle};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the portal server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Events that can be sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// Link state change from the Wi-Fi layer.
    Network(NetworkEvent),
    /// Stop serving and return from [`PortalServer::run`].
    Shutdown,
}

impl From<NetworkEvent> for ServerEvent {
    fn from(event: NetworkEvent) -> Self {
        ServerEvent::Network(event)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

struct RunningPortal {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl RunningPortal {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            error!("Portal task on {} ended abnormally: {}", self.addr, e);
        }
        info!("Config portal on {} stopped", self.addr);
    }
}

/// The config portal server.
pub struct PortalServer {
    config: ServerConfig,
    app: Router,
    event_tx: mpsc::Sender<ServerEvent>,
    event_rx: mpsc::Receiver<ServerEvent>,
}

impl PortalServer {
    /// Create a server for `app`, usually the portal router from
    /// `devcfg-web`.
    pub fn new(config: ServerConfig, app: Router) -> Self {
        let (event_tx, event_rx) = mpsc::channel(32);
        Self {
            config,
            app,
            event_tx,
            event_rx,
        }
    }

    /// Get a sender for submitting events to the server.
    pub fn event_sender(&self) -> mpsc::Sender<ServerEvent> {
        self.event_tx.clone()
    }

    /// Process events until [`ServerEvent::Shutdown`] or until every sender is
    /// dropped.
    ///
    /// Fails with [`ServerError::Bind`] when the portal cannot bind its
    /// address after the network comes up.
    pub async fn run(self) -> Result<(), ServerError> {
        let PortalServer {
            config,
            app,
            event_tx,
            mut event_rx,
        } = self;
        // Only outside senders keep the loop alive.
        drop(event_tx);

        let mut lifecycle = PortalLifecycle::new();
        let mut running: Option<RunningPortal> = None;

        while let Some(event) = event_rx.recv().await {
            let network = match event {
                ServerEvent::Network(network) => network,
                ServerEvent::Shutdown => break,
            };
            debug!("Network event {:?}", network);
            match lifecycle.on_event(network) {
                Some(LifecycleAction::Start) => match start(&config, app.clone()).await {
                    Ok(portal) => running = Some(portal),
                    Err(e) => {
                        // Nothing is listening at this point.
                        error!("{}", e);
                        return Err(e);
                    }
                },
                Some(LifecycleAction::Stop) => {
                    if let Some(portal) = running.take() {
                        portal.stop().await;
                    }
                }
                None => {}
            }
        }

        if let Some(portal) = running.take() {
            portal.stop().await;
        }
        Ok(())
    }
}

async fn start(config: &ServerConfig, app: Router) -> Result<RunningPortal, ServerError> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        })?;
    let addr = listener.local_addr().unwrap_or(config.bind_addr);
    info!("Config portal listening on http://{}", addr);

    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = served {
            warn!("Config portal server error: {}", e);
        }
    });

    Ok(RunningPortal {
        addr,
        shutdown,
        handle,
    })
}

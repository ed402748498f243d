//! The configuration portal on `EspHttpServer`.
//!
//! Requests are answered by [`Portal::handle`]; this module only copies the
//! response onto the connection and starts or stops the server as the link
//! comes and goes.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use devcfg_core::NetworkEvent;
use devcfg_portal::{DeviceControl, LifecycleAction, Portal, PortalAction, PortalLifecycle};
use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::Write;
use log::{error, info};

const PORTAL_PATHS: [&str; 5] = ["/", "/style.min.css", "/setup", "/get", "/factory"];

/// Restarts the chip.
pub struct EspRestart;

impl DeviceControl for EspRestart {
    fn restart(&self) {
        info!("Restarting");
        esp_idf_svc::hal::reset::restart();
    }
}

/// Start an HTTP server answering the portal paths.
pub fn start_portal(
    portal: &Portal,
    control: &Arc<dyn DeviceControl>,
) -> Result<EspHttpServer<'static>> {
    let mut server = EspHttpServer::new(&Configuration {
        stack_size: 10240,
        ..Default::default()
    })?;

    for path in PORTAL_PATHS {
        let portal = portal.clone();
        let control = control.clone();
        server.fn_handler::<anyhow::Error, _>(path, Method::Get, move |req| {
            serve(&portal, &control, req)
        })?;
    }

    info!("Config portal started");
    Ok(server)
}

fn serve(
    portal: &Portal,
    control: &Arc<dyn DeviceControl>,
    req: Request<&mut EspHttpConnection>,
) -> Result<()> {
    let uri = req.uri().to_string();
    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri.as_str(), None),
    };
    let response = portal.handle(path, query);

    let mut headers = vec![("Content-Type", response.content_type)];
    headers.extend_from_slice(response.headers());
    let mut out = req.into_response(response.status, None, &headers)?;
    out.write_all(response.body.as_bytes())?;
    out.flush()?;

    if let Some(PortalAction::Reboot { delay }) = response.action {
        let control = control.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            control.restart();
        });
    }
    Ok(())
}

/// Serve the portal while the network is up. Returns when every event
/// sender has been dropped.
pub fn run_portal(
    portal: Portal,
    control: Arc<dyn DeviceControl>,
    events: Receiver<NetworkEvent>,
) {
    let mut lifecycle = PortalLifecycle::new();
    let mut server: Option<EspHttpServer<'static>> = None;

    for event in events {
        match lifecycle.on_event(event) {
            Some(LifecycleAction::Start) => match start_portal(&portal, &control) {
                Ok(started) => server = Some(started),
                Err(e) => {
                    error!("Failed to start config portal: {:?}", e);
                    lifecycle.mark_stopped();
                }
            },
            Some(LifecycleAction::Stop) => {
                if server.take().is_some() {
                    info!("Config portal stopped");
                }
            }
            None => {}
        }
    }
}

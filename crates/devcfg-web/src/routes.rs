//! HTTP routes of the configuration portal.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use devcfg_portal::{PortalAction, PortalResponse};
use tracing::{error, info};

use crate::AppState;

/// Create the router serving every portal page.
///
/// Routes:
/// - `/` - landing page, `?reboot=1` restarts the device
/// - `/style.min.css` - stylesheet
/// - `/setup` - namespace list and namespace forms
/// - `/get` - plain-text value of one entry
/// - `/factory` - factory reset
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(portal_handler))
        .route("/style.min.css", get(portal_handler))
        .route("/setup", get(portal_handler))
        .route("/get", get(portal_handler))
        .route("/factory", get(portal_handler))
        .fallback(portal_handler)
        .with_state(state)
}

async fn portal_handler(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().map(str::to_string);

    // The registry lock is synchronous and commits touch storage.
    let portal_state = state.clone();
    let served = tokio::task::spawn_blocking(move || {
        portal_state.portal.handle(&path, query.as_deref())
    })
    .await;

    let response = match served {
        Ok(response) => response,
        Err(e) => {
            error!("Portal handler task failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Some(PortalAction::Reboot { delay }) = response.action {
        let control = state.control.clone();
        tokio::spawn(async move {
            info!("Restarting device in {:?}", delay);
            tokio::time::sleep(delay).await;
            control.restart();
        });
    }

    into_http(response)
}

fn into_http(response: PortalResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, response.content_type);
    for (name, value) in response.headers() {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(response.body)).unwrap_or_else(|e| {
        error!("Building response failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WebState;
    use axum::http::Request;
    use devcfg_core::{Entry, EntryType, MemoryBackend, Namespace, Registry, Setting};
    use devcfg_portal::{DeviceControl, Portal, PortalConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Default)]
    struct CountingControl(AtomicUsize);

    impl DeviceControl for CountingControl {
        fn restart(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn app() -> (Router, Setting<u16>, Arc<CountingControl>) {
        let mut registry = Registry::init(Arc::new(MemoryBackend::new())).unwrap();
        let id = registry
            .register_namespace(Namespace::new("net", "Network", 2))
            .unwrap();
        let port = Setting::new(80u16);
        registry
            .register_entry(id, Entry::new("port", "Port", EntryType::U16, port.clone(), 80u16))
            .unwrap();
        let config = PortalConfig {
            reboot_delay_ms: 10,
            ..PortalConfig::default()
        };
        let portal = Portal::new(registry.into_shared(), config);
        let control = Arc::new(CountingControl::default());
        let router = create_router(WebState::new(portal, control.clone()));
        (router, port, control)
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_setup_then_get() {
        let (router, port, _) = app();
        let (status, headers, _) = get(router.clone(), "/setup?namespace=net&port=8080").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers.get(header::PRAGMA).unwrap(), "no-cache");
        assert_eq!(headers.get(header::EXPIRES).unwrap(), "0");
        assert_eq!(port.get(), 8080);

        let (status, headers, body) = get(router, "/get?namespace=net&entry=port").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "8080");
        assert!(headers
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_missing_entry_is_404() {
        let (router, _, _) = app();
        let (status, _, body) = get(router, "/get?namespace=net&entry=ssid").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "ERROR: Requested setting does not exist");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let (router, _, _) = app();
        let (status, _, _) = get(router, "/admin").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stylesheet() {
        let (router, _, _) = app();
        let (status, headers, body) = get(router, "/style.min.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/css");
        assert!(headers.get(header::CACHE_CONTROL).is_none());
        assert!(body.contains("body{"));
    }

    #[tokio::test]
    async fn test_reboot_restarts_after_response() {
        let (router, _, control) = app();
        let (status, _, body) = get(router, "/?reboot=1").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Rebooting device"));

        for _ in 0..100 {
            if control.0.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(control.0.load(Ordering::SeqCst), 1);
    }
}

mod config;

use std::sync::Arc;
use std::time::Duration;

use devcfg_core::network::{AccessPoint, ApScanner, ScanError};
use devcfg_core::{
    Attributes, Entry, EntryType, FileBackend, MemoryBackend, Namespace, NetworkEvent,
    NetworkSettings, Registry, Setting, StorageBackend, TextSetting, WifiMode,
};
use devcfg_portal::{DeviceControl, Portal};
use devcfg_server::{PortalServer, ServerConfig, ServerEvent};
use devcfg_web::{create_router, WebState};
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::DeviceConfig;

/// Stands in for a device restart: wakes `main`, which exits.
struct ProcessControl(Arc<Notify>);

impl DeviceControl for ProcessControl {
    fn restart(&self) {
        tracing::warn!("Restart requested");
        self.0.notify_one();
    }
}

/// Fixed list of neighbours for the SSID widget.
struct SimulatedScanner;

impl ApScanner for SimulatedScanner {
    fn scan(&self) -> Result<Vec<AccessPoint>, ScanError> {
        Ok(vec![
            AccessPoint { ssid: "Marina-Guest".into(), rssi: -52 },
            AccessPoint { ssid: "Harbour Office".into(), rssi: -67 },
            AccessPoint { ssid: "Pontoon-B".into(), rssi: -78 },
            AccessPoint { ssid: "Neighbour".into(), rssi: -88 },
        ])
    }
}

/// Settings of the simulated sensor node.
#[derive(Clone)]
struct DeviceSettings {
    name: TextSetting,
    interval: Setting<u32>,
    offset: Setting<i16>,
    gain: Setting<f32>,
    serial: Setting<u64>,
}

impl DeviceSettings {
    fn new() -> Self {
        Self {
            name: TextSetting::new("devcfg-sim", 32),
            interval: Setting::new(5),
            offset: Setting::new(0),
            gain: Setting::new(1.0),
            serial: Setting::new(0x00C0_FFEE),
        }
    }

    fn register(&self, registry: &mut Registry) -> anyhow::Result<()> {
        let id = registry.register_namespace(Namespace::new("device", "Device", 5))?;
        registry.register_entry(
            id,
            Entry::new("name", "Device name", EntryType::Text, self.name.clone(), "devcfg-sim"),
        )?;
        registry.register_entry(
            id,
            Entry::new("interval", "Report interval (s)", EntryType::U32, self.interval.clone(), 5u32),
        )?;
        registry.register_entry(
            id,
            Entry::new("offset", "Sensor offset", EntryType::I16, self.offset.clone(), 0i16),
        )?;
        registry.register_entry(
            id,
            Entry::new("gain", "Sensor gain", EntryType::Float, self.gain.clone(), 1.0f32)
                .with_attributes(Attributes::READ),
        )?;
        registry.register_entry(
            id,
            Entry::new("serial", "Serial number", EntryType::U64, self.serial.clone(), 0x00C0_FFEEu64)
                .with_attributes(Attributes::READ),
        )?;
        let summary = registry.load(id)?;
        tracing::info!(
            "Device settings: {} loaded, {} defaulted",
            summary.loaded.len(),
            summary.missing.len()
        );
        Ok(())
    }
}

/// Periodic report reading the settings through the module's own handles.
async fn report_loop(settings: DeviceSettings) {
    loop {
        let interval = settings.interval.get().max(1);
        tokio::time::sleep(Duration::from_secs(u64::from(interval))).await;
        let reading = 20.0 * settings.gain.get() + f32::from(settings.offset.get());
        tracing::info!("{}: reading {:.2}", settings.name.get(), reading);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,devcfg_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("devcfg simulator starting...");

    let config = DeviceConfig::from_env()?;

    let backend: Arc<dyn StorageBackend> = match &config.data_dir {
        Some(dir) => {
            tracing::info!("Storing settings in {}", dir.display());
            Arc::new(FileBackend::new(dir))
        }
        None => {
            tracing::info!("No data_dir configured, settings are kept in memory");
            Arc::new(MemoryBackend::new())
        }
    };
    let mut registry = Registry::init(backend)?;

    let network = NetworkSettings::new();
    network.register(&mut registry, Some(Arc::new(SimulatedScanner)))?;
    let device = DeviceSettings::new();
    device.register(&mut registry)?;

    let registry = registry.into_shared();
    let restart = Arc::new(Notify::new());
    let portal = Portal::new(registry, config.portal.clone());
    let state = WebState::new(portal, Arc::new(ProcessControl(restart.clone())));
    let app = create_router(state).layer(TraceLayer::new_for_http());

    let server = PortalServer::new(
        ServerConfig {
            bind_addr: config.bind_addr,
        },
        app,
    );
    let event_tx = server.event_sender();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("Portal server error: {}", e);
        }
    });

    // Simulated Wi-Fi bring-up
    let event = match network.mode(config.wifi_mode) {
        WifiMode::Station => {
            tracing::info!("Joining '{}' as {}", network.ssid(), network.hostname());
            NetworkEvent::StationGotIp
        }
        _ => {
            tracing::info!(
                "Starting access point '{}' (password '{}')",
                devcfg_core::network::AP_SSID,
                devcfg_core::network::AP_PASSWORD
            );
            NetworkEvent::AccessPointStarted
        }
    };
    event_tx.send(event.into()).await?;

    let report_handle = tokio::spawn(report_loop(device));

    tracing::info!("Config portal: http://{}/setup", config.bind_addr);

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = restart.notified() => {
            tracing::info!("Restarting: shutting down the simulator");
        }
        _ = report_handle => {
            tracing::warn!("Report loop stopped");
        }
    }

    let _ = event_tx.send(ServerEvent::Shutdown).await;
    let _ = server_handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

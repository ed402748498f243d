//! devcfg firmware for ESP32
//!
//! This binary requires the ESP32 Rust toolchain.
//! It will not compile with the standard Rust toolchain.
//!
//! Boot order: NVS, WiFi driver, settings registration (the SSID widget scans
//! through the driver), then WiFi bring-up. The portal thread follows the
//! link state and serves `/setup` whenever the device has an address.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use devcfg_core::{Entry, EntryType, Namespace, NetworkSettings, Registry, Setting, WifiMode};
use devcfg_esp32::http::{run_portal, EspRestart};
use devcfg_esp32::nvs::NvsBackend;
use devcfg_esp32::wifi::{bring_up, create_wifi, watch_network, WifiScanner};
use devcfg_portal::{Portal, PortalConfig};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use log::info;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("devcfg firmware starting...");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    let mut registry = Registry::init(Arc::new(NvsBackend::new()))?;
    let wifi = create_wifi(peripherals.modem, sysloop.clone())?;

    let network = NetworkSettings::new();
    network.register(&mut registry, Some(Arc::new(WifiScanner::new(wifi.clone()))))?;

    let heartbeat = Setting::new(10u16);
    let app = registry.register_namespace(Namespace::new("app", "Application", 1))?;
    registry.register_entry(
        app,
        Entry::new("heartbeat", "Heartbeat (s)", EntryType::U16, heartbeat.clone(), 10u16),
    )?;
    registry.load(app)?;

    let (event_tx, event_rx) = mpsc::channel();
    let _watch = watch_network(&sysloop, event_tx)?;

    let portal = Portal::new(registry.into_shared(), PortalConfig::default());
    thread::Builder::new()
        .name("portal".into())
        .stack_size(8192)
        .spawn(move || run_portal(portal, Arc::new(EspRestart), event_rx))?;

    let mode = bring_up(&wifi, &network, WifiMode::Auto)?;
    info!("WiFi up in {:?} mode, hostname {}", mode, network.hostname());

    loop {
        let secs = heartbeat.get().max(1);
        thread::sleep(Duration::from_secs(u64::from(secs)));
        info!("alive");
    }
}

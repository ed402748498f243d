//! ESP32 components for devcfg.
//!
//! This crate provides the device side of the settings registry:
//! - NVS storage backend
//! - WiFi bring-up (station or configuration access point) and access point
//!   scanning for the SSID widget
//! - The config portal on `EspHttpServer`, started and stopped with the link
//!
//! # Example
//!
//! ```ignore
//! use devcfg_esp32::{nvs::NvsBackend, wifi, http};
//!
//! let mut registry = Registry::init(Arc::new(NvsBackend::new()))?;
//! let driver = wifi::create_wifi(peripherals.modem, sysloop.clone())?;
//! network.register(&mut registry, Some(Arc::new(wifi::WifiScanner::new(driver.clone()))))?;
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! let _watch = wifi::watch_network(&sysloop, tx)?;
//! wifi::bring_up(&driver, &network, WifiMode::Auto)?;
//! http::run_portal(portal, Arc::new(http::EspRestart), rx);
//! ```

pub mod http;
pub mod nvs;
pub mod wifi;

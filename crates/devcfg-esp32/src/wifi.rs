//! WiFi bring-up for ESP32.
//!
//! The driver is created first so the SSID widget can scan through it, then
//! brought up as a station or as the configuration access point once the
//! `network` namespace has been loaded.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use devcfg_core::network::{AccessPoint, ApScanner, ScanError, AP_PASSWORD, AP_SSID};
use devcfg_core::{NetworkEvent, NetworkSettings, WifiMode};
use esp_idf_svc::{
    eventloop::{EspSubscription, EspSystemEventLoop, System},
    hal::peripheral,
    ipv4::IpEvent,
    wifi::{
        AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
        EspWifi, WifiEvent,
    },
};
use log::{info, warn};

/// The WiFi driver, shared between bring-up and the SSID scanner.
pub type SharedWifi = Arc<Mutex<BlockingWifi<EspWifi<'static>>>>;

/// Create the WiFi driver without starting it.
pub fn create_wifi(
    modem: impl peripheral::Peripheral<P = esp_idf_svc::hal::modem::Modem> + 'static,
    sysloop: EspSystemEventLoop,
) -> Result<SharedWifi> {
    let esp_wifi = EspWifi::new(modem, sysloop.clone(), None)?;
    let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
    Ok(Arc::new(Mutex::new(wifi)))
}

/// Scans through the shared driver for the SSID widget.
pub struct WifiScanner {
    wifi: SharedWifi,
}

impl WifiScanner {
    pub fn new(wifi: SharedWifi) -> Self {
        Self { wifi }
    }
}

impl ApScanner for WifiScanner {
    fn scan(&self) -> std::result::Result<Vec<AccessPoint>, ScanError> {
        let mut wifi = self
            .wifi
            .lock()
            .map_err(|_| ScanError("WiFi driver is locked".to_string()))?;
        let found = wifi.scan().map_err(|e| ScanError(e.to_string()))?;
        Ok(found
            .into_iter()
            .map(|ap| AccessPoint {
                ssid: ap.ssid.to_string(),
                rssi: ap.signal_strength,
            })
            .collect())
    }
}

/// Bring the interface up in the mode the settings call for.
///
/// Returns the mode actually used. A station that fails to connect falls back
/// to the access point so the portal stays reachable.
pub fn bring_up(wifi: &SharedWifi, settings: &NetworkSettings, mode: WifiMode) -> Result<WifiMode> {
    let mut wifi = wifi.lock().map_err(|_| anyhow!("WiFi driver lock poisoned"))?;

    if let Err(e) = wifi
        .wifi_mut()
        .sta_netif_mut()
        .set_hostname(&settings.hostname())
    {
        warn!("Could not set hostname '{}': {}", settings.hostname(), e);
    }

    match settings.mode(mode) {
        WifiMode::Station => match connect_station(&mut wifi, &settings.ssid(), &settings.password()) {
            Ok(()) => Ok(WifiMode::Station),
            Err(e) => {
                warn!("Station connect failed: {}, starting access point", e);
                let _ = wifi.stop();
                start_access_point(&mut wifi)?;
                Ok(WifiMode::AccessPoint)
            }
        },
        _ => {
            start_access_point(&mut wifi)?;
            Ok(WifiMode::AccessPoint)
        }
    }
}

fn connect_station(wifi: &mut BlockingWifi<EspWifi<'static>>, ssid: &str, password: &str) -> Result<()> {
    if ssid.is_empty() {
        bail!("WiFi SSID cannot be empty");
    }

    let auth_method = if password.is_empty() {
        info!("WiFi password is empty, using open network");
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    // Initial configuration for scanning
    wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
    wifi.start()?;

    info!("Scanning for WiFi networks...");
    let channel = wifi.scan()?.into_iter().find(|ap| ap.ssid == ssid).map(|ap| {
        info!("Found '{}' on channel {}", ssid, ap.channel);
        ap.channel
    });
    if channel.is_none() {
        info!("Network '{}' not found in scan, will try anyway", ssid);
    }

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid
            .try_into()
            .map_err(|_| anyhow!("SSID '{}' is too long", ssid))?,
        password: password
            .try_into()
            .map_err(|_| anyhow!("WiFi password is too long"))?,
        channel,
        auth_method,
        ..Default::default()
    }))?;

    info!("Connecting to '{}'...", ssid);
    wifi.connect()?;

    info!("Waiting for DHCP lease...");
    wifi.wait_netif_up()?;

    let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
    info!("WiFi connected!");
    info!("  IP address: {}", ip_info.ip);
    info!("  Gateway:    {}", ip_info.subnet.gateway);
    info!("  Netmask:    {}", ip_info.subnet.mask);
    Ok(())
}

fn start_access_point(wifi: &mut BlockingWifi<EspWifi<'static>>) -> Result<()> {
    // Mixed so the SSID widget can still scan while serving the portal.
    wifi.set_configuration(&Configuration::Mixed(
        ClientConfiguration::default(),
        AccessPointConfiguration {
            ssid: AP_SSID
                .try_into()
                .map_err(|_| anyhow!("AP SSID is too long"))?,
            password: AP_PASSWORD
                .try_into()
                .map_err(|_| anyhow!("AP password is too long"))?,
            auth_method: AuthMethod::WPA2Personal,
            channel: 1,
            ..Default::default()
        },
    ))?;
    wifi.start()?;
    wifi.wait_netif_up()?;

    let ip_info = wifi.wifi().ap_netif().get_ip_info()?;
    info!("Access point '{}' up at {}", AP_SSID, ip_info.ip);
    Ok(())
}

/// Event loop subscriptions forwarding link changes. Dropping it stops the
/// forwarding.
pub struct NetworkWatch {
    _wifi: EspSubscription<'static, System>,
    _ip: EspSubscription<'static, System>,
}

/// Forward WiFi and IP events to `events` as [`NetworkEvent`]s.
pub fn watch_network(sysloop: &EspSystemEventLoop, events: Sender<NetworkEvent>) -> Result<NetworkWatch> {
    let wifi_tx = events.clone();
    let wifi = sysloop.subscribe::<WifiEvent, _>(move |event| {
        let mapped = match event {
            WifiEvent::ApStarted => Some(NetworkEvent::AccessPointStarted),
            WifiEvent::ApStopped => Some(NetworkEvent::AccessPointStopped),
            _ => None,
        };
        if let Some(mapped) = mapped {
            let _ = wifi_tx.send(mapped);
        }
    })?;

    let ip = sysloop.subscribe::<IpEvent, _>(move |event| {
        let mapped = match event {
            IpEvent::DhcpIpAssigned(_) => Some(NetworkEvent::StationGotIp),
            IpEvent::DhcpIpDeassigned(_) => Some(NetworkEvent::StationLostIp),
            _ => None,
        };
        if let Some(mapped) = mapped {
            let _ = events.send(mapped);
        }
    })?;

    Ok(NetworkWatch { _wifi: wifi, _ip: ip })
}

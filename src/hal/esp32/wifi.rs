//! WiFi station driver for ESP32.
//!
//! Unlike a blocking connect, the driver here only starts the radio and
//! forwards WiFi/IP events to a channel. The
//! [`ConnectionSupervisor`](crate::network::ConnectionSupervisor) consumes
//! them and calls [`WifiDriver::connect`] back on this type.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::mpsc;
//! use camsnap::config::WifiConfig;
//! use camsnap::hal::esp32::Esp32Wifi;
//! use camsnap::network::ConnectionSupervisor;
//!
//! let (tx, rx) = mpsc::channel();
//! let config = WifiConfig::default().with_ssid("MyNetwork").with_password("secret123");
//!
//! let wifi = Esp32Wifi::start(modem, sysloop, nvs, &config, tx)?;
//! let mut supervisor = ConnectionSupervisor::new(wifi, config.retry);
//! supervisor.run(rx, |ip| log::info!("up at {}", ip))?;
//! ```

use std::sync::mpsc::Sender;

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent};
use log::{debug, info};

use crate::config::{WifiConfig, MAX_SSID_LEN};
use crate::error::NetworkError;
use crate::traits::{NetEvent, WifiDriver};

/// Station-mode WiFi, event-driven.
///
/// Event subscriptions live as long as this value.
pub struct Esp32Wifi {
    wifi: EspWifi<'static>,
    _wifi_events: EspSubscription<'static, System>,
    _ip_events: EspSubscription<'static, System>,
}

impl Esp32Wifi {
    /// Configure station mode, subscribe to events and start the radio.
    ///
    /// `StaStarted` arrives on `events` shortly after this returns; the
    /// supervisor answers it with the first connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the SSID is too long for the driver, or if
    /// driver init, configuration or event subscription fails.
    pub fn start(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        config: &WifiConfig,
        events: Sender<NetEvent>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let mut wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;

        // Create heapless strings for esp-idf
        let mut ssid_buf: heapless::String<32> = heapless::String::new();
        ssid_buf
            .push_str(config.ssid.as_str())
            .map_err(|_| NetworkError::SsidTooLong {
                len: config.ssid.len(),
                max: MAX_SSID_LEN,
            })?;

        // ShortString and the driver's password buffer are both 64 bytes
        let mut pass_buf: heapless::String<64> = heapless::String::new();
        pass_buf.push_str(config.password.as_str()).map_err(|_| {
            NetworkError::Driver(format!("password is {} bytes", config.password.len()))
        })?;

        let auth_method = if pass_buf.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: ssid_buf,
            password: pass_buf,
            auth_method,
            ..Default::default()
        }))?;

        let tx = events.clone();
        let wifi_events = sysloop.subscribe::<WifiEvent, _>(move |event| {
            let forwarded = match event {
                WifiEvent::StaStarted => Some(NetEvent::StaStarted),
                WifiEvent::StaDisconnected(_) => Some(NetEvent::StaDisconnected),
                _ => None,
            };
            if let Some(event) = forwarded {
                let _ = tx.send(event);
            }
        })?;

        let tx = events;
        let ip_events = sysloop.subscribe::<IpEvent, _>(move |event| {
            let forwarded = match event {
                IpEvent::DhcpIpAssigned(assignment) => Some(NetEvent::GotIp(assignment.ip())),
                IpEvent::DhcpIpDeassigned(_) => Some(NetEvent::LostIp),
                _ => None,
            };
            if let Some(event) = forwarded {
                let _ = tx.send(event);
            }
        })?;

        info!("[WiFi] Starting station for '{}'...", config.ssid);
        wifi.start()?;

        Ok(Self {
            wifi,
            _wifi_events: wifi_events,
            _ip_events: ip_events,
        })
    }
}

impl WifiDriver for Esp32Wifi {
    fn connect(&mut self) -> Result<(), NetworkError> {
        debug!("[WiFi] Connect request");
        self.wifi
            .connect()
            .map_err(|e| NetworkError::Driver(e.to_string()))
    }
}

//! ESP32-CAM snapshot server.
//!
//! This is the main entry point for the camera board. Startup:
//! - Reports free PSRAM
//! - Mounts the SPIFFS partition (retried)
//! - Powers up and initializes the camera (retried)
//! - Starts WiFi in station mode and supervises the connection
//! - Starts the HTTP server on the first IP address
//!
//! Each `GET /image.jpg` captures a fresh frame, stores it to flash and
//! streams the stored file back.
//!
//! If bring-up fails the device stays up in the `Degraded` state and logs
//! the reason periodically instead of exiting.
//!
//! # Build
//!
//! ```bash
//! WIFI_SSID=MyNetwork WIFI_PASSWORD=secret \
//!     cargo build --release --features esp32-http --target xtensa-esp32-espidf
//!
//! # Flash and monitor
//! espflash flash --monitor --partition-table partitions.csv \
//!     target/xtensa-esp32-espidf/release/esp32_main
//! ```

use std::fmt::Display;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use camsnap::hal::esp32::{log_psram, Esp32Camera, Esp32HttpServer, Esp32Spiffs, Esp32Wifi};
use camsnap::persistence::log_existing;
use camsnap::{
    bring_up, CameraConfig, Config, ConnectionSupervisor, FsImageStore, Health, HealthMonitor,
    SnapshotService, WifiConfig,
};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};

/// How often a degraded device repeats its status
const DEGRADED_REPORT_INTERVAL: Duration = Duration::from_secs(60);

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_hal::sys::link_patches();
    EspLogger::initialize_default();

    info!("================================");
    info!("  camsnap ESP32-CAM");
    info!("================================");

    // =========================================================================
    // Configuration
    // =========================================================================
    let config = Config::default()
        .with_wifi(
            WifiConfig::default()
                .with_ssid(option_env!("WIFI_SSID").unwrap_or(""))
                .with_password(option_env!("WIFI_PASSWORD").unwrap_or("")),
        )
        .with_camera(CameraConfig::default());
    let route = config.image_route();

    let health = HealthMonitor::new();
    let peripherals = Peripherals::take()?;

    // =========================================================================
    // Memory
    // =========================================================================
    log_psram();

    // =========================================================================
    // Flash filesystem
    // =========================================================================
    let _spiffs = match bring_up(
        "spiffs",
        &config.storage.mount_retry,
        &health,
        thread::sleep,
        || Esp32Spiffs::mount(&config.storage),
    ) {
        Ok(spiffs) => spiffs,
        Err(e) => park(&health, e),
    };

    let store = FsImageStore::from_config(&config);
    log_existing(&store, config.image_path().as_str());

    // =========================================================================
    // Camera (powered through GPIO32)
    // =========================================================================
    let camera = match bring_up(
        "camera",
        &config.camera.init_retry,
        &health,
        thread::sleep,
        || Esp32Camera::new(&config.camera),
    ) {
        Ok(camera) => camera,
        Err(e) => park(&health, e),
    };

    let service = Arc::new(SnapshotService::new(camera, store, config.web.chunk_size));

    // =========================================================================
    // WiFi
    // =========================================================================
    if !config.wifi.is_configured() {
        health.set(Health::Degraded {
            component: "wifi",
            attempts: 0,
        });
        park(&health, "WiFi not configured (set WIFI_SSID/WIFI_PASSWORD)");
    }

    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let (events_tx, events_rx) = mpsc::channel();
    let wifi = Esp32Wifi::start(peripherals.modem, sysloop, Some(nvs), &config.wifi, events_tx)?;

    // =========================================================================
    // Connection supervision, HTTP server on first IP
    // =========================================================================
    let mut supervisor = ConnectionSupervisor::new(wifi, config.wifi.retry);
    let mut _server: Option<Esp32HttpServer> = None;

    let result = supervisor.run(events_rx, |ip| {
        match Esp32HttpServer::new(&config.web, route.as_str(), Arc::clone(&service)) {
            Ok(started) => {
                _server = Some(started);
                health.set_ready();
                info!("Snapshot URL: http://{}{}", ip, route);
            }
            Err(e) => {
                error!("Failed to start HTTP server: {:?}", e);
                health.set(Health::Degraded {
                    component: "http",
                    attempts: 1,
                });
            }
        }
    });

    health.set_offline(&result);
    match result {
        Ok(()) => park(&health, "WiFi event channel closed"),
        Err(e) => park(&health, e),
    }
}

/// Stay alive in a degraded state, reporting why.
fn park(health: &HealthMonitor, reason: impl Display) -> ! {
    error!("Startup halted: {}", reason);
    loop {
        thread::sleep(DEGRADED_REPORT_INTERVAL);
        warn!("Device health: {:?} ({})", health.get(), reason);
    }
}

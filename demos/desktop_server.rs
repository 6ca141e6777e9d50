//! Desktop server example for trying the snapshot route without hardware.
//!
//! This example wires a mock camera to a real file store in the system temp
//! directory and serves it with the axum server:
//! - Fetch a fresh image at http://localhost:8080/image.jpg
//! - Every request produces a new synthetic frame
//!
//! # Network Bring-up
//!
//! A [`MockWifi`] that associates on the first connect drives the same
//! [`ConnectionSupervisor`] the device uses, so the server only starts once
//! the supervisor reports an address, exactly as on the ESP32.
//!
//! # Usage
//!
//! ```sh
//! cargo run --example desktop_server --features web
//! RUST_LOG=debug cargo run --example desktop_server --features web
//! ```
//!
//! # Configuration
//!
//! Edit the `Config::default()` call in `main()` to customize settings,
//! e.g. `PixelFormat::Grayscale` to serve `/image.pgm` instead.

use std::net::Ipv4Addr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use camsnap::hal::{MockCamera, MockWifi};
use camsnap::services::{run_server, WebServerConfig};
use camsnap::{
    CameraConfig, Config, ConnectionSupervisor, FsImageStore, NetEvent, PixelFormat,
    SnapshotService, StorageConfig, WebConfig,
};
use log::{error, info};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=================================");
    info!("  camsnap Desktop Server");
    info!("=================================");

    // Central configuration - modify this for your setup
    let storage_dir = std::env::temp_dir().join("camsnap-demo");
    std::fs::create_dir_all(&storage_dir)?;
    let config = Config::default()
        .with_camera(CameraConfig::default().with_pixel_format(PixelFormat::Jpeg))
        .with_storage(StorageConfig::default().with_base_path(&storage_dir.to_string_lossy()))
        .with_web(WebConfig::default().with_port(8080));

    // Mock camera, real files
    let camera = MockCamera::new(config.camera.pixel_format, config.camera.frame_size);
    let store = FsImageStore::from_config(&config);
    info!("Images stored at {}", store.path().display());
    let service = Arc::new(SnapshotService::new(camera, store, config.web.chunk_size));

    // Simulated station bring-up on its own thread
    let (events_tx, events_rx) = mpsc::channel();
    let wifi = MockWifi::new().with_auto_associate(events_tx.clone(), Ipv4Addr::LOCALHOST);
    let (ip_tx, ip_rx) = tokio::sync::oneshot::channel();
    let retry = config.wifi.retry;

    thread::spawn(move || {
        let mut supervisor = ConnectionSupervisor::new(wifi, retry);
        let mut ip_tx = Some(ip_tx);
        let result = supervisor.run(events_rx, |ip| {
            if let Some(tx) = ip_tx.take() {
                let _ = tx.send(ip);
            }
        });
        if let Err(e) = result {
            error!("Network supervisor stopped: {}", e);
        }
    });
    events_tx.send(NetEvent::StaStarted)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let ip = ip_rx.await?;
        let web_config = WebServerConfig::from_config(&config);
        info!("Got IP {}, starting web server", ip);
        info!("  Snapshot: http://localhost:{}{}", web_config.addr.port(), web_config.route);
        info!("Press Ctrl+C to stop.");

        run_server(service, web_config).await?;
        Ok::<(), anyhow::Error>(())
    })
}

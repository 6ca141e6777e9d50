//! Integration tests for WiFi bring-up through the connection supervisor.
//!
//! The mock driver stands in for the radio; events are fed through the same
//! channel the ESP32 event loop uses.

use std::net::Ipv4Addr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use camsnap::hal::MockWifi;
use camsnap::{ConnectionState, ConnectionSupervisor, NetEvent, NetworkError, RetryPolicy};

const IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);

fn no_backoff() -> RetryPolicy {
    RetryPolicy::unbounded()
}

#[test]
fn no_server_before_first_ip() {
    let (tx, rx) = mpsc::channel();
    tx.send(NetEvent::StaStarted).unwrap();
    tx.send(NetEvent::StaDisconnected).unwrap();
    tx.send(NetEvent::StaDisconnected).unwrap();
    drop(tx);

    let mut supervisor = ConnectionSupervisor::new(MockWifi::new(), no_backoff());
    let mut started = Vec::new();
    supervisor.run(rx, |ip| started.push(ip)).unwrap();

    assert!(started.is_empty());
    assert_eq!(supervisor.driver().connects(), 3);
    assert_eq!(supervisor.manager().state(), ConnectionState::Connecting);
}

#[test]
fn server_starts_once_on_first_ip() {
    let (tx, rx) = mpsc::channel();
    let wifi = MockWifi::new().with_auto_associate(tx.clone(), IP);
    tx.send(NetEvent::StaStarted).unwrap();

    // A later drop re-associates through the same driver
    let disconnect = tx.clone();

    let mut supervisor = ConnectionSupervisor::new(wifi, no_backoff());
    let monitor = supervisor.monitor();
    let (started_tx, started_rx) = mpsc::channel();

    // The driver keeps a sender, so the supervisor never sees the channel
    // close; leave its thread detached.
    thread::spawn(move || {
        let _ = supervisor.run(rx, |ip| {
            let _ = started_tx.send(ip);
        });
    });

    let ip = started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(ip, IP);
    assert_eq!(monitor.snapshot().ip, Some(IP));

    disconnect.send(NetEvent::StaDisconnected).unwrap();
    assert!(started_rx.recv_timeout(Duration::from_millis(200)).is_err());

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.failures, 0);
}

#[test]
fn disconnect_after_connect_reconnects_once() {
    let (tx, rx) = mpsc::channel();
    tx.send(NetEvent::StaStarted).unwrap();
    tx.send(NetEvent::GotIp(IP)).unwrap();
    tx.send(NetEvent::StaDisconnected).unwrap();
    tx.send(NetEvent::GotIp(IP)).unwrap();
    drop(tx);

    let mut supervisor = ConnectionSupervisor::new(MockWifi::new(), no_backoff());
    let mut started = Vec::new();
    supervisor.run(rx, |ip| started.push(ip)).unwrap();

    // One connect on start, exactly one after the drop
    assert_eq!(supervisor.driver().connects(), 2);
    // Second GotIp does not start another server
    assert_eq!(started, vec![IP]);
    assert_eq!(supervisor.manager().state(), ConnectionState::Connected);
    assert_eq!(supervisor.manager().failures(), 0);
}

#[test]
fn retries_exhausted_reaches_failed() {
    let (tx, rx) = mpsc::channel();
    tx.send(NetEvent::StaStarted).unwrap();
    for _ in 0..5 {
        tx.send(NetEvent::StaDisconnected).unwrap();
    }
    tx.send(NetEvent::GotIp(IP)).unwrap();

    let policy = RetryPolicy::unbounded().with_max_retries(3);
    let mut supervisor = ConnectionSupervisor::new(MockWifi::new(), policy);
    let mut started = 0;
    let err = supervisor.run(rx, |_| started += 1).unwrap_err();

    assert_eq!(err, NetworkError::RetriesExhausted { attempts: 4 });
    assert_eq!(started, 0);
    // Start plus three retries
    assert_eq!(supervisor.driver().connects(), 4);
    assert_eq!(supervisor.monitor().snapshot().state, ConnectionState::Failed);
}

#[test]
fn backoff_does_not_block_events() {
    let (tx, rx) = mpsc::channel();
    tx.send(NetEvent::StaStarted).unwrap();
    tx.send(NetEvent::StaDisconnected).unwrap();
    // Address arrives while a long reconnect is pending
    tx.send(NetEvent::GotIp(IP)).unwrap();
    drop(tx);

    let policy = RetryPolicy::default().with_backoff_ms(60_000, 60_000);
    let mut supervisor = ConnectionSupervisor::new(MockWifi::new(), policy);
    let mut started = Vec::new();
    supervisor.run(rx, |ip| started.push(ip)).unwrap();

    assert_eq!(started, vec![IP]);
    // The pending reconnect was cancelled
    assert_eq!(supervisor.driver().connects(), 1);
}

//! Station-mode connection management.
//!
//! Two layers:
//!
//! - [`ConnectionManager`]: a pure state machine. Feed it [`NetEvent`]s, it
//!   returns the [`NetAction`] to take. No I/O, no clock.
//! - [`ConnectionSupervisor`]: the single consumer of the event channel. It
//!   runs the manager's actions against a [`WifiDriver`], schedules delayed
//!   reconnects and publishes a [`NetworkSnapshot`] to a [`NetworkMonitor`].
//!
//! # State Machine
//!
//! ```text
//!                StaStarted / retry
//! Disconnected ─────────────────────▶ Connecting ──GotIp──▶ Connected
//!                                       ▲    │                  │
//!                                       │    │ retries used up  │ StaDisconnected
//!                                       │    ▼                  │ / LostIp
//!                                       │  Failed               │
//!                                       └───────────────────────┘
//! ```
//!
//! The first `GotIp` yields [`NetAction::StartServer`]; later ones do not.
//!
//! # Example
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use camsnap::config::RetryPolicy;
//! use camsnap::network::{ConnectionManager, ConnectionState, NetAction};
//! use camsnap::traits::NetEvent;
//!
//! let mut manager = ConnectionManager::new(RetryPolicy::unbounded());
//! assert_eq!(manager.handle(NetEvent::StaStarted), NetAction::Connect);
//!
//! let ip = Ipv4Addr::new(192, 168, 1, 20);
//! assert_eq!(manager.handle(NetEvent::GotIp(ip)), NetAction::StartServer(ip));
//! assert_eq!(manager.state(), ConnectionState::Connected);
//!
//! // Reconnect after a drop does not start a second server
//! assert_eq!(manager.handle(NetEvent::StaDisconnected), NetAction::Connect);
//! assert_eq!(manager.handle(NetEvent::GotIp(ip)), NetAction::None);
//! ```

use std::net::Ipv4Addr;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::RetryPolicy;
use crate::error::NetworkError;
use crate::traits::{NetEvent, WifiDriver};

/// Station connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not associated, nothing in progress.
    #[default]
    Disconnected,
    /// Association or DHCP in progress.
    Connecting,
    /// Associated with an address.
    Connected,
    /// Retry policy gave up. Terminal.
    Failed,
}

impl ConnectionState {
    /// Short name for logs and status output.
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

/// What the supervisor should do after an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetAction {
    /// Nothing.
    None,
    /// Issue a connect request now.
    Connect,
    /// Issue a connect request after the delay.
    ConnectAfter(Duration),
    /// First address acquired: start HTTP delivery.
    StartServer(Ipv4Addr),
    /// Stop retrying.
    GiveUp(NetworkError),
}

/// Pure connection state machine.
#[derive(Clone, Debug)]
pub struct ConnectionManager {
    policy: RetryPolicy,
    state: ConnectionState,
    ip: Option<Ipv4Addr>,
    failures: u32,
    server_started: bool,
}

impl ConnectionManager {
    /// New manager in the `Disconnected` state.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            ip: None,
            failures: 0,
            server_started: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Address while connected.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    /// Consecutive failures since the last successful connection.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether `StartServer` has been issued.
    pub fn server_started(&self) -> bool {
        self.server_started
    }

    /// Advance the state machine.
    pub fn handle(&mut self, event: NetEvent) -> NetAction {
        if self.state == ConnectionState::Failed {
            debug!("Ignoring {:?} in failed state", event);
            return NetAction::None;
        }

        match event {
            NetEvent::StaStarted => {
                self.state = ConnectionState::Connecting;
                NetAction::Connect
            }
            NetEvent::StaDisconnected => {
                self.ip = None;
                self.failures = self.failures.saturating_add(1);
                if self.policy.is_exhausted(self.failures) {
                    self.state = ConnectionState::Failed;
                    return NetAction::GiveUp(NetworkError::RetriesExhausted {
                        attempts: self.failures,
                    });
                }
                self.state = ConnectionState::Connecting;
                let delay = self.policy.backoff(self.failures);
                if delay.is_zero() {
                    NetAction::Connect
                } else {
                    NetAction::ConnectAfter(delay)
                }
            }
            NetEvent::GotIp(ip) => {
                self.state = ConnectionState::Connected;
                self.ip = Some(ip);
                self.failures = 0;
                if self.server_started {
                    NetAction::None
                } else {
                    self.server_started = true;
                    NetAction::StartServer(ip)
                }
            }
            NetEvent::LostIp => {
                self.ip = None;
                self.state = ConnectionState::Connecting;
                NetAction::None
            }
        }
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Point-in-time view of the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct NetworkSnapshot {
    /// Current state
    pub state: ConnectionState,
    /// Address while connected
    pub ip: Option<Ipv4Addr>,
    /// Consecutive failures
    pub failures: u32,
}

/// Shared, read-mostly connection status.
#[derive(Debug, Default)]
pub struct NetworkMonitor {
    inner: Mutex<NetworkSnapshot>,
}

impl NetworkMonitor {
    /// New monitor reporting `Disconnected`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> NetworkSnapshot {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while connected.
    pub fn is_connected(&self) -> bool {
        self.snapshot().state == ConnectionState::Connected
    }

    fn publish(&self, snapshot: NetworkSnapshot) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Drives a [`WifiDriver`] from a channel of [`NetEvent`]s.
pub struct ConnectionSupervisor<D: WifiDriver> {
    driver: D,
    manager: ConnectionManager,
    monitor: Arc<NetworkMonitor>,
}

impl<D: WifiDriver> ConnectionSupervisor<D> {
    /// Supervisor with its own monitor.
    pub fn new(driver: D, policy: RetryPolicy) -> Self {
        Self {
            driver,
            manager: ConnectionManager::new(policy),
            monitor: Arc::new(NetworkMonitor::new()),
        }
    }

    /// Publish to an existing monitor instead.
    pub fn with_monitor(mut self, monitor: Arc<NetworkMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Handle for reading connection status from other threads.
    pub fn monitor(&self) -> Arc<NetworkMonitor> {
        Arc::clone(&self.monitor)
    }

    /// The state machine.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Consume events until the channel closes or retries run out.
    ///
    /// `on_connected` runs once, on the first address. Returns `Ok(())` when
    /// every sender is dropped.
    pub fn run<F>(&mut self, events: Receiver<NetEvent>, mut on_connected: F) -> Result<(), NetworkError>
    where
        F: FnMut(Ipv4Addr),
    {
        let mut retry_at: Option<Instant> = None;

        loop {
            let event = match retry_at {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        retry_at = None;
                        if let Some(failed) = self.connect_now() {
                            self.dispatch(failed, &mut retry_at, &mut on_connected)?;
                        }
                        continue;
                    }
                    match events.recv_timeout(deadline - now) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match events.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            self.dispatch(event, &mut retry_at, &mut on_connected)?;
        }

        info!("Network event channel closed");
        Ok(())
    }

    fn dispatch<F>(
        &mut self,
        event: NetEvent,
        retry_at: &mut Option<Instant>,
        on_connected: &mut F,
    ) -> Result<(), NetworkError>
    where
        F: FnMut(Ipv4Addr),
    {
        let mut pending = Some(event);
        while let Some(event) = pending.take() {
            debug!("Network event: {:?}", event);
            let action = self.manager.handle(event);
            self.publish();

            match action {
                NetAction::None => {}
                NetAction::Connect => {
                    *retry_at = None;
                    pending = self.connect_now();
                }
                NetAction::ConnectAfter(delay) => {
                    info!(
                        "Reconnecting in {} ms (attempt {})",
                        delay.as_millis(),
                        self.manager.failures()
                    );
                    *retry_at = Some(Instant::now() + delay);
                }
                NetAction::StartServer(ip) => {
                    info!("Got IP {}", ip);
                    on_connected(ip);
                }
                NetAction::GiveUp(err) => {
                    error!("WiFi: {}", err);
                    return Err(err);
                }
            }

            if self.manager.state() == ConnectionState::Connected {
                *retry_at = None;
            }
        }
        Ok(())
    }

    // A connect request the driver rejects outright counts as a disconnect.
    fn connect_now(&mut self) -> Option<NetEvent> {
        match self.driver.connect() {
            Ok(()) => None,
            Err(e) => {
                warn!("Connect request failed: {}", e);
                Some(NetEvent::StaDisconnected)
            }
        }
    }

    fn publish(&self) {
        self.monitor.publish(NetworkSnapshot {
            state: self.manager.state(),
            ip: self.manager.ip(),
            failures: self.manager.failures(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockWifi;
    use std::sync::mpsc;

    const IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 7);

    #[test]
    fn starts_disconnected() {
        let manager = ConnectionManager::new(RetryPolicy::default());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.ip(), None);
        assert!(!manager.server_started());
    }

    #[test]
    fn sta_started_connects() {
        let mut manager = ConnectionManager::new(RetryPolicy::default());
        assert_eq!(manager.handle(NetEvent::StaStarted), NetAction::Connect);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn disconnect_backs_off() {
        let policy = RetryPolicy::default().with_backoff_ms(100, 1000);
        let mut manager = ConnectionManager::new(policy);
        manager.handle(NetEvent::StaStarted);
        assert_eq!(
            manager.handle(NetEvent::StaDisconnected),
            NetAction::ConnectAfter(Duration::from_millis(100))
        );
        assert_eq!(
            manager.handle(NetEvent::StaDisconnected),
            NetAction::ConnectAfter(Duration::from_millis(200))
        );
        assert_eq!(manager.failures(), 2);
    }

    #[test]
    fn retries_exhausted_is_terminal() {
        let policy = RetryPolicy::unbounded().with_max_retries(2);
        let mut manager = ConnectionManager::new(policy);
        manager.handle(NetEvent::StaStarted);
        assert_eq!(manager.handle(NetEvent::StaDisconnected), NetAction::Connect);
        assert_eq!(manager.handle(NetEvent::StaDisconnected), NetAction::Connect);
        assert_eq!(
            manager.handle(NetEvent::StaDisconnected),
            NetAction::GiveUp(NetworkError::RetriesExhausted { attempts: 3 })
        );
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(manager.handle(NetEvent::GotIp(IP)), NetAction::None);
        assert_eq!(manager.state(), ConnectionState::Failed);
    }

    #[test]
    fn got_ip_resets_failures() {
        let mut manager = ConnectionManager::new(RetryPolicy::unbounded().with_max_retries(2));
        manager.handle(NetEvent::StaStarted);
        manager.handle(NetEvent::StaDisconnected);
        manager.handle(NetEvent::StaDisconnected);
        manager.handle(NetEvent::GotIp(IP));
        assert_eq!(manager.failures(), 0);
        assert_eq!(manager.handle(NetEvent::StaDisconnected), NetAction::Connect);
    }

    #[test]
    fn lost_ip_clears_address() {
        let mut manager = ConnectionManager::new(RetryPolicy::unbounded());
        manager.handle(NetEvent::GotIp(IP));
        assert_eq!(manager.handle(NetEvent::LostIp), NetAction::None);
        assert_eq!(manager.ip(), None);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn supervisor_returns_when_channel_closes() {
        let (tx, rx) = mpsc::channel();
        tx.send(NetEvent::StaStarted).unwrap();
        drop(tx);

        let mut supervisor = ConnectionSupervisor::new(MockWifi::new(), RetryPolicy::unbounded());
        let mut started = 0;
        supervisor.run(rx, |_| started += 1).unwrap();

        assert_eq!(supervisor.driver().connects(), 1);
        assert_eq!(started, 0);
        assert_eq!(supervisor.monitor().snapshot().state, ConnectionState::Connecting);
    }

    #[test]
    fn supervisor_waits_out_backoff() {
        let (tx, rx) = mpsc::channel();
        tx.send(NetEvent::StaStarted).unwrap();
        tx.send(NetEvent::StaDisconnected).unwrap();

        let policy = RetryPolicy::default().with_backoff_ms(20, 20);
        let mut supervisor = ConnectionSupervisor::new(MockWifi::new(), policy);

        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            drop(tx);
        });
        supervisor.run(rx, |_| {}).unwrap();
        sender.join().unwrap();

        // One connect on start, one after the backoff
        assert_eq!(supervisor.driver().connects(), 2);
    }

    #[test]
    fn supervisor_treats_connect_error_as_disconnect() {
        let (tx, rx) = mpsc::channel();
        tx.send(NetEvent::StaStarted).unwrap();
        drop(tx);

        let mut wifi = MockWifi::new();
        wifi.fail_connects(10);
        let policy = RetryPolicy::unbounded().with_max_retries(2);
        let mut supervisor = ConnectionSupervisor::new(wifi, policy);

        let err = supervisor.run(rx, |_| {}).unwrap_err();
        assert_eq!(err, NetworkError::RetriesExhausted { attempts: 3 });
        assert_eq!(supervisor.driver().connects(), 3);
        assert_eq!(supervisor.monitor().snapshot().state, ConnectionState::Failed);
    }
}

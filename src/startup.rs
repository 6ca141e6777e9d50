//! Startup bring-up with retries and an observable health state.
//!
//! Peripheral init (filesystem mount, camera driver) can fail transiently,
//! e.g. a sensor that has not settled after power-up. [`bring_up`] retries
//! per a [`RetryPolicy`] and keeps a [`HealthMonitor`] current so a stuck
//! device reports `Degraded` instead of vanishing silently.

use core::fmt::Display;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{info, warn};

use crate::config::RetryPolicy;
use crate::error::{DeviceError, NetworkError};

/// Device health.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Health {
    /// Components still coming up.
    #[default]
    Initializing,
    /// Everything up, serving.
    Ready,
    /// A component failed to come up.
    Degraded {
        /// Which component
        component: &'static str,
        /// Failed attempts so far
        attempts: u32,
    },
}

/// Shared health state.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    inner: Mutex<Health>,
}

impl HealthMonitor {
    /// New monitor in `Initializing`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current health.
    pub fn get(&self) -> Health {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the health state.
    pub fn set(&self, health: Health) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = health;
    }

    /// Mark every component as up.
    pub fn set_ready(&self) {
        self.set(Health::Ready);
    }

    /// True once `set_ready` has been called and nothing degraded since.
    pub fn is_ready(&self) -> bool {
        self.get() == Health::Ready
    }

    /// Record that WiFi supervision has ended and the device is offline.
    ///
    /// Exhausted retries carry their attempt count; a closed event channel
    /// reports zero attempts.
    pub fn set_offline(&self, outcome: &Result<(), NetworkError>) {
        let attempts = match outcome {
            Err(NetworkError::RetriesExhausted { attempts }) => *attempts,
            _ => 0,
        };
        self.set(Health::Degraded {
            component: "wifi",
            attempts,
        });
    }
}

/// Run `attempt` until it succeeds or `policy` is exhausted.
///
/// `sleep` is called with the backoff between attempts; pass
/// `std::thread::sleep` on the device, a recorder in tests. Health goes to
/// `Degraded` on the first failure and stays there on give-up. Success
/// leaves it for the caller to promote to `Ready`.
///
/// ```
/// use std::time::Duration;
/// use camsnap::config::RetryPolicy;
/// use camsnap::startup::{bring_up, Health, HealthMonitor};
///
/// let health = HealthMonitor::new();
/// let mut tries = 0;
/// let value = bring_up("camera", &RetryPolicy::default(), &health, |_| {}, || {
///     tries += 1;
///     if tries < 3 { Err("not ready") } else { Ok(42) }
/// })
/// .unwrap();
///
/// assert_eq!(value, 42);
/// assert_eq!(health.get(), Health::Degraded { component: "camera", attempts: 2 });
/// ```
pub fn bring_up<T, E, S, A>(
    component: &'static str,
    policy: &RetryPolicy,
    health: &HealthMonitor,
    mut sleep: S,
    mut attempt: A,
) -> Result<T, DeviceError>
where
    E: Display,
    S: FnMut(Duration),
    A: FnMut() -> Result<T, E>,
{
    let mut failures: u32 = 0;
    loop {
        match attempt() {
            Ok(value) => {
                info!("{} up after {} attempt(s)", component, failures + 1);
                return Ok(value);
            }
            Err(e) => {
                failures += 1;
                health.set(Health::Degraded {
                    component,
                    attempts: failures,
                });
                if policy.is_exhausted(failures) {
                    return Err(DeviceError::GaveUp {
                        component,
                        attempts: failures,
                        last_error: e.to_string(),
                    });
                }
                let delay = policy.backoff(failures);
                warn!(
                    "{} init failed (attempt {}): {}, retrying in {} ms",
                    component,
                    failures,
                    e,
                    delay.as_millis()
                );
                sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_try_success_stays_initializing() {
        let health = HealthMonitor::new();
        let result: Result<u8, DeviceError> =
            bring_up("fs", &RetryPolicy::default(), &health, |_| {}, || Ok::<_, String>(1));
        assert_eq!(result.unwrap(), 1);
        assert_eq!(health.get(), Health::Initializing);
        health.set_ready();
        assert!(health.is_ready());
    }

    #[test]
    fn wifi_give_up_replaces_ready() {
        let health = HealthMonitor::new();
        health.set_ready();

        health.set_offline(&Err(NetworkError::RetriesExhausted { attempts: 11 }));
        assert_eq!(
            health.get(),
            Health::Degraded {
                component: "wifi",
                attempts: 11
            }
        );
        assert!(!health.is_ready());

        health.set_offline(&Ok(()));
        assert_eq!(
            health.get(),
            Health::Degraded {
                component: "wifi",
                attempts: 0
            }
        );
    }

    #[test]
    fn gives_up_after_policy() {
        let health = HealthMonitor::new();
        let policy = RetryPolicy::default().with_max_retries(2).with_backoff_ms(10, 100);
        let mut delays = Vec::new();
        let mut calls = 0;

        let err = bring_up(
            "camera",
            &policy,
            &health,
            |d| delays.push(d),
            || -> Result<(), DeviceError> {
                calls += 1;
                Err(DeviceError::InitFailed {
                    component: "camera",
                    code: 0x105,
                })
            },
        )
        .unwrap_err();

        assert_eq!(calls, 3);
        assert_eq!(delays, vec![Duration::from_millis(10), Duration::from_millis(20)]);
        assert!(matches!(err, DeviceError::GaveUp { attempts: 3, .. }));
        assert!(err.to_string().contains("code 0x105"));
        assert_eq!(
            health.get(),
            Health::Degraded {
                component: "camera",
                attempts: 3
            }
        );
    }
}

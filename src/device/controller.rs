use super::{interface::SwitchDevice, DeviceSnapshot};
use crate::{error::AppError, time::TimeProvider};
use arc_swap::ArcSwap;
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const VERIFY_ATTEMPTS: u32 = 3;
const BACKOFF_INITIAL_MS: u64 = 250;
const BACKOFF_CAP_MS: u64 = 2_000;

/// Drives a [`SwitchDevice`] with verified, serialized commands. Every
/// state change is read back; a disagreeing read re-issues the command
/// under exponential backoff before giving up.
#[derive(Debug)]
pub struct DeviceCommander<D: SwitchDevice> {
    device: Arc<D>,
    time: Arc<dyn TimeProvider>,
    cmd_lock: Mutex<()>,
    snapshot: ArcSwap<DeviceSnapshot>,
}

impl<D: SwitchDevice> DeviceCommander<D> {
    pub fn new(device: Arc<D>, time: Arc<dyn TimeProvider>) -> Self {
        let snapshot = ArcSwap::from_pointee(DeviceSnapshot::unknown(device.address()));
        Self { device, time, cmd_lock: Mutex::new(()), snapshot }
    }

    pub fn device(&self) -> Arc<D> {
        self.device.clone()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.load().as_ref().clone()
    }

    pub async fn connect(&self) -> Result<(), AppError> {
        let _guard = self.cmd_lock.lock().await;
        match self.device.connect().await {
            Ok(()) => {
                info!("Connected to switch device at {}", self.device.address());
                self.refresh_snapshot(None).await;
                Ok(())
            }
            Err(e) => {
                self.publish_unreachable();
                Err(e)
            }
        }
    }

    pub async fn turn_on(&self) -> Result<(), AppError> {
        self.set_state(true).await
    }

    pub async fn turn_off(&self) -> Result<(), AppError> {
        self.set_state(false).await
    }

    /// OFF that never propagates a failure. Shutdown must not block on an
    /// unreachable pump.
    pub async fn turn_off_best_effort(&self) {
        if let Err(e) = self.set_state(false).await {
            warn!("Releasing device failed, continuing shutdown: {}", e);
        }
    }

    /// Poll the device and refresh the published snapshot.
    pub async fn poll(&self) -> DeviceSnapshot {
        let _guard = self.cmd_lock.lock().await;
        self.refresh_snapshot(None).await;
        self.snapshot()
    }

    async fn set_state(&self, on: bool) -> Result<(), AppError> {
        let _guard = self.cmd_lock.lock().await;

        let mut backoff_ms = BACKOFF_INITIAL_MS;
        let mut last_err: Option<AppError> = None;
        for attempt in 1..=VERIFY_ATTEMPTS {
            let issued = if on { self.device.turn_on().await } else { self.device.turn_off().await };
            match issued {
                Ok(()) => match self.device.is_on().await {
                    Ok(observed) if observed == on => {
                        debug!(
                            "Device at {} verified {} (attempt {})",
                            self.device.address(),
                            if on { "ON" } else { "OFF" },
                            attempt
                        );
                        self.publish(Some(on));
                        return Ok(());
                    }
                    Ok(observed) => {
                        warn!(
                            "Device at {} reports {} after commanding {} (attempt {})",
                            self.device.address(),
                            if observed { "ON" } else { "OFF" },
                            if on { "ON" } else { "OFF" },
                            attempt
                        );
                        last_err = Some(AppError::DeviceStateMismatch {
                            requested: on,
                            observed: if observed { "on" } else { "off" }.to_owned(),
                        });
                    }
                    Err(e) => {
                        warn!("Verification read failed for {}: {}", self.device.address(), e);
                        last_err = Some(e);
                    }
                },
                Err(e) => {
                    warn!("Command failed for {}: {}", self.device.address(), e);
                    last_err = Some(e);
                }
            }
            if attempt < VERIFY_ATTEMPTS {
                self.time.sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(BACKOFF_CAP_MS);
            }
        }

        match last_err {
            Some(AppError::DeviceStateMismatch { requested, observed }) => {
                // Command went through but the relay disagrees; surface unknown state.
                self.publish(None);
                Err(AppError::DeviceStateMismatch { requested, observed })
            }
            Some(e) => {
                self.publish_unreachable();
                Err(e)
            }
            None => {
                self.publish_unreachable();
                Err(AppError::DeviceUnreachable(self.device.address()))
            }
        }
    }

    async fn refresh_snapshot(&self, verified_on: Option<bool>) {
        match verified_on {
            Some(on) => self.publish(Some(on)),
            None => match self.device.is_on().await {
                Ok(on) => self.publish(Some(on)),
                Err(_) => self.publish_unreachable(),
            },
        }
    }

    fn publish(&self, on: Option<bool>) {
        self.snapshot.store(Arc::new(DeviceSnapshot {
            reachable: true,
            on,
            last_verified: on.map(|_| self.time.now()),
            address: self.device.address(),
        }));
    }

    fn publish_unreachable(&self) {
        let prev = self.snapshot.load();
        self.snapshot.store(Arc::new(DeviceSnapshot {
            reachable: false,
            on: None,
            last_verified: prev.last_verified,
            address: self.device.address(),
        }));
    }
}

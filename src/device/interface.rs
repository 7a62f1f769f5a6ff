use crate::error::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error};

/// Narrow contract for a single on/off actuator. Vendor pairing and LAN
/// discovery live outside the core; anything that can switch a pump and
/// report its relay state can implement this.
#[async_trait]
pub trait SwitchDevice: Send + Sync {
    async fn connect(&self) -> Result<(), AppError>;
    async fn turn_on(&self) -> Result<(), AppError>;
    async fn turn_off(&self) -> Result<(), AppError>;
    /// Verification read. `Err` means the state is unknown.
    async fn is_on(&self) -> Result<bool, AppError>;
    fn address(&self) -> String;
    fn connected(&self) -> bool;
}

const REQUEST_TIMEOUT_SECS: u64 = 5;

/// Plain HTTP relay: `GET /relay/on`, `GET /relay/off`, `GET /relay/status`.
pub struct HttpRelayDevice {
    address: String,
    client: reqwest::Client,
    connected: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct RelayStatus {
    on: bool,
}

impl HttpRelayDevice {
    pub fn new(address: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { address, client, connected: AtomicBool::new(false) })
    }

    async fn command(&self, path: &str) -> Result<(), AppError> {
        let url = format!("http://{}/relay/{}", self.address, path);
        match self.client.get(&url).send().await.and_then(|r| r.error_for_status()) {
            Ok(_) => {
                debug!("Relay command '{}' accepted by {}", path, self.address);
                Ok(())
            }
            Err(e) => {
                error!("Relay command '{}' failed for {}: {}", path, self.address, e);
                self.connected.store(false, Ordering::SeqCst);
                Err(AppError::DeviceUnreachable(format!("{}: {}", self.address, e)))
            }
        }
    }
}

#[async_trait]
impl SwitchDevice for HttpRelayDevice {
    async fn connect(&self) -> Result<(), AppError> {
        self.is_on().await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn turn_on(&self) -> Result<(), AppError> {
        self.command("on").await
    }

    async fn turn_off(&self) -> Result<(), AppError> {
        self.command("off").await
    }

    async fn is_on(&self) -> Result<bool, AppError> {
        let url = format!("http://{}/relay/status", self.address);
        let status: RelayStatus = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                self.connected.store(false, Ordering::SeqCst);
                AppError::DeviceUnreachable(format!("{}: {}", self.address, e))
            })?
            .json()
            .await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(status.on)
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub mod controller;
pub mod interface;

/// Last known device state, refreshed after every command and status poll.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceSnapshot {
    pub reachable: bool,
    /// `None` means the state could not be verified.
    pub on: Option<bool>,
    pub last_verified: Option<i64>,
    pub address: String,
}

impl DeviceSnapshot {
    pub fn unknown(address: String) -> Self {
        Self { reachable: false, on: None, last_verified: None, address }
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),
    #[error("Device state mismatch: requested {requested}, observed {observed}")]
    DeviceStateMismatch { requested: bool, observed: String },
    #[error("Weather unavailable: {0}")]
    WeatherUnavailable(String),
    #[error("Unknown location: {0}")]
    LocationUnknown(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Shutting down")]
    ShuttingDown,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }
}

use crate::environment::weather::{StationReading, WeatherFeed};
use crate::error::AppError;
use async_trait::async_trait;
use std::sync::Mutex;

/// Feed that serves a settable fixed reading, or fails when cleared.
pub struct FixedFeed {
    reading: Mutex<Option<(f64, f64)>>,
}

impl FixedFeed {
    pub fn new(temperature_c: f64, humidity_pct: f64) -> Self {
        Self { reading: Mutex::new(Some((temperature_c, humidity_pct))) }
    }

    pub fn failing() -> Self {
        Self { reading: Mutex::new(None) }
    }

    pub fn set(&self, temperature_c: f64, humidity_pct: f64) {
        *self.reading.lock().unwrap() = Some((temperature_c, humidity_pct));
    }

    pub fn fail(&self) {
        *self.reading.lock().unwrap() = None;
    }
}

#[async_trait]
impl WeatherFeed for FixedFeed {
    async fn fetch(&self, station_id: &str) -> Result<StationReading, AppError> {
        match *self.reading.lock().unwrap() {
            Some((t, h)) => Ok(StationReading {
                station_id: station_id.to_owned(),
                station_name: "Test station".to_owned(),
                temperature_c: Some(t),
                humidity_pct: Some(h),
            }),
            None => Err(AppError::WeatherUnavailable("scripted failure".to_owned())),
        }
    }
}

pub mod daylight;
pub mod weather;

use crate::{
    config::Adaptation,
    error::AppError,
    time::TimeProvider,
    utils::{format_hhmm, resolve_tz_offset},
};
use chrono::DateTime;
use daylight::{DaylightCalculator, DaylightInfo};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, error, info};
use weather::{EnvironmentalSample, WeatherFeed, WeatherProvider};

/// Copy-on-read view of the environmental inputs, as exposed on status.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EnvSnapshot {
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub station_id: Option<String>,
    pub station_name: Option<String>,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub adaptation_enabled: bool,
    pub adaptive_enabled: bool,
}

/// Aggregates the daylight calculator and the weather cache behind one
/// read surface. A single poller task keeps the weather side fresh.
#[derive(Debug)]
pub struct EnvironmentalService<F: WeatherFeed> {
    weather: Option<WeatherProvider<F>>,
    daylight: Option<DaylightCalculator>,
    tz_offset_secs: i64,
    adaptation_enabled: bool,
    adaptive_enabled: bool,
    time: Arc<dyn TimeProvider>,
}

const POLL_TICK_SECS: u64 = 60;

impl<F: WeatherFeed> EnvironmentalService<F> {
    /// Build from the adaptation config. An unknown postcode disables the
    /// environmental inputs; whether that is fatal is the caller's call
    /// (it is for adaptive synthesis, it is not for fixed schedules).
    pub fn new(
        adaptation: &Adaptation,
        feed: F,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self, AppError> {
        let tz_offset_secs = resolve_tz_offset(adaptation.location.timezone.as_deref())?;

        if !adaptation.enabled {
            return Ok(Self {
                weather: None,
                daylight: None,
                tz_offset_secs,
                adaptation_enabled: false,
                adaptive_enabled: false,
                time,
            });
        }

        let daylight = match DaylightCalculator::new(&adaptation.location.postcode, tz_offset_secs)
        {
            Ok(calc) => Some(calc),
            Err(e) => {
                error!("Adaptation disabled: {}", e);
                return Ok(Self {
                    weather: None,
                    daylight: None,
                    tz_offset_secs,
                    adaptation_enabled: false,
                    adaptive_enabled: false,
                    time,
                });
            }
        };

        let weather = if adaptation.temperature.enabled {
            let location = daylight.as_ref().map(|d| d.lat_lon()).unwrap_or((0., 0.));
            Some(WeatherProvider::new(
                feed,
                &adaptation.temperature.station_id,
                location,
                adaptation.temperature.update_interval_minutes,
                time.clone(),
            ))
        } else {
            None
        };

        Ok(Self {
            weather,
            daylight,
            tz_offset_secs,
            adaptation_enabled: true,
            adaptive_enabled: adaptation.adaptive.enabled,
            time,
        })
    }

    pub fn adaptation_enabled(&self) -> bool {
        self.adaptation_enabled
    }

    pub fn tz_offset_secs(&self) -> i64 {
        self.tz_offset_secs
    }

    /// Latest weather view; unknown fields when no source is enabled.
    pub fn sample(&self) -> EnvironmentalSample {
        match &self.weather {
            Some(w) => w.current(self.time.now()),
            None => EnvironmentalSample::default(),
        }
    }

    /// Daylight for the local day containing `ts`. Pure per date.
    pub fn daylight_for(&self, ts: i64) -> Option<DaylightInfo> {
        let calc = self.daylight.as_ref()?;
        let date = DateTime::from_timestamp(ts + self.tz_offset_secs, 0)?.date_naive();
        Some(calc.daylight(date))
    }

    pub async fn refresh(&self) -> EnvironmentalSample {
        match &self.weather {
            Some(w) => w.refresh().await,
            None => EnvironmentalSample::default(),
        }
    }

    pub fn snapshot(&self) -> EnvSnapshot {
        let sample = self.sample();
        let daylight = self.daylight_for(self.time.now());
        EnvSnapshot {
            temperature_c: sample.temperature_c,
            humidity_pct: sample.humidity_pct,
            station_id: sample.station_id,
            station_name: sample.station_name,
            sunrise: daylight.map(|d| format_hhmm(d.sunrise_secs)),
            sunset: daylight.map(|d| format_hhmm(d.sunset_secs)),
            adaptation_enabled: self.adaptation_enabled,
            adaptive_enabled: self.adaptive_enabled,
        }
    }

    /// Background poller; returns when the shutdown channel flips.
    pub async fn run_poller(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if self.weather.is_none() {
            debug!("No weather source enabled, poller not needed");
            return;
        }
        info!("Environmental poller started");
        loop {
            self.refresh().await;
            tokio::select! {
                _ = self.time.sleep(Duration::from_secs(POLL_TICK_SECS)) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Environmental poller stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Adaptation, Location, TemperatureSource};
    use crate::test::utils::mock_time::MockTimeProvider;
    use async_trait::async_trait;
    use super::weather::StationReading;

    struct StaticFeed;

    #[async_trait]
    impl WeatherFeed for StaticFeed {
        async fn fetch(&self, station_id: &str) -> Result<StationReading, AppError> {
            Ok(StationReading {
                station_id: station_id.to_owned(),
                station_name: "De Bilt".to_owned(),
                temperature_c: Some(18.),
                humidity_pct: Some(70.),
            })
        }
    }

    fn adaptation(postcode: &str) -> Adaptation {
        Adaptation {
            enabled: true,
            location: Location { postcode: postcode.to_owned(), timezone: Some("+02:00".to_owned()) },
            temperature: TemperatureSource { enabled: true, ..Default::default() },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn aggregates_weather_and_daylight() {
        let time = Arc::new(MockTimeProvider::new(1_750_000_000)); // mid-June 2025
        let service =
            EnvironmentalService::new(&adaptation("3731"), StaticFeed, time).unwrap();
        service.refresh().await;

        let snap = service.snapshot();
        assert!(snap.adaptation_enabled);
        assert_eq!(snap.temperature_c, Some(18.));
        assert_eq!(snap.station_name.as_deref(), Some("De Bilt"));
        assert!(snap.sunrise.is_some() && snap.sunset.is_some());
    }

    #[tokio::test]
    async fn unknown_postcode_degrades_to_disabled() {
        let time = Arc::new(MockTimeProvider::new(1_750_000_000));
        let service =
            EnvironmentalService::new(&adaptation("0000"), StaticFeed, time).unwrap();
        let snap = service.snapshot();
        assert!(!snap.adaptation_enabled);
        assert_eq!(snap.temperature_c, None);
        assert!(snap.sunrise.is_none());
    }

    #[tokio::test]
    async fn disabled_adaptation_reports_unknowns() {
        let time = Arc::new(MockTimeProvider::new(1_750_000_000));
        let service = EnvironmentalService::new(&Adaptation::default(), StaticFeed, time).unwrap();
        let snap = service.snapshot();
        assert!(!snap.adaptation_enabled);
        assert_eq!(service.sample(), EnvironmentalSample::default());
    }
}

use crate::{error::AppError, time::TimeProvider};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Deserialize;
use std::{
    sync::atomic::{AtomicI64, Ordering},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, warn};

/// One observation from the outdoor feed. `None` fields mean unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentalSample {
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub sampled_at: i64,
    pub station_id: Option<String>,
    pub station_name: Option<String>,
}

/// Raw reading for a single station, before caching policy is applied.
#[derive(Debug, Clone)]
pub struct StationReading {
    pub station_id: String,
    pub station_name: String,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
}

#[async_trait]
pub trait WeatherFeed: Send + Sync {
    async fn fetch(&self, station_id: &str) -> Result<StationReading, AppError>;
}

#[async_trait]
impl<F: WeatherFeed + ?Sized> WeatherFeed for Arc<F> {
    async fn fetch(&self, station_id: &str) -> Result<StationReading, AppError> {
        (**self).fetch(station_id).await
    }
}

/// Stations exposed by the meteorological feed, used for `"auto"` resolution.
const STATIONS: &[(&str, &str, f64, f64)] = &[
    ("6235", "De Kooy", 52.928, 4.781),
    ("6240", "Schiphol", 52.318, 4.790),
    ("6260", "De Bilt", 52.100, 5.180),
    ("6275", "Deelen", 52.056, 5.873),
    ("6280", "Eelde", 53.125, 6.585),
    ("6290", "Twenthe", 52.274, 6.891),
    ("6310", "Vlissingen", 51.442, 3.596),
    ("6330", "Hoek van Holland", 51.992, 4.122),
    ("6370", "Eindhoven", 51.451, 5.377),
    ("6380", "Maastricht", 50.906, 5.762),
];

const EARTH_RADIUS_KM: f64 = 6_371.;

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.).sin().powi(2);
    2. * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// `"auto"` picks the station closest to the location; anything else is
/// taken literally (with a name lookup when the station is known).
pub fn resolve_station(station_id: &str, lat: f64, lon: f64) -> (String, Option<String>) {
    if station_id != "auto" {
        let name = STATIONS
            .iter()
            .find(|(id, _, _, _)| *id == station_id)
            .map(|(_, name, _, _)| (*name).to_owned());
        return (station_id.to_owned(), name);
    }
    let (id, name, _, _) = STATIONS
        .iter()
        .min_by(|a, b| {
            let da = haversine_km(lat, lon, a.2, a.3);
            let db = haversine_km(lat, lon, b.2, b.3);
            da.total_cmp(&db)
        })
        .unwrap_or(&STATIONS[0]);
    ((*id).to_owned(), Some((*name).to_owned()))
}

const FEED_URL: &str = "https://data.buienradar.nl/2.0/feed/json";
const FEED_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct FeedDocument {
    actual: FeedActual,
}

#[derive(Debug, Deserialize)]
struct FeedActual {
    #[serde(rename = "stationmeasurements")]
    station_measurements: Vec<FeedMeasurement>,
}

#[derive(Debug, Deserialize)]
struct FeedMeasurement {
    #[serde(rename = "stationid")]
    station_id: i64,
    #[serde(rename = "stationname")]
    station_name: String,
    temperature: Option<f64>,
    humidity: Option<f64>,
}

/// Production feed client over the public station-actuals JSON document.
#[derive(Debug)]
pub struct MeteoFeed {
    client: reqwest::Client,
    url: String,
}

impl MeteoFeed {
    pub fn new() -> Result<Self, AppError> {
        Self::with_url(FEED_URL.to_owned())
    }

    pub fn with_url(url: String) -> Result<Self, AppError> {
        let client =
            reqwest::Client::builder().timeout(Duration::from_secs(FEED_TIMEOUT_SECS)).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl WeatherFeed for MeteoFeed {
    async fn fetch(&self, station_id: &str) -> Result<StationReading, AppError> {
        let doc: FeedDocument = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::WeatherUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| AppError::WeatherUnavailable(format!("malformed feed: {}", e)))?;

        // Station ids arrive as bare integers in the feed.
        let wanted = station_id.trim_start_matches('0');
        doc.actual
            .station_measurements
            .into_iter()
            .find(|m| m.station_id.to_string() == wanted)
            .map(|m| StationReading {
                station_id: m.station_id.to_string(),
                station_name: m.station_name,
                temperature_c: m.temperature,
                humidity_pct: m.humidity,
            })
            .ok_or_else(|| {
                AppError::WeatherUnavailable(format!("station {} absent from feed", station_id))
            })
    }
}

/// Feed-origin minimum refresh window. Requests inside it are answered from
/// cache without touching the network.
const ORIGIN_MIN_REFRESH_SECS: i64 = 30 * 60;
/// A failed fetch keeps serving the previous sample for this many update
/// intervals before fields degrade to unknown.
const STALE_INTERVALS: i64 = 4;

/// Cache over a [`WeatherFeed`]: polls at most once per configured interval,
/// honours the origin refresh floor, and degrades to unknown fields once the
/// last good sample exceeds the staleness budget.
#[derive(Debug)]
pub struct WeatherProvider<F: WeatherFeed> {
    feed: F,
    station_id: String,
    station_name: Option<String>,
    update_interval_secs: i64,
    time: Arc<dyn TimeProvider>,
    cache: ArcSwap<EnvironmentalSample>,
    last_attempt: AtomicI64,
    last_success: AtomicI64,
}

impl<F: WeatherFeed> WeatherProvider<F> {
    pub fn new(
        feed: F,
        station_id: &str,
        location: (f64, f64),
        update_interval_minutes: u64,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        // Station resolution is memoized here; `"auto"` never re-resolves.
        let (station_id, station_name) = resolve_station(station_id, location.0, location.1);
        info!(
            "Weather station resolved to {} ({})",
            station_id,
            station_name.as_deref().unwrap_or("unnamed")
        );
        Self {
            feed,
            station_id,
            station_name,
            update_interval_secs: (update_interval_minutes as i64) * 60,
            time,
            cache: ArcSwap::from_pointee(EnvironmentalSample::default()),
            last_attempt: AtomicI64::new(i64::MIN / 2),
            last_success: AtomicI64::new(i64::MIN / 2),
        }
    }

    pub fn station(&self) -> (String, Option<String>) {
        (self.station_id.clone(), self.station_name.clone())
    }

    /// Fetch if the polling and origin windows allow it, then return the
    /// current view.
    pub async fn refresh(&self) -> EnvironmentalSample {
        let now = self.time.now();
        let due_for_poll = now - self.last_success.load(Ordering::SeqCst) >= self.update_interval_secs;
        let outside_origin_window =
            now - self.last_attempt.load(Ordering::SeqCst) >= ORIGIN_MIN_REFRESH_SECS;

        if due_for_poll && outside_origin_window {
            self.last_attempt.store(now, Ordering::SeqCst);
            match self.feed.fetch(&self.station_id).await {
                Ok(reading) => {
                    debug!(
                        "Weather sample from {}: {:?} C, {:?} %",
                        reading.station_name, reading.temperature_c, reading.humidity_pct
                    );
                    self.last_success.store(now, Ordering::SeqCst);
                    self.cache.store(Arc::new(EnvironmentalSample {
                        temperature_c: reading.temperature_c,
                        humidity_pct: reading.humidity_pct,
                        sampled_at: now,
                        station_id: Some(reading.station_id),
                        station_name: Some(reading.station_name),
                    }));
                }
                Err(e) => warn!("Weather fetch failed, serving cached sample: {}", e),
            }
        }
        self.current(now)
    }

    /// Cached sample with the staleness budget applied.
    pub fn current(&self, now: i64) -> EnvironmentalSample {
        let mut sample = self.cache.load().as_ref().clone();
        let stale_after = self.update_interval_secs * STALE_INTERVALS;
        if sample.sampled_at == 0 || now - sample.sampled_at > stale_after {
            sample.temperature_c = None;
            sample.humidity_pct = None;
        }
        sample
    }
}

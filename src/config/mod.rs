use crate::error::AppError;
use crate::utils::{parse_hhmm, resolve_tz_offset};
use serde::Deserialize;
use std::fs;

pub const CONFIG_FILE: &str = "./hydro.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    pub device_id: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(rename = "type", default = "default_device_type")]
    pub device_type: String,
    pub address: String,
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub auto_discovery: bool,
}

fn default_device_type() -> String {
    "switch".to_owned()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Devices {
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrowingSystem {
    #[serde(rename = "type")]
    pub system_type: String,
    pub primary_device_id: String,
}

impl Default for GrowingSystem {
    fn default() -> Self {
        Self { system_type: "flood_drain".to_owned(), primary_device_id: "pump".to_owned() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActiveHours {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CycleEntry {
    pub on_time: String,
    pub off_minutes: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub postcode: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Default for Location {
    fn default() -> Self {
        Self { postcode: "1012".to_owned(), timezone: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemperatureSource {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_weather_source")]
    pub source: String,
    #[serde(default = "default_station")]
    pub station_id: String,
    #[serde(default = "default_update_interval")]
    pub update_interval_minutes: u64,
}

fn default_weather_source() -> String {
    "meteo".to_owned()
}

fn default_station() -> String {
    "auto".to_owned()
}

fn default_update_interval() -> u64 {
    60
}

impl Default for TemperatureSource {
    fn default() -> Self {
        Self {
            enabled: false,
            source: default_weather_source(),
            station_id: default_station(),
            update_interval_minutes: default_update_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct PeriodValues {
    pub morning: f64,
    pub day: f64,
    pub evening: f64,
    pub night: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaylightAdaptor {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub shift_schedule: bool,
    #[serde(default)]
    pub period_factors: Option<PeriodValues>,
}

/// One temperature or humidity band. `min`/`max` of `None` mean unbounded.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct Band {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    pub factor: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct Constraints {
    pub min_wait: f64,
    pub max_wait: f64,
    pub min_flood: f64,
    pub max_flood: f64,
    pub flood_minutes: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self { min_wait: 5., max_wait: 180., min_flood: 2., max_flood: 15., flood_minutes: 2. }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdaptiveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tod_frequencies")]
    pub tod_frequencies: PeriodValues,
    #[serde(default = "default_temperature_bands")]
    pub temperature_bands: Vec<Band>,
    #[serde(default = "default_humidity_bands")]
    pub humidity_bands: Vec<Band>,
    #[serde(default)]
    pub constraints: Constraints,
}

pub fn default_tod_frequencies() -> PeriodValues {
    PeriodValues { morning: 18., day: 28., evening: 18., night: 118. }
}

pub fn default_temperature_bands() -> Vec<Band> {
    vec![
        Band { min: None, max: Some(15.), factor: 1.15 },
        Band { min: Some(15.), max: Some(25.), factor: 1. },
        Band { min: Some(25.), max: Some(30.), factor: 0.85 },
        Band { min: Some(30.), max: None, factor: 0.70 },
    ]
}

pub fn default_humidity_bands() -> Vec<Band> {
    vec![
        Band { min: None, max: Some(40.), factor: 0.9 },
        Band { min: Some(40.), max: Some(70.), factor: 1. },
        Band { min: Some(70.), max: None, factor: 1.1 },
    ]
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tod_frequencies: default_tod_frequencies(),
            temperature_bands: default_temperature_bands(),
            humidity_bands: default_humidity_bands(),
            constraints: Constraints::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Adaptation {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub temperature: TemperatureSource,
    #[serde(default)]
    pub daylight: DaylightAdaptor,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Schedule {
    #[serde(rename = "type")]
    pub schedule_type: String,
    #[serde(default = "default_flood_minutes")]
    pub flood_minutes: f64,
    #[serde(default = "default_drain_minutes")]
    pub drain_minutes: f64,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: f64,
    #[serde(default)]
    pub active_hours: Option<ActiveHours>,
    #[serde(default)]
    pub cycles: Vec<CycleEntry>,
    #[serde(default)]
    pub adaptation: Adaptation,
}

fn default_flood_minutes() -> f64 {
    2.
}

fn default_drain_minutes() -> f64 {
    5.
}

fn default_interval_minutes() -> f64 {
    60.
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            schedule_type: "interval".to_owned(),
            flood_minutes: default_flood_minutes(),
            drain_minutes: default_drain_minutes(),
            interval_minutes: default_interval_minutes(),
            active_hours: None,
            cycles: vec![],
            adaptation: Adaptation::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub devices: Devices,
    #[serde(default)]
    pub growing_system: GrowingSystem,
    #[serde(default)]
    pub schedule: Schedule,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config_content = fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("unable to read {}: {}", path, e)))?;
        Self::load_from_str(&config_content)
    }

    pub fn load_from_str(config_str: &str) -> Result<Self, AppError> {
        let config: Config = toml::from_str(config_str)
            .map_err(|e| AppError::config(format!("unable to parse config: {}", e)))?;
        config.validate()
    }

    /// Check every configured value and return the normalized configuration,
    /// or a single `Configuration` error listing all violations.
    pub fn validate(self) -> Result<Self, AppError> {
        let mut problems: Vec<String> = vec![];

        if self.devices.devices.is_empty() {
            problems.push("devices.devices must list at least one device".to_owned());
        }
        if !self
            .devices
            .devices
            .iter()
            .any(|d| d.device_id == self.growing_system.primary_device_id)
        {
            problems.push(format!(
                "growing_system.primary_device_id '{}' does not match any configured device",
                self.growing_system.primary_device_id
            ));
        }
        if !matches!(self.growing_system.system_type.as_str(), "flood_drain" | "nft") {
            problems
                .push(format!("growing_system.type '{}' is unknown", self.growing_system.system_type));
        }

        let sched = &self.schedule;
        match sched.schedule_type.as_str() {
            "interval" => {
                if sched.flood_minutes <= 0. || sched.drain_minutes < 0. {
                    problems.push("interval schedule durations must be positive".to_owned());
                }
                if sched.interval_minutes < sched.flood_minutes + sched.drain_minutes {
                    problems.push(format!(
                        "interval_minutes {} is shorter than flood {} + drain {}",
                        sched.interval_minutes, sched.flood_minutes, sched.drain_minutes
                    ));
                }
                if let Some(hours) = &sched.active_hours {
                    for t in [&hours.start, &hours.end] {
                        if let Err(e) = parse_hhmm(t) {
                            problems.push(e.to_string());
                        }
                    }
                }
            }
            "time_based" => {
                if sched.flood_minutes <= 0. {
                    problems.push("flood_minutes must be positive".to_owned());
                }
                if sched.adaptation.adaptive.enabled {
                    if !sched.cycles.is_empty() {
                        problems.push(
                            "cycles cannot be supplied while adaptive synthesis is enabled"
                                .to_owned(),
                        );
                    }
                } else if sched.cycles.is_empty() {
                    problems.push("time_based schedule requires a non-empty cycle list".to_owned());
                }
                for cycle in &sched.cycles {
                    if let Err(e) = parse_hhmm(&cycle.on_time) {
                        problems.push(e.to_string());
                    }
                    if cycle.off_minutes < 0. {
                        problems
                            .push(format!("cycle at {} has negative off_minutes", cycle.on_time));
                    }
                }
            }
            "nft" => {} // surfaced as NotImplemented by the factory
            other => problems.push(format!("schedule.type '{}' is unknown", other)),
        }

        let adaptation = &sched.adaptation;
        if adaptation.enabled {
            if adaptation.location.postcode.trim().is_empty() {
                problems.push("adaptation.location.postcode must be set".to_owned());
            }
            if let Err(e) = resolve_tz_offset(adaptation.location.timezone.as_deref()) {
                problems.push(e.to_string());
            }
            if adaptation.temperature.enabled && adaptation.temperature.update_interval_minutes == 0
            {
                problems.push("temperature.update_interval_minutes must be positive".to_owned());
            }
        }
        if adaptation.adaptive.enabled {
            if !adaptation.enabled {
                problems.push("adaptive synthesis requires adaptation.enabled = true".to_owned());
            }
            validate_adaptive(&adaptation.adaptive, &mut problems);
        }

        if problems.is_empty() {
            Ok(self)
        } else {
            Err(AppError::Configuration(problems.join("; ")))
        }
    }
}

fn validate_adaptive(adaptive: &AdaptiveConfig, problems: &mut Vec<String>) {
    let freq = &adaptive.tod_frequencies;
    for (name, v) in [
        ("morning", freq.morning),
        ("day", freq.day),
        ("evening", freq.evening),
        ("night", freq.night),
    ] {
        if v <= 0. {
            problems.push(format!("tod_frequencies.{} must be positive", name));
        }
    }

    let c = &adaptive.constraints;
    if c.min_wait > c.max_wait {
        problems.push(format!("constraints: min_wait {} > max_wait {}", c.min_wait, c.max_wait));
    }
    if c.min_flood > c.max_flood {
        problems
            .push(format!("constraints: min_flood {} > max_flood {}", c.min_flood, c.max_flood));
    }
    for (name, v) in [
        ("min_wait", c.min_wait),
        ("max_wait", c.max_wait),
        ("min_flood", c.min_flood),
        ("max_flood", c.max_flood),
        ("flood_minutes", c.flood_minutes),
    ] {
        if v <= 0. {
            problems.push(format!("constraints.{} must be positive", name));
        }
    }

    validate_bands("temperature_bands", &adaptive.temperature_bands, problems);
    validate_bands("humidity_bands", &adaptive.humidity_bands, problems);
}

/// Bands must tile the real line: first open below, last open above, each
/// boundary shared with its neighbour, every factor positive.
fn validate_bands(name: &str, bands: &[Band], problems: &mut Vec<String>) {
    if bands.is_empty() {
        problems.push(format!("{} must contain at least one band", name));
        return;
    }
    for band in bands {
        if band.factor <= 0. {
            problems.push(format!("{}: factor {} must be positive", name, band.factor));
        }
    }
    if bands[0].min.is_some() {
        problems.push(format!("{}: first band must be unbounded below", name));
    }
    if bands[bands.len() - 1].max.is_some() {
        problems.push(format!("{}: last band must be unbounded above", name));
    }
    for pair in bands.windows(2) {
        match (pair[0].max, pair[1].min) {
            (Some(hi), Some(lo)) if (hi - lo).abs() < f64::EPSILON => {}
            _ => {
                problems.push(format!("{}: bands must share boundaries with no gaps", name));
                return;
            }
        }
    }
}

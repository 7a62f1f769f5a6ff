use super::ds::{mins_to_secs, Cycle, CycleNote, Period, SchedulePlan};
use crate::config::{AdaptiveConfig, Band, DaylightAdaptor, PeriodValues};
use crate::environment::daylight::DaylightInfo;
use crate::environment::weather::EnvironmentalSample;
use crate::error::AppError;
use crate::utils::SECS_PER_DAY;
use tracing::{debug, info};

const NINE_AM: i64 = 9 * 3600;
const SIX_PM: i64 = 18 * 3600;
const EIGHT_PM: i64 = 20 * 3600;

/// The four period windows for one local day, in seconds from local
/// midnight. Night extends past 86 400 to the next sunrise so the windows
/// always partition 24 hours.
pub fn day_periods(daylight: &DaylightInfo) -> [(Period, i64, i64); 4] {
    let sunrise = daylight.sunrise_secs;
    let sunset = daylight.sunset_secs;

    let morning_end = NINE_AM.max(sunrise);
    let day_end = SIX_PM.max(sunset).max(morning_end);
    let evening_end = EIGHT_PM.max(day_end);
    [
        (Period::Morning, sunrise, morning_end),
        (Period::Day, morning_end, day_end),
        (Period::Evening, day_end, evening_end),
        (Period::Night, evening_end, SECS_PER_DAY + sunrise),
    ]
}

/// Factor for a value against a band partition. Membership is
/// `[min, max)`; an unknown value contributes a neutral 1.0.
pub fn band_factor(bands: &[Band], value: Option<f64>) -> f64 {
    let Some(v) = value else { return 1. };
    bands
        .iter()
        .find(|band| {
            band.min.map_or(true, |min| v >= min) && band.max.map_or(true, |max| v < max)
        })
        .map(|band| band.factor)
        .unwrap_or(1.)
}

/// Current temperature and humidity factors for a sample; used both for
/// synthesis and to detect band-membership changes between samples.
pub fn sample_factors(cfg: &AdaptiveConfig, sample: &EnvironmentalSample) -> (f64, f64) {
    (
        band_factor(&cfg.temperature_bands, sample.temperature_c),
        band_factor(&cfg.humidity_bands, sample.humidity_pct),
    )
}

/// Per-period multipliers from the daylight adaptor: explicit factors win;
/// otherwise the day period scales with relative day length. Factors above
/// 1 shorten waits.
pub fn period_factors(adaptor: &DaylightAdaptor, daylight: &DaylightInfo) -> PeriodValues {
    if !adaptor.enabled {
        return PeriodValues { morning: 1., day: 1., evening: 1., night: 1. };
    }
    if let Some(factors) = adaptor.period_factors {
        return factors;
    }
    let day_scale = (daylight.day_length_mins / 720.).clamp(0.75, 1.25);
    PeriodValues { morning: 1., day: day_scale, evening: 1., night: 1. }
}

fn period_value(values: &PeriodValues, period: Period) -> f64 {
    match period {
        Period::Morning => values.morning,
        Period::Day => values.day,
        Period::Evening => values.evening,
        Period::Night => values.night,
    }
}

/// Synthesize one local day's plan from factors alone. This is a pure
/// function of the adaptation config, the day's daylight and the latest
/// sample; it never reads any previously installed plan.
pub fn synthesize(
    cfg: &AdaptiveConfig,
    adaptor: &DaylightAdaptor,
    daylight: &DaylightInfo,
    sample: &EnvironmentalSample,
) -> Result<SchedulePlan, AppError> {
    let constraints = &cfg.constraints;
    let (tf, hf) = sample_factors(cfg, sample);
    let pf = period_factors(adaptor, daylight);

    let mut flood_deviation = false;
    let flood_mins = {
        let v = constraints.flood_minutes;
        if v < constraints.min_flood || v > constraints.max_flood {
            flood_deviation = true;
        }
        v.clamp(constraints.min_flood, constraints.max_flood)
    };
    let flood_secs = mins_to_secs(flood_mins);

    let mut cycles = vec![];
    for (period, start, end) in day_periods(daylight) {
        if start >= end {
            debug!("Period {} is empty, no cycles emitted", period);
            continue;
        }
        let base = period_value(&cfg.tod_frequencies, period);
        let target_off_mins =
            (base * tf * hf / period_value(&pf, period)).clamp(constraints.min_wait, constraints.max_wait);
        let off_secs = mins_to_secs(target_off_mins);

        let mut cursor = start;
        while cursor + flood_secs + off_secs <= end {
            cycles.push(Cycle {
                start_secs: cursor.rem_euclid(SECS_PER_DAY),
                flood_secs,
                off_secs,
                drain_secs: off_secs,
                deviation: flood_deviation,
                note: Some(CycleNote {
                    period,
                    temperature_c: sample.temperature_c,
                    humidity_pct: sample.humidity_pct,
                    temp_factor: tf,
                    humidity_factor: hf,
                }),
            });
            cursor += flood_secs + off_secs;
        }
    }

    info!(
        "Synthesized {} cycles (tf {:.2}, hf {:.2}, flood {:.1} min)",
        cycles.len(),
        tf,
        hf,
        flood_mins
    );
    SchedulePlan::new(cycles)
}

/// Analytic comparison of a synthesized plan against an optional reference.
/// Never feeds back into synthesis.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ValidationReport {
    pub matches: bool,
    pub deviations: Vec<Deviation>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Deviation {
    pub on_time: String,
    pub off_minutes: f64,
    pub reference_off_minutes: f64,
}

pub fn validate_plan(plan: &SchedulePlan, reference: Option<&SchedulePlan>) -> ValidationReport {
    let mut report = ValidationReport { matches: true, deviations: vec![], warnings: vec![] };

    for cycle in plan.cycles() {
        if cycle.deviation {
            report.warnings.push(format!("cycle at {} was clamped into bounds", cycle.on_time()));
        }
    }

    if let Some(reference) = reference {
        for cycle in plan.cycles() {
            let nearest = reference
                .cycles()
                .iter()
                .min_by_key(|r| (r.start_secs - cycle.start_secs).abs());
            if let Some(nearest) = nearest {
                let off = cycle.off_secs as f64 / 60.;
                let ref_off = nearest.off_secs as f64 / 60.;
                if ref_off > 0. && (off - ref_off).abs() > ref_off * 0.5 {
                    report.deviations.push(Deviation {
                        on_time: cycle.on_time(),
                        off_minutes: off,
                        reference_off_minutes: ref_off,
                    });
                }
            }
        }
    }

    report.matches = report.deviations.is_empty();
    report
}

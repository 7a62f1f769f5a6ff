use super::ds::{mins_to_secs, Bounds, Cycle, SchedulePlan};
use crate::config::CycleEntry;
use crate::error::AppError;
use crate::utils::parse_hhmm;
use tracing::info;

/// Literal time-of-day plan: at each on-time flood for `flood_mins`, then
/// drain; the engine sleeps to the next on-time regardless of `off_minutes`.
/// Out-of-bounds values are clamped and flagged, never dropped.
pub fn build_time_of_day_plan(
    flood_mins: f64,
    entries: &[CycleEntry],
    bounds: &Bounds,
) -> Result<SchedulePlan, AppError> {
    if entries.is_empty() {
        return Err(AppError::config("time_based schedule requires a non-empty cycle list"));
    }

    let mut cycles = Vec::with_capacity(entries.len());
    for entry in entries {
        let start_secs = parse_hhmm(&entry.on_time)?;
        let mut deviation = false;
        let flood = bounds.clamp_flood_mins(flood_mins, &mut deviation);
        let off = bounds.clamp_off_mins(entry.off_minutes, &mut deviation);
        let off_secs = mins_to_secs(off);
        cycles.push(Cycle {
            start_secs,
            flood_secs: mins_to_secs(flood),
            off_secs,
            drain_secs: off_secs,
            deviation,
            note: None,
        });
    }

    info!("Time-of-day plan: {} cycles, flood {} min", cycles.len(), flood_mins);
    SchedulePlan::new(cycles)
}

use super::ds::{mins_to_secs, Cycle, SchedulePlan};
use crate::config::ActiveHours;
use crate::error::AppError;
use crate::utils::{format_hhmm, parse_hhmm, SECS_PER_DAY};
use tracing::{debug, info};

/// Active window in seconds of local day; may wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveWindow {
    pub start_secs: i64,
    pub end_secs: i64,
}

impl ActiveWindow {
    pub fn from_config(hours: &ActiveHours) -> Result<Self, AppError> {
        Ok(Self { start_secs: parse_hhmm(&hours.start)?, end_secs: parse_hhmm(&hours.end)? })
    }

    pub fn contains(&self, secs_of_day: i64) -> bool {
        if self.start_secs <= self.end_secs {
            (self.start_secs..self.end_secs).contains(&secs_of_day)
        } else {
            secs_of_day >= self.start_secs || secs_of_day < self.end_secs
        }
    }

    fn len_secs(&self) -> i64 {
        (self.end_secs - self.start_secs).rem_euclid(SECS_PER_DAY)
    }
}

/// Fixed-interval plan: `ON(flood) → OFF(drain) → WAIT(rest)`, repeating.
/// The chain anchors at local midnight, or at the window start when active
/// hours are set; on-instants outside the window are suppressed entirely.
/// A cycle that starts inside the window runs to completion.
pub fn build_interval_plan(
    flood_mins: f64,
    drain_mins: f64,
    interval_mins: f64,
    active: Option<ActiveWindow>,
) -> Result<SchedulePlan, AppError> {
    if flood_mins <= 0. || drain_mins < 0. || interval_mins <= 0. {
        return Err(AppError::config("interval schedule durations must be positive"));
    }
    if interval_mins < flood_mins + drain_mins {
        return Err(AppError::config(format!(
            "interval {} min is shorter than flood {} + drain {} min",
            interval_mins, flood_mins, drain_mins
        )));
    }
    if let Some(window) = &active {
        if window.len_secs() == 0 {
            return Err(AppError::config("active_hours window is empty"));
        }
    }

    let flood_secs = mins_to_secs(flood_mins);
    let drain_secs = mins_to_secs(drain_mins);
    let interval_secs = mins_to_secs(interval_mins);

    let anchor = active.map(|w| w.start_secs).unwrap_or(0);
    let mut cycles = vec![];
    let mut offset = 0;
    while offset < SECS_PER_DAY {
        let start_secs = (anchor + offset) % SECS_PER_DAY;
        offset += interval_secs;

        if let Some(window) = &active {
            if !window.contains(start_secs) {
                debug!("Suppressing on-instant {} outside active hours", format_hhmm(start_secs));
                continue;
            }
        }
        cycles.push(Cycle {
            start_secs,
            flood_secs,
            drain_secs,
            off_secs: interval_secs - flood_secs,
            deviation: false,
            note: None,
        });
    }

    info!(
        "Interval plan: {} cycles of flood {} min every {} min",
        cycles.len(),
        flood_mins,
        interval_mins
    );
    SchedulePlan::new(cycles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_spaces_cycles_by_interval() {
        let plan = build_interval_plan(1., 2., 4., None).unwrap();
        let starts: Vec<i64> =
            plan.cycles().iter().take(3).map(|c| c.start_secs).collect();
        assert_eq!(starts, vec![0, 240, 480]);
        let first = &plan.cycles()[0];
        assert_eq!(first.flood_secs, 60);
        assert_eq!(first.drain_secs, 120);
        assert_eq!(first.off_secs, 180);
    }

    #[test]
    fn active_hours_anchor_and_suppress() {
        let window = ActiveWindow { start_secs: 5 * 60, end_secs: 10 * 60 };
        let plan = build_interval_plan(1., 2., 4., Some(window)).unwrap();
        let starts: Vec<i64> = plan.cycles().iter().map(|c| c.start_secs).collect();
        // Anchored at 00:05; 00:09 still starts inside the window.
        assert_eq!(starts, vec![5 * 60, 9 * 60]);
    }

    #[test]
    fn window_wrapping_midnight() {
        let window = ActiveWindow { start_secs: 23 * 3600, end_secs: 3600 };
        assert!(window.contains(23 * 3600 + 1800));
        assert!(window.contains(600));
        assert!(!window.contains(2 * 3600));

        let plan = build_interval_plan(2., 3., 60., Some(window)).unwrap();
        // 23:00 and 00:00 fall inside the two-hour window.
        let starts: Vec<i64> = plan.cycles().iter().map(|c| c.start_secs).collect();
        assert_eq!(starts, vec![0, 23 * 3600]);
    }

    #[test]
    fn back_to_back_interval_has_no_wait() {
        let plan = build_interval_plan(2., 2., 4., None).unwrap();
        let c = &plan.cycles()[0];
        assert_eq!(c.flood_secs + c.drain_secs, mins_to_secs(4.));
    }

    #[test]
    fn interval_shorter_than_phases_fails() {
        assert!(build_interval_plan(3., 2., 4., None).is_err());
    }
}

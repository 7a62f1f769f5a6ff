use crate::error::AppError;
use crate::utils::{format_hhmm, sod_local, SECS_PER_DAY};
use std::fmt;
use tracing::warn;

/// Named partition of the local day used by adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Morning,
    Day,
    Evening,
    Night,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Period::Morning => "morning",
            Period::Day => "day",
            Period::Evening => "evening",
            Period::Night => "night",
        };
        f.write_str(s)
    }
}

/// Adaptive annotations. Informational only; the execution loop never
/// reads these.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleNote {
    pub period: Period,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub temp_factor: f64,
    pub humidity_factor: f64,
}

/// One flood event within a local day. All fields are seconds; `start_secs`
/// counts from local midnight.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub start_secs: i64,
    pub flood_secs: i64,
    /// Drain-plus-wait that nominally follows the flood. Informational for
    /// time-based plans; the engine waits for the next on-time regardless.
    pub off_secs: i64,
    /// Portion of `off_secs` during which the engine reports the drain
    /// phase and re-issues OFF at its end.
    pub drain_secs: i64,
    /// Set when construction clamped a value into bounds.
    pub deviation: bool,
    pub note: Option<CycleNote>,
}

impl Cycle {
    pub fn on_time(&self) -> String {
        format_hhmm(self.start_secs)
    }
}

/// Clamping bounds applied to every plan at construction and replan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_flood_mins: f64,
    pub max_flood_mins: f64,
    pub min_off_mins: f64,
    pub max_off_mins: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self { min_flood_mins: 2., max_flood_mins: 15., min_off_mins: 5., max_off_mins: 180. }
    }
}

impl Bounds {
    /// Clamp a minute value into `[min, max]`, flagging the deviation.
    fn clamp(value: f64, min: f64, max: f64, what: &str, deviated: &mut bool) -> f64 {
        if value < min || value > max {
            warn!("{} {:.2} min outside [{:.0}, {:.0}], clamping", what, value, min, max);
            *deviated = true;
            value.clamp(min, max)
        } else {
            value
        }
    }

    pub fn clamp_flood_mins(&self, value: f64, deviated: &mut bool) -> f64 {
        Self::clamp(value, self.min_flood_mins, self.max_flood_mins, "flood", deviated)
    }

    pub fn clamp_off_mins(&self, value: f64, deviated: &mut bool) -> f64 {
        Self::clamp(value, self.min_off_mins, self.max_off_mins, "off", deviated)
    }
}

pub fn mins_to_secs(mins: f64) -> i64 {
    (mins * 60.).round() as i64
}

/// Ordered cycles for one local day. Immutable once installed; a replan
/// swaps in a whole new plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulePlan {
    cycles: Vec<Cycle>,
}

impl SchedulePlan {
    /// Sorts by on-time and drops duplicate on-times (first wins).
    pub fn new(mut cycles: Vec<Cycle>) -> Result<Self, AppError> {
        if cycles.is_empty() {
            return Err(AppError::config("schedule plan contains no cycles"));
        }
        cycles.sort_by_key(|c| c.start_secs);
        cycles.dedup_by_key(|c| c.start_secs);
        for cycle in &cycles {
            if !(0..SECS_PER_DAY).contains(&cycle.start_secs) || cycle.flood_secs <= 0 {
                return Err(AppError::config(format!(
                    "invalid cycle at {} (flood {} s)",
                    cycle.on_time(),
                    cycle.flood_secs
                )));
            }
        }
        Ok(Self { cycles })
    }

    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Next occurrence at or after `ts` that is strictly later than
    /// `after_ts`, as an absolute timestamp paired with its cycle. Cycles
    /// wrap to the next day when today's occurrence already passed.
    pub fn next_on(&self, ts: i64, tz_offset_secs: i64, after_ts: i64) -> Option<(i64, &Cycle)> {
        let midnight = sod_local(ts, tz_offset_secs);
        self.cycles
            .iter()
            .map(|cycle| {
                let mut candidate = midnight + cycle.start_secs;
                while candidate < ts || candidate <= after_ts {
                    candidate += SECS_PER_DAY;
                }
                (candidate, cycle)
            })
            .min_by_key(|(candidate, _)| *candidate)
    }
}

/// Engine phase. `Waiting` covers both idle-between-cycles and
/// armed-for-next-on-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Stopped,
    Waiting,
    Flood,
    Drain,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Stopped => "stopped",
            SchedulerState::Waiting => "waiting",
            SchedulerState::Flood => "flood",
            SchedulerState::Drain => "drain",
        };
        f.write_str(s)
    }
}

/// Worker-published part of the status snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub state: SchedulerState,
    pub next_event_time: Option<String>,
    pub time_until_next_cycle: Option<i64>,
    pub current_period: Option<String>,
    pub last_cycle: Option<String>,
}

impl WorkerStatus {
    pub fn stopped() -> Self {
        Self {
            running: false,
            state: SchedulerState::Stopped,
            next_event_time: None,
            time_until_next_cycle: None,
            current_period: None,
            last_cycle: None,
        }
    }

    pub fn armed() -> Self {
        Self { running: true, state: SchedulerState::Waiting, ..Self::stopped() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn cycle(start_secs: i64) -> Cycle {
        Cycle {
            start_secs,
            flood_secs: 120,
            off_secs: 300,
            drain_secs: 300,
            deviation: false,
            note: None,
        }
    }

    #[test]
    fn plan_sorts_and_dedupes() {
        let plan =
            SchedulePlan::new(vec![cycle(600), cycle(60), cycle(600), cycle(300)]).unwrap();
        let starts: Vec<i64> = plan.cycles().iter().map(|c| c.start_secs).collect();
        assert_eq!(starts, vec![60, 300, 600]);
    }

    #[test]
    fn empty_plan_is_rejected() {
        assert!(SchedulePlan::new(vec![]).is_err());
    }

    #[test]
    fn next_on_wraps_to_tomorrow() {
        let plan = SchedulePlan::new(vec![cycle(23 * 3600 + 58 * 60), cycle(3 * 60)]).unwrap();
        // 23:57:30 local, zero offset
        let ts = 86_400 * 10 + 23 * 3600 + 57 * 60 + 30;
        let (first, c) = plan.next_on(ts, 0, i64::MIN / 2).unwrap();
        assert_eq!(c.start_secs, 23 * 3600 + 58 * 60);
        assert_eq!(first, 86_400 * 10 + 23 * 3600 + 58 * 60);

        // After firing the 23:58 cycle, the next is 00:03 tomorrow.
        let (second, c) = plan.next_on(first, 0, first).unwrap();
        assert_eq!(c.start_secs, 3 * 60);
        assert_eq!(second, 86_400 * 11 + 3 * 60);
    }

    #[test]
    fn next_on_is_monotonic_within_a_day() {
        let plan = SchedulePlan::new(vec![cycle(3600), cycle(7200), cycle(10_800)]).unwrap();
        let t1 = 86_400 + 1800;
        let t2 = 86_400 + 5000;
        let (n1, _) = plan.next_on(t1, 0, i64::MIN / 2).unwrap();
        let (n2, _) = plan.next_on(t2, 0, i64::MIN / 2).unwrap();
        assert!(n1 <= n2);
        assert!(n2 > t2);
    }

    #[test]
    fn cycle_due_now_fires_immediately() {
        let plan = SchedulePlan::new(vec![cycle(3600)]).unwrap();
        let ts = 86_400 * 5 + 3600;
        let (next, _) = plan.next_on(ts, 0, i64::MIN / 2).unwrap();
        assert_eq!(next, ts);
    }

    #[test]
    fn clamping_flags_deviation() {
        let bounds = Bounds::default();
        let mut deviated = false;
        assert_eq!(bounds.clamp_off_mins(0., &mut deviated), 5.);
        assert!(deviated);

        let mut deviated = false;
        assert_eq!(bounds.clamp_flood_mins(10., &mut deviated), 10.);
        assert!(!deviated);
    }
}

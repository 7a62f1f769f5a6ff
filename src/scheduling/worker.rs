use super::adaptive::{sample_factors, synthesize, validate_plan, ValidationReport};
use super::ds::{SchedulePlan, SchedulerState, WorkerStatus};
use crate::config::{AdaptiveConfig, DaylightAdaptor};
use crate::device::{controller::DeviceCommander, interface::SwitchDevice};
use crate::environment::{weather::WeatherFeed, EnvironmentalService};
use crate::error::AppError;
use crate::time::TimeProvider;
use crate::utils::display_local;
use arc_swap::ArcSwap;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const TICK_SECS: u64 = 1;
/// How late an on-instant may be observed and still fire. Anything later
/// (a forward clock jump, a start mid-flood) is skipped, never caught up.
const LATE_GRACE_SECS: i64 = 5;
/// Cadence of the device status refresh between commands, so a pump that
/// drops off the network during a long wait shows up on status before the
/// next command touches it.
const DEVICE_POLL_SECS: i64 = 60;

/// The scheduler's executing core. Owned by exactly one worker task; all
/// shared views (plan, status) go through atomic snapshot pointers.
pub struct Engine<D: SwitchDevice> {
    commander: Arc<DeviceCommander<D>>,
    plan: Arc<ArcSwap<SchedulePlan>>,
    status: Arc<ArcSwap<WorkerStatus>>,
    tz_offset_secs: i64,
    state: SchedulerState,
    phase_end_ts: i64,
    drain_end_ts: i64,
    last_fired_ts: i64,
    last_device_poll_ts: i64,
    last_cycle: Option<String>,
    current_period: Option<String>,
}

impl<D: SwitchDevice> Engine<D> {
    pub fn new(
        commander: Arc<DeviceCommander<D>>,
        plan: Arc<ArcSwap<SchedulePlan>>,
        status: Arc<ArcSwap<WorkerStatus>>,
        tz_offset_secs: i64,
    ) -> Self {
        Self {
            commander,
            plan,
            status,
            tz_offset_secs,
            state: SchedulerState::Waiting,
            phase_end_ts: 0,
            drain_end_ts: 0,
            last_fired_ts: i64::MIN / 2,
            last_device_poll_ts: 0,
            last_cycle: None,
            current_period: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// One poll of the wall clock. Transitions are driven entirely by `now`
    /// so tests can step simulated clocks through the state machine.
    pub async fn tick(&mut self, now: i64) {
        if self.state != SchedulerState::Stopped
            && now - self.last_device_poll_ts >= DEVICE_POLL_SECS
        {
            self.last_device_poll_ts = now;
            self.commander.poll().await;
        }
        match self.state {
            SchedulerState::Stopped => {}
            SchedulerState::Waiting => {
                self.try_fire(now).await;
            }
            SchedulerState::Flood => {
                if now >= self.phase_end_ts {
                    self.end_flood(now).await;
                }
            }
            SchedulerState::Drain => {
                // The next on-time can land before the nominal drain end
                // (time-of-day plans treat off as informational).
                if !self.try_fire(now).await && now >= self.drain_end_ts {
                    // Reconciliation OFF at drain end; the device should
                    // already be off.
                    if let Err(e) = self.commander.turn_off().await {
                        warn!("Drain-end reconciliation failed: {}", e);
                    }
                    self.state = SchedulerState::Waiting;
                    debug!("Drain complete, waiting for next cycle");
                }
            }
        }
        self.publish(now);
    }

    /// Fire the next due cycle, if any. Returns true when a flood started.
    async fn try_fire(&mut self, now: i64) -> bool {
        let plan = self.plan.load_full();
        let Some((on_ts, cycle)) =
            plan.next_on(now - LATE_GRACE_SECS, self.tz_offset_secs, self.last_fired_ts)
        else {
            return false;
        };
        if on_ts > now {
            return false;
        }

        // Never two floods at once: a fire is only reachable from Waiting
        // or Drain, and it always records the on-instant it consumed.
        self.last_fired_ts = on_ts;
        self.last_cycle = Some(display_local(on_ts, self.tz_offset_secs));
        self.current_period = cycle.note.as_ref().map(|n| n.period.to_string());

        match self.commander.turn_on().await {
            Ok(()) => {
                info!("Flood started at {}", display_local(on_ts, self.tz_offset_secs));
            }
            Err(AppError::DeviceUnreachable(e)) => {
                // No water is moving; skip this cycle and reconcile later.
                error!("Pump unreachable, skipping cycle: {}", e);
                return false;
            }
            Err(e) => {
                // The command may have landed despite failed verification;
                // run the phase on the original schedule.
                error!("Flood command not verified: {}", e);
            }
        }

        self.state = SchedulerState::Flood;
        self.phase_end_ts = on_ts + cycle.flood_secs;
        self.drain_end_ts = self.phase_end_ts + cycle.drain_secs;
        true
    }

    async fn end_flood(&mut self, now: i64) {
        if let Err(e) = self.commander.turn_off().await {
            // Phase advances regardless; state reconciles at the next
            // command or poll.
            error!("Flood-end OFF not verified: {}", e);
        }
        self.state = SchedulerState::Drain;
        debug!("Flood ended at {}, draining", display_local(now, self.tz_offset_secs));
    }

    /// Release the device and stop. Called exactly once, from the worker's
    /// shutdown path.
    pub async fn shutdown(&mut self, now: i64) {
        self.commander.turn_off_best_effort().await;
        self.state = SchedulerState::Stopped;
        self.publish(now);
        info!("Scheduler worker stopped, device released");
    }

    fn publish(&self, now: i64) {
        let next_cycle = self
            .plan
            .load()
            .next_on(now, self.tz_offset_secs, self.last_fired_ts)
            .map(|(ts, _)| ts);
        let next_event_ts = match self.state {
            SchedulerState::Stopped => None,
            SchedulerState::Waiting => next_cycle,
            SchedulerState::Flood => Some(self.phase_end_ts),
            SchedulerState::Drain => {
                Some(next_cycle.map_or(self.drain_end_ts, |n| n.min(self.drain_end_ts)))
            }
        };
        self.status.store(Arc::new(WorkerStatus {
            running: self.state != SchedulerState::Stopped,
            state: self.state,
            next_event_time: next_event_ts.map(|ts| display_local(ts, self.tz_offset_secs)),
            time_until_next_cycle: next_cycle.map(|ts| (ts - now).max(0)),
            current_period: self.current_period.clone(),
            last_cycle: self.last_cycle.clone(),
        }));
    }
}

/// Adaptive configuration as observed by the worker; replaced atomically
/// on configuration update, with a generation bump forcing re-synthesis.
#[derive(Debug, Clone)]
pub struct AdaptiveShared {
    pub cfg: AdaptiveConfig,
    pub adaptor: DaylightAdaptor,
    pub generation: u64,
}

/// Re-synthesis triggers for the adaptive strategy: midnight crossing,
/// band-membership change, config replacement. The in-progress phase is
/// never interrupted; the worker reads the new plan at its next fire
/// decision.
pub struct AdaptiveRuntime<F: WeatherFeed> {
    shared: Arc<ArcSwap<AdaptiveShared>>,
    env: Arc<EnvironmentalService<F>>,
    plan: Arc<ArcSwap<SchedulePlan>>,
    report: Arc<ArcSwap<ValidationReport>>,
    last_day: Option<i64>,
    last_factors: Option<(f64, f64)>,
    last_generation: Option<u64>,
}

impl<F: WeatherFeed> AdaptiveRuntime<F> {
    pub fn new(
        shared: Arc<ArcSwap<AdaptiveShared>>,
        env: Arc<EnvironmentalService<F>>,
        plan: Arc<ArcSwap<SchedulePlan>>,
        report: Arc<ArcSwap<ValidationReport>>,
    ) -> Self {
        Self {
            shared,
            env,
            plan,
            report,
            last_day: None,
            last_factors: None,
            last_generation: None,
        }
    }

    pub fn maybe_resynthesize(&mut self, now: i64) {
        let shared = self.shared.load();
        let day = (now + self.env.tz_offset_secs()).div_euclid(crate::utils::SECS_PER_DAY);
        let sample = self.env.sample();
        let factors = sample_factors(&shared.cfg, &sample);

        if self.last_day == Some(day)
            && self.last_factors == Some(factors)
            && self.last_generation == Some(shared.generation)
        {
            return;
        }
        let Some(daylight) = self.env.daylight_for(now) else {
            warn!("No daylight data, keeping current plan");
            return;
        };
        match synthesize(&shared.cfg, &shared.adaptor, &daylight, &sample) {
            Ok(new_plan) => {
                info!(
                    "Installing re-synthesized plan: {} cycles (day {}, factors {:?})",
                    new_plan.len(),
                    day,
                    factors
                );
                let previous = self.plan.load_full();
                self.report.store(Arc::new(validate_plan(&new_plan, Some(previous.as_ref()))));
                self.plan.store(Arc::new(new_plan));
                self.last_day = Some(day);
                self.last_factors = Some(factors);
                self.last_generation = Some(shared.generation);
            }
            Err(e) => error!("Re-synthesis failed, keeping current plan: {}", e),
        }
    }
}

/// The single task owning the device and the plan cursor. Blocks on the
/// earlier of the tick cadence and the cancellation signal; always
/// releases the device on the way out.
pub async fn run_worker<D: SwitchDevice, F: WeatherFeed>(
    mut engine: Engine<D>,
    mut adaptive: Option<AdaptiveRuntime<F>>,
    time: Arc<dyn TimeProvider>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Scheduler worker started");
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = time.sleep(Duration::from_secs(TICK_SECS)) => {}
        }
        let now = time.now();
        if let Some(runtime) = adaptive.as_mut() {
            runtime.maybe_resynthesize(now);
        }
        engine.tick(now).await;
    }
    engine.shutdown(time.now()).await;
}

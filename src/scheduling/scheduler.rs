use super::adaptive::ValidationReport;
use super::ds::{Bounds, SchedulePlan, SchedulerState, WorkerStatus};
use super::interval::{build_interval_plan, ActiveWindow};
use super::time_of_day::build_time_of_day_plan;
use super::worker::{run_worker, AdaptiveRuntime, AdaptiveShared, Engine};
use crate::config::Schedule;
use crate::device::{controller::DeviceCommander, interface::SwitchDevice, DeviceSnapshot};
use crate::environment::{weather::WeatherFeed, EnvSnapshot, EnvironmentalService};
use crate::error::AppError;
use crate::time::TimeProvider;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Strategy tag. Adaptive wraps the time-of-day execution path around a
/// synthesizer-maintained cycle list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Interval,
    TimeOfDay,
    Adaptive,
}

/// Full point-in-time status: scheduler fields plus device and
/// environment, each read from its own snapshot pointer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatus {
    #[serde(flatten)]
    pub scheduler: WorkerStatus,
    pub device: DeviceSnapshot,
    pub environment: EnvSnapshot,
}

const SHUTDOWN_BUDGET_SECS: u64 = 10;

/// The unified scheduler. One worker task owns the device and the plan
/// cursor; everything here is a thin concurrent-safe control surface.
#[derive(Debug)]
pub struct Scheduler<D: SwitchDevice, F: WeatherFeed> {
    kind: StrategyKind,
    commander: Arc<DeviceCommander<D>>,
    env: Option<Arc<EnvironmentalService<F>>>,
    plan: Arc<ArcSwap<SchedulePlan>>,
    worker_status: Arc<ArcSwap<WorkerStatus>>,
    report: Arc<ArcSwap<ValidationReport>>,
    adaptive: Option<Arc<ArcSwap<AdaptiveShared>>>,
    bounds: Bounds,
    time: Arc<dyn TimeProvider>,
    tz_offset_secs: i64,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl<D: SwitchDevice + 'static, F: WeatherFeed + 'static> Scheduler<D, F> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: StrategyKind,
        commander: Arc<DeviceCommander<D>>,
        env: Option<Arc<EnvironmentalService<F>>>,
        plan: SchedulePlan,
        adaptive: Option<AdaptiveShared>,
        report: ValidationReport,
        time: Arc<dyn TimeProvider>,
        tz_offset_secs: i64,
    ) -> Self {
        Self {
            kind,
            commander,
            env,
            plan: Arc::new(ArcSwap::from_pointee(plan)),
            worker_status: Arc::new(ArcSwap::from_pointee(WorkerStatus::stopped())),
            report: Arc::new(ArcSwap::from_pointee(report)),
            adaptive: adaptive.map(|shared| Arc::new(ArcSwap::from_pointee(shared))),
            bounds: Bounds::default(),
            time,
            tz_offset_secs,
            shutdown_tx: Mutex::new(None),
            tasks: Mutex::new(vec![]),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn is_running(&self) -> bool {
        self.worker_status.load().running
    }

    pub fn state(&self) -> SchedulerState {
        self.worker_status.load().state
    }

    pub fn installed_plan(&self) -> Arc<SchedulePlan> {
        self.plan.load_full()
    }

    pub fn validation_report(&self) -> ValidationReport {
        self.report.load().as_ref().clone()
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            scheduler: self.worker_status.load().as_ref().clone(),
            device: self.commander.snapshot(),
            environment: self
                .env
                .as_ref()
                .map(|env| env.snapshot())
                .unwrap_or_default(),
        }
    }

    /// Begin execution. Idempotent: a second call while running returns
    /// success without spawning a duplicate worker.
    pub async fn start(&self) -> Result<(), AppError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(AppError::ShuttingDown);
        }
        let mut tasks = self.tasks.lock().await;
        if tasks.iter().any(|handle| !handle.is_finished()) {
            debug!("Start requested while already running, nothing to do");
            return Ok(());
        }
        tasks.clear();

        // Construction-time invariants, re-checked.
        if self.plan.load().is_empty() {
            return Err(AppError::config("installed plan has no cycles"));
        }

        // An unreachable pump does not block startup; cycles are skipped
        // until it comes back.
        if let Err(e) = self.commander.connect().await {
            warn!("Starting with unreachable device: {}", e);
        }

        let (tx, rx) = watch::channel(false);
        if let Some(env) = &self.env {
            tasks.push(tokio::spawn(env.clone().run_poller(rx.clone())));
        }
        let engine = Engine::new(
            self.commander.clone(),
            self.plan.clone(),
            self.worker_status.clone(),
            self.tz_offset_secs,
        );
        let runtime = match (&self.adaptive, &self.env) {
            (Some(shared), Some(env)) => Some(AdaptiveRuntime::new(
                shared.clone(),
                env.clone(),
                self.plan.clone(),
                self.report.clone(),
            )),
            _ => None,
        };
        tasks.push(tokio::spawn(run_worker(engine, runtime, self.time.clone(), rx)));
        *self.shutdown_tx.lock().await = Some(tx);
        self.worker_status.store(Arc::new(WorkerStatus::armed()));
        info!("Scheduler started ({:?})", self.kind);
        Ok(())
    }

    /// Request termination: cancels the worker, which commands OFF before
    /// returning. Bounded by the graceful-shutdown budget. Idempotent.
    pub async fn stop(&self) -> Result<(), AppError> {
        self.shutting_down.store(true, Ordering::SeqCst);
        let tx = self.shutdown_tx.lock().await.take();
        let mut tasks = self.tasks.lock().await;

        if let Some(tx) = tx {
            let _ = tx.send(true);
            let drained = tokio::time::timeout(
                Duration::from_secs(SHUTDOWN_BUDGET_SECS),
                join_all_tasks(&mut tasks),
            )
            .await;
            if drained.is_err() {
                warn!("Graceful shutdown budget exceeded, aborting remaining tasks");
            }
        } else {
            // Never ran (or already stopped): still release the device.
            self.commander.turn_off_best_effort().await;
        }
        for handle in tasks.drain(..) {
            handle.abort();
        }
        self.worker_status.store(Arc::new(WorkerStatus::stopped()));
        self.shutting_down.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");
        Ok(())
    }

    /// Manual override: command the pump ON outside the schedule.
    pub async fn turn_on(&self) -> Result<(), AppError> {
        self.guard_shutdown()?;
        self.commander.turn_on().await
    }

    /// Manual override: command the pump OFF.
    pub async fn turn_off(&self) -> Result<(), AppError> {
        self.guard_shutdown()?;
        self.commander.turn_off().await
    }

    /// OFF then stop. Succeeds even when the device is unreachable.
    pub async fn emergency_stop(&self) -> Result<(), AppError> {
        warn!("Emergency stop requested");
        self.commander.turn_off_best_effort().await;
        self.stop().await
    }

    /// Install a new plan. The worker observes it at its next fire
    /// decision; installing an identical plan is a no-op for execution.
    pub async fn replan(&self, plan: SchedulePlan) -> Result<(), AppError> {
        self.guard_shutdown()?;
        if plan.is_empty() {
            return Err(AppError::config("replan requires a non-empty plan"));
        }
        info!("Installing replacement plan with {} cycles", plan.len());
        self.plan.store(Arc::new(plan));
        Ok(())
    }

    /// Replace the schedule/adaptation configuration subset. The strategy
    /// kind is fixed at construction; changing it means building a new
    /// scheduler through the factory.
    pub async fn update_config(&self, schedule: &Schedule) -> Result<(), AppError> {
        self.guard_shutdown()?;
        match (self.kind, schedule.schedule_type.as_str()) {
            (StrategyKind::Interval, "interval") => {
                let window = schedule
                    .active_hours
                    .as_ref()
                    .map(ActiveWindow::from_config)
                    .transpose()?;
                let plan = build_interval_plan(
                    schedule.flood_minutes,
                    schedule.drain_minutes,
                    schedule.interval_minutes,
                    window,
                )?;
                self.plan.store(Arc::new(plan));
                Ok(())
            }
            (StrategyKind::TimeOfDay, "time_based") if !schedule.adaptation.adaptive.enabled => {
                let plan = build_time_of_day_plan(
                    schedule.flood_minutes,
                    &schedule.cycles,
                    &self.bounds,
                )?;
                self.plan.store(Arc::new(plan));
                Ok(())
            }
            (StrategyKind::Adaptive, "time_based") if schedule.adaptation.adaptive.enabled => {
                if !schedule.cycles.is_empty() {
                    return Err(AppError::config(
                        "cycles cannot be supplied while adaptive synthesis is enabled",
                    ));
                }
                let Some(shared) = &self.adaptive else {
                    return Err(AppError::config("adaptive runtime is not initialized"));
                };
                let generation = shared.load().generation + 1;
                shared.store(Arc::new(AdaptiveShared {
                    cfg: schedule.adaptation.adaptive.clone(),
                    adaptor: schedule.adaptation.daylight.clone(),
                    generation,
                }));
                info!("Adaptive configuration replaced (generation {})", generation);
                Ok(())
            }
            _ => Err(AppError::config(
                "changing the schedule type requires constructing a new scheduler",
            )),
        }
    }

    fn guard_shutdown(&self) -> Result<(), AppError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(AppError::ShuttingDown);
        }
        Ok(())
    }
}

async fn join_all_tasks(tasks: &mut Vec<JoinHandle<()>>) {
    for handle in tasks.drain(..) {
        let _ = handle.await;
    }
}

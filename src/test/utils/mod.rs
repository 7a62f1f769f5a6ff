pub mod mock_cfg;
pub mod mock_device;
pub mod mock_time;
pub mod mock_weather;

use crate::device::controller::DeviceCommander;
use crate::scheduling::ds::{SchedulePlan, WorkerStatus};
use crate::scheduling::worker::Engine;
use crate::time::TimeProvider;
use arc_swap::ArcSwap;
use mock_device::{logging_switch, CommandLog, MockSwitchDevice};
use mock_time::MockTimeProvider;
use std::sync::Arc;

/// Engine under a simulated clock and a command-logging switch. Scenario
/// tests step it second by second and assert the resulting timeline.
pub struct TestEngine {
    pub engine: Engine<MockSwitchDevice>,
    pub time: Arc<MockTimeProvider>,
    pub log: Arc<CommandLog>,
    pub plan: Arc<ArcSwap<SchedulePlan>>,
    pub status: Arc<ArcSwap<WorkerStatus>>,
}

impl TestEngine {
    pub fn new(plan: SchedulePlan, start_ts: i64) -> Self {
        Self::with_offset(plan, start_ts, 0)
    }

    pub fn with_offset(plan: SchedulePlan, start_ts: i64, tz_offset_secs: i64) -> Self {
        let time = Arc::new(MockTimeProvider::new(start_ts));
        let (device, log) = logging_switch(time.clone());
        let commander = Arc::new(DeviceCommander::new(device, time.clone()));
        let plan = Arc::new(ArcSwap::from_pointee(plan));
        let status = Arc::new(ArcSwap::from_pointee(WorkerStatus::armed()));
        let engine = Engine::new(commander, plan.clone(), status.clone(), tz_offset_secs);
        Self { engine, time, log, plan, status }
    }

    /// Tick once at the current simulated time, then advance one second.
    pub async fn step(&mut self) {
        self.engine.tick(self.time.now()).await;
        self.time.advance_time(1).await;
    }

    /// Run `secs` one-second polls.
    pub async fn run_secs(&mut self, secs: i64) {
        for _ in 0..secs {
            self.step().await;
        }
    }
}

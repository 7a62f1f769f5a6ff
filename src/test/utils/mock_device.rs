use crate::device::interface::SwitchDevice;
use crate::error::AppError;
use crate::time::TimeProvider;
use async_trait::async_trait;
use mockall::mock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

mock! {
    #[derive(Debug)]
    pub SwitchDevice {}

    #[async_trait]
    impl SwitchDevice for SwitchDevice {
        async fn connect(&self) -> Result<(), AppError>;
        async fn turn_on(&self) -> Result<(), AppError>;
        async fn turn_off(&self) -> Result<(), AppError>;
        async fn is_on(&self) -> Result<bool, AppError>;
        fn address(&self) -> String;
        fn connected(&self) -> bool;
    }
}

/// Always-healthy switch that accepts any sequence of commands and
/// verifies whatever was last requested.
pub fn noop_switch() -> Arc<MockSwitchDevice> {
    let state = Arc::new(AtomicBool::new(false));
    let mut device = MockSwitchDevice::new();
    device.expect_connect().times(0..).returning(|| Ok(()));
    let s = state.clone();
    device.expect_turn_on().times(0..).returning(move || {
        trace!("Mocked pump ON");
        s.store(true, Ordering::SeqCst);
        Ok(())
    });
    let s = state.clone();
    device.expect_turn_off().times(0..).returning(move || {
        trace!("Mocked pump OFF");
        s.store(false, Ordering::SeqCst);
        Ok(())
    });
    let s = state.clone();
    device.expect_is_on().times(0..).returning(move || Ok(s.load(Ordering::SeqCst)));
    device.expect_address().return_const("mock-pump".to_owned());
    device.expect_connected().times(0..).return_const(true);
    Arc::new(device)
}

/// Every command the device accepted, with the simulated timestamp it
/// arrived at. Lets scenario tests assert exact ON/OFF timelines.
pub struct CommandLog {
    pub entries: Mutex<Vec<(&'static str, i64)>>,
}

impl CommandLog {
    pub fn last(&self) -> Option<&'static str> {
        self.entries.lock().unwrap().last().map(|(c, _)| *c)
    }

    pub fn times_of(&self, command: &str) -> Vec<i64> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == command)
            .map(|(_, ts)| *ts)
            .collect()
    }

    /// Collapses consecutive repeats of the same command, keeping the
    /// first timestamp of each run. Reconciliation OFFs while already off
    /// stay visible as separate entries because the timestamps differ.
    pub fn timeline(&self) -> Vec<(&'static str, i64)> {
        self.entries.lock().unwrap().clone()
    }
}

/// Healthy switch wired to a [`CommandLog`]; commands are stamped with the
/// provided clock.
pub fn logging_switch(time: Arc<dyn TimeProvider>) -> (Arc<MockSwitchDevice>, Arc<CommandLog>) {
    let log = Arc::new(CommandLog { entries: Mutex::new(vec![]) });
    let state = Arc::new(AtomicBool::new(false));

    let mut device = MockSwitchDevice::new();
    device.expect_connect().times(0..).returning(|| Ok(()));
    let (l, s, t) = (log.clone(), state.clone(), time.clone());
    device.expect_turn_on().times(0..).returning(move || {
        l.entries.lock().unwrap().push(("on", t.now()));
        s.store(true, Ordering::SeqCst);
        Ok(())
    });
    let (l, s, t) = (log.clone(), state.clone(), time);
    device.expect_turn_off().times(0..).returning(move || {
        l.entries.lock().unwrap().push(("off", t.now()));
        s.store(false, Ordering::SeqCst);
        Ok(())
    });
    let s = state.clone();
    device.expect_is_on().times(0..).returning(move || Ok(s.load(Ordering::SeqCst)));
    device.expect_address().return_const("mock-pump".to_owned());
    device.expect_connected().times(0..).return_const(true);
    (Arc::new(device), log)
}

use super::adaptive::{synthesize, validate_plan, ValidationReport};
use super::ds::Bounds;
use super::interval::{build_interval_plan, ActiveWindow};
use super::scheduler::{Scheduler, StrategyKind};
use super::time_of_day::build_time_of_day_plan;
use super::worker::AdaptiveShared;
use crate::config::{Config, DeviceEntry};
use crate::device::{controller::DeviceCommander, interface::SwitchDevice};
use crate::environment::{daylight::resolve_postcode, weather::WeatherFeed, EnvironmentalService};
use crate::error::AppError;
use crate::time::TimeProvider;
use std::sync::Arc;
use tracing::info;

/// The device the growing system drives.
pub fn primary_device(config: &Config) -> Result<&DeviceEntry, AppError> {
    config
        .devices
        .devices
        .iter()
        .find(|d| d.device_id == config.growing_system.primary_device_id)
        .ok_or_else(|| {
            AppError::config(format!(
                "primary device '{}' is not configured",
                config.growing_system.primary_device_id
            ))
        })
}

/// Select and wire a strategy from validated configuration. Every fallible
/// step happens before anything is spawned; a failure constructs nothing.
pub fn build_scheduler<D: SwitchDevice + 'static, F: WeatherFeed + 'static>(
    config: &Config,
    device: Arc<D>,
    feed: F,
    time: Arc<dyn TimeProvider>,
) -> Result<Scheduler<D, F>, AppError> {
    let schedule = &config.schedule;
    let adaptation = &schedule.adaptation;

    let commander = Arc::new(DeviceCommander::new(device, time.clone()));
    let env = Arc::new(EnvironmentalService::new(adaptation, feed, time.clone())?);
    let tz_offset_secs = env.tz_offset_secs();

    match schedule.schedule_type.as_str() {
        "interval" => {
            let window =
                schedule.active_hours.as_ref().map(ActiveWindow::from_config).transpose()?;
            let plan = build_interval_plan(
                schedule.flood_minutes,
                schedule.drain_minutes,
                schedule.interval_minutes,
                window,
            )?;
            info!("Built interval scheduler");
            Ok(Scheduler::new(
                StrategyKind::Interval,
                commander,
                Some(env),
                plan,
                None,
                ValidationReport::default(),
                time,
                tz_offset_secs,
            ))
        }
        "time_based" if adaptation.adaptive.enabled => {
            // An unresolvable location is fatal here: the synthesized plan
            // is the only plan an adaptive scheduler has.
            resolve_postcode(&adaptation.location.postcode)?;
            let daylight = env.daylight_for(time.now()).ok_or_else(|| {
                AppError::LocationUnknown(adaptation.location.postcode.clone())
            })?;
            let sample = env.sample();
            let plan =
                synthesize(&adaptation.adaptive, &adaptation.daylight, &daylight, &sample)?;
            let report = validate_plan(&plan, None);
            info!("Built adaptive scheduler with {} synthesized cycles", plan.len());
            Ok(Scheduler::new(
                StrategyKind::Adaptive,
                commander,
                Some(env),
                plan,
                Some(AdaptiveShared {
                    cfg: adaptation.adaptive.clone(),
                    adaptor: adaptation.daylight.clone(),
                    generation: 0,
                }),
                report,
                time,
                tz_offset_secs,
            ))
        }
        "time_based" => {
            let plan = build_time_of_day_plan(
                schedule.flood_minutes,
                &schedule.cycles,
                &Bounds::default(),
            )?;
            info!("Built time-of-day scheduler");
            Ok(Scheduler::new(
                StrategyKind::TimeOfDay,
                commander,
                Some(env),
                plan,
                None,
                ValidationReport::default(),
                time,
                tz_offset_secs,
            ))
        }
        "nft" => Err(AppError::NotImplemented("nft scheduling strategy".to_owned())),
        other => Err(AppError::config(format!("schedule.type '{}' is unknown", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::weather::MeteoFeed;
    use crate::test::utils::{mock_device::noop_switch, mock_time::MockTimeProvider};

    fn load(toml: &str) -> Config {
        Config::load_from_str(toml).unwrap()
    }

    fn build(config: &Config) -> Result<Scheduler<crate::test::utils::mock_device::MockSwitchDevice, MeteoFeed>, AppError> {
        build_scheduler(
            config,
            noop_switch(),
            MeteoFeed::new().unwrap(),
            Arc::new(MockTimeProvider::new(1_750_000_000)),
        )
    }

    #[test]
    fn interval_config_builds_interval_scheduler() {
        let config = load(crate::config::tests::MINIMAL_INTERVAL);
        let scheduler = build(&config).unwrap();
        assert_eq!(scheduler.kind(), StrategyKind::Interval);
        assert_eq!(scheduler.installed_plan().len(), 360);
    }

    #[test]
    fn nft_strategy_is_not_implemented() {
        let mut config = load(crate::config::tests::MINIMAL_INTERVAL);
        config.schedule.schedule_type = "nft".to_owned();
        let err = build(&config).unwrap_err();
        assert!(matches!(err, AppError::NotImplemented(_)));
    }

    #[test]
    fn adaptive_config_synthesizes_initial_plan() {
        let toml = r#"
            [[devices.devices]]
            device_id = "pump"
            name = "p"
            address = "a"

            [growing_system]
            type = "flood_drain"
            primary_device_id = "pump"

            [schedule]
            type = "time_based"
            flood_minutes = 2.0

            [schedule.adaptation]
            enabled = true

            [schedule.adaptation.location]
            postcode = "3731"
            timezone = "+02:00"

            [schedule.adaptation.adaptive]
            enabled = true
        "#;
        let config = load(toml);
        let scheduler = build(&config).unwrap();
        assert_eq!(scheduler.kind(), StrategyKind::Adaptive);
        assert!(scheduler.installed_plan().len() > 10);
    }

    #[test]
    fn adaptive_with_unknown_postcode_fails_construction() {
        let toml = r#"
            [[devices.devices]]
            device_id = "pump"
            name = "p"
            address = "a"

            [growing_system]
            type = "flood_drain"
            primary_device_id = "pump"

            [schedule]
            type = "time_based"
            flood_minutes = 2.0

            [schedule.adaptation]
            enabled = true

            [schedule.adaptation.location]
            postcode = "0000"

            [schedule.adaptation.adaptive]
            enabled = true
        "#;
        let config = load(toml);
        let err = build(&config).unwrap_err();
        assert!(matches!(err, AppError::LocationUnknown(_)));
    }

    #[test]
    fn primary_device_lookup() {
        let config = load(crate::config::tests::MINIMAL_INTERVAL);
        assert_eq!(primary_device(&config).unwrap().device_id, "pump");
    }
}

use crate::config::Config;

/// Config builders for tests; each returns a validated configuration.
pub fn interval_config(flood: f64, drain: f64, interval: f64) -> Config {
    let toml = format!(
        r#"
        [[devices.devices]]
        device_id = "pump"
        name = "Tray pump"
        address = "mock-pump"

        [growing_system]
        type = "flood_drain"
        primary_device_id = "pump"

        [schedule]
        type = "interval"
        flood_minutes = {flood}
        drain_minutes = {drain}
        interval_minutes = {interval}
    "#
    );
    Config::load_from_str(&toml).unwrap()
}

pub fn interval_config_with_hours(
    flood: f64,
    drain: f64,
    interval: f64,
    start: &str,
    end: &str,
) -> Config {
    let mut config = interval_config(flood, drain, interval);
    config.schedule.active_hours =
        Some(crate::config::ActiveHours { start: start.to_owned(), end: end.to_owned() });
    config
}

pub fn time_based_config(flood: f64, cycles: &[(&str, f64)]) -> Config {
    let cycle_list = cycles
        .iter()
        .map(|(on, off)| format!("{{ on_time = \"{}\", off_minutes = {} }}", on, off))
        .collect::<Vec<_>>()
        .join(", ");
    let toml = format!(
        r#"
        [[devices.devices]]
        device_id = "pump"
        name = "Tray pump"
        address = "mock-pump"

        [growing_system]
        type = "flood_drain"
        primary_device_id = "pump"

        [schedule]
        type = "time_based"
        flood_minutes = {flood}
        cycles = [{cycle_list}]
    "#
    );
    Config::load_from_str(&toml).unwrap()
}

pub fn adaptive_config(postcode: &str) -> Config {
    let toml = format!(
        r#"
        [[devices.devices]]
        device_id = "pump"
        name = "Tray pump"
        address = "mock-pump"

        [growing_system]
        type = "flood_drain"
        primary_device_id = "pump"

        [schedule]
        type = "time_based"
        flood_minutes = 2.0

        [schedule.adaptation]
        enabled = true

        [schedule.adaptation.location]
        postcode = "{postcode}"
        timezone = "+02:00"

        [schedule.adaptation.temperature]
        enabled = true
        station_id = "auto"
        update_interval_minutes = 60

        [schedule.adaptation.adaptive]
        enabled = true
    "#
    );
    Config::load_from_str(&toml).unwrap()
}

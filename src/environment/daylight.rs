use crate::error::AppError;
use chrono::{Datelike, NaiveDate};
use std::f64::consts::PI;

/// Sunrise/sunset for one local date, in seconds of the local day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DaylightInfo {
    pub date: NaiveDate,
    pub sunrise_secs: i64,
    pub sunset_secs: i64,
    pub day_length_mins: f64,
}

/// Postcode districts the calculator can resolve. The identifier is opaque
/// to callers; only the first four characters are significant.
const POSTCODE_DISTRICTS: &[(&str, f64, f64)] = &[
    ("1012", 52.372, 4.894),  // Amsterdam centrum
    ("1071", 52.358, 4.881),  // Amsterdam zuid
    ("2011", 52.381, 4.637),  // Haarlem
    ("2511", 52.078, 4.312),  // Den Haag
    ("2611", 52.011, 4.357),  // Delft
    ("3011", 51.919, 4.488),  // Rotterdam
    ("3511", 52.093, 5.110),  // Utrecht
    ("3731", 52.110, 5.180),  // De Bilt
    ("4811", 51.589, 4.775),  // Breda
    ("5038", 51.560, 5.083),  // Tilburg
    ("5611", 51.439, 5.478),  // Eindhoven
    ("6211", 50.851, 5.690),  // Maastricht
    ("6511", 51.843, 5.860),  // Nijmegen
    ("6811", 51.984, 5.910),  // Arnhem
    ("7311", 52.211, 5.969),  // Apeldoorn
    ("7511", 52.220, 6.893),  // Enschede
    ("8011", 52.512, 6.091),  // Zwolle
    ("8911", 53.200, 5.799),  // Leeuwarden
    ("9711", 53.216, 6.568),  // Groningen
    ("9726", 53.207, 6.555),  // Groningen zuid
];

pub fn resolve_postcode(postcode: &str) -> Result<(f64, f64), AppError> {
    let district = postcode.trim().get(..4).unwrap_or("");
    POSTCODE_DISTRICTS
        .iter()
        .find(|(prefix, _, _)| *prefix == district)
        .map(|(_, lat, lon)| (*lat, *lon))
        .ok_or_else(|| AppError::LocationUnknown(postcode.to_owned()))
}

/// Pure sunrise/sunset calculator for a resolved location. No I/O;
/// identical inputs always produce identical output.
#[derive(Debug, Clone, Copy)]
pub struct DaylightCalculator {
    lat_deg: f64,
    lon_deg: f64,
    tz_offset_secs: i64,
}

const ZENITH_OFFICIAL_DEG: f64 = 90.833;

impl DaylightCalculator {
    pub fn new(postcode: &str, tz_offset_secs: i64) -> Result<Self, AppError> {
        let (lat_deg, lon_deg) = resolve_postcode(postcode)?;
        Ok(Self { lat_deg, lon_deg, tz_offset_secs })
    }

    pub fn from_lat_lon(lat_deg: f64, lon_deg: f64, tz_offset_secs: i64) -> Self {
        Self { lat_deg, lon_deg, tz_offset_secs }
    }

    pub fn lat_lon(&self) -> (f64, f64) {
        (self.lat_deg, self.lon_deg)
    }

    /// NOAA solar-position approximation, accurate to a couple of minutes.
    pub fn daylight(&self, date: NaiveDate) -> DaylightInfo {
        let day_of_year = date.ordinal() as f64;
        let gamma = 2. * PI / 365. * (day_of_year - 1.);

        // Equation of time (minutes) and solar declination (radians).
        let eqtime = 229.18
            * (0.000075 + 0.001868 * gamma.cos()
                - 0.032077 * gamma.sin()
                - 0.014615 * (2. * gamma).cos()
                - 0.040849 * (2. * gamma).sin());
        let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
            - 0.006758 * (2. * gamma).cos()
            + 0.000907 * (2. * gamma).sin()
            - 0.002697 * (3. * gamma).cos()
            + 0.00148 * (3. * gamma).sin();

        let lat_rad = self.lat_deg.to_radians();
        let cos_ha = ZENITH_OFFICIAL_DEG.to_radians().cos() / (lat_rad.cos() * decl.cos())
            - lat_rad.tan() * decl.tan();
        // Polar day/night collapses to an all-day or zero-length window.
        let ha_deg = cos_ha.clamp(-1., 1.).acos().to_degrees();

        let sunrise_utc_mins = 720. - 4. * (self.lon_deg + ha_deg) - eqtime;
        let sunset_utc_mins = 720. - 4. * (self.lon_deg - ha_deg) - eqtime;

        let offset_mins = self.tz_offset_secs as f64 / 60.;
        let sunrise_secs = ((sunrise_utc_mins + offset_mins) * 60.).round() as i64;
        let sunset_secs = ((sunset_utc_mins + offset_mins) * 60.).round() as i64;

        DaylightInfo {
            date,
            sunrise_secs,
            sunset_secs,
            day_length_mins: (sunset_secs - sunrise_secs) as f64 / 60.,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn june_and_december(calc: &DaylightCalculator) -> (DaylightInfo, DaylightInfo) {
        (
            calc.daylight(NaiveDate::from_ymd_opt(2025, 6, 21).unwrap()),
            calc.daylight(NaiveDate::from_ymd_opt(2025, 12, 21).unwrap()),
        )
    }

    #[test]
    fn unknown_postcode_fails() {
        let err = DaylightCalculator::new("0000AB", 0).unwrap_err();
        assert!(matches!(err, AppError::LocationUnknown(_)));
    }

    #[test]
    fn known_postcodes_resolve_with_suffix() {
        assert!(DaylightCalculator::new("1012 AB", 7200).is_ok());
        assert!(DaylightCalculator::new("9711", 7200).is_ok());
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let calc = DaylightCalculator::new("3731", 7200).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        assert_eq!(calc.daylight(date), calc.daylight(date));
    }

    #[test]
    fn summer_days_are_longer_than_winter_days() {
        let calc = DaylightCalculator::new("3731", 7200).unwrap();
        let (june, december) = june_and_december(&calc);
        assert!(june.day_length_mins > 15. * 60.);
        assert!(december.day_length_mins < 9. * 60.);
        assert!(june.sunrise_secs < june.sunset_secs);
    }

    #[test]
    fn midsummer_sunrise_in_plausible_window() {
        // De Bilt, CEST: sunrise around 05:15, sunset around 22:00.
        let calc = DaylightCalculator::new("3731", 7200).unwrap();
        let (june, _) = june_and_december(&calc);
        assert!((4 * 3600..6 * 3600).contains(&june.sunrise_secs), "{}", june.sunrise_secs);
        assert!((21 * 3600..23 * 3600).contains(&june.sunset_secs), "{}", june.sunset_secs);
    }

    #[test]
    fn latitude_extremes_do_not_panic() {
        let calc = DaylightCalculator::from_lat_lon(78.2, 15.6, 3600); // Svalbard
        let (june, december) = june_and_december(&calc);
        assert!(june.day_length_mins >= december.day_length_mins);
        assert!(december.day_length_mins >= 0.);
    }
}

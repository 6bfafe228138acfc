/// ============================================================
///  Offline Weather Model
///
///  Deterministic stand-in for the live feed, driven only by
///  latitude, longitude and the UTC clock:
///   1. Ambient temperature – lat² mean, lagged declination, cloud-damped day cycle
///   2. Cloud cover         – climate band baseline + per-day hash
///   3. Irradiance          – clear-sky GHI attenuated by cloud cover
///   4. Sunrise / sunset    – sunrise hour angle around solar noon
///   5. Wind / humidity     – smooth diurnal curves
/// ============================================================

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use std::f64::consts::PI;

use crate::models::telemetry::{WeatherSample, WeatherSource};
use crate::services::irradiance;

const DEG: f64 = PI / 180.0;

pub fn sample(lat_deg: f64, lon_deg: f64, utc_now: DateTime<Utc>) -> WeatherSample {
    let lat_deg = lat_deg.clamp(-90.0, 90.0);
    let lon_deg = lon_deg.clamp(-180.0, 180.0);
    let doy = utc_now.ordinal() as f64;
    let ut_h = utc_now.hour() as f64 + utc_now.minute() as f64 / 60.0 + utc_now.second() as f64 / 3600.0;
    // local solar hour, 0..24
    let solar_h = (ut_h + lon_deg / 15.0).rem_euclid(24.0);

    let cloud_cover_percent = cloud_cover(lat_deg, lon_deg, doy, solar_h);
    let clear = irradiance::clear_sky_ghi(lat_deg, lon_deg, utc_now);
    let irradiance_w_m2 = irradiance::cloud_attenuated_ghi(clear, cloud_cover_percent);
    let (sunrise, sunset) = sun_times(lat_deg, lon_deg, utc_now);

    WeatherSample {
        temperature_c: ambient_temperature(lat_deg, utc_now.ordinal(), solar_h, cloud_cover_percent),
        cloud_cover_percent,
        irradiance_w_m2,
        wind_speed_m_s: 2.0 + 2.5 * (2.0 * PI * (solar_h - 15.0) / 24.0).cos().max(0.0),
        humidity_percent: (65.0 + 20.0 * (2.0 * PI * (solar_h - 5.0) / 24.0).cos()).clamp(5.0, 100.0),
        is_day: irradiance::solar_altitude_at(lat_deg, lon_deg, utc_now) > 0.0,
        sunrise,
        sunset,
        utc_offset_seconds: Some((lon_deg / 15.0).round() as i32 * 3600),
        source: WeatherSource::Fallback,
    }
}

// ─── Ambient temperature model ───────────────────────────────
/// Smooth in latitude, no climate bands:
///  - annual mean falls off with lat² from 27 °C at the equator
///  - seasonal swing grows with sin|lat| and follows the solar declination
///    about 30 days late (thermal inertia of the ground)
///  - diurnal half-range shrinks under cloud, peak at 14:30 solar time
fn ambient_temperature(lat_deg: f64, doy: u32, solar_h: f64, cloud_cover_pct: f64) -> f64 {
    let annual_mean = 27.0 - 0.0095 * lat_deg * lat_deg;
    let swing = 1.0 + 14.0 * (lat_deg.abs() * DEG).sin();

    let lagged_doy = (doy + 334) % 365 + 1;
    let decl_ratio = irradiance::solar_declination_deg(lagged_doy) / 23.45;
    let seasonal = swing * decl_ratio * lat_deg.signum();

    let half_range = 6.0 - 0.04 * cloud_cover_pct.clamp(0.0, 100.0);
    let diurnal = half_range * (2.0 * PI * (solar_h - 14.5) / 24.0).cos();

    annual_mean + seasonal + diurnal
}

// ─── Cloud cover ─────────────────────────────────────────────
/// Cloud cover in percent: a climate-band baseline that swings with the
/// season, a per-day deterministic offset and a slight afternoon build-up.
fn cloud_cover(lat_deg: f64, lon_deg: f64, doy: f64, solar_h: f64) -> f64 {
    let season_phase = if lat_deg >= 0.0 {
        (2.0 * PI * (doy - 180.0) / 365.0).cos()
    } else {
        (2.0 * PI * doy / 365.0).cos()
    };

    let abs_lat = lat_deg.abs();
    let baseline = if abs_lat < 15.0 {
        55.0 - 5.0 * season_phase // tropical, persistently humid
    } else if abs_lat < 35.0 {
        30.0 - 15.0 * season_phase // subtropical desert belt
    } else if abs_lat < 55.0 {
        45.0 - 15.0 * season_phase // temperate
    } else {
        60.0 - 10.0 * season_phase // sub-polar
    };

    // same plant, same day → same offset
    let seed = ((lat_deg * 100.0) as i64).wrapping_mul(397)
        ^ ((lon_deg * 100.0) as i64).wrapping_mul(631)
        ^ (doy as i64).wrapping_mul(1013);
    let daily = (seed.rem_euclid(1000) as f64 / 1000.0 - 0.5) * 40.0; // ±20 %

    let afternoon = if (6.0..=20.0).contains(&solar_h) {
        5.0 * (solar_h - 13.0) / 7.0
    } else {
        0.0
    };

    (baseline + daily + afternoon).clamp(0.0, 100.0)
}

// ─── Sunrise / sunset ────────────────────────────────────────
/// UTC sunrise and sunset for the UTC day of `utc_now`; `None` during polar
/// day or polar night.
fn sun_times(lat_deg: f64, lon_deg: f64, utc_now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let decl = irradiance::solar_declination_deg(utc_now.ordinal()) * DEG;
    let cos_omega0 = -(lat_deg * DEG).tan() * decl.tan();
    if !(-1.0..=1.0).contains(&cos_omega0) {
        return (None, None);
    }
    let half_day_h = cos_omega0.acos() / DEG / 15.0;
    let noon_h = irradiance::solar_noon_utc_hours(lon_deg);

    let midnight = utc_now.date_naive().and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    let at = |hours: f64| midnight.map(|m| m + Duration::seconds((hours * 3600.0).round() as i64));
    (at(noon_h - half_day_h), at(noon_h + half_day_h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn deterministic_for_same_inputs() {
        let t = Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 0).unwrap();
        let a = sample(45.07, 7.33, t);
        let b = sample(45.07, 7.33, t);
        assert_eq!(a.temperature_c, b.temperature_c);
        assert_eq!(a.cloud_cover_percent, b.cloud_cover_percent);
        assert_eq!(a.irradiance_w_m2, b.irradiance_w_m2);
        assert_eq!(a.source, WeatherSource::Fallback);
    }

    #[test]
    fn dark_at_local_midnight() {
        // Turin, ~23:30 local in summer
        let t = Utc.with_ymd_and_hms(2025, 6, 21, 22, 0, 0).unwrap();
        let w = sample(45.07, 7.33, t);
        assert!(!w.is_day);
        assert_eq!(w.irradiance_w_m2, 0.0);
    }

    #[test]
    fn bright_and_warm_at_summer_noon() {
        let t = Utc.with_ymd_and_hms(2025, 6, 21, 11, 30, 0).unwrap();
        let w = sample(45.07, 7.33, t);
        assert!(w.is_day);
        assert!(w.irradiance_w_m2 > 300.0, "GHI {:.0}", w.irradiance_w_m2);
        assert!(w.temperature_c > 15.0 && w.temperature_c < 35.0, "T {:.1}", w.temperature_c);
        assert!((0.0..=100.0).contains(&w.cloud_cover_percent));
        assert_eq!(w.utc_offset_seconds, Some(0));
    }

    #[test]
    fn sunrise_precedes_sunset_and_brackets_noon() {
        let t = Utc.with_ymd_and_hms(2025, 6, 21, 12, 0, 0).unwrap();
        let w = sample(40.0, 0.0, t);
        let (rise, set) = (w.sunrise.unwrap(), w.sunset.unwrap());
        assert!(rise < set);
        let day_len = (set - rise).num_minutes();
        // ~15 h of daylight at 40°N on the June solstice
        assert!(day_len > 14 * 60 && day_len < 16 * 60, "{} min", day_len);
    }

    #[test]
    fn seasons_flip_across_the_equator() {
        // mid-July: northern summer, southern winter
        let t = Utc.with_ymd_and_hms(2025, 7, 20, 12, 0, 0).unwrap();
        let north = ambient_temperature(45.0, t.ordinal(), 14.5, 50.0);
        let south = ambient_temperature(-45.0, t.ordinal(), 14.5, 50.0);
        assert!(north > south + 15.0, "N {:.1} S {:.1}", north, south);
        // equator barely moves with the season
        let jan = ambient_temperature(0.0, 15, 14.5, 50.0);
        let jul = ambient_temperature(0.0, 196, 14.5, 50.0);
        assert!((jan - jul).abs() < 2.1, "Jan {:.1} Jul {:.1}", jan, jul);
    }

    #[test]
    fn clouds_flatten_the_daily_cycle() {
        let clear = ambient_temperature(40.0, 172, 14.5, 0.0) - ambient_temperature(40.0, 172, 2.5, 0.0);
        let overcast = ambient_temperature(40.0, 172, 14.5, 100.0) - ambient_temperature(40.0, 172, 2.5, 100.0);
        assert!((clear - 12.0).abs() < 1e-9);
        assert!((overcast - 4.0).abs() < 1e-9);
    }

    #[test]
    fn polar_night_has_no_sunrise() {
        let t = Utc.with_ymd_and_hms(2025, 12, 21, 12, 0, 0).unwrap();
        let w = sample(80.0, 15.0, t);
        assert!(w.sunrise.is_none() && w.sunset.is_none());
        assert!(!w.is_day);
        assert_eq!(w.irradiance_w_m2, 0.0);
    }
}

/// ============================================================
///  Irradiance & Expected-Power Model
///
///  Pure, total functions; nothing here fails or does I/O.
///  Out-of-domain inputs are clamped, night is signalled by
///  sentinels (0 W/m² GHI, infinite air mass).
///
///   1. Solar geometry  – Cooper declination, fixed-UTC solar
///                        noon, hour angle, altitude
///   2. Air mass        – Kasten & Young (1989)
///   3. Clear-sky GHI   – eccentricity-corrected solar constant
///                        × Hottel beam + Liu-Jordan diffuse
///   4. Cloud cover     – linear attenuation, diffuse floor
///   5. Cell temperature – NOCT linear rise
///   6. Expected power  – P = P_nom × (G/1000) × (1 − L_temp) × (1 − L_sys)
/// ============================================================

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::f64::consts::PI;

// ─── Physical constants ──────────────────────────────────────
const SC: f64 = 1361.0; // Solar constant W/m²
const DEG: f64 = PI / 180.0;

pub const STC_IRRADIANCE_W_M2: f64 = 1000.0;
pub const REFERENCE_CELL_TEMP_C: f64 = 25.0;
pub const DEFAULT_NOCT_C: f64 = 45.0;
pub const DEFAULT_TEMP_COEFF: f64 = -0.004; // 1/°C, typical c-Si

/// Fraction of clear-sky GHI that survives full overcast (diffuse only).
const OVERCAST_FLOOR: f64 = 0.25;

/// Solar declination in degrees (Cooper 1969).
pub fn solar_declination_deg(day_of_year: u32) -> f64 {
    let n = day_of_year.clamp(1, 366) as f64;
    23.45 * (DEG * 360.0 / 365.0 * (284.0 + n)).sin()
}

/// Solar altitude above the horizon in degrees.
pub fn solar_altitude_deg(lat_deg: f64, declination_deg: f64, hour_angle_deg: f64) -> f64 {
    let lat = lat_deg.clamp(-90.0, 90.0) * DEG;
    let decl = declination_deg * DEG;
    let omega = hour_angle_deg * DEG;
    let sin_alpha = lat.sin() * decl.sin() + lat.cos() * decl.cos() * omega.cos();
    // asin is undefined outside [-1, 1]; rounding can push us just past it
    sin_alpha.clamp(-1.0, 1.0).asin() / DEG
}

/// Relative optical air mass (Kasten & Young 1989).
///
/// Returns `f64::INFINITY` once the sun is at or below the horizon; check for
/// night before feeding this into anything else.
pub fn air_mass(altitude_deg: f64) -> f64 {
    if altitude_deg <= 0.0 {
        return f64::INFINITY;
    }
    1.0 / ((altitude_deg * DEG).sin() + 0.50572 * (altitude_deg + 6.07995).powf(-1.6364))
}

/// Extraterrestrial normal irradiance corrected for orbital eccentricity.
pub fn extraterrestrial_irradiance(day_of_year: u32) -> f64 {
    let n = day_of_year.clamp(1, 366) as f64;
    SC * (1.0 + 0.033 * (DEG * 360.0 * n / 365.0).cos())
}

/// Solar noon in decimal UTC hours, from longitude alone (no equation of time).
pub fn solar_noon_utc_hours(lon_deg: f64) -> f64 {
    12.0 - lon_deg.clamp(-180.0, 180.0) / 15.0
}

/// Hour angle in degrees, negative before solar noon, within [-180, 180).
pub fn hour_angle_deg(utc_hours: f64, lon_deg: f64) -> f64 {
    (15.0 * (utc_hours - solar_noon_utc_hours(lon_deg)) + 180.0).rem_euclid(360.0) - 180.0
}

/// Solar altitude at a site for a UTC instant.
pub fn solar_altitude_at(lat_deg: f64, lon_deg: f64, utc: DateTime<Utc>) -> f64 {
    let ut_h = utc.hour() as f64 + utc.minute() as f64 / 60.0 + utc.second() as f64 / 3600.0;
    let decl = solar_declination_deg(utc.ordinal());
    solar_altitude_deg(lat_deg, decl, hour_angle_deg(ut_h, lon_deg))
}

/// Hottel (1976) climate correction factors (r0, r1, rk), chosen by latitude band.
fn hottel_climate_factors(abs_lat: f64) -> (f64, f64, f64) {
    if abs_lat < 23.5 {
        (0.95, 0.98, 1.02) // tropical
    } else if abs_lat < 66.5 {
        (0.97, 0.99, 1.02) // mid-latitude
    } else {
        (0.99, 0.99, 1.01) // sub-arctic
    }
}

/// Clear-sky global horizontal irradiance (W/m²) at sea level.
///
/// 0 exactly when the computed solar altitude is at or below the horizon,
/// strictly positive otherwise.
pub fn clear_sky_ghi(lat_deg: f64, lon_deg: f64, utc: DateTime<Utc>) -> f64 {
    let altitude = solar_altitude_at(lat_deg, lon_deg, utc);
    if altitude <= 0.0 {
        return 0.0;
    }
    let am = air_mass(altitude);
    let e0 = extraterrestrial_irradiance(utc.ordinal());

    // Hottel beam transmittance for site altitude A = 0 km
    let a_km = 0.0_f64;
    let (r0, r1, rk) = hottel_climate_factors(lat_deg.abs().min(90.0));
    let a0 = r0 * (0.4237 - 0.00821 * (6.0 - a_km).powi(2));
    let a1 = r1 * (0.5055 + 0.00595 * (6.5 - a_km).powi(2));
    let k = rk * (0.2711 + 0.01858 * (2.5 - a_km).powi(2));
    let tau_b = a0 + a1 * (-k * am).exp();

    // Liu & Jordan diffuse transmittance
    let tau_d = 0.271 - 0.294 * tau_b;

    (e0 * (altitude * DEG).sin() * (tau_b + tau_d)).max(0.0)
}

/// Attenuates clear-sky GHI by cloud cover. Full overcast keeps the diffuse floor.
pub fn cloud_attenuated_ghi(clear_sky_ghi: f64, cloud_cover_pct: f64) -> f64 {
    let cover = cloud_cover_pct.clamp(0.0, 100.0) / 100.0;
    clear_sky_ghi.max(0.0) * (1.0 - (1.0 - OVERCAST_FLOOR) * cover)
}

/// Cell temperature from the NOCT model: T_cell = T_amb + (NOCT − 20) × G / 800.
pub fn cell_temperature(ambient_c: f64, irradiance_w_m2: f64, noct_c: f64) -> f64 {
    ambient_c + (noct_c - 20.0) * (irradiance_w_m2.max(0.0) / 800.0)
}

/// Fractional power loss from cell heating, in [0, 1]. Zero at or below 25 °C.
pub fn temperature_loss_fraction(cell_temp_c: f64, temp_coeff: f64) -> f64 {
    (-temp_coeff * (cell_temp_c - REFERENCE_CELL_TEMP_C)).clamp(0.0, 1.0)
}

/// Expected DC-side power of a plant in kW, never negative.
pub fn expected_power_kw(
    capacity_kwp: f64,
    irradiance_w_m2: f64,
    cell_temp_c: f64,
    system_loss_fraction: f64,
) -> f64 {
    let temp_loss = temperature_loss_fraction(cell_temp_c, DEFAULT_TEMP_COEFF);
    let sys_loss = system_loss_fraction.clamp(0.0, 1.0);
    (capacity_kwp
        * (irradiance_w_m2.max(0.0) / STC_IRRADIANCE_W_M2)
        * (1.0 - temp_loss)
        * (1.0 - sys_loss))
        .max(0.0)
}

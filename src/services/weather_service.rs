use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::WeatherConfig;
use crate::models::telemetry::{CurrentWeatherResponse, WeatherSample, WeatherSource};
use crate::services::weather_fallback;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("weather request timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected weather payload: {0}")]
    Payload(String),
}

type CacheKey = (i64, i64);

/// Current-weather client for Open-Meteo with a short-lived cache and a
/// deterministic offline fallback. Callers always get a sample.
#[derive(Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    ttl: Duration,
    offline: Arc<AtomicBool>,
    cache: Arc<Mutex<HashMap<CacheKey, (Instant, WeatherSample)>>>,
}

impl WeatherClient {
    pub fn new(cfg: &WeatherConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: cfg.base_url.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms),
            ttl: Duration::from_secs(cfg.cache_ttl_s),
            offline: Arc::new(AtomicBool::new(cfg.offline_mode)),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Relaxed)
    }

    pub fn set_offline(&self, value: bool) {
        self.offline.store(value, Ordering::Relaxed);
    }

    /// Never fails: live sample when possible, fallback model otherwise.
    pub async fn fetch_current_weather(&self, lat: f64, lon: f64) -> WeatherSample {
        let now = Utc::now();
        if self.is_offline() {
            return weather_fallback::sample(lat, lon, now);
        }

        let key = cache_key(lat, lon);
        if let Some((at, sample)) = self.cache.lock().await.get(&key) {
            if at.elapsed() < self.ttl {
                debug!(lat, lon, "weather cache hit");
                return sample.clone();
            }
        }

        match self.fetch_live(lat, lon).await {
            Ok(sample) => {
                self.cache.lock().await.insert(key, (Instant::now(), sample.clone()));
                sample
            }
            Err(e) => {
                warn!(lat, lon, error = %e, "live weather unavailable, using offline model");
                weather_fallback::sample(lat, lon, now)
            }
        }
    }

    async fn fetch_live(&self, lat: f64, lon: f64) -> Result<WeatherSample, WeatherError> {
        let url = format!(
            "{}?latitude={}&longitude={}&current=temperature_2m,relative_humidity_2m,cloud_cover,shortwave_radiation,wind_speed_10m,is_day&daily=sunrise,sunset&timezone=auto&forecast_days=1",
            self.base_url, lat, lon
        );
        let request = async {
            let resp = self.http.get(&url).send().await?.error_for_status()?;
            resp.json::<CurrentWeatherResponse>().await
        };
        let resp = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| WeatherError::Timeout(self.timeout))??;
        to_sample(resp)
    }
}

/// Coordinates rounded to two decimals (~1 km).
fn cache_key(lat: f64, lon: f64) -> CacheKey {
    ((lat * 100.0).round() as i64, (lon * 100.0).round() as i64)
}

/// Open-Meteo local wall-clock time ("2025-06-21T05:41") to UTC.
fn local_to_utc(local: &str, utc_offset_seconds: i32) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M").ok()?;
    Some(naive.and_utc() - chrono::Duration::seconds(i64::from(utc_offset_seconds)))
}

fn to_sample(resp: CurrentWeatherResponse) -> Result<WeatherSample, WeatherError> {
    let current = resp.current;
    let temperature_c = current
        .temperature_2m
        .ok_or_else(|| WeatherError::Payload(format!("no temperature_2m at {}", current.time)))?;
    let offset = resp.utc_offset_seconds.unwrap_or(0);
    let (sunrise, sunset) = match &resp.daily {
        Some(daily) => (
            daily.sunrise.first().and_then(|s| local_to_utc(s, offset)),
            daily.sunset.first().and_then(|s| local_to_utc(s, offset)),
        ),
        None => (None, None),
    };

    Ok(WeatherSample {
        temperature_c,
        cloud_cover_percent: current.cloud_cover.unwrap_or(0.0).clamp(0.0, 100.0),
        irradiance_w_m2: current.shortwave_radiation.unwrap_or(0.0).max(0.0),
        wind_speed_m_s: current.wind_speed_10m.unwrap_or(0.0),
        humidity_percent: current.relative_humidity_2m.unwrap_or(50.0),
        is_day: current.is_day.unwrap_or(1) == 1,
        sunrise,
        sunset,
        utc_offset_seconds: resp.utc_offset_seconds,
        source: WeatherSource::Live,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::telemetry::{CurrentData, DailyData};
    use chrono::TimeZone;

    fn response(temp: Option<f64>) -> CurrentWeatherResponse {
        CurrentWeatherResponse {
            utc_offset_seconds: Some(7200),
            current: CurrentData {
                time: "2025-06-21T12:00".into(),
                temperature_2m: temp,
                relative_humidity_2m: Some(40.0),
                cloud_cover: Some(140.0),
                shortwave_radiation: Some(812.0),
                wind_speed_10m: Some(4.1),
                is_day: Some(1),
            },
            daily: Some(DailyData {
                sunrise: vec!["2025-06-21T05:41".into()],
                sunset: vec!["2025-06-21T21:17".into()],
            }),
        }
    }

    #[test]
    fn converts_local_sun_times_to_utc() {
        let sample = to_sample(response(Some(27.0))).unwrap();
        assert_eq!(sample.sunrise, Some(Utc.with_ymd_and_hms(2025, 6, 21, 3, 41, 0).unwrap()));
        assert_eq!(sample.sunset, Some(Utc.with_ymd_and_hms(2025, 6, 21, 19, 17, 0).unwrap()));
        assert_eq!(sample.cloud_cover_percent, 100.0);
        assert_eq!(sample.source, WeatherSource::Live);
    }

    #[test]
    fn missing_temperature_is_a_payload_error() {
        assert!(matches!(to_sample(response(None)), Err(WeatherError::Payload(_))));
    }

    #[test]
    fn nearby_coordinates_share_a_cache_slot() {
        assert_eq!(cache_key(45.0712, 7.3301), cache_key(45.0698, 7.3349));
        assert_ne!(cache_key(45.07, 7.33), cache_key(45.08, 7.33));
    }

    #[tokio::test]
    async fn offline_mode_skips_the_network() {
        let client = WeatherClient::new(&WeatherConfig {
            offline_mode: true,
            ..WeatherConfig::default()
        });
        let sample = client.fetch_current_weather(45.07, 7.33).await;
        assert_eq!(sample.source, WeatherSource::Fallback);
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back() {
        let client = WeatherClient::new(&WeatherConfig {
            base_url: "http://127.0.0.1:9/v1/forecast".into(),
            timeout_ms: 500,
            ..WeatherConfig::default()
        });
        let sample = client.fetch_current_weather(45.07, 7.33).await;
        assert_eq!(sample.source, WeatherSource::Fallback);
    }
}

//! Public holiday lookup.
//!
//! The client IP is geolocated to a country, then that country's public
//! holidays for the current year are fetched and reshaped to look like
//! calendar events so the web client can render them in the same grid.

use std::net::IpAddr;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HolidayConfig;
use crate::constants::HOLIDAY_COLOR;
use crate::error::{CalShareError, CalShareResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeoResponse {
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicHoliday {
    date: NaiveDate,
    local_name: Option<String>,
    name: String,
}

/// A holiday shaped like an all-day event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    pub name: String,
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    pub color: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub all_day: bool,
}

impl From<PublicHoliday> for Holiday {
    fn from(h: PublicHoliday) -> Self {
        Holiday {
            name: h.local_name.unwrap_or(h.name),
            start_at: h.date,
            end_at: h.date,
            color: HOLIDAY_COLOR.to_string(),
            kind: "holiday".to_string(),
            all_day: true,
        }
    }
}

pub struct HolidayClient {
    http: reqwest::Client,
    config: HolidayConfig,
}

impl HolidayClient {
    pub fn new(config: HolidayConfig) -> Self {
        HolidayClient {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Holidays for the country the IP resolves to, for the current year.
    pub async fn holidays_for_ip(&self, ip: Option<IpAddr>) -> CalShareResult<Vec<Holiday>> {
        let country = self.country_for_ip(ip).await?;
        self.holidays_for_country(&country, Utc::now().year()).await
    }

    /// Resolve an IP to an ISO country code. Local, private and unknown
    /// addresses, and geolocation failures, fall back to the configured
    /// default country.
    pub async fn country_for_ip(&self, ip: Option<IpAddr>) -> CalShareResult<String> {
        let Some(ip) = ip.filter(is_routable) else {
            return Ok(self.config.default_country.clone());
        };

        let url = format!("{}/{}", self.config.geo_url.trim_end_matches('/'), ip);
        let lookup = match self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
        {
            Ok(resp) => resp.json::<GeoResponse>().await,
            Err(e) => Err(e),
        };

        match lookup {
            Ok(GeoResponse {
                country_code: Some(code),
            }) if !code.is_empty() => Ok(code),
            Ok(_) => Ok(self.config.default_country.clone()),
            Err(e) => {
                tracing::warn!(%ip, error = %e, "IP geolocation failed; using default country");
                Ok(self.config.default_country.clone())
            }
        }
    }

    pub async fn holidays_for_country(&self, country: &str, year: i32) -> CalShareResult<Vec<Holiday>> {
        let url = format!(
            "{}/PublicHolidays/{}/{}",
            self.config.holiday_url.trim_end_matches('/'),
            year,
            country
        );

        let holidays = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| CalShareError::Holiday(e.to_string()))?
            .json::<Vec<PublicHoliday>>()
            .await
            .map_err(|e| CalShareError::Holiday(e.to_string()))?;

        Ok(holidays.into_iter().map(Holiday::from).collect())
    }
}

fn is_routable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}

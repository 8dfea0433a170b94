use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::config::NetworkConfig;
use crate::prayer::Coordinates;

/// Response from an IP geolocation service.
///
/// Accepts both the ipapi.co shape (`latitude`/`longitude`) and the
/// ip-api.com shape (`lat`/`lon`).
#[derive(Debug, Clone, Deserialize)]
pub struct GeoIpResponse {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon")]
    pub longitude: f64,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl GeoIpResponse {
    pub fn coordinates(&self) -> Result<Coordinates> {
        Coordinates::new(self.latitude, self.longitude)
            .context("GeoIP service returned invalid coordinates")
    }

    /// The reported IANA zone, if it is one we know.
    pub fn time_zone(&self) -> Option<Tz> {
        self.timezone.as_deref().and_then(|tz| tz.parse().ok())
    }
}

/// API client for IP-based location lookup.
#[derive(Clone, Debug)]
pub struct GeoIpClient {
    client: reqwest::Client,
    url: String,
}

impl GeoIpClient {
    /// Create a new API client with configurable timeouts.
    pub fn new(url: String, network_config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network_config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(network_config.connect_timeout_secs))
            .user_agent(concat!("salat-companion/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Look up the caller's approximate position.
    pub async fn fetch_location(&self) -> Result<GeoIpResponse> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to send request to GeoIP service")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GeoIP service returned error status: {}", status);
        }

        let data = response
            .json::<GeoIpResponse>()
            .await
            .context("Failed to parse GeoIP response")?;

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== GeoIpResponse Parsing Tests ====================

    #[test]
    fn test_parse_ipapi_shape() {
        let body = r#"{"ip": "203.0.113.7", "city": "Riyadh", "latitude": 24.7136,
            "longitude": 46.6753, "timezone": "Asia/Riyadh"}"#;
        let response: GeoIpResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.city.as_deref(), Some("Riyadh"));
        assert_eq!(response.time_zone(), Some(chrono_tz::Asia::Riyadh));
        let coords = response.coordinates().unwrap();
        assert_eq!(coords.latitude, 24.7136);
    }

    #[test]
    fn test_parse_ip_api_shape() {
        let body = r#"{"status": "success", "lat": 30.0444, "lon": 31.2357, "timezone": "Africa/Cairo"}"#;
        let response: GeoIpResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.longitude, 31.2357);
        assert!(response.city.is_none());
    }

    #[test]
    fn test_unknown_timezone_is_ignored() {
        let response = GeoIpResponse {
            latitude: 0.0,
            longitude: 0.0,
            timezone: Some("Not/AZone".to_string()),
            city: None,
        };
        assert!(response.time_zone().is_none());
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let response = GeoIpResponse {
            latitude: 123.0,
            longitude: 0.0,
            timezone: None,
            city: None,
        };
        assert!(response.coordinates().is_err());
    }

    #[test]
    fn test_missing_coordinates_fail_to_parse() {
        let body = r#"{"error": true, "reason": "RateLimited"}"#;
        assert!(serde_json::from_str::<GeoIpResponse>(body).is_err());
    }

    // ==================== Client Creation Tests ====================

    #[test]
    fn test_client_creation() {
        let config = NetworkConfig::default();
        let client = GeoIpClient::new("https://example.com/json".to_string(), &config).unwrap();
        assert_eq!(client.url(), "https://example.com/json");
    }
}

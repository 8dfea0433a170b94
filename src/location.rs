//! Position acquisition with bounded retries.

use std::future::Future;
use std::time::Duration;

use chrono_tz::Tz;

use crate::api::GeoIpClient;
use crate::error::LocationError;
use crate::prayer::Coordinates;

/// A resolved position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coordinates: Coordinates,
    /// Horizontal accuracy radius in metres, when the source reports one.
    pub accuracy_m: Option<f64>,
    /// Zone suggested by the source.
    pub timezone: Option<Tz>,
}

impl Position {
    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            coordinates,
            accuracy_m: None,
            timezone: None,
        }
    }
}

/// Source of the user's position.
pub trait LocationProvider: Send + Sync {
    fn locate(&self) -> impl Future<Output = Result<Position, LocationError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            timeout: Duration::from_secs(15),
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Ask `provider` for a position, retrying transient failures.
///
/// Permission and support failures are returned immediately; timeouts and
/// unavailability are retried up to `policy.attempts` times in total.
pub async fn locate_with_retry<P: LocationProvider>(
    provider: &P,
    policy: &RetryPolicy,
) -> Result<Position, LocationError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = match tokio::time::timeout(policy.timeout, provider.locate()).await {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout),
        };

        match result {
            Ok(position) => {
                tracing::info!(
                    attempt,
                    accuracy_m = ?position.accuracy_m,
                    "Location acquired: {}",
                    position.coordinates
                );
                return Ok(position);
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!("Location attempt {}/{} failed: {}", attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(e) => {
                tracing::error!("Unable to acquire location after {} attempt(s): {}", attempt, e);
                return Err(e);
            }
        }
    }
}

/// Coordinates entered manually or read from configuration.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation {
    position: Position,
}

impl FixedLocation {
    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            position: Position::new(coordinates),
        }
    }
}

impl LocationProvider for FixedLocation {
    async fn locate(&self) -> Result<Position, LocationError> {
        Ok(self.position)
    }
}

/// Approximate location from the public IP address.
#[derive(Debug, Clone)]
pub struct GeoIpLocator {
    client: GeoIpClient,
}

impl GeoIpLocator {
    pub fn new(client: GeoIpClient) -> Self {
        Self { client }
    }
}

impl LocationProvider for GeoIpLocator {
    async fn locate(&self) -> Result<Position, LocationError> {
        let response = self.client.fetch_location().await.map_err(|e| {
            let timed_out = e
                .chain()
                .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
                .any(reqwest::Error::is_timeout);
            if timed_out {
                LocationError::Timeout
            } else {
                LocationError::Unavailable(format!("{e:#}"))
            }
        })?;

        let coordinates = response
            .coordinates()
            .map_err(|e| LocationError::Unavailable(format!("{e:#}")))?;

        Ok(Position {
            coordinates,
            accuracy_m: None,
            timezone: response.time_zone(),
        })
    }
}

//! Error taxonomy for the prayer-time pipeline.
//!
//! Location and orientation errors are user-facing and carry retry-friendly
//! messages. Calculation errors wrap provider failures with the date and
//! coordinates they were computed for. Nothing here is fatal to the process.

use chrono::NaiveDate;
use thiserror::Error;

/// Failures while acquiring the user's position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable: {0}")]
    Unavailable(String),
    #[error("geolocation unsupported")]
    Unsupported,
    #[error("location request timed out")]
    Timeout,
}

impl LocationError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Location access denied. Please enable location services and try again."
            }
            Self::Unavailable(_) => {
                "Unable to retrieve location. Ensure location services are enabled and try again."
            }
            Self::Unsupported => {
                "Geolocation is not supported on this device. Please enter your coordinates manually."
            }
            Self::Timeout => {
                "Location request timed out. Please check your connection and try again."
            }
        }
    }
}

/// Failures of the compass heading stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrientationError {
    #[error("orientation permission denied")]
    PermissionDenied,
    #[error("orientation unsupported")]
    Unsupported,
    #[error("orientation data unavailable")]
    DataUnavailable,
}

impl OrientationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Device orientation permission denied. Please allow motion access in your settings."
            }
            Self::Unsupported => {
                "Device orientation is not supported on this device. Please use the Qibla direction value manually."
            }
            Self::DataUnavailable => {
                "Device orientation data is unavailable. Please use the Qibla direction value manually."
            }
        }
    }
}

/// Failures while computing prayer instants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculationError {
    #[error("invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
    #[error("the sun does not rise or set on {date} at this latitude")]
    NoSunriseOrSunset { date: NaiveDate },
    #[error("unknown calculation method: {0}")]
    UnknownMethod(String),
    #[error("failed to calculate prayer times for {date}: {reason}")]
    Provider { date: NaiveDate, reason: String },
}

/// Failures of the preference store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error for key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("preferences version mismatch: expected at most {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Stable tag for the error class, for callers that branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Location,
    Orientation,
    Calculation,
    Network,
    Storage,
}

/// Umbrella error surfaced to the CLI and the daemon loop.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error(transparent)]
    Orientation(#[from] OrientationError),
    #[error(transparent)]
    Calculation(#[from] CalculationError),
    #[error("network error: {0}")]
    Network(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Location(_) => ErrorKind::Location,
            Self::Orientation(_) => ErrorKind::Orientation,
            Self::Calculation(_) => ErrorKind::Calculation,
            Self::Network(_) => ErrorKind::Network,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Message suitable for a banner, with a retry affordance implied.
    pub fn user_message(&self) -> String {
        match self {
            Self::Location(e) => e.user_message().to_string(),
            Self::Orientation(e) => e.user_message().to_string(),
            Self::Calculation(e) => format!("Failed to calculate prayer times: {e}"),
            Self::Network(_) => "Could not reach the network. Please try again.".to_string(),
            Self::Storage(_) => "Could not read or save your preferences.".to_string(),
        }
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::CalculationError;

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Validate and build coordinates. Rejects NaN and out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CalculationError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        if !valid {
            return Err(CalculationError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lat {:.4}, Lon {:.4}", self.latitude, self.longitude)
    }
}

/// Astronomical parameter set used to derive Fajr and Isha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CalculationMethod {
    #[default]
    UmmAlQura,
    MuslimWorldLeague,
    Egyptian,
}

/// How Isha is derived for a method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IshaRule {
    /// Sun depression angle below the horizon, in degrees.
    Angle(f64),
    /// Fixed number of minutes after Maghrib.
    MinutesAfterMaghrib(i64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodParameters {
    pub fajr_angle: f64,
    pub isha: IshaRule,
}

impl CalculationMethod {
    pub const ALL: [CalculationMethod; 3] = [
        CalculationMethod::UmmAlQura,
        CalculationMethod::MuslimWorldLeague,
        CalculationMethod::Egyptian,
    ];

    pub fn parameters(self) -> MethodParameters {
        match self {
            Self::UmmAlQura => MethodParameters {
                fajr_angle: 18.5,
                isha: IshaRule::MinutesAfterMaghrib(90),
            },
            Self::MuslimWorldLeague => MethodParameters {
                fajr_angle: 18.0,
                isha: IshaRule::Angle(17.0),
            },
            Self::Egyptian => MethodParameters {
                fajr_angle: 19.5,
                isha: IshaRule::Angle(17.5),
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UmmAlQura => "UmmAlQura",
            Self::MuslimWorldLeague => "MuslimWorldLeague",
            Self::Egyptian => "Egyptian",
        }
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalculationMethod {
    type Err = CalculationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "ummalqura" => Ok(Self::UmmAlQura),
            "muslimworldleague" | "mwl" => Ok(Self::MuslimWorldLeague),
            "egyptian" | "egypt" => Ok(Self::Egyptian),
            _ => Err(CalculationError::UnknownMethod(s.to_string())),
        }
    }
}

/// Juristic school used for the Asr shadow length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AsrMadhab {
    #[default]
    Shafi,
    Hanafi,
}

impl AsrMadhab {
    pub fn shadow_factor(self) -> f64 {
        match self {
            Self::Shafi => 1.0,
            Self::Hanafi => 2.0,
        }
    }
}

/// The six daily markers, in fixed daily order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prayer {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl Prayer {
    pub const ALL: [Prayer; 6] = [
        Prayer::Fajr,
        Prayer::Sunrise,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghrib,
        Prayer::Isha,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fajr => "fajr",
            Self::Sunrise => "sunrise",
            Self::Dhuhr => "dhuhr",
            Self::Asr => "asr",
            Self::Maghrib => "maghrib",
            Self::Isha => "isha",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Fajr => "Fajr",
            Self::Sunrise => "Sunrise",
            Self::Dhuhr => "Dhuhr",
            Self::Asr => "Asr",
            Self::Maghrib => "Maghrib",
            Self::Isha => "Isha",
        }
    }
}

impl fmt::Display for Prayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Prayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Prayer::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown prayer: {s}"))
    }
}

/// The six prayer instants for one calendar day at one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerTimes {
    pub date: NaiveDate,
    pub fajr: DateTime<Utc>,
    pub sunrise: DateTime<Utc>,
    pub dhuhr: DateTime<Utc>,
    pub asr: DateTime<Utc>,
    pub maghrib: DateTime<Utc>,
    pub isha: DateTime<Utc>,
}

impl PrayerTimes {
    pub fn get(&self, prayer: Prayer) -> DateTime<Utc> {
        match prayer {
            Prayer::Fajr => self.fajr,
            Prayer::Sunrise => self.sunrise,
            Prayer::Dhuhr => self.dhuhr,
            Prayer::Asr => self.asr,
            Prayer::Maghrib => self.maghrib,
            Prayer::Isha => self.isha,
        }
    }

    /// Instants in fixed daily order.
    pub fn iter(&self) -> impl Iterator<Item = (Prayer, DateTime<Utc>)> + '_ {
        Prayer::ALL.into_iter().map(move |p| (p, self.get(p)))
    }

    /// Render every instant as `HH:MM` in the given zone.
    pub fn formatted(&self, tz: Tz) -> Vec<(Prayer, String)> {
        self.iter()
            .map(|(p, t)| (p, t.with_timezone(&tz).format("%H:%M").to_string()))
            .collect()
    }
}

/// Inputs for one provider call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimesRequest {
    pub coordinates: Coordinates,
    pub method: CalculationMethod,
    pub madhab: AsrMadhab,
    pub date: NaiveDate,
}

/// Source of daily prayer instants.
///
/// Implementations must be pure: identical requests yield identical times.
pub trait PrayerTimesProvider: Send + Sync {
    fn prayer_times(&self, request: &TimesRequest) -> Result<PrayerTimes, CalculationError>;
}

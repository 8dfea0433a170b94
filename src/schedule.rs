use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::CalculationError;
use crate::prayer::{AsrMadhab, CalculationMethod, Coordinates, Prayer, PrayerTimes, PrayerTimesProvider, TimesRequest};

/// The next prayer and when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpcomingPrayer {
    pub prayer: Prayer,
    pub time: DateTime<Utc>,
}

/// Which prayer is in progress and which comes next.
///
/// Before Fajr the current prayer is the previous day's Isha, so `current`
/// is always populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrentNextPrayer {
    pub current: Prayer,
    pub next: UpcomingPrayer,
}

/// Resolve current/next for `now` against today's instants.
///
/// `tomorrow` is only invoked once `now` is past Isha, to fetch the
/// following day's Fajr.
pub fn determine_current_next<F>(
    today: &PrayerTimes,
    now: DateTime<Utc>,
    tomorrow: F,
) -> Result<CurrentNextPrayer, CalculationError>
where
    F: FnOnce() -> Result<PrayerTimes, CalculationError>,
{
    let mut previous: Option<Prayer> = None;

    for (prayer, time) in today.iter() {
        if now < time {
            return Ok(CurrentNextPrayer {
                current: previous.unwrap_or(Prayer::Isha),
                next: UpcomingPrayer { prayer, time },
            });
        }
        previous = Some(prayer);
    }

    let next_day = tomorrow()?;
    Ok(CurrentNextPrayer {
        current: Prayer::Isha,
        next: UpcomingPrayer {
            prayer: Prayer::Fajr,
            time: next_day.fajr,
        },
    })
}

/// Inputs fixed for one calculation cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleSettings {
    pub coordinates: Coordinates,
    pub method: CalculationMethod,
    pub madhab: AsrMadhab,
    pub timezone: Tz,
}

/// Daily prayer schedule for one location, backed by a time provider.
#[derive(Debug, Clone)]
pub struct PrayerSchedule<P> {
    provider: P,
    settings: ScheduleSettings,
}

impl<P: PrayerTimesProvider> PrayerSchedule<P> {
    pub fn new(provider: P, settings: ScheduleSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    /// Replace the inputs; later resolutions use the new settings.
    pub fn set_settings(&mut self, settings: ScheduleSettings) {
        self.settings = settings;
    }

    /// Calendar date of `now` in the configured zone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.settings.timezone).date_naive()
    }

    pub fn times_for(&self, date: NaiveDate) -> Result<PrayerTimes, CalculationError> {
        let request = TimesRequest {
            coordinates: self.settings.coordinates,
            method: self.settings.method,
            madhab: self.settings.madhab,
            date,
        };

        self.provider.prayer_times(&request).map_err(|e| match e {
            CalculationError::Provider { .. } | CalculationError::NoSunriseOrSunset { .. } => e,
            other => CalculationError::Provider {
                date,
                reason: format!("{other} at {}", self.settings.coordinates),
            },
        })
    }

    pub fn today(&self, now: DateTime<Utc>) -> Result<PrayerTimes, CalculationError> {
        self.times_for(self.local_date(now))
    }

    pub fn tomorrow(&self, now: DateTime<Utc>) -> Result<PrayerTimes, CalculationError> {
        let date = self
            .local_date(now)
            .checked_add_days(Days::new(1))
            .ok_or_else(|| CalculationError::Provider {
                date: self.local_date(now),
                reason: "date out of range".to_string(),
            })?;
        self.times_for(date)
    }

    pub fn current_next(&self, now: DateTime<Utc>) -> Result<CurrentNextPrayer, CalculationError> {
        let today = self.today(now)?;
        let resolved = determine_current_next(&today, now, || self.tomorrow(now))?;
        tracing::debug!(
            current = %resolved.current,
            next = %resolved.next.prayer,
            at = %resolved.next.time,
            "Resolved prayer schedule"
        );
        Ok(resolved)
    }
}

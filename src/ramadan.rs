use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::prayer::PrayerTimes;

/// Length of the Ramadan window, in days.
///
/// A fixed window offset from a configured start date rather than a lunar
/// calendar computation.
pub const RAMADAN_LENGTH_DAYS: i64 = 29;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RamadanEvent {
    Suhoor,
    Iftar,
}

impl RamadanEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Suhoor => "Suhoor",
            Self::Iftar => "Iftar",
        }
    }
}

impl fmt::Display for RamadanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RamadanPhase {
    Fasting,
    PostIftar,
    PreSuhoor,
    NotRamadan,
}

impl RamadanPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fasting => "Fasting",
            Self::PostIftar => "Post-Iftar",
            Self::PreSuhoor => "Pre-Suhoor",
            Self::NotRamadan => "Not Ramadan",
        }
    }
}

impl fmt::Display for RamadanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NextEvent {
    pub event: RamadanEvent,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RamadanState {
    pub ramadan_day: Option<u32>,
    pub suhoor: Option<DateTime<Utc>>,
    pub iftar: Option<DateTime<Utc>>,
    pub current_event: RamadanPhase,
    pub next_event: Option<NextEvent>,
}

impl RamadanState {
    pub fn not_ramadan() -> Self {
        Self {
            ramadan_day: None,
            suhoor: None,
            iftar: None,
            current_event: RamadanPhase::NotRamadan,
            next_event: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ramadan_day.is_some()
    }
}

/// Ramadan window anchored at local midnight of the start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamadanCalendar {
    pub start: NaiveDate,
    pub length_days: i64,
    pub timezone: Tz,
}

impl RamadanCalendar {
    pub fn new(start: NaiveDate, timezone: Tz) -> Self {
        Self {
            start,
            length_days: RAMADAN_LENGTH_DAYS,
            timezone,
        }
    }

    pub fn with_length(mut self, length_days: i64) -> Self {
        self.length_days = length_days;
        self
    }

    /// First instant of the start date in the configured zone.
    fn start_instant(&self) -> Option<DateTime<Utc>> {
        let midnight = self.start.and_hms_opt(0, 0, 0)?;
        self.timezone
            .from_local_datetime(&midnight)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// 1-based day ordinal, or `None` outside the window.
    pub fn day_of(&self, now: DateTime<Utc>) -> Option<u32> {
        let elapsed = now - self.start_instant()?;
        let length = Duration::try_days(self.length_days)?;
        if elapsed < Duration::zero() || elapsed >= length {
            return None;
        }
        u32::try_from(elapsed.num_days() + 1).ok()
    }

    /// Derive the Ramadan state for `now`.
    ///
    /// `tomorrow` supplies the following day's Fajr for the post-Iftar
    /// Suhoor; without it, today's Fajr plus one day is used.
    pub fn state(
        &self,
        today: &PrayerTimes,
        tomorrow: Option<&PrayerTimes>,
        now: DateTime<Utc>,
    ) -> RamadanState {
        let Some(day) = self.day_of(now) else {
            return RamadanState::not_ramadan();
        };

        let suhoor = today.fajr;
        let iftar = today.maghrib;
        let next_suhoor = tomorrow
            .map(|t| t.fajr)
            .unwrap_or(suhoor + Duration::days(1));
        let day_span = Duration::hours(24);

        // First match wins.
        let (phase, next) = if suhoor <= now && now < iftar && iftar - now <= day_span {
            (RamadanPhase::Fasting, NextEvent { event: RamadanEvent::Iftar, time: iftar })
        } else if now >= iftar {
            (
                RamadanPhase::PostIftar,
                NextEvent { event: RamadanEvent::Suhoor, time: next_suhoor },
            )
        } else {
            (
                RamadanPhase::PreSuhoor,
                NextEvent { event: RamadanEvent::Suhoor, time: suhoor },
            )
        };

        RamadanState {
            ramadan_day: Some(day),
            suhoor: Some(suhoor),
            iftar: Some(iftar),
            current_event: phase,
            next_event: Some(next),
        }
    }
}

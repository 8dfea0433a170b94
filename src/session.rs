//! One place that ties the schedule, Ramadan state, countdowns and
//! reminders together for a given instant.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::countdown::countdown_string;
use crate::error::AppError;
use crate::messages::Language;
use crate::notification::{Delivery, NotificationCenter};
use crate::prayer::{PrayerTimes, PrayerTimesProvider};
use crate::ramadan::{RamadanCalendar, RamadanState};
use crate::reminder::{
    PrayerReminders, Reminder, ReminderEvent, ReminderInput, ReminderKey, ReminderScheduler,
    ReminderTimers,
};
use crate::schedule::{CurrentNextPrayer, PrayerSchedule, ScheduleSettings, determine_current_next};
use crate::store::Preferences;
use crate::traits::Clock;

/// Everything a view needs for one tick.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub now: DateTime<Utc>,
    pub timezone: Tz,
    pub times: PrayerTimes,
    pub current_next: CurrentNextPrayer,
    pub next_prayer_countdown: String,
    pub ramadan: RamadanState,
    pub next_event_countdown: String,
}

impl Snapshot {
    fn reminder_input<'a>(&'a self, reminders: &'a PrayerReminders) -> ReminderInput<'a> {
        ReminderInput {
            times: &self.times,
            ramadan_next: self.ramadan.next_event.as_ref(),
            reminders,
            timezone: self.timezone,
        }
    }
}

pub struct PrayerSession<P> {
    schedule: PrayerSchedule<P>,
    ramadan: RamadanCalendar,
    reminders: PrayerReminders,
    language: Language,
    scheduler: ReminderScheduler,
    center: NotificationCenter,
}

impl<P: PrayerTimesProvider> PrayerSession<P> {
    pub fn new(
        schedule: PrayerSchedule<P>,
        ramadan: RamadanCalendar,
        scheduler: ReminderScheduler,
        center: NotificationCenter,
    ) -> Self {
        Self {
            schedule,
            ramadan,
            reminders: PrayerReminders::default(),
            language: Language::default(),
            scheduler,
            center,
        }
    }

    pub fn with_preferences(mut self, reminders: PrayerReminders, language: Language) -> Self {
        self.reminders = reminders;
        self.language = language;
        self
    }

    pub fn settings(&self) -> &ScheduleSettings {
        self.schedule.settings()
    }

    /// Change location, method or zone. The Ramadan window follows the zone.
    pub fn set_settings(&mut self, settings: ScheduleSettings) {
        self.ramadan.timezone = settings.timezone;
        self.schedule.set_settings(settings);
    }

    /// Adopt persisted preferences. A UTC zone means none was chosen, so
    /// the zone already in use is kept.
    pub fn apply_preferences(&mut self, prefs: &Preferences) {
        let mut settings = *self.settings();
        settings.method = prefs.calculation_method;
        if prefs.timezone != chrono_tz::UTC {
            settings.timezone = prefs.timezone;
        }
        if settings != *self.settings() {
            tracing::info!(method = %settings.method, zone = %settings.timezone, "Schedule settings changed");
            self.set_settings(settings);
        }
        self.reminders = prefs.prayer_reminders;
        self.language = prefs.language;
    }

    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.schedule.local_date(now)
    }

    pub fn reminders(&self) -> &PrayerReminders {
        &self.reminders
    }

    pub fn set_reminders(&mut self, reminders: PrayerReminders) {
        self.reminders = reminders;
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn center(&self) -> &NotificationCenter {
        &self.center
    }

    pub fn center_mut(&mut self) -> &mut NotificationCenter {
        &mut self.center
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    /// Resolve the schedule and Ramadan state at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Result<Snapshot, AppError> {
        let today = self.schedule.today(now)?;
        let tomorrow = self.schedule.tomorrow(now);

        let current_next = determine_current_next(&today, now, || tomorrow.clone())?;
        let ramadan = self.ramadan.state(&today, tomorrow.as_ref().ok(), now);

        Ok(Snapshot {
            now,
            timezone: self.schedule.settings().timezone,
            times: today,
            current_next,
            next_prayer_countdown: countdown_string(Some(current_next.next.time), now),
            next_event_countdown: countdown_string(ramadan.next_event.map(|e| e.time), now),
            ramadan,
        })
    }

    /// Deliver every reminder whose lead window contains `now`, once each,
    /// and drop in-app notifications past their display timeout.
    pub fn run_reminder_pass(&mut self, now: DateTime<Utc>) -> Result<Vec<ReminderKey>, AppError> {
        let snapshot = self.snapshot(now)?;
        let input = snapshot.reminder_input(&self.reminders);
        let delivered = self
            .scheduler
            .run_pass(&input, &mut self.center, self.language, now);

        let expired = self.center.expire(now);
        if expired > 0 {
            tracing::debug!("Expired {} notification(s)", expired);
        }
        Ok(delivered)
    }

    /// Reminders whose lead window has not opened yet, for arming timers.
    pub fn upcoming_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, AppError> {
        let snapshot = self.snapshot(now)?;
        Ok(self
            .scheduler
            .upcoming(&snapshot.reminder_input(&self.reminders), now))
    }

    /// Deliver a reminder handed back by a timer. The event's switch is
    /// checked again, since it may have been turned off after arming.
    pub fn deliver_reminder(&mut self, reminder: &Reminder, now: DateTime<Utc>) -> Option<Delivery> {
        if let ReminderEvent::Prayer(prayer) = reminder.key.event {
            if !self.reminders.is_enabled(prayer) {
                tracing::debug!(%prayer, "Reminder disabled since arming");
                return None;
            }
        }
        self.scheduler
            .deliver(reminder, &mut self.center, self.language, now)
    }
}

/// Drives a session from a periodic tick: one reminder pass per tick, plus
/// one-shot timers re-armed whenever the local day or the preferences
/// change.
pub struct ReminderDaemon {
    clock: Arc<dyn Clock>,
    sink: mpsc::UnboundedSender<Reminder>,
    timers: ReminderTimers,
    prefs: Preferences,
    armed_for: Option<(NaiveDate, Preferences)>,
}

impl ReminderDaemon {
    pub fn new(clock: Arc<dyn Clock>, sink: mpsc::UnboundedSender<Reminder>, prefs: Preferences) -> Self {
        Self {
            clock,
            sink,
            timers: ReminderTimers::new(),
            prefs,
            armed_for: None,
        }
    }

    /// Preferences currently in force.
    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn timers(&self) -> &ReminderTimers {
        &self.timers
    }

    /// Run one tick. `reloaded` is `None` when the store could not be read;
    /// the last good preferences then stay in force and reminders keep
    /// flowing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn tick<P: PrayerTimesProvider>(
        &mut self,
        session: &mut PrayerSession<P>,
        reloaded: Option<Preferences>,
    ) -> Result<Vec<ReminderKey>, AppError> {
        match reloaded {
            Some(prefs) => self.prefs = prefs,
            None => tracing::warn!("Keeping last known preferences"),
        }
        session.apply_preferences(&self.prefs);

        let now = self.clock.now_utc();
        let delivered = session.run_reminder_pass(now)?;
        if !delivered.is_empty() {
            tracing::info!("Delivered {} reminder(s)", delivered.len());
        }

        let key = (session.local_date(now), self.prefs.clone());
        if self.armed_for.as_ref() != Some(&key) {
            let upcoming = session.upcoming_reminders(now)?;
            tracing::info!("Armed {} reminder timer(s)", upcoming.len());
            self.timers.arm(upcoming, self.clock.clone(), self.sink.clone());
            self.armed_for = Some(key);
        }

        Ok(delivered)
    }

    /// Deliver a reminder handed back by one of the timers.
    pub fn fired<P: PrayerTimesProvider>(
        &mut self,
        session: &mut PrayerSession<P>,
        reminder: &Reminder,
    ) -> Option<Delivery> {
        session.deliver_reminder(reminder, self.clock.now_utc())
    }

    pub fn shutdown(&mut self) {
        tracing::info!("Shutting down, cancelling {} timer(s)", self.timers.pending());
        self.timers.disarm();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, TimeZone};

    use super::*;
    use crate::astronomy::AstronomicalCalculator;
    use crate::prayer::{AsrMadhab, CalculationMethod, Coordinates, Prayer};
    use crate::ramadan::{RamadanEvent, RamadanPhase};
    use crate::reminder::LeadTimes;
    use crate::traits::{MockCapabilities, MockNotifier};

    fn riyadh() -> Tz {
        chrono_tz::Asia::Riyadh
    }

    fn session() -> (PrayerSession<AstronomicalCalculator>, MockNotifier) {
        let settings = ScheduleSettings {
            coordinates: Coordinates::new(21.4225, 39.8262).unwrap(),
            method: CalculationMethod::UmmAlQura,
            madhab: AsrMadhab::Shafi,
            timezone: riyadh(),
        };
        let notifier = MockNotifier::new();
        let center = NotificationCenter::new(
            Arc::new(notifier.clone()),
            Arc::new(MockCapabilities::default()),
            Duration::seconds(5),
        );
        let session = PrayerSession::new(
            PrayerSchedule::new(AstronomicalCalculator, settings),
            RamadanCalendar::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), riyadh()),
            ReminderScheduler::new(LeadTimes::default()),
            center,
        );
        (session, notifier)
    }

    fn local(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        riyadh()
            .with_ymd_and_hms(2025, 3, d, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_snapshot_outside_ramadan() {
        let (session, _) = session();
        let now = riyadh()
            .with_ymd_and_hms(2025, 6, 1, 13, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let snapshot = session.snapshot(now).unwrap();

        assert_eq!(snapshot.ramadan, RamadanState::not_ramadan());
        assert_eq!(snapshot.next_event_countdown, "0h 0m 0s");
        assert_eq!(snapshot.current_next.current, Prayer::Dhuhr);
        assert_ne!(snapshot.next_prayer_countdown, "0h 0m 0s");
    }

    #[test]
    fn test_snapshot_during_fast() {
        let (session, _) = session();
        let snapshot = session.snapshot(local(10, 13, 0)).unwrap();

        assert_eq!(snapshot.ramadan.ramadan_day, Some(10));
        assert_eq!(snapshot.ramadan.current_event, RamadanPhase::Fasting);
        let next = snapshot.ramadan.next_event.unwrap();
        assert_eq!(next.event, RamadanEvent::Iftar);
        assert_eq!(next.time, snapshot.times.maghrib);
    }

    #[test]
    fn test_snapshot_after_isha_counts_to_tomorrow() {
        let (session, _) = session();
        let now = local(10, 23, 0);
        let snapshot = session.snapshot(now).unwrap();

        assert_eq!(snapshot.current_next.current, Prayer::Isha);
        assert_eq!(snapshot.current_next.next.prayer, Prayer::Fajr);
        assert!(snapshot.current_next.next.time > now);
        assert_eq!(snapshot.ramadan.current_event, RamadanPhase::PostIftar);
        assert_eq!(
            snapshot.ramadan.next_event.unwrap().time,
            snapshot.current_next.next.time
        );
    }

    #[test]
    fn test_reminder_pass_delivers_once() {
        let (mut session, notifier) = session();
        let times = session.snapshot(local(10, 12, 0)).unwrap().times;
        let now = times.asr - Duration::minutes(10);

        let first = session.run_reminder_pass(now).unwrap();
        let second = session.run_reminder_pass(now + Duration::seconds(30)).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].event, ReminderEvent::Prayer(Prayer::Asr));
        assert!(second.is_empty());
        assert_eq!(notifier.notification_count(), 1);
    }

    #[test]
    fn test_iftar_and_maghrib_reminders_both_fire() {
        let (mut session, notifier) = session();
        let times = session.snapshot(local(10, 12, 0)).unwrap().times;

        let delivered = session
            .run_reminder_pass(times.maghrib - Duration::minutes(4))
            .unwrap();

        let events: Vec<_> = delivered.iter().map(|k| k.event).collect();
        assert_eq!(
            events,
            vec![
                ReminderEvent::Prayer(Prayer::Maghrib),
                ReminderEvent::Ramadan(RamadanEvent::Iftar),
            ]
        );
        assert_eq!(notifier.notification_count(), 2);
    }

    #[test]
    fn test_disabled_prayer_not_delivered_by_timer() {
        let (mut session, notifier) = session();
        let now = local(10, 12, 0);
        let upcoming = session.upcoming_reminders(now).unwrap();
        let asr = upcoming
            .iter()
            .find(|r| r.key.event == ReminderEvent::Prayer(Prayer::Asr))
            .copied()
            .unwrap();

        let mut reminders = *session.reminders();
        reminders.set(Prayer::Asr, false);
        session.set_reminders(reminders);

        assert!(session.deliver_reminder(&asr, asr.fire_at).is_none());
        assert!(!notifier.was_called());
    }

    #[test]
    fn test_arabic_reminder_text() {
        let (session, notifier) = session();
        let mut session = session.with_preferences(PrayerReminders::default(), Language::Ar);
        let times = session.snapshot(local(10, 12, 0)).unwrap().times;

        session
            .run_reminder_pass(times.isha - Duration::minutes(15))
            .unwrap();

        let (_, body) = &notifier.get_notifications()[0];
        assert!(body.contains("العشاء"));
        assert!(body.contains("١٥"));
    }

    #[test]
    fn test_apply_preferences_keeps_located_zone_for_utc() {
        let (mut session, _) = session();
        let prefs = Preferences {
            calculation_method: CalculationMethod::Egyptian,
            language: Language::Ar,
            ..Default::default()
        };

        session.apply_preferences(&prefs);

        assert_eq!(session.settings().method, CalculationMethod::Egyptian);
        assert_eq!(session.settings().timezone, riyadh());
        assert_eq!(session.language(), Language::Ar);
    }

    #[test]
    fn test_settings_change_moves_ramadan_zone() {
        let (mut session, _) = session();
        let mut settings = *session.settings();
        settings.timezone = chrono_tz::Asia::Jakarta;
        session.set_settings(settings);

        // 23:30 UTC Feb 28 is 06:30 Mar 1 in Jakarta
        let now = Utc.with_ymd_and_hms(2025, 2, 28, 23, 30, 0).unwrap();
        assert_eq!(session.snapshot(now).unwrap().ramadan.ramadan_day, Some(1));
    }
}

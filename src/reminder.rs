//! Reminder scheduling with per-event deduplication.
//!
//! A scheduling pass runs whenever an input changes (coordinates, method,
//! zone, reminder map, language) and on every daemon tick. Each event is
//! keyed by name and local date; once delivered, the key is recorded in the
//! ledger and later passes skip it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::messages::{self, Language};
use crate::notification::{Delivery, NotificationCenter};
use crate::prayer::{Prayer, PrayerTimes};
use crate::ramadan::{NextEvent, RamadanEvent};
use crate::traits::Clock;

// ==================== Reminder Map ====================

/// Per-prayer reminder switches, persisted as `{"fajr": true, ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrayerReminders {
    pub fajr: bool,
    pub sunrise: bool,
    pub dhuhr: bool,
    pub asr: bool,
    pub maghrib: bool,
    pub isha: bool,
}

impl Default for PrayerReminders {
    fn default() -> Self {
        Self {
            fajr: true,
            sunrise: false,
            dhuhr: true,
            asr: true,
            maghrib: true,
            isha: true,
        }
    }
}

impl PrayerReminders {
    fn slot(&mut self, prayer: Prayer) -> &mut bool {
        match prayer {
            Prayer::Fajr => &mut self.fajr,
            Prayer::Sunrise => &mut self.sunrise,
            Prayer::Dhuhr => &mut self.dhuhr,
            Prayer::Asr => &mut self.asr,
            Prayer::Maghrib => &mut self.maghrib,
            Prayer::Isha => &mut self.isha,
        }
    }

    pub fn is_enabled(&self, prayer: Prayer) -> bool {
        match prayer {
            Prayer::Fajr => self.fajr,
            Prayer::Sunrise => self.sunrise,
            Prayer::Dhuhr => self.dhuhr,
            Prayer::Asr => self.asr,
            Prayer::Maghrib => self.maghrib,
            Prayer::Isha => self.isha,
        }
    }

    pub fn set(&mut self, prayer: Prayer, enabled: bool) {
        *self.slot(prayer) = enabled;
    }

    /// Flip one switch and return its new value.
    pub fn toggle(&mut self, prayer: Prayer) -> bool {
        let slot = self.slot(prayer);
        *slot = !*slot;
        *slot
    }
}

// ==================== Lead Times ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadTimes {
    pub prayer: Duration,
    pub suhoor: Duration,
    pub iftar: Duration,
}

impl Default for LeadTimes {
    fn default() -> Self {
        Self {
            prayer: Duration::minutes(15),
            suhoor: Duration::minutes(15),
            iftar: Duration::minutes(5),
        }
    }
}

impl LeadTimes {
    pub fn for_event(&self, event: ReminderEvent) -> Duration {
        match event {
            ReminderEvent::Prayer(_) => self.prayer,
            ReminderEvent::Ramadan(RamadanEvent::Suhoor) => self.suhoor,
            ReminderEvent::Ramadan(RamadanEvent::Iftar) => self.iftar,
        }
    }
}

// ==================== Reminders ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderEvent {
    Prayer(Prayer),
    Ramadan(RamadanEvent),
}

/// Dedupe key: one reminder per event per local date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    pub event: ReminderEvent,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reminder {
    pub key: ReminderKey,
    pub event_time: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
}

impl Reminder {
    /// Message text, with the minutes remaining as of `now` rounded up.
    pub fn message(&self, language: Language, now: DateTime<Utc>) -> String {
        let seconds = (self.event_time - now).num_seconds().max(0);
        let minutes = (seconds + 59) / 60;
        match self.key.event {
            ReminderEvent::Prayer(p) => messages::prayer_reminder(language, p, minutes),
            ReminderEvent::Ramadan(e) => messages::ramadan_reminder(language, e, minutes),
        }
    }
}

/// Inputs for one scheduling pass.
#[derive(Debug, Clone, Copy)]
pub struct ReminderInput<'a> {
    pub times: &'a PrayerTimes,
    pub ramadan_next: Option<&'a NextEvent>,
    pub reminders: &'a PrayerReminders,
    pub timezone: Tz,
}

/// Keys already delivered.
#[derive(Debug, Clone, Default)]
pub struct ReminderLedger {
    delivered: HashSet<ReminderKey>,
}

impl ReminderLedger {
    /// Record a key; false if it was already there.
    pub fn mark(&mut self, key: ReminderKey) -> bool {
        self.delivered.insert(key)
    }

    pub fn contains(&self, key: &ReminderKey) -> bool {
        self.delivered.contains(key)
    }

    /// Forget keys for dates before `date`.
    pub fn prune_before(&mut self, date: NaiveDate) {
        self.delivered.retain(|k| k.date >= date);
    }

    pub fn len(&self) -> usize {
        self.delivered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReminderScheduler {
    lead: LeadTimes,
    ledger: ReminderLedger,
}

impl ReminderScheduler {
    pub fn new(lead: LeadTimes) -> Self {
        Self {
            lead,
            ledger: ReminderLedger::default(),
        }
    }

    pub fn lead_times(&self) -> LeadTimes {
        self.lead
    }

    pub fn ledger(&self) -> &ReminderLedger {
        &self.ledger
    }

    /// Every enabled event still ahead of `now` and not yet delivered,
    /// prayers first in daily order, then the Ramadan event.
    pub fn plan(&self, input: &ReminderInput<'_>, now: DateTime<Utc>) -> Vec<Reminder> {
        let prayers = input
            .times
            .iter()
            .filter(|(p, _)| input.reminders.is_enabled(*p))
            .map(|(p, t)| (ReminderEvent::Prayer(p), t));
        let ramadan = input
            .ramadan_next
            .map(|next| (ReminderEvent::Ramadan(next.event), next.time));

        prayers
            .chain(ramadan)
            .filter(|(_, time)| *time > now)
            .map(|(event, time)| Reminder {
                key: ReminderKey {
                    event,
                    date: time.with_timezone(&input.timezone).date_naive(),
                },
                event_time: time,
                fire_at: time - self.lead.for_event(event),
            })
            .filter(|r| !self.ledger.contains(&r.key))
            .collect()
    }

    /// Reminders whose lead window already contains `now`.
    pub fn due(&self, input: &ReminderInput<'_>, now: DateTime<Utc>) -> Vec<Reminder> {
        self.plan(input, now)
            .into_iter()
            .filter(|r| r.fire_at <= now)
            .collect()
    }

    /// Reminders whose lead window opens later; these get one-shot timers.
    pub fn upcoming(&self, input: &ReminderInput<'_>, now: DateTime<Utc>) -> Vec<Reminder> {
        self.plan(input, now)
            .into_iter()
            .filter(|r| r.fire_at > now)
            .collect()
    }

    /// Deliver one reminder unless its key was already delivered or the
    /// event has passed.
    pub fn deliver(
        &mut self,
        reminder: &Reminder,
        center: &mut NotificationCenter,
        language: Language,
        now: DateTime<Utc>,
    ) -> Option<Delivery> {
        if reminder.event_time <= now {
            tracing::debug!(?reminder.key, "Skipping reminder for past event");
            return None;
        }
        if !self.ledger.mark(reminder.key) {
            tracing::debug!(?reminder.key, "Reminder already delivered");
            return None;
        }

        let message = reminder.message(language, now);
        tracing::info!(?reminder.key, "Delivering reminder: {}", message);
        Some(center.deliver(&message, now))
    }

    /// Run one scheduling pass: deliver everything due, once.
    pub fn run_pass(
        &mut self,
        input: &ReminderInput<'_>,
        center: &mut NotificationCenter,
        language: Language,
        now: DateTime<Utc>,
    ) -> Vec<ReminderKey> {
        let today = now.with_timezone(&input.timezone).date_naive();
        if let Some(yesterday) = today.pred_opt() {
            self.ledger.prune_before(yesterday);
        }

        self.due(input, now)
            .into_iter()
            .filter_map(|r| self.deliver(&r, center, language, now).map(|_| r.key))
            .collect()
    }
}

// ==================== One-shot Timers ====================

/// One-shot timers that hand reminders back to the owner of the
/// notification center when their lead window opens.
///
/// Re-arming or dropping cancels every outstanding timer.
#[derive(Debug, Default)]
pub struct ReminderTimers {
    handles: Vec<JoinHandle<()>>,
}

impl ReminderTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(
        &mut self,
        reminders: Vec<Reminder>,
        clock: Arc<dyn Clock>,
        sink: mpsc::UnboundedSender<Reminder>,
    ) {
        self.disarm();

        let now = clock.now_utc();
        for reminder in reminders {
            let delay = (reminder.fire_at - now).to_std().unwrap_or_default();
            let sink = sink.clone();
            tracing::debug!(?reminder.key, fire_at = %reminder.fire_at, "Arming reminder");
            self.handles.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = sink.send(reminder);
            }));
        }
    }

    pub fn disarm(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    /// Timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for ReminderTimers {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::traits::{MockCapabilities, MockClock, MockNotifier};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn times() -> PrayerTimes {
        let b = base();
        PrayerTimes {
            date: b.date_naive(),
            fajr: b + Duration::hours(5),
            sunrise: b + Duration::hours(6),
            dhuhr: b + Duration::hours(12),
            asr: b + Duration::hours(15),
            maghrib: b + Duration::hours(18),
            isha: b + Duration::hours(19) + Duration::minutes(30),
        }
    }

    fn center() -> (NotificationCenter, MockNotifier) {
        let notifier = MockNotifier::new();
        let center = NotificationCenter::new(
            Arc::new(notifier.clone()),
            Arc::new(MockCapabilities::default()),
            Duration::seconds(5),
        );
        (center, notifier)
    }

    fn input<'a>(
        times: &'a PrayerTimes,
        next: Option<&'a NextEvent>,
        reminders: &'a PrayerReminders,
    ) -> ReminderInput<'a> {
        ReminderInput {
            times,
            ramadan_next: next,
            reminders,
            timezone: chrono_tz::UTC,
        }
    }

    // ==================== Reminder Map Tests ====================

    #[test]
    fn test_default_reminders_skip_sunrise() {
        let r = PrayerReminders::default();
        assert!(!r.is_enabled(Prayer::Sunrise));
        assert!(Prayer::ALL
            .into_iter()
            .filter(|p| *p != Prayer::Sunrise)
            .all(|p| r.is_enabled(p)));
    }

    #[test]
    fn test_toggle_flips_one_prayer() {
        let mut r = PrayerReminders::default();
        assert!(!r.toggle(Prayer::Asr));
        assert!(!r.is_enabled(Prayer::Asr));
        assert!(r.toggle(Prayer::Asr));
        assert!(r.is_enabled(Prayer::Dhuhr));
    }

    #[test]
    fn test_reminders_json_shape() {
        let json = serde_json::to_value(PrayerReminders::default()).unwrap();
        assert_eq!(json["fajr"], true);
        assert_eq!(json["sunrise"], false);

        // Missing keys fall back to defaults
        let partial: PrayerReminders = serde_json::from_str(r#"{"fajr": false}"#).unwrap();
        assert!(!partial.fajr);
        assert!(partial.isha);
    }

    // ==================== Planning Tests ====================

    #[test]
    fn test_due_inside_lead_window() {
        let t = times();
        let r = PrayerReminders::default();
        let scheduler = ReminderScheduler::default();

        let now = t.dhuhr - Duration::minutes(10);
        let due = scheduler.due(&input(&t, None, &r), now);

        assert_eq!(due.len(), 1);
        assert_eq!(due[0].key.event, ReminderEvent::Prayer(Prayer::Dhuhr));
    }

    #[test]
    fn test_lead_window_boundaries() {
        let t = times();
        let r = PrayerReminders::default();
        let scheduler = ReminderScheduler::default();
        let i = input(&t, None, &r);

        // Exactly 15 minutes out is inside the window
        assert_eq!(scheduler.due(&i, t.asr - Duration::minutes(15)).len(), 1);
        // 15 minutes and 1 second is outside
        assert!(scheduler.due(&i, t.asr - Duration::minutes(15) - Duration::seconds(1)).is_empty());
        // At the instant itself the event is no longer ahead
        assert!(scheduler.due(&i, t.asr).iter().all(|r| r.key.event != ReminderEvent::Prayer(Prayer::Asr)));
    }

    #[test]
    fn test_disabled_prayer_is_never_due() {
        let t = times();
        let mut r = PrayerReminders::default();
        r.set(Prayer::Maghrib, false);
        let scheduler = ReminderScheduler::default();

        let due = scheduler.due(&input(&t, None, &r), t.maghrib - Duration::minutes(5));
        assert!(due.is_empty());
    }

    #[test]
    fn test_iftar_uses_five_minute_lead() {
        let t = times();
        let r = PrayerReminders {
            maghrib: false,
            ..Default::default()
        };
        let next = NextEvent {
            event: RamadanEvent::Iftar,
            time: t.maghrib,
        };
        let scheduler = ReminderScheduler::default();
        let i = input(&t, Some(&next), &r);

        assert!(scheduler.due(&i, t.maghrib - Duration::minutes(10)).is_empty());
        let due = scheduler.due(&i, t.maghrib - Duration::minutes(5));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].key.event, ReminderEvent::Ramadan(RamadanEvent::Iftar));
    }

    #[test]
    fn test_plan_is_in_prayer_order_then_ramadan() {
        let t = times();
        let r = PrayerReminders::default();
        let next = NextEvent {
            event: RamadanEvent::Suhoor,
            time: t.fajr,
        };
        let scheduler = ReminderScheduler::default();

        let plan = scheduler.plan(&input(&t, Some(&next), &r), base());
        let events: Vec<_> = plan.iter().map(|r| r.key.event).collect();
        assert_eq!(
            events,
            vec![
                ReminderEvent::Prayer(Prayer::Fajr),
                ReminderEvent::Prayer(Prayer::Dhuhr),
                ReminderEvent::Prayer(Prayer::Asr),
                ReminderEvent::Prayer(Prayer::Maghrib),
                ReminderEvent::Prayer(Prayer::Isha),
                ReminderEvent::Ramadan(RamadanEvent::Suhoor),
            ]
        );
        assert_eq!(plan[0].fire_at, t.fajr - Duration::minutes(15));
    }

    #[test]
    fn test_key_uses_local_date_of_event() {
        let t = times();
        let r = PrayerReminders::default();
        let scheduler = ReminderScheduler::default();
        let i = ReminderInput {
            timezone: chrono_tz::Pacific::Auckland,
            ..input(&t, None, &r)
        };

        // Isha at 19:30 UTC on Mar 1 is Mar 2 in Auckland
        let plan = scheduler.plan(&i, base());
        let isha = plan
            .iter()
            .find(|r| r.key.event == ReminderEvent::Prayer(Prayer::Isha))
            .unwrap();
        assert_eq!(isha.key.date, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }

    // ==================== Dedupe Tests ====================

    #[test]
    fn test_repeated_passes_deliver_once() {
        let t = times();
        let r = PrayerReminders::default();
        let mut scheduler = ReminderScheduler::default();
        let (mut center, notifier) = center();
        let i = input(&t, None, &r);

        let now = t.fajr - Duration::minutes(12);
        let first = scheduler.run_pass(&i, &mut center, Language::En, now);
        let second = scheduler.run_pass(&i, &mut center, Language::En, now + Duration::minutes(1));
        let third = scheduler.run_pass(&i, &mut center, Language::En, now + Duration::minutes(2));

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(third.is_empty());
        assert_eq!(notifier.notification_count(), 1);
        assert_eq!(notifier.get_notifications()[0].1, "Fajr prayer in 12 minutes");
    }

    #[test]
    fn test_deliver_skips_past_event() {
        let t = times();
        let mut scheduler = ReminderScheduler::default();
        let (mut center, _) = center();
        let reminder = Reminder {
            key: ReminderKey {
                event: ReminderEvent::Prayer(Prayer::Asr),
                date: t.date,
            },
            event_time: t.asr,
            fire_at: t.asr - Duration::minutes(15),
        };

        assert!(scheduler.deliver(&reminder, &mut center, Language::En, t.asr).is_none());
        assert!(scheduler.ledger().is_empty());
        assert!(center.is_empty());
    }

    #[test]
    fn test_ledger_pruned_after_two_days() {
        let t = times();
        let r = PrayerReminders::default();
        let mut scheduler = ReminderScheduler::default();
        let (mut center, _) = center();
        let i = input(&t, None, &r);

        scheduler.run_pass(&i, &mut center, Language::En, t.fajr - Duration::minutes(1));
        assert_eq!(scheduler.ledger().len(), 1);

        // Two days later the Mar 1 entry is older than yesterday
        scheduler.run_pass(&i, &mut center, Language::En, t.fajr + Duration::days(2));
        assert!(scheduler.ledger().is_empty());
    }

    // ==================== Timer Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_timers_fire_at_lead_time() {
        let t = times();
        let r = PrayerReminders::default();
        let now = t.dhuhr - Duration::minutes(20);
        let clock = Arc::new(MockClock::new(now));
        let scheduler = ReminderScheduler::default();

        let upcoming = scheduler.upcoming(&input(&t, None, &r), now);
        assert_eq!(upcoming[0].key.event, ReminderEvent::Prayer(Prayer::Dhuhr));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = ReminderTimers::new();
        timers.arm(vec![upcoming[0]], clock, tx);

        let started = tokio::time::Instant::now();
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.key, upcoming[0].key);
        let elapsed = started.elapsed();
        assert!(elapsed >= std::time::Duration::from_secs(5 * 60));
        assert!(elapsed < std::time::Duration::from_secs(5 * 60 + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_cancels_previous_timers() {
        let t = times();
        let r = PrayerReminders::default();
        let now = base();
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new(now));
        let scheduler = ReminderScheduler::default();
        let upcoming = scheduler.upcoming(&input(&t, None, &r), now);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = ReminderTimers::new();
        timers.arm(upcoming.clone(), clock.clone(), tx.clone());
        assert_eq!(timers.pending(), upcoming.len());

        timers.arm(upcoming[..1].to_vec(), clock, tx);
        drop(timers);

        tokio::time::sleep(std::time::Duration::from_secs(24 * 3600)).await;
        assert!(rx.try_recv().is_err(), "dropped timers must not fire");
    }
}

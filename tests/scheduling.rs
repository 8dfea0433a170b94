//! Integration tests for prayer schedule and Ramadan resolution.
//!
//! Uses the built-in astronomical provider with fixed inputs, plus
//! proptest for the ordering invariants of the resolver.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use salat_companion::{
    AsrMadhab, AstronomicalCalculator, CalculationMethod, Coordinates, Prayer, PrayerSchedule,
    PrayerTimes, PrayerTimesProvider, RamadanCalendar, RamadanPhase, ScheduleSettings,
    TimesRequest, countdown_string, determine_current_next,
};

fn kaaba_request(method: CalculationMethod, date: NaiveDate) -> TimesRequest {
    TimesRequest {
        coordinates: Coordinates::new(21.4225, 39.8262).unwrap(),
        method,
        madhab: AsrMadhab::Shafi,
        date,
    }
}

fn rendered(times: &PrayerTimes) -> Vec<String> {
    times.iter().map(|(_, t)| t.to_rfc3339()).collect()
}

// ==================== Determinism ====================

#[test]
fn test_kaaba_umm_al_qura_is_deterministic() {
    let request = kaaba_request(
        CalculationMethod::UmmAlQura,
        NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
    );

    let first = AstronomicalCalculator.prayer_times(&request).unwrap();
    let second = AstronomicalCalculator.prayer_times(&request).unwrap();

    assert_eq!(rendered(&first), rendered(&second));
}

#[test]
fn test_methods_differ_only_in_twilight() {
    let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
    let uaq = AstronomicalCalculator
        .prayer_times(&kaaba_request(CalculationMethod::UmmAlQura, date))
        .unwrap();
    let egy = AstronomicalCalculator
        .prayer_times(&kaaba_request(CalculationMethod::Egyptian, date))
        .unwrap();

    assert_eq!(uaq.sunrise, egy.sunrise);
    assert_eq!(uaq.dhuhr, egy.dhuhr);
    assert_eq!(uaq.maghrib, egy.maghrib);
    // Egyptian uses a deeper Fajr angle
    assert!(egy.fajr < uaq.fajr);
    // Umm al-Qura Isha is a fixed 90 minutes after Maghrib
    assert!(((uaq.isha - uaq.maghrib) - Duration::minutes(90)).num_minutes().abs() <= 1);
}

// ==================== Resolver Invariants ====================

fn fixed_day() -> PrayerTimes {
    AstronomicalCalculator
        .prayer_times(&kaaba_request(
            CalculationMethod::UmmAlQura,
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
        ))
        .unwrap()
}

fn fixed_next_day() -> PrayerTimes {
    AstronomicalCalculator
        .prayer_times(&kaaba_request(
            CalculationMethod::UmmAlQura,
            NaiveDate::from_ymd_opt(2025, 3, 16).unwrap(),
        ))
        .unwrap()
}

proptest! {
    #[test]
    fn prop_next_is_strictly_after_now(offset_secs in 0i64..(36 * 3600)) {
        let today = fixed_day();
        let tomorrow = fixed_next_day();
        let now = today.fajr - Duration::hours(6) + Duration::seconds(offset_secs);

        let resolved = determine_current_next(&today, now, || Ok(tomorrow)).unwrap();

        prop_assert!(resolved.next.time > now);

        if now < today.fajr {
            prop_assert_eq!(resolved.current, Prayer::Isha);
            prop_assert_eq!(resolved.next.prayer, Prayer::Fajr);
        } else if now >= today.isha {
            prop_assert_eq!(resolved.current, Prayer::Isha);
            prop_assert_eq!(resolved.next.time, tomorrow.fajr);
        } else {
            // current is the immediately preceding instant
            let current_time = today.get(resolved.current);
            prop_assert!(current_time <= now);
            let after: Vec<_> = today
                .iter()
                .filter(|(_, t)| *t > current_time && *t <= now)
                .collect();
            prop_assert!(after.is_empty());
        }
    }

    #[test]
    fn prop_ramadan_outside_window_is_empty(hours_outside in 1i64..2000) {
        let tz = chrono_tz::Asia::Riyadh;
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let calendar = RamadanCalendar::new(start, tz);
        let today = fixed_day();

        let start_instant: DateTime<Utc> = tz
            .from_local_datetime(&start.and_hms_opt(0, 0, 0).unwrap())
            .unwrap()
            .with_timezone(&Utc);

        for now in [
            start_instant - Duration::hours(hours_outside),
            start_instant + Duration::days(29) + Duration::hours(hours_outside - 1),
        ] {
            let state = calendar.state(&today, None, now);
            prop_assert_eq!(state.current_event, RamadanPhase::NotRamadan);
            prop_assert!(state.ramadan_day.is_none());
            prop_assert!(state.suhoor.is_none());
            prop_assert!(state.iftar.is_none());
            prop_assert!(state.next_event.is_none());
        }
    }
}

// ==================== Ramadan Against Real Times ====================

#[test]
fn test_ramadan_first_midnight_is_pre_suhoor() {
    let tz = chrono_tz::Asia::Riyadh;
    let schedule = PrayerSchedule::new(
        AstronomicalCalculator,
        ScheduleSettings {
            coordinates: Coordinates::new(21.4225, 39.8262).unwrap(),
            method: CalculationMethod::UmmAlQura,
            madhab: AsrMadhab::Shafi,
            timezone: tz,
        },
    );
    let calendar = RamadanCalendar::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), tz);
    let now = tz
        .with_ymd_and_hms(2025, 3, 1, 0, 0, 0)
        .unwrap()
        .with_timezone(&Utc);

    let today = schedule.today(now).unwrap();
    let state = calendar.state(&today, None, now);

    assert_eq!(state.ramadan_day, Some(1));
    assert_eq!(state.current_event, RamadanPhase::PreSuhoor);
    assert_eq!(state.next_event.unwrap().time, today.fajr);
}

#[test]
fn test_polar_night_surfaces_calculation_error() {
    let schedule = PrayerSchedule::new(
        AstronomicalCalculator,
        ScheduleSettings {
            coordinates: Coordinates::new(78.2232, 15.6267).unwrap(),
            method: CalculationMethod::MuslimWorldLeague,
            madhab: AsrMadhab::Shafi,
            timezone: chrono_tz::Arctic::Longyearbyen,
        },
    );
    let now = Utc.with_ymd_and_hms(2024, 12, 21, 12, 0, 0).unwrap();

    let err = schedule.current_next(now).unwrap_err();
    assert!(err.to_string().contains("2024-12-21"), "{err}");
}

// ==================== Countdown ====================

#[test]
fn test_countdown_to_next_prayer() {
    let today = fixed_day();
    let now = today.asr - Duration::seconds(90);

    let resolved = determine_current_next(&today, now, || Ok(fixed_next_day())).unwrap();

    assert_eq!(resolved.next.prayer, Prayer::Asr);
    assert_eq!(countdown_string(Some(resolved.next.time), now), "0h 1m 30s");
    assert_eq!(countdown_string(Some(resolved.next.time), today.asr), "0h 0m 0s");
    assert_eq!(countdown_string(None, now), "0h 0m 0s");
}

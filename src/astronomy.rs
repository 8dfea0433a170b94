//! Built-in prayer time calculation from a low-precision solar model.
//!
//! Accurate to about a minute between 1950 and 2050, which is the resolution
//! prayer times are published at anyway.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::error::CalculationError;
use crate::prayer::{IshaRule, PrayerTimes, PrayerTimesProvider, TimesRequest};

/// Sun altitude at apparent sunrise/sunset (refraction + semi-diameter).
const RISE_SET_ANGLE: f64 = 0.833;

/// Initial guesses in hours, refined by one pass.
const GUESS_FAJR: f64 = 5.0;
const GUESS_SUNRISE: f64 = 6.0;
const GUESS_DHUHR: f64 = 12.0;
const GUESS_ASR: f64 = 13.0;
const GUESS_SUNSET: f64 = 18.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct AstronomicalCalculator;

impl PrayerTimesProvider for AstronomicalCalculator {
    fn prayer_times(&self, request: &TimesRequest) -> Result<PrayerTimes, CalculationError> {
        let latitude = request.coordinates.latitude;
        let longitude = request.coordinates.longitude;
        let date = request.date;
        let params = request.method.parameters();

        let jd = julian_day(date) - longitude / (15.0 * 24.0);
        let day = SolarDay { jd, latitude };

        let sunrise = day.sun_angle_time(RISE_SET_ANGLE, GUESS_SUNRISE, Direction::BeforeNoon);
        let sunset = day.sun_angle_time(RISE_SET_ANGLE, GUESS_SUNSET, Direction::AfterNoon);
        let (Some(sunrise), Some(sunset)) = (sunrise, sunset) else {
            return Err(CalculationError::NoSunriseOrSunset { date });
        };

        let dhuhr = day.mid_day(GUESS_DHUHR);
        let asr = day
            .asr_time(request.madhab.shadow_factor(), GUESS_ASR)
            .ok_or_else(|| CalculationError::Provider {
                date,
                reason: "sun never reaches the Asr shadow length".to_string(),
            })?;

        // Middle-of-the-night bound for twilight times that are missing or
        // implausibly far from sunrise/sunset.
        let night_portion = (24.0 - (sunset - sunrise)) / 2.0;

        let fajr = match day.sun_angle_time(params.fajr_angle, GUESS_FAJR, Direction::BeforeNoon) {
            Some(t) if sunrise - t <= night_portion => t,
            _ => sunrise - night_portion,
        };

        let isha = match params.isha {
            IshaRule::MinutesAfterMaghrib(minutes) => sunset + minutes as f64 / 60.0,
            IshaRule::Angle(angle) => {
                match day.sun_angle_time(angle, GUESS_SUNSET, Direction::AfterNoon) {
                    Some(t) if t - sunset <= night_portion => t,
                    _ => sunset + night_portion,
                }
            }
        };

        let to_utc = |hours: f64| instant(date, hours - longitude / 15.0);

        Ok(PrayerTimes {
            date,
            fajr: to_utc(fajr)?,
            sunrise: to_utc(sunrise)?,
            dhuhr: to_utc(dhuhr)?,
            asr: to_utc(asr)?,
            maghrib: to_utc(sunset)?,
            isha: to_utc(isha)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    BeforeNoon,
    AfterNoon,
}

/// Solar geometry for one date at one latitude. Times are local solar hours.
struct SolarDay {
    jd: f64,
    latitude: f64,
}

impl SolarDay {
    fn mid_day(&self, guess_hours: f64) -> f64 {
        let (_, eqt) = sun_position(self.jd + guess_hours / 24.0);
        fix_hour(12.0 - eqt)
    }

    /// Time at which the sun is `angle` degrees below the horizon.
    /// `None` when it never gets there on this day.
    fn sun_angle_time(&self, angle: f64, guess_hours: f64, direction: Direction) -> Option<f64> {
        let (decl, _) = sun_position(self.jd + guess_hours / 24.0);
        let cos_h = (-dsin(angle) - dsin(decl) * dsin(self.latitude))
            / (dcos(decl) * dcos(self.latitude));

        if !(-1.0..=1.0).contains(&cos_h) {
            return None;
        }

        let hour_angle = dacos(cos_h) / 15.0;
        let noon = self.mid_day(guess_hours);
        Some(match direction {
            Direction::BeforeNoon => noon - hour_angle,
            Direction::AfterNoon => noon + hour_angle,
        })
    }

    fn asr_time(&self, factor: f64, guess_hours: f64) -> Option<f64> {
        let (decl, _) = sun_position(self.jd + guess_hours / 24.0);
        let angle = -darccot(factor + dtan((self.latitude - decl).abs()));
        self.sun_angle_time(angle, guess_hours, Direction::AfterNoon)
    }
}

/// Julian day at 0h UT of the given Gregorian date.
fn julian_day(date: NaiveDate) -> f64 {
    let (mut year, mut month) = (date.year() as f64, date.month() as f64);
    let day = date.day() as f64;
    if month <= 2.0 {
        year -= 1.0;
        month += 12.0;
    }
    let a = (year / 100.0).floor();
    let b = 2.0 - a + (a / 4.0).floor();

    (365.25 * (year + 4716.0)).floor() + (30.6001 * (month + 1.0)).floor() + day + b - 1524.5
}

/// Declination (degrees) and equation of time (hours) for a Julian day.
fn sun_position(jd: f64) -> (f64, f64) {
    let d = jd - 2451545.0;
    let g = fix_angle(357.529 + 0.98560028 * d);
    let q = fix_angle(280.459 + 0.98564736 * d);
    let l = fix_angle(q + 1.915 * dsin(g) + 0.020 * dsin(2.0 * g));
    let e = 23.439 - 0.00000036 * d;

    let ra = fix_hour(datan2(dcos(e) * dsin(l), dcos(l)) / 15.0);
    let eqt = q / 15.0 - ra;
    let decl = dasin(dsin(e) * dsin(l));

    (decl, eqt)
}

/// Convert fractional UTC hours on `date` to an instant rounded to the minute.
fn instant(date: NaiveDate, utc_hours: f64) -> Result<DateTime<Utc>, CalculationError> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| CalculationError::Provider {
            date,
            reason: "date out of range".to_string(),
        })?;

    let minutes = (utc_hours * 60.0).round() as i64;
    Ok(midnight + Duration::minutes(minutes))
}

fn fix_angle(a: f64) -> f64 {
    a - 360.0 * (a / 360.0).floor()
}

fn fix_hour(h: f64) -> f64 {
    h - 24.0 * (h / 24.0).floor()
}

fn dsin(d: f64) -> f64 {
    d.to_radians().sin()
}

fn dcos(d: f64) -> f64 {
    d.to_radians().cos()
}

fn dtan(d: f64) -> f64 {
    d.to_radians().tan()
}

fn dasin(x: f64) -> f64 {
    x.asin().to_degrees()
}

fn dacos(x: f64) -> f64 {
    x.acos().to_degrees()
}

fn datan2(y: f64, x: f64) -> f64 {
    y.atan2(x).to_degrees()
}

fn darccot(x: f64) -> f64 {
    (1.0 / x).atan().to_degrees()
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;
    use chrono_tz::Tz;

    use super::*;
    use crate::prayer::{AsrMadhab, CalculationMethod, Coordinates, Prayer};

    fn request(lat: f64, lon: f64, method: CalculationMethod, y: i32, m: u32, d: u32) -> TimesRequest {
        TimesRequest {
            coordinates: Coordinates::new(lat, lon).unwrap(),
            method,
            madhab: AsrMadhab::Shafi,
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
        }
    }

    /// Minutes since local midnight for a prayer instant.
    fn local_minutes(times: &PrayerTimes, prayer: Prayer, tz: Tz) -> i64 {
        let local = times.get(prayer).with_timezone(&tz);
        (local.hour() * 60 + local.minute()) as i64
    }

    fn assert_near(actual: i64, hh: i64, mm: i64, label: &str) {
        let expected = hh * 60 + mm;
        assert!(
            (actual - expected).abs() <= 2,
            "{label}: expected ~{hh:02}:{mm:02}, got {:02}:{:02}",
            actual / 60,
            actual % 60
        );
    }

    // ==================== Julian Day Tests ====================

    #[test]
    fn test_julian_day_j2000() {
        // 2000-01-01 00:00 UT is JD 2451544.5
        let jd = julian_day(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert_eq!(jd, 2451544.5);
    }

    #[test]
    fn test_julian_day_handles_january_february() {
        let jd = julian_day(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(jd, 2460369.5);
    }

    // ==================== Known Location Tests ====================

    #[test]
    fn test_makkah_umm_al_qura() {
        let times = AstronomicalCalculator
            .prayer_times(&request(21.4225, 39.8262, CalculationMethod::UmmAlQura, 2025, 3, 1))
            .unwrap();
        let tz = chrono_tz::Asia::Riyadh;

        assert_near(local_minutes(&times, Prayer::Fajr, tz), 5, 25, "fajr");
        assert_near(local_minutes(&times, Prayer::Sunrise, tz), 6, 41, "sunrise");
        assert_near(local_minutes(&times, Prayer::Dhuhr, tz), 12, 33, "dhuhr");
        assert_near(local_minutes(&times, Prayer::Asr, tz), 15, 54, "asr");
        assert_near(local_minutes(&times, Prayer::Maghrib, tz), 18, 25, "maghrib");
        // Umm al-Qura isha is exactly 90 minutes after maghrib
        assert_eq!(times.isha - times.maghrib, Duration::minutes(90));
    }

    #[test]
    fn test_cairo_egyptian() {
        let times = AstronomicalCalculator
            .prayer_times(&request(30.0444, 31.2357, CalculationMethod::Egyptian, 2024, 1, 15))
            .unwrap();
        let tz = chrono_tz::Africa::Cairo;

        assert_near(local_minutes(&times, Prayer::Fajr, tz), 5, 21, "fajr");
        assert_near(local_minutes(&times, Prayer::Sunrise, tz), 6, 52, "sunrise");
        assert_near(local_minutes(&times, Prayer::Dhuhr, tz), 12, 4, "dhuhr");
        assert_near(local_minutes(&times, Prayer::Asr, tz), 14, 57, "asr");
        assert_near(local_minutes(&times, Prayer::Maghrib, tz), 17, 17, "maghrib");
        assert_near(local_minutes(&times, Prayer::Isha, tz), 18, 39, "isha");
    }

    #[test]
    fn test_new_york_muslim_world_league() {
        let times = AstronomicalCalculator
            .prayer_times(&request(40.7128, -74.0060, CalculationMethod::MuslimWorldLeague, 2024, 3, 15))
            .unwrap();
        let tz = chrono_tz::America::New_York;

        assert_near(local_minutes(&times, Prayer::Sunrise, tz), 7, 7, "sunrise");
        assert_near(local_minutes(&times, Prayer::Maghrib, tz), 19, 3, "maghrib");
    }

    #[test]
    fn test_eastern_longitude_fajr_falls_on_previous_utc_day() {
        // Sydney: local 03:56 on Dec 1 is Nov 30 in UTC
        let times = AstronomicalCalculator
            .prayer_times(&request(-33.8688, 151.2093, CalculationMethod::MuslimWorldLeague, 2024, 12, 1))
            .unwrap();

        assert_eq!(times.fajr.date_naive(), NaiveDate::from_ymd_opt(2024, 11, 30).unwrap());
        let local = times.fajr.with_timezone(&chrono_tz::Australia::Sydney);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
    }

    // ==================== Ordering and Edge Cases ====================

    #[test]
    fn test_instants_are_in_daily_order() {
        for method in CalculationMethod::ALL {
            let times = AstronomicalCalculator
                .prayer_times(&request(33.5, 44.4, method, 2024, 9, 10))
                .unwrap();
            let instants: Vec<_> = times.iter().map(|(_, t)| t).collect();
            assert!(instants.windows(2).all(|w| w[0] < w[1]), "{method}: {instants:?}");
        }
    }

    #[test]
    fn test_instants_are_whole_minutes() {
        let times = AstronomicalCalculator
            .prayer_times(&request(21.4225, 39.8262, CalculationMethod::UmmAlQura, 2025, 3, 1))
            .unwrap();
        for (_, t) in times.iter() {
            assert_eq!(t.second(), 0);
            assert_eq!(t.nanosecond(), 0);
        }
    }

    #[test]
    fn test_hanafi_asr_is_later() {
        let mut req = request(24.7136, 46.6753, CalculationMethod::UmmAlQura, 2024, 5, 5);
        let shafi = AstronomicalCalculator.prayer_times(&req).unwrap();
        req.madhab = AsrMadhab::Hanafi;
        let hanafi = AstronomicalCalculator.prayer_times(&req).unwrap();

        assert!(hanafi.asr > shafi.asr);
        assert_eq!(hanafi.fajr, shafi.fajr);
    }

    #[test]
    fn test_high_latitude_summer_uses_middle_of_night() {
        // London at midsummer: the sun never gets 18 degrees below the horizon
        let times = AstronomicalCalculator
            .prayer_times(&request(51.5074, -0.1278, CalculationMethod::MuslimWorldLeague, 2024, 6, 21))
            .unwrap();

        assert!(times.fajr < times.sunrise);
        assert!(times.isha > times.maghrib);
        let night = Duration::hours(24) - (times.maghrib - times.sunrise);
        let half = night / 2;
        assert!((times.sunrise - times.fajr - half).num_minutes().abs() <= 1);
        assert!((times.isha - times.maghrib - half).num_minutes().abs() <= 1);
    }

    #[test]
    fn test_polar_night_is_an_error() {
        let result = AstronomicalCalculator.prayer_times(&request(
            78.2232,
            15.6267,
            CalculationMethod::MuslimWorldLeague,
            2024,
            12,
            21,
        ));
        assert!(matches!(result, Err(CalculationError::NoSunriseOrSunset { .. })));
    }

    #[test]
    fn test_kaaba_scenario_is_deterministic() {
        let req = request(21.4225, 39.8262, CalculationMethod::UmmAlQura, 2025, 3, 10);
        let a = AstronomicalCalculator.prayer_times(&req).unwrap();
        let b = AstronomicalCalculator.prayer_times(&req).unwrap();

        let render = |t: &PrayerTimes| t.iter().map(|(_, i)| i.to_rfc3339()).collect::<Vec<_>>();
        assert_eq!(render(&a), render(&b));
    }
}

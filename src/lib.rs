//! Salat Companion Library
//!
//! Prayer-time resolution, Ramadan state, countdowns and deduplicated
//! reminders, exposed for the CLI and for testing.

pub mod api;
pub mod astronomy;
pub mod config;
pub mod countdown;
pub mod error;
pub mod location;
pub mod messages;
pub mod notification;
pub mod prayer;
pub mod qibla;
pub mod ramadan;
pub mod reminder;
pub mod schedule;
pub mod session;
pub mod store;
pub mod traits;

// Re-export commonly used types
pub use api::{GeoIpClient, GeoIpResponse};
pub use astronomy::AstronomicalCalculator;
pub use config::AppConfig;
pub use countdown::{Countdown, CountdownEvent, CountdownHandle, countdown_string, format_countdown};
pub use error::{AppError, CalculationError, ErrorKind, LocationError, OrientationError, StoreError};
pub use location::{FixedLocation, GeoIpLocator, LocationProvider, Position, RetryPolicy, locate_with_retry};
pub use messages::Language;
pub use notification::{Delivery, Notification, NotificationCenter};
pub use prayer::{AsrMadhab, CalculationMethod, Coordinates, Prayer, PrayerTimes, PrayerTimesProvider, TimesRequest};
pub use qibla::{LocationAccuracy, qibla_direction};
pub use ramadan::{NextEvent, RamadanCalendar, RamadanEvent, RamadanPhase, RamadanState};
pub use reminder::{
    LeadTimes, PrayerReminders, Reminder, ReminderEvent, ReminderInput, ReminderKey, ReminderLedger,
    ReminderScheduler, ReminderTimers,
};
pub use schedule::{CurrentNextPrayer, PrayerSchedule, ScheduleSettings, UpcomingPrayer, determine_current_next};
pub use session::{PrayerSession, ReminderDaemon, Snapshot};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, Preferences, Theme};
pub use traits::{
    Clock, CombinedNotifier, DesktopCapabilities, MockCapabilities, MockCapabilityFlags, MockClock,
    MockNotifier, NotificationCapabilities, Notifier, NtfyNotifier, PermissionState, SystemClock,
};
#[cfg(feature = "desktop")]
pub use traits::DesktopNotifier;

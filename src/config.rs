use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::location::RetryPolicy;
use crate::prayer::{AsrMadhab, CalculationMethod, Coordinates};
use crate::reminder::LeadTimes;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub location: LocationConfig,
    pub calculation: CalculationConfig,
    pub ramadan: RamadanConfig,
    pub reminders: ReminderConfig,
    pub notifications: NotificationConfig,
    pub network: NetworkConfig,
    pub refresh: RefreshConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocationConfig {
    /// Manual coordinates; when both are set, no lookup is made.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geoip_url: String,
    pub attempts: u32,
    pub timeout_secs: u64,
    pub retry_delay_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            geoip_url: "https://ipapi.co/json/".to_string(),
            attempts: 2,
            timeout_secs: 15,
            retry_delay_secs: 2,
        }
    }
}

impl LocationConfig {
    pub fn manual_coordinates(&self) -> Result<Option<Coordinates>> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Ok(Some(
                Coordinates::new(lat, lon).context("Invalid manual coordinates in configuration")?,
            )),
            (None, None) => Ok(None),
            _ => anyhow::bail!("location.latitude and location.longitude must be set together"),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts.max(1),
            timeout: Duration::from_secs(self.timeout_secs),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CalculationConfig {
    pub method: CalculationMethod,
    pub madhab: AsrMadhab,
    pub timezone: Tz,
}

impl Default for CalculationConfig {
    fn default() -> Self {
        Self {
            method: CalculationMethod::UmmAlQura,
            madhab: AsrMadhab::Shafi,
            timezone: chrono_tz::UTC,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RamadanConfig {
    pub start_date: NaiveDate,
    pub length_days: i64,
}

impl Default for RamadanConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap_or_default(),
            length_days: 29,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReminderConfig {
    pub prayer_lead_minutes: i64,
    pub suhoor_lead_minutes: i64,
    pub iftar_lead_minutes: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            prayer_lead_minutes: 15,
            suhoor_lead_minutes: 15,
            iftar_lead_minutes: 5,
        }
    }
}

/// Longest lead a reminder may have: one day.
const MAX_LEAD_MINUTES: i64 = 24 * 60;

impl ReminderConfig {
    pub fn lead_times(&self) -> Result<LeadTimes> {
        let lead = |name: &str, minutes: i64| {
            if !(0..=MAX_LEAD_MINUTES).contains(&minutes) {
                anyhow::bail!("reminders.{name} must be between 0 and {MAX_LEAD_MINUTES}, got {minutes}");
            }
            chrono::Duration::try_minutes(minutes)
                .with_context(|| format!("reminders.{name} is out of range"))
        };

        Ok(LeadTimes {
            prayer: lead("prayer_lead_minutes", self.prayer_lead_minutes)?,
            suhoor: lead("suhoor_lead_minutes", self.suhoor_lead_minutes)?,
            iftar: lead("iftar_lead_minutes", self.iftar_lead_minutes)?,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Desktop notifications via the session's notification daemon.
    pub system: bool,
    /// Freedesktop sound name played with each reminder (e.g. "message-new-instant")
    pub sound: Option<String>,
    pub icon: Option<String>,
    /// Ntfy.sh topic for phone notifications (e.g., "salat-reminders-7f3a")
    pub ntfy_topic: Option<String>,
    pub display_timeout_secs: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            system: true,
            sound: None,
            icon: None,
            ntfy_topic: None,
            display_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    pub countdown_tick_ms: u64,
    pub schedule_pass_interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            countdown_tick_ms: 1000,
            schedule_pass_interval_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    pub preferences_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured path, or `<data_dir>/salat-companion/preferences.json`.
    pub fn resolved_preferences_path(&self) -> PathBuf {
        self.preferences_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("salat-companion")
                .join("preferences.json")
        })
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("salat-companion");

        let builder = Config::builder()
            // 1. Load default values
            // Location
            .set_default("location.latitude", None::<f64>)?
            .set_default("location.longitude", None::<f64>)?
            .set_default("location.geoip_url", "https://ipapi.co/json/")?
            .set_default("location.attempts", 2)?
            .set_default("location.timeout_secs", 15)?
            .set_default("location.retry_delay_secs", 2)?
            // Calculation
            .set_default("calculation.method", "UmmAlQura")?
            .set_default("calculation.madhab", "Shafi")?
            .set_default("calculation.timezone", "UTC")?
            // Ramadan
            .set_default("ramadan.start_date", "2025-03-01")?
            .set_default("ramadan.length_days", 29)?
            // Reminders
            .set_default("reminders.prayer_lead_minutes", 15)?
            .set_default("reminders.suhoor_lead_minutes", 15)?
            .set_default("reminders.iftar_lead_minutes", 5)?
            // Notifications
            .set_default("notifications.enabled", true)?
            .set_default("notifications.system", true)?
            .set_default("notifications.sound", None::<String>)?
            .set_default("notifications.icon", None::<String>)?
            .set_default("notifications.ntfy_topic", None::<String>)?
            .set_default("notifications.display_timeout_secs", 5)?
            // Network
            .set_default("network.request_timeout_secs", 30)?
            .set_default("network.connect_timeout_secs", 10)?
            // Refresh
            .set_default("refresh.countdown_tick_ms", 1000)?
            .set_default("refresh.schedule_pass_interval_secs", 30)?
            // Storage
            .set_default("storage.preferences_path", None::<String>)?

            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))

            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))

            // 4. Load from Environment variables (SALAT__CALCULATION__METHOD=...)
            .add_source(Environment::with_prefix("SALAT").separator("__"));

        let s = builder.build()?;
        let config: Self = s.try_deserialize()?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Reject values the scheduler and timers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.refresh.countdown_tick_ms == 0 {
            anyhow::bail!("refresh.countdown_tick_ms must be greater than 0");
        }
        if self.refresh.schedule_pass_interval_secs == 0 {
            anyhow::bail!("refresh.schedule_pass_interval_secs must be greater than 0");
        }
        if !(1..=30).contains(&self.ramadan.length_days) {
            anyhow::bail!(
                "ramadan.length_days must be between 1 and 30, got {}",
                self.ramadan.length_days
            );
        }
        if !(0..=3600).contains(&self.notifications.display_timeout_secs) {
            anyhow::bail!(
                "notifications.display_timeout_secs must be between 0 and 3600, got {}",
                self.notifications.display_timeout_secs
            );
        }
        self.reminders.lead_times()?;
        self.location.manual_coordinates()?;
        Ok(())
    }
}

//! Abstractions for time and side effects to enable testing.
//!
//! This module provides traits for:
//! - `Clock`: Abstracting time access for deterministic testing
//! - `Notifier`: Abstracting system notifications, sound and vibration
//! - `NotificationCapabilities`: Querying what the host can deliver

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==================== Clock Trait ====================

/// Trait for abstracting time access.
///
/// This allows injecting mock clocks during testing to create
/// deterministic, reproducible tests for time-dependent logic.
pub trait Clock: Send + Sync {
    /// Get the current time in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for testing with controllable time.
#[derive(Debug, Clone)]
pub struct MockClock {
    utc_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock set to the given UTC time.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            utc_time: Arc::new(Mutex::new(time)),
        }
    }

    /// Set the mock clock to a new time.
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.utc_time.lock().unwrap() = time;
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.utc_time.lock().unwrap();
        *time = *time + duration;
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc_time.lock().unwrap()
    }
}

// ==================== Notifier Trait ====================

/// Trait for abstracting system notifications.
///
/// Sound and vibration default to no-ops so backends without those
/// capabilities need not implement them.
pub trait Notifier: Send + Sync {
    /// Send a notification with the given title and body.
    fn notify(&self, title: &str, body: &str) -> Result<()>;

    /// Vibrate with a pattern of on/off durations in milliseconds.
    fn vibrate(&self, _pattern: &[u64]) -> Result<()> {
        Ok(())
    }

    /// Play a named sound clip.
    fn play_sound(&self, _clip: &str) -> Result<()> {
        Ok(())
    }
}

/// Desktop notifier implementation using notify-rust.
#[cfg(feature = "desktop")]
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier {
    icon: Option<String>,
}

#[cfg(feature = "desktop")]
impl DesktopNotifier {
    pub fn new(icon: Option<String>) -> Self {
        Self { icon }
    }
}

#[cfg(feature = "desktop")]
impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        let mut notification = notify_rust::Notification::new();
        notification.summary(title).body(body).appname("Salat Companion");
        if let Some(ref icon) = self.icon {
            notification.icon(icon);
        }
        notification.show()?;
        Ok(())
    }

    fn play_sound(&self, clip: &str) -> Result<()> {
        // Freedesktop sound theme names, e.g. "message-new-instant".
        notify_rust::Notification::new()
            .appname("Salat Companion")
            .summary("")
            .sound_name(clip)
            .show()?;
        Ok(())
    }
}

/// Phone notifier posting to an ntfy.sh topic.
#[derive(Debug, Clone)]
pub struct NtfyNotifier {
    topic: String,
    base_url: String,
}

impl NtfyNotifier {
    pub fn new(topic: String) -> Self {
        Self {
            topic,
            base_url: "https://ntfy.sh".to_string(),
        }
    }

    /// Point at a self-hosted ntfy server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.topic)
    }
}

impl Notifier for NtfyNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        let url = self.url();
        let message = format!("{}\n{}", title, body);

        // Fire and forget on a plain thread; the caller may be inside a
        // runtime where blocking reqwest is not allowed.
        std::thread::spawn(move || {
            if let Ok(client) = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
            {
                if let Err(e) = client.post(&url).body(message).send() {
                    tracing::warn!("Failed to post ntfy notification: {}", e);
                }
            }
        });

        Ok(())
    }
}

/// Fans out to several notifiers; a failing backend does not stop the rest.
#[derive(Clone, Default)]
pub struct CombinedNotifier {
    backends: Vec<Arc<dyn Notifier>>,
}

impl CombinedNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, backend: Arc<dyn Notifier>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Run `f` on every backend. A failing backend is logged and skipped;
    /// returns how many failed.
    fn each(&self, channel: &str, f: impl Fn(&dyn Notifier) -> Result<()>) -> usize {
        let mut failed = 0;
        for backend in &self.backends {
            if let Err(e) = f(backend.as_ref()) {
                tracing::warn!("Notifier backend failed ({}): {}", channel, e);
                failed += 1;
            }
        }
        failed
    }
}

impl Notifier for CombinedNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        self.each("notification", |backend| backend.notify(title, body));
        Ok(())
    }

    fn vibrate(&self, pattern: &[u64]) -> Result<()> {
        self.each("vibration", |backend| backend.vibrate(pattern));
        Ok(())
    }

    fn play_sound(&self, clip: &str) -> Result<()> {
        self.each("sound", |backend| backend.play_sound(clip));
        Ok(())
    }
}

/// Mock notifier for testing that records all notifications.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    notifications: Arc<Mutex<Vec<(String, String)>>>,
    vibrations: Arc<Mutex<Vec<Vec<u64>>>>,
    sounds: Arc<Mutex<Vec<String>>>,
}

impl MockNotifier {
    /// Create a new mock notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all notifications that have been sent.
    pub fn get_notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().unwrap().clone()
    }

    /// Get the count of notifications sent.
    pub fn notification_count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    pub fn vibration_count(&self) -> usize {
        self.vibrations.lock().unwrap().len()
    }

    pub fn sounds(&self) -> Vec<String> {
        self.sounds.lock().unwrap().clone()
    }

    /// Clear all recorded notifications.
    pub fn clear(&self) {
        self.notifications.lock().unwrap().clear();
        self.vibrations.lock().unwrap().clear();
        self.sounds.lock().unwrap().clear();
    }

    /// Check if any notification was sent.
    pub fn was_called(&self) -> bool {
        !self.notifications.lock().unwrap().is_empty()
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }

    fn vibrate(&self, pattern: &[u64]) -> Result<()> {
        self.vibrations.lock().unwrap().push(pattern.to_vec());
        Ok(())
    }

    fn play_sound(&self, clip: &str) -> Result<()> {
        self.sounds.lock().unwrap().push(clip.to_string());
        Ok(())
    }
}

// ==================== Capabilities Trait ====================

/// Notification permission as last reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    #[default]
    Default,
}

/// What the host can deliver right now.
pub trait NotificationCapabilities: Send + Sync {
    fn system_notifications_supported(&self) -> bool;

    fn permission(&self) -> PermissionState;

    /// Prompt for permission where the host supports prompting.
    fn request_permission(&self) -> PermissionState;

    /// True while the app is in the foreground; system notifications are
    /// suppressed then, since the in-app banner is already visible.
    fn is_foreground(&self) -> bool;

    fn can_vibrate(&self) -> bool;

    fn can_play_sound(&self) -> bool;
}

/// Capabilities of a headless desktop daemon.
#[derive(Debug, Clone)]
pub struct DesktopCapabilities {
    system_enabled: bool,
    sound_enabled: bool,
}

impl DesktopCapabilities {
    pub fn new(system_enabled: bool, sound_enabled: bool) -> Self {
        Self {
            system_enabled,
            sound_enabled,
        }
    }
}

impl NotificationCapabilities for DesktopCapabilities {
    fn system_notifications_supported(&self) -> bool {
        cfg!(feature = "desktop") && self.system_enabled
    }

    fn permission(&self) -> PermissionState {
        if self.system_notifications_supported() {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        }
    }

    fn request_permission(&self) -> PermissionState {
        self.permission()
    }

    fn is_foreground(&self) -> bool {
        false
    }

    fn can_vibrate(&self) -> bool {
        false
    }

    fn can_play_sound(&self) -> bool {
        cfg!(feature = "desktop") && self.sound_enabled
    }
}

/// Mock capabilities with every flag settable from tests.
#[derive(Debug, Clone)]
pub struct MockCapabilities {
    inner: Arc<Mutex<MockCapabilityFlags>>,
}

#[derive(Debug, Clone)]
pub struct MockCapabilityFlags {
    pub supported: bool,
    pub permission: PermissionState,
    pub permission_on_request: PermissionState,
    pub foreground: bool,
    pub vibrate: bool,
    pub sound: bool,
}

impl Default for MockCapabilityFlags {
    fn default() -> Self {
        Self {
            supported: true,
            permission: PermissionState::Granted,
            permission_on_request: PermissionState::Granted,
            foreground: false,
            vibrate: true,
            sound: true,
        }
    }
}

impl MockCapabilities {
    pub fn new(flags: MockCapabilityFlags) -> Self {
        Self {
            inner: Arc::new(Mutex::new(flags)),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut MockCapabilityFlags)) {
        f(&mut self.inner.lock().unwrap());
    }
}

impl Default for MockCapabilities {
    fn default() -> Self {
        Self::new(MockCapabilityFlags::default())
    }
}

impl NotificationCapabilities for MockCapabilities {
    fn system_notifications_supported(&self) -> bool {
        self.inner.lock().unwrap().supported
    }

    fn permission(&self) -> PermissionState {
        self.inner.lock().unwrap().permission
    }

    fn request_permission(&self) -> PermissionState {
        let mut flags = self.inner.lock().unwrap();
        flags.permission = flags.permission_on_request;
        flags.permission
    }

    fn is_foreground(&self) -> bool {
        self.inner.lock().unwrap().foreground
    }

    fn can_vibrate(&self) -> bool {
        self.inner.lock().unwrap().vibrate
    }

    fn can_play_sound(&self) -> bool {
        self.inner.lock().unwrap().sound
    }
}

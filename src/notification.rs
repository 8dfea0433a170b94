//! In-app notification queue with best-effort system delivery.
//!
//! Every message lands in the in-app queue. System notification, sound and
//! vibration are attempted on top of that and each degrades silently when
//! the host lacks the capability.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::traits::{NotificationCapabilities, Notifier, PermissionState};

pub const DEFAULT_VIBRATION: [u64; 3] = [200, 100, 200];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub is_permission_message: bool,
    pub created_at: DateTime<Utc>,
}

/// Which channels a delivery actually reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub id: u64,
    pub system: bool,
    pub sound: bool,
    pub vibration: bool,
}

pub struct NotificationCenter {
    queue: Vec<Notification>,
    next_id: u64,
    display_timeout: Duration,
    notifier: Arc<dyn Notifier>,
    capabilities: Arc<dyn NotificationCapabilities>,
    sound_clip: Option<String>,
    icon_title: String,
}

impl NotificationCenter {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        capabilities: Arc<dyn NotificationCapabilities>,
        display_timeout: Duration,
    ) -> Self {
        Self {
            queue: Vec::new(),
            next_id: 1,
            display_timeout,
            notifier,
            capabilities,
            sound_clip: None,
            icon_title: "Salat Companion".to_string(),
        }
    }

    pub fn with_sound(mut self, clip: Option<String>) -> Self {
        self.sound_clip = clip;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.icon_title = title.into();
        self
    }

    /// Enqueue an in-app message only.
    pub fn push(&mut self, message: impl Into<String>, is_permission_message: bool, now: DateTime<Utc>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Notification {
            id,
            message: message.into(),
            is_permission_message,
            created_at: now,
        });
        id
    }

    /// Deliver a reminder on every available channel.
    pub fn deliver(&mut self, message: &str, now: DateTime<Utc>) -> Delivery {
        let id = self.push(message, false, now);
        let caps = &self.capabilities;
        let mut delivery = Delivery {
            id,
            ..Default::default()
        };

        if !caps.system_notifications_supported() {
            tracing::debug!("System notifications unsupported, in-app only");
        } else if caps.permission() != PermissionState::Granted {
            tracing::debug!("Notification permission not granted, in-app only");
        } else if caps.is_foreground() {
            tracing::debug!("App in foreground, suppressing system notification");
        } else {
            match self.notifier.notify(&self.icon_title, message) {
                Ok(()) => delivery.system = true,
                Err(e) => tracing::warn!("System notification failed: {}", e),
            }
        }

        if let Some(ref clip) = self.sound_clip {
            if caps.can_play_sound() {
                match self.notifier.play_sound(clip) {
                    Ok(()) => delivery.sound = true,
                    Err(e) => tracing::warn!("Failed to play sound {}: {}", clip, e),
                }
            }
        }

        if caps.can_vibrate() {
            match self.notifier.vibrate(&DEFAULT_VIBRATION) {
                Ok(()) => delivery.vibration = true,
                Err(e) => tracing::warn!("Vibration failed: {}", e),
            }
        }

        delivery
    }

    /// Ask the host for permission; a refusal is reported in-app.
    pub fn request_permission(&mut self, denied_message: &str, now: DateTime<Utc>) -> PermissionState {
        if !self.capabilities.system_notifications_supported() {
            self.push(denied_message, true, now);
            return PermissionState::Denied;
        }

        let state = self.capabilities.request_permission();
        if state == PermissionState::Denied {
            self.push(denied_message, true, now);
        }
        tracing::info!(?state, "Notification permission requested");
        state
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.queue.len();
        self.queue.retain(|n| n.id != id);
        self.queue.len() != before
    }

    /// Drop notifications whose display timeout has elapsed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = self.display_timeout;
        let before = self.queue.len();
        self.queue.retain(|n| now - n.created_at < timeout);
        before - self.queue.len()
    }

    pub fn active(&self) -> &[Notification] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

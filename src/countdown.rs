//! Live countdown to a target instant.
//!
//! The emitter ticks once per interval and stops after reporting expiry.
//! It never re-resolves the schedule itself; on `Expired` the caller
//! recomputes the next target and starts a new countdown.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::traits::Clock;

pub const ZERO_COUNTDOWN: &str = "0h 0m 0s";

const MIN_TICK: StdDuration = StdDuration::from_millis(1);

/// Format a remaining duration as `"{h}h {m}m {s}s"`. Negative is zero.
pub fn format_countdown(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours}h {minutes}m {seconds}s")
}

/// One-shot rendering of the countdown to `target`.
pub fn countdown_string(target: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match target {
        Some(target) => format_countdown(target - now),
        None => ZERO_COUNTDOWN.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownEvent {
    Tick(String),
    Expired,
}

/// Handle to a running countdown. Dropping it stops the ticker.
#[derive(Debug)]
pub struct CountdownHandle {
    events: mpsc::Receiver<CountdownEvent>,
    task: Option<JoinHandle<()>>,
}

impl CountdownHandle {
    /// Next event, or `None` once the countdown has finished or been cancelled.
    pub async fn recv(&mut self) -> Option<CountdownEvent> {
        self.events.recv().await
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events.close();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Spawns countdown tickers on the current tokio runtime.
#[derive(Clone)]
pub struct Countdown {
    clock: Arc<dyn Clock>,
    tick: StdDuration,
}

impl Countdown {
    /// A zero `tick` is raised to one millisecond.
    pub fn new(clock: Arc<dyn Clock>, tick: StdDuration) -> Self {
        Self {
            clock,
            tick: tick.max(MIN_TICK),
        }
    }

    /// Start counting down to `target`.
    ///
    /// With no target the zero string is emitted once and nothing ticks.
    pub fn start(&self, target: Option<DateTime<Utc>>, timezone: Tz) -> CountdownHandle {
        let (tx, rx) = mpsc::channel(8);

        let Some(target) = target else {
            // Capacity is 8 and nothing else has sent yet.
            let _ = tx.try_send(CountdownEvent::Tick(ZERO_COUNTDOWN.to_string()));
            return CountdownHandle {
                events: rx,
                task: None,
            };
        };

        tracing::debug!(
            target = %target.with_timezone(&timezone).format("%Y-%m-%d %H:%M:%S %Z"),
            "Starting countdown"
        );

        // Pin the wall-clock target to the monotonic clock once; ticks then
        // measure against the deadline rather than re-reading the wall clock.
        let remaining = (target - self.clock.now_utc()).to_std().unwrap_or_default();
        let deadline = Instant::now() + remaining;
        let tick = self.tick;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let left = deadline.saturating_duration_since(Instant::now());
                let left = Duration::from_std(left).unwrap_or_else(|_| Duration::zero());

                if left <= Duration::zero() {
                    let _ = tx.send(CountdownEvent::Tick(ZERO_COUNTDOWN.to_string())).await;
                    let _ = tx.send(CountdownEvent::Expired).await;
                    break;
                }

                if tx.send(CountdownEvent::Tick(format_countdown(left))).await.is_err() {
                    // Receiver dropped.
                    break;
                }
            }
        });

        CountdownHandle {
            events: rx,
            task: Some(task),
        }
    }
}

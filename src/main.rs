use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use salat_companion::{
    AppError, AstronomicalCalculator, CalculationMethod, Clock, CombinedNotifier, Countdown,
    CountdownEvent, DesktopCapabilities, FixedLocation, GeoIpClient, GeoIpLocator, JsonFileStore,
    Language, LocationAccuracy, NotificationCenter, Notifier, NtfyNotifier, PermissionState,
    Position, Prayer, PrayerSchedule, PrayerSession, Preferences, RamadanCalendar, ReminderDaemon,
    ReminderScheduler, ScheduleSettings, StoreError, SystemClock, config::AppConfig, location,
    messages, qibla,
};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[cfg(feature = "desktop")]
use salat_companion::DesktopNotifier;

#[derive(Parser, Debug)]
#[command(name = "salat-companion")]
#[command(about = "Prayer times, Ramadan countdown and reminders")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the day's prayer times
    Times {
        /// Date to show (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show the current and next prayer
    Next,
    /// Show the Ramadan day, phase and next Suhoor/Iftar
    Ramadan,
    /// Show the Qibla bearing and distance to the Kaaba
    Qibla {
        /// Current compass heading in degrees, to show how far to turn
        #[arg(long, allow_hyphen_values = true)]
        heading: Option<f64>,
    },
    /// Live countdown to the next prayer
    Watch,
    /// Run the reminder scheduler (headless)
    Daemon,
    /// Inspect or change per-prayer reminders
    Reminders {
        #[command(subcommand)]
        action: RemindersAction,
    },
    /// Change a persisted preference
    Set {
        #[command(subcommand)]
        setting: Setting,
    },
}

#[derive(Subcommand, Debug)]
enum RemindersAction {
    List,
    Toggle { prayer: Prayer },
}

#[derive(Subcommand, Debug)]
enum Setting {
    Method { value: CalculationMethod },
    Timezone { value: String },
    Language { value: Language },
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("salat_companion=debug");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<AppError>() {
                Some(app) => {
                    tracing::error!(kind = ?app.kind(), "{:#}", e);
                    eprintln!("{}", app.user_message());
                }
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let config = Arc::new(config);

    let prefs_path = config.storage.resolved_preferences_path();
    let store = JsonFileStore::open(&prefs_path)
        .map_err(AppError::from)
        .with_context(|| format!("Failed to open preferences at {}", prefs_path.display()))?;
    let prefs = Preferences::load(&store, default_preferences(&config))
        .map_err(AppError::from)
        .context("Failed to load preferences")?;

    match args.command.unwrap_or(Command::Times { date: None }) {
        Command::Reminders { action } => run_reminders(action, prefs, &store),
        Command::Set { setting } => run_set(setting, prefs, &store),
        Command::Qibla { heading } => runtime()?.block_on(async {
            let position = resolve_position(&config).await?;
            show_qibla(&position, heading)?;
            Ok::<_, anyhow::Error>(())
        }),
        Command::Times { date } => runtime()?.block_on(async {
            let settings = resolve_settings(&config, &prefs).await?;
            show_times(settings, &prefs, date)
        }),
        Command::Next => runtime()?.block_on(async {
            let session = build_session(&config, &prefs, resolve_settings(&config, &prefs).await?)?;
            show_next(&session, &prefs, SystemClock.now_utc())
        }),
        Command::Ramadan => runtime()?.block_on(async {
            let session = build_session(&config, &prefs, resolve_settings(&config, &prefs).await?)?;
            show_ramadan(&session, &prefs, SystemClock.now_utc())
        }),
        Command::Watch => runtime()?.block_on(async {
            let session = build_session(&config, &prefs, resolve_settings(&config, &prefs).await?)?;
            run_watch(session, &config, Arc::new(SystemClock)).await
        }),
        Command::Daemon => runtime()?.block_on(async {
            let session = build_session(&config, &prefs, resolve_settings(&config, &prefs).await?)?;
            run_daemon(session, config.clone(), prefs.clone(), Arc::new(SystemClock)).await
        }),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create tokio runtime")
}

fn default_preferences(config: &AppConfig) -> Preferences {
    Preferences {
        calculation_method: config.calculation.method,
        timezone: config.calculation.timezone,
        ..Default::default()
    }
}

fn run_reminders(action: RemindersAction, mut prefs: Preferences, store: &JsonFileStore) -> Result<()> {
    if let RemindersAction::Toggle { prayer } = action {
        let enabled = prefs.prayer_reminders.toggle(prayer);
        prefs.save(store).context("Failed to save preferences")?;
        tracing::info!(%prayer, enabled, "Reminder toggled");
    }

    for prayer in Prayer::ALL {
        let state = if prefs.prayer_reminders.is_enabled(prayer) { "on" } else { "off" };
        println!("{:<10} {}", messages::prayer_name(prefs.language, prayer), state);
    }
    Ok(())
}

fn run_set(setting: Setting, mut prefs: Preferences, store: &JsonFileStore) -> Result<()> {
    match setting {
        Setting::Method { value } => prefs.calculation_method = value,
        Setting::Timezone { value } => {
            prefs.timezone = value
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("Unknown time zone {value:?}: {e}"))?;
        }
        Setting::Language { value } => prefs.language = value,
    }
    prefs.save(store).context("Failed to save preferences")?;

    println!(
        "method={} timezone={} language={}",
        prefs.calculation_method, prefs.timezone, prefs.language
    );
    Ok(())
}

/// Locate the user and combine with preferences into schedule inputs.
async fn resolve_settings(config: &AppConfig, prefs: &Preferences) -> Result<ScheduleSettings> {
    let position = resolve_position(config).await?;

    let mut timezone = prefs.timezone;
    if timezone == chrono_tz::UTC {
        if let Some(tz) = position.timezone {
            tracing::info!("Using time zone {} reported for this location", tz);
            timezone = tz;
        }
    }

    Ok(ScheduleSettings {
        coordinates: position.coordinates,
        method: prefs.calculation_method,
        madhab: config.calculation.madhab,
        timezone,
    })
}

async fn resolve_position(config: &AppConfig) -> Result<Position> {
    let policy = config.location.retry_policy();

    if let Some(coordinates) = config.location.manual_coordinates()? {
        let position = location::locate_with_retry(&FixedLocation::new(coordinates), &policy)
            .await
            .map_err(AppError::from)?;
        return Ok(position);
    }

    tracing::info!("No manual coordinates configured, looking up location by IP");
    let client = GeoIpClient::new(config.location.geoip_url.clone(), &config.network)
        .map_err(|e| AppError::Network(format!("{e:#}")))?;
    let position = location::locate_with_retry(&GeoIpLocator::new(client), &policy)
        .await
        .map_err(AppError::from)?;
    Ok(position)
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    let mut notifier = CombinedNotifier::new();

    #[cfg(feature = "desktop")]
    if config.notifications.system {
        notifier = notifier.with(Arc::new(DesktopNotifier::new(config.notifications.icon.clone())));
    }

    if let Some(ref topic) = config.notifications.ntfy_topic {
        notifier = notifier.with(Arc::new(NtfyNotifier::new(topic.clone())));
    }

    tracing::info!("Notifier configured with {} backend(s)", notifier.len());
    Arc::new(notifier)
}

fn build_session(
    config: &AppConfig,
    prefs: &Preferences,
    settings: ScheduleSettings,
) -> Result<PrayerSession<AstronomicalCalculator>> {
    let notifications = &config.notifications;
    let capabilities = DesktopCapabilities::new(
        notifications.enabled && (notifications.system || notifications.ntfy_topic.is_some()),
        notifications.sound.is_some(),
    );
    let center = NotificationCenter::new(
        build_notifier(config),
        Arc::new(capabilities),
        chrono::Duration::seconds(notifications.display_timeout_secs),
    )
    .with_sound(notifications.sound.clone());

    let ramadan = RamadanCalendar::new(config.ramadan.start_date, settings.timezone)
        .with_length(config.ramadan.length_days);

    let session = PrayerSession::new(
        PrayerSchedule::new(AstronomicalCalculator, settings),
        ramadan,
        ReminderScheduler::new(config.reminders.lead_times()?),
        center,
    )
    .with_preferences(prefs.prayer_reminders, prefs.language);
    Ok(session)
}

fn show_times(settings: ScheduleSettings, prefs: &Preferences, date: Option<NaiveDate>) -> Result<()> {
    let schedule = PrayerSchedule::new(AstronomicalCalculator, settings);
    let date = date.unwrap_or_else(|| schedule.local_date(SystemClock.now_utc()));
    let times = schedule.times_for(date)?;

    println!("{} ({}, {})", date, settings.coordinates, settings.method);
    for (prayer, time) in times.formatted(settings.timezone) {
        println!(
            "{:<10} {}",
            messages::prayer_name(prefs.language, prayer),
            messages::localize_digits(prefs.language, &time)
        );
    }
    Ok(())
}

fn show_qibla(position: &Position, heading: Option<f64>) -> Result<(), AppError> {
    let bearing = qibla::qibla_direction(position.coordinates);
    let distance = qibla::distance_km(position.coordinates, qibla::KAABA);
    let accuracy = LocationAccuracy::classify(position.accuracy_m);

    println!("Qibla:    {:.1}° ({})", bearing, qibla::cardinal(bearing));
    if let Some(heading) = heading {
        let turn = qibla::relative_bearing(bearing, heading)?;
        println!("Turn:     {:.1}° clockwise from heading {:.1}°", turn, heading);
    }
    println!("Distance: {:.0} km", distance);
    println!("Location: {} (accuracy {})", position.coordinates, accuracy);
    Ok(())
}

fn show_next(
    session: &PrayerSession<AstronomicalCalculator>,
    prefs: &Preferences,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    let snapshot = session.snapshot(now)?;
    let lang = prefs.language;
    let next = snapshot.current_next.next;

    println!("Current: {}", messages::prayer_name(lang, snapshot.current_next.current));
    println!(
        "Next:    {} at {} (in {})",
        messages::prayer_name(lang, next.prayer),
        messages::localize_digits(
            lang,
            &next.time.with_timezone(&snapshot.timezone).format("%H:%M").to_string()
        ),
        messages::localize_digits(lang, &snapshot.next_prayer_countdown)
    );
    Ok(())
}

fn show_ramadan(
    session: &PrayerSession<AstronomicalCalculator>,
    prefs: &Preferences,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    let snapshot = session.snapshot(now)?;
    let lang = prefs.language;
    let state = &snapshot.ramadan;
    let local = |t: chrono::DateTime<chrono::Utc>| {
        messages::localize_digits(
            lang,
            &t.with_timezone(&snapshot.timezone).format("%H:%M").to_string(),
        )
    };

    let Some(day) = state.ramadan_day else {
        println!("{}", messages::phase_label(lang, state.current_event));
        return Ok(());
    };

    println!("{}", messages::ramadan_day(lang, day));
    println!("Phase:  {}", messages::phase_label(lang, state.current_event));
    if let (Some(suhoor), Some(iftar)) = (state.suhoor, state.iftar) {
        println!("Suhoor: {}", local(suhoor));
        println!("Iftar:  {}", local(iftar));
    }
    if let Some(next) = state.next_event {
        println!(
            "Next:   {} at {} (in {})",
            next.event,
            local(next.time),
            messages::localize_digits(lang, &snapshot.next_event_countdown)
        );
    }
    Ok(())
}

/// Print a live countdown, re-resolving the next prayer each time one expires.
async fn run_watch(
    session: PrayerSession<AstronomicalCalculator>,
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    let countdown = Countdown::new(clock.clone(), Duration::from_millis(config.refresh.countdown_tick_ms));
    let lang = session.language();

    loop {
        let snapshot = session.snapshot(clock.now_utc())?;
        let next = snapshot.current_next.next;
        let name = messages::prayer_name(lang, next.prayer);
        let mut handle = countdown.start(Some(next.time), snapshot.timezone);

        loop {
            tokio::select! {
                event = handle.recv() => match event {
                    Some(CountdownEvent::Tick(remaining)) => {
                        print!("\r{}: {}   ", name, messages::localize_digits(lang, &remaining));
                        let _ = std::io::stdout().flush();
                    }
                    Some(CountdownEvent::Expired) | None => {
                        println!();
                        tracing::info!(prayer = %next.prayer, "Prayer time reached");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    handle.cancel();
                    println!();
                    return Ok(());
                }
            }
        }
    }
}

/// Headless reminder loop: a periodic pass plus one-shot timers.
async fn run_daemon(
    mut session: PrayerSession<AstronomicalCalculator>,
    config: Arc<AppConfig>,
    prefs: Preferences,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    tracing::info!("Starting Salat Companion in daemon mode");
    tracing::info!(
        "Location {}, method {}, zone {}",
        session.settings().coordinates,
        session.settings().method,
        session.settings().timezone
    );

    let denied = messages::permission_denied(session.language());
    let permission = session.center_mut().request_permission(denied, clock.now_utc());
    let prefs_path = config.storage.resolved_preferences_path();
    persist_permission(&prefs_path, &config, permission);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut daemon = ReminderDaemon::new(clock, tx, prefs);

    let interval_secs = config.refresh.schedule_pass_interval_secs;
    tracing::info!("Starting reminder loop with interval: {} seconds", interval_secs);

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Pick up preference changes made by other invocations
                let reloaded = reload_preferences(&prefs_path, &config)
                    .inspect_err(|e| tracing::warn!("Failed to reload preferences: {}", e))
                    .ok();
                if let Err(e) = daemon.tick(&mut session, reloaded) {
                    tracing::error!("Reminder pass failed ({:?}): {}", e.kind(), e);
                }
            }
            Some(reminder) = rx.recv() => {
                daemon.fired(&mut session, &reminder);
            }
            _ = tokio::signal::ctrl_c() => {
                daemon.shutdown();
                return Ok(());
            }
        }
    }
}

fn reload_preferences(path: &Path, config: &AppConfig) -> Result<Preferences, StoreError> {
    let store = JsonFileStore::open(path)?;
    Preferences::load(&store, default_preferences(config))
}

fn persist_permission(path: &Path, config: &AppConfig, permission: PermissionState) {
    let result = JsonFileStore::open(path).and_then(|store| {
        let mut prefs = Preferences::load(&store, default_preferences(config))?;
        prefs.notification_permission = permission;
        prefs.save(&store)
    });
    if let Err(e) = result {
        tracing::warn!("Failed to save notification permission: {}", e);
    }
}

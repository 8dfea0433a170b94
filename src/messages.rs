//! User-facing strings in English and Arabic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::prayer::Prayer;
use crate::ramadan::{RamadanEvent, RamadanPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ar => "ar",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::En),
            "ar" | "arabic" => Ok(Self::Ar),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Replace ASCII digits with Arabic-Indic digits.
pub fn to_arabic_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => char::from_u32(0x0660 + d).unwrap_or(c),
            None => c,
        })
        .collect()
}

/// Localise digits for the given language.
pub fn localize_digits(language: Language, s: &str) -> String {
    match language {
        Language::En => s.to_string(),
        Language::Ar => to_arabic_digits(s),
    }
}

pub fn prayer_name(language: Language, prayer: Prayer) -> &'static str {
    match language {
        Language::En => prayer.display_name(),
        Language::Ar => match prayer {
            Prayer::Fajr => "الفجر",
            Prayer::Sunrise => "الشروق",
            Prayer::Dhuhr => "الظهر",
            Prayer::Asr => "العصر",
            Prayer::Maghrib => "المغرب",
            Prayer::Isha => "العشاء",
        },
    }
}

pub fn phase_label(language: Language, phase: RamadanPhase) -> &'static str {
    match language {
        Language::En => phase.as_str(),
        Language::Ar => match phase {
            RamadanPhase::Fasting => "صائم",
            RamadanPhase::PostIftar => "بعد الإفطار",
            RamadanPhase::PreSuhoor => "قبل السحور",
            RamadanPhase::NotRamadan => "ليس رمضان",
        },
    }
}

fn minutes_en(minutes: i64) -> String {
    if minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{minutes} minutes")
    }
}

pub fn prayer_reminder(language: Language, prayer: Prayer, minutes: i64) -> String {
    let text = match (language, prayer) {
        (Language::En, Prayer::Sunrise) => format!("Sunrise in {}", minutes_en(minutes)),
        (Language::En, p) => format!("{} prayer in {}", p.display_name(), minutes_en(minutes)),
        (Language::Ar, p) => format!("صلاة {} بعد {minutes} دقيقة", prayer_name(Language::Ar, p)),
    };
    localize_digits(language, &text)
}

pub fn ramadan_reminder(language: Language, event: RamadanEvent, minutes: i64) -> String {
    let text = match (language, event) {
        (Language::En, RamadanEvent::Suhoor) => {
            format!("Suhoor ends at Fajr in {}!", minutes_en(minutes))
        }
        (Language::En, RamadanEvent::Iftar) => {
            format!("Time for Iftar is approaching! Iftar in {}.", minutes_en(minutes))
        }
        (Language::Ar, RamadanEvent::Suhoor) => {
            format!("ينتهي السحور عند الفجر بعد {minutes} دقيقة!")
        }
        (Language::Ar, RamadanEvent::Iftar) => format!("اقترب موعد الإفطار! بعد {minutes} دقيقة."),
    };
    localize_digits(language, &text)
}

pub fn permission_denied(language: Language) -> &'static str {
    match language {
        Language::En => {
            "Notifications are blocked. Reminders will only appear inside the app."
        }
        Language::Ar => "الإشعارات محظورة. ستظهر التذكيرات داخل التطبيق فقط.",
    }
}

pub fn ramadan_day(language: Language, day: u32) -> String {
    match language {
        Language::En => format!("Day {day} of Ramadan"),
        Language::Ar => to_arabic_digits(&format!("اليوم {day} من رمضان")),
    }
}

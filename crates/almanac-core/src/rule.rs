//! Recurrence rules — the core data model for when events repeat.
//!
//! A rule is `(frequency, rate, add_rate)`. For weekly and monthly
//! frequencies `add_rate` is a day-selection bitmask:
//! - weekly: bit 0 = Sunday … bit 6 = Saturday
//! - monthly: bit d = day d of the month, d in 1..=31 (bit 0 unused)

use chrono::{DateTime, Datelike, Local, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AlmanacError, Result};

/// Weekday mask selecting Monday through Friday.
pub const WORKDAYS: i32 = 0x3E;
/// Weekday mask selecting Saturday and Sunday.
pub const WEEKENDS: i32 = 0x41;
/// Weekday mask selecting every day of the week.
pub const ALL_WEEK: i32 = 0x7F;

/// Two-letter English day names in Sunday..Saturday (bit 0..6) order.
const DAY_ABBREV: [&str; 7] = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];

/// The bit a weekday occupies in a weekly mask (bit 0 = Sunday).
pub fn weekday_bit(day: Weekday) -> i32 {
    1 << day.num_days_from_sunday()
}

/// Build a weekly mask from a set of weekdays.
pub fn weekday_mask(days: &[Weekday]) -> i32 {
    days.iter().fold(0, |mask, d| mask | weekday_bit(*d))
}

/// Build a monthly mask from day-of-month numbers. Days outside 1..=31 are
/// ignored.
pub fn month_day_mask(days: &[u32]) -> i32 {
    days.iter()
        .filter(|d| (1..=31).contains(*d))
        .fold(0u32, |mask, d| mask | (1 << d)) as i32
}

/// How often an event repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Frequency {
    #[default]
    NotSet,
    EveryNthMinute,
    EveryNthHour,
    EveryNthDay,
    EveryNthWeek,
    EveryNthMonth,
    EveryNthYear,
}

impl Frequency {
    /// Parse a persisted frequency name, case-insensitively. Unknown names
    /// fall back to `NotSet`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "everynthminute" => Self::EveryNthMinute,
            "everynthhour" => Self::EveryNthHour,
            "everynthday" => Self::EveryNthDay,
            "everynthweek" => Self::EveryNthWeek,
            "everynthmonth" => Self::EveryNthMonth,
            "everynthyear" => Self::EveryNthYear,
            _ => Self::NotSet,
        }
    }

    /// The canonical name written to profile files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSet => "NotSet",
            Self::EveryNthMinute => "EveryNthMinute",
            Self::EveryNthHour => "EveryNthHour",
            Self::EveryNthDay => "EveryNthDay",
            Self::EveryNthWeek => "EveryNthWeek",
            Self::EveryNthMonth => "EveryNthMonth",
            Self::EveryNthYear => "EveryNthYear",
        }
    }
}

/// Whether an event's target time is a fixed wall-clock time or anchored to
/// a solar phenomenon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventType {
    #[default]
    Absolute,
    Astronomical,
}

impl EventType {
    /// Parse a persisted type name, case-insensitively. Unknown names fall
    /// back to `Absolute`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("AstronomicalEvent") || s.eq_ignore_ascii_case("Astronomical") {
            Self::Astronomical
        } else {
            Self::Absolute
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute => "AbsoluteEvent",
            Self::Astronomical => "AstronomicalEvent",
        }
    }
}

/// Whether an event's timer is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventState {
    #[default]
    Enabled,
    Disabled,
}

impl EventState {
    /// Parse a persisted state name, case-insensitively. Unknown names fall
    /// back to `Enabled`.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("Disabled") {
            Self::Disabled
        } else {
            Self::Enabled
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "Enabled",
            Self::Disabled => "Disabled",
        }
    }
}

/// A recurrence rule. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Step count for the frequency unit; must be >= 1 for recurring rules.
    pub rate: u32,
    /// Day-selection bitmask for weekly/monthly frequencies; 0 otherwise.
    pub add_rate: i32,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency, rate: u32, add_rate: i32) -> Self {
        Self { frequency, rate, add_rate }
    }

    /// A rule that never repeats.
    pub fn one_time() -> Self {
        Self::new(Frequency::NotSet, 0, 0)
    }

    pub fn is_recurring(&self) -> bool {
        self.frequency != Frequency::NotSet
    }

    /// Check the rule is schedulable: a recurring rule needs `rate >= 1`,
    /// and weekly/monthly rules need at least one selectable day bit.
    pub fn validate(&self) -> Result<()> {
        match self.frequency {
            Frequency::NotSet => return Ok(()),
            _ if self.rate == 0 => {
                return Err(AlmanacError::Config(format!(
                    "{} rule needs rate >= 1",
                    self.frequency.as_str()
                )));
            }
            Frequency::EveryNthWeek => {
                if self.add_rate <= 0 || self.add_rate as u32 & 0x7F == 0 {
                    return Err(AlmanacError::Config(format!(
                        "weekly rule needs a day mask, got {:#x}",
                        self.add_rate
                    )));
                }
            }
            Frequency::EveryNthMonth => {
                if self.add_rate <= 0 || self.add_rate as u32 & !1u32 == 0 {
                    return Err(AlmanacError::Config(format!(
                        "monthly rule needs a day mask, got {:#x}",
                        self.add_rate
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Human-readable description of the rule, derived at save time.
    ///
    /// `target` supplies the day and month for yearly rules.
    pub fn describe(&self, target: DateTime<Local>) -> String {
        match self.frequency {
            Frequency::NotSet => "One time event".to_string(),
            Frequency::EveryNthMinute => format!("Every({})Minute", self.rate),
            Frequency::EveryNthHour => format!("Every({})Hour", self.rate),
            Frequency::EveryNthDay => format!("Every({})Day", self.rate),
            Frequency::EveryNthWeek => {
                format!("Every({})Week ({})", self.rate, self.describe_weekdays())
            }
            Frequency::EveryNthMonth => {
                format!("Every({})Month ({})", self.rate, self.describe_month_days())
            }
            Frequency::EveryNthYear => {
                format!("Every({})Year ({:02}/{:02})", self.rate, target.day(), target.month())
            }
        }
    }

    fn describe_weekdays(&self) -> String {
        let mask = self.add_rate as u32;
        let mut out = String::from("-");
        for (bit, abbrev) in DAY_ABBREV.iter().enumerate() {
            if mask & (1 << bit) != 0 {
                out.push_str(abbrev);
                out.push('-');
            }
        }
        out
    }

    fn describe_month_days(&self) -> String {
        let mask = self.add_rate as u32;
        let mut out = String::from("-");
        for day in 1..=31u32 {
            if mask & (1 << day) != 0 {
                out.push_str(&format!("{day}.-"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(Frequency::parse("everyNTHweek"), Frequency::EveryNthWeek);
        assert_eq!(Frequency::parse("EVERYNTHMINUTE"), Frequency::EveryNthMinute);
        assert_eq!(Frequency::parse("bogus"), Frequency::NotSet);
        assert_eq!(EventType::parse("astronomicalevent"), EventType::Astronomical);
        assert_eq!(EventType::parse("AbsoluteEvent"), EventType::Absolute);
        assert_eq!(EventType::parse(""), EventType::Absolute);
        assert_eq!(EventState::parse("DISABLED"), EventState::Disabled);
        assert_eq!(EventState::parse("whatever"), EventState::Enabled);
    }

    #[test]
    fn test_weekday_masks() {
        assert_eq!(weekday_bit(Weekday::Sun), 0x01);
        assert_eq!(weekday_bit(Weekday::Sat), 0x40);
        assert_eq!(
            weekday_mask(&[
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri
            ]),
            WORKDAYS
        );
        assert_eq!(weekday_mask(&[Weekday::Sat, Weekday::Sun]), WEEKENDS);
        assert_eq!(WORKDAYS | WEEKENDS, ALL_WEEK);
    }

    #[test]
    fn test_month_day_mask() {
        assert_eq!(month_day_mask(&[1, 15]), 0x8002);
        assert_eq!(month_day_mask(&[0, 32]), 0);
        assert_eq!(month_day_mask(&[31]), 1 << 31);
    }

    #[test]
    fn test_validate() {
        assert!(RecurrenceRule::one_time().validate().is_ok());
        assert!(RecurrenceRule::new(Frequency::EveryNthMinute, 10, 0).validate().is_ok());
        assert!(RecurrenceRule::new(Frequency::EveryNthMinute, 0, 0).validate().is_err());
        assert!(RecurrenceRule::new(Frequency::EveryNthWeek, 1, WORKDAYS).validate().is_ok());
        assert!(RecurrenceRule::new(Frequency::EveryNthWeek, 1, 0).validate().is_err());
        assert!(RecurrenceRule::new(Frequency::EveryNthWeek, 1, -1).validate().is_err());
        // Only bits above 0x7F set: no selectable weekday.
        assert!(RecurrenceRule::new(Frequency::EveryNthWeek, 1, 0x80).validate().is_err());
        assert!(RecurrenceRule::new(Frequency::EveryNthMonth, 1, 0x8002).validate().is_ok());
        // Bit 0 alone selects no month day.
        assert!(RecurrenceRule::new(Frequency::EveryNthMonth, 1, 1).validate().is_err());
    }

    #[test]
    fn test_describe() {
        let target = Local.with_ymd_and_hms(2025, 7, 5, 9, 0, 0).unwrap();
        assert_eq!(RecurrenceRule::one_time().describe(target), "One time event");
        assert_eq!(
            RecurrenceRule::new(Frequency::EveryNthMinute, 10, 0).describe(target),
            "Every(10)Minute"
        );
        assert_eq!(
            RecurrenceRule::new(Frequency::EveryNthHour, 2, 0).describe(target),
            "Every(2)Hour"
        );
        assert_eq!(
            RecurrenceRule::new(Frequency::EveryNthWeek, 1, WORKDAYS).describe(target),
            "Every(1)Week (-Mo-Tu-We-Th-Fr-)"
        );
        assert_eq!(
            RecurrenceRule::new(Frequency::EveryNthWeek, 2, 0x80).describe(target),
            "Every(2)Week (-)"
        );
        assert_eq!(
            RecurrenceRule::new(Frequency::EveryNthMonth, 1, 0x8002).describe(target),
            "Every(1)Month (-1.-15.-)"
        );
        assert_eq!(
            RecurrenceRule::new(Frequency::EveryNthYear, 2, 0).describe(target),
            "Every(2)Year (05/07)"
        );
    }
}

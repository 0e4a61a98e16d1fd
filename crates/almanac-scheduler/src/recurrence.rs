//! Recurrence arithmetic — pure next-fire computation.
//!
//! `next_fire` advances an event's target until it is strictly later than
//! `now + 1 minute`. The one-minute forward guard matters: timers re-arm to
//! the next minute boundary right after firing, and without the guard a
//! re-armed timer could observe the occurrence it just delivered.
//!
//! All arithmetic is on local wall-clock time. Minute and hour steps are
//! plain durations; day, week, month and year steps are calendar steps
//! that preserve the target's time of day across DST transitions.

use almanac_core::error::Result;
use almanac_core::rule::{Frequency, RecurrenceRule};
use chrono::{DateTime, Datelike, Days, Duration, Local, Months, NaiveDateTime, TimeZone, Timelike, Weekday};

/// Round to the whole minute: seconds >= 30 round up, otherwise down.
/// Sub-second precision is always dropped.
pub fn round_to_minute(t: DateTime<Local>) -> DateTime<Local> {
    let t = t.with_nanosecond(0).unwrap_or(t);
    let secs = t.second() as i64;
    if secs >= 30 {
        t + Duration::seconds(60 - secs)
    } else {
        t - Duration::seconds(secs)
    }
}

/// Compute the next fire instant for `target` under `rule`, strictly later
/// than `now + 1 minute` (except for one-time rules, which return the
/// target unchanged — the caller decides whether a past target is an
/// error). The result is rounded to the whole minute.
pub fn next_fire(
    target: DateTime<Local>,
    now: DateTime<Local>,
    rule: &RecurrenceRule,
) -> Result<DateTime<Local>> {
    rule.validate()?;
    let limit = now + Duration::minutes(1);
    let next = match rule.frequency {
        Frequency::NotSet => target,
        Frequency::EveryNthMinute => step_until(target, limit, Duration::minutes(rule.rate as i64)),
        Frequency::EveryNthHour => step_until(target, limit, Duration::hours(rule.rate as i64)),
        Frequency::EveryNthDay => next_daily(target, limit, rule.rate),
        Frequency::EveryNthWeek => next_weekly(target, limit, rule.rate, rule.add_rate),
        Frequency::EveryNthMonth => next_monthly(target, limit, rule.rate, rule.add_rate),
        Frequency::EveryNthYear => next_yearly(target, limit, rule.rate),
    };
    Ok(round_to_minute(next))
}

fn step_until(mut t: DateTime<Local>, limit: DateTime<Local>, step: Duration) -> DateTime<Local> {
    while t <= limit {
        t += step;
    }
    t
}

/// Advance by whole days preserving the wall-clock time of day — the
/// calendar arithmetic the day walks are specified over. A time landing in
/// a DST gap resolves to the plain duration sum instead.
fn add_days_wall(t: DateTime<Local>, days: u64) -> DateTime<Local> {
    let fallback = t + Duration::days(days as i64);
    match t.date_naive().checked_add_days(Days::new(days)) {
        Some(date) => resolve_local(date.and_time(t.time()), fallback),
        None => fallback,
    }
}

fn resolve_local(naive: NaiveDateTime, fallback: DateTime<Local>) -> DateTime<Local> {
    Local.from_local_datetime(&naive).earliest().unwrap_or(fallback)
}

fn next_daily(mut t: DateTime<Local>, limit: DateTime<Local>, rate: u32) -> DateTime<Local> {
    while t <= limit {
        t = add_days_wall(t, rate as u64);
    }
    t
}

fn next_yearly(mut t: DateTime<Local>, limit: DateTime<Local>, rate: u32) -> DateTime<Local> {
    let step = Months::new(12 * rate);
    while t <= limit {
        // checked_add_months clamps Feb 29 to Feb 28 on non-leap years
        t = t
            .checked_add_months(step)
            .unwrap_or_else(|| t + Duration::days(365 * rate as i64));
    }
    t
}

fn weekday_selected(mask: u32, t: DateTime<Local>) -> bool {
    mask & (1 << t.weekday().num_days_from_sunday()) != 0
}

/// Walk day by day through the selected weekdays (bit 0 = Sunday). Week
/// blocks run Sunday..Saturday; when the walk passes a Saturday it skips
/// ahead `7 * (rate - 1)` days into the next eligible week block.
fn next_weekly(mut t: DateTime<Local>, limit: DateTime<Local>, rate: u32, add_rate: i32) -> DateTime<Local> {
    let mask = add_rate as u32 & 0x7F;
    if t > limit && weekday_selected(mask, t) {
        return t;
    }
    loop {
        let week_ends = t.weekday() == Weekday::Sat;
        t = add_days_wall(t, 1);
        if week_ends && rate > 1 {
            t = add_days_wall(t, 7 * (rate as u64 - 1));
        }
        if weekday_selected(mask, t) && t > limit {
            return t;
        }
    }
}

/// Walk day by day through the selected month days (bit d = day d),
/// preserving the target's hour:minute. Passing the end of a month skips
/// ahead `rate - 1` months before the scan resumes.
fn next_monthly(mut t: DateTime<Local>, limit: DateTime<Local>, rate: u32, add_rate: i32) -> DateTime<Local> {
    let mask = add_rate as u32;
    loop {
        if mask & (1 << t.day()) != 0 && t > limit {
            return t;
        }
        let month = t.month();
        t = add_days_wall(t, 1);
        if t.month() != month && rate > 1 {
            t = t
                .checked_add_months(Months::new(rate - 1))
                .unwrap_or_else(|| t + Duration::days(30 * (rate as i64 - 1)));
        }
    }
}

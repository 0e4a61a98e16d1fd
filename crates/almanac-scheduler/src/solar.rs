//! Solar-anchored time resolution.
//!
//! Astronomical events anchor to a solar phenomenon (sunrise, sunset, the
//! dawn/dusk twilights, solar noon) at the scheduler's configured
//! coordinates, with a signed minute offset: `"Sunset:-10"` fires ten
//! minutes before sunset.

use std::fmt;

use almanac_core::error::{AlmanacError, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime};
use sunrise::{Coordinates, DawnType, SolarDay, SolarEvent};

/// Default anchor when an astronomical event does not specify one.
pub const DEFAULT_ASTRO_OFFSET: &str = "Sunset:-10";

/// Solar phenomenon an astronomical event anchors to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolarKind {
    Sunrise,
    #[default]
    Sunset,
    SolarNoon,
    DawnCivil,
    DuskCivil,
    DawnNautical,
    DuskNautical,
    DawnAstronomical,
    DuskAstronomical,
}

impl SolarKind {
    /// Parse a phenomenon name, case-insensitively. Unrecognized names fall
    /// back to `Sunset`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "sunrise" => Self::Sunrise,
            "sunset" => Self::Sunset,
            "solarnoon" => Self::SolarNoon,
            "dawncivil" => Self::DawnCivil,
            "duskcivil" => Self::DuskCivil,
            "dawnnautical" => Self::DawnNautical,
            "dusknautical" => Self::DuskNautical,
            "dawnastronomical" => Self::DawnAstronomical,
            "duskastronomical" => Self::DuskAstronomical,
            _ => Self::Sunset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sunrise => "Sunrise",
            Self::Sunset => "Sunset",
            Self::SolarNoon => "SolarNoon",
            Self::DawnCivil => "DawnCivil",
            Self::DuskCivil => "DuskCivil",
            Self::DawnNautical => "DawnNautical",
            Self::DuskNautical => "DuskNautical",
            Self::DawnAstronomical => "DawnAstronomical",
            Self::DuskAstronomical => "DuskAstronomical",
        }
    }
}

/// A parsed `"<Kind>:<±minutes>"` anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AstroOffset {
    pub kind: SolarKind,
    pub minutes: i64,
}

impl AstroOffset {
    /// Parse an anchor string. Malformed input degrades field by field:
    /// an unknown kind becomes `Sunset`, a missing or unparseable offset
    /// becomes 0.
    pub fn parse(s: &str) -> Self {
        let mut parts = s.splitn(2, ':');
        let kind = SolarKind::parse(parts.next().unwrap_or(""));
        let minutes = parts.next().and_then(|m| m.trim().parse().ok()).unwrap_or(0);
        Self { kind, minutes }
    }
}

impl fmt::Display for AstroOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.minutes)
    }
}

/// The day's solar phenomena at a location, as local instants.
#[derive(Debug, Clone, Copy)]
pub struct SolarTimes {
    pub sunrise: DateTime<Local>,
    pub sunset: DateTime<Local>,
    pub solar_noon: DateTime<Local>,
    pub dawn_civil: DateTime<Local>,
    pub dusk_civil: DateTime<Local>,
    pub dawn_nautical: DateTime<Local>,
    pub dusk_nautical: DateTime<Local>,
    pub dawn_astronomical: DateTime<Local>,
    pub dusk_astronomical: DateTime<Local>,
}

impl SolarTimes {
    pub fn get(&self, kind: SolarKind) -> DateTime<Local> {
        match kind {
            SolarKind::Sunrise => self.sunrise,
            SolarKind::Sunset => self.sunset,
            SolarKind::SolarNoon => self.solar_noon,
            SolarKind::DawnCivil => self.dawn_civil,
            SolarKind::DuskCivil => self.dusk_civil,
            SolarKind::DawnNautical => self.dawn_nautical,
            SolarKind::DuskNautical => self.dusk_nautical,
            SolarKind::DawnAstronomical => self.dawn_astronomical,
            SolarKind::DuskAstronomical => self.dusk_astronomical,
        }
    }
}

/// Compute all solar phenomena for one date at the given coordinates.
///
/// Solar noon is derived as the sunrise→sunset midpoint.
pub fn solar_times(date: NaiveDate, latitude: f64, longitude: f64) -> Result<SolarTimes> {
    let coord = Coordinates::new(latitude, longitude).ok_or_else(|| {
        AlmanacError::Solar(format!("invalid coordinates {latitude:.4}, {longitude:.4}"))
    })?;
    let day = SolarDay::new(coord, date);
    let local = |event: SolarEvent| day.event_time(event).with_timezone(&Local);

    let sunrise = local(SolarEvent::Sunrise);
    let sunset = local(SolarEvent::Sunset);
    Ok(SolarTimes {
        sunrise,
        sunset,
        solar_noon: sunrise + (sunset - sunrise) / 2,
        dawn_civil: local(SolarEvent::Dawn(DawnType::Civil)),
        dusk_civil: local(SolarEvent::Dusk(DawnType::Civil)),
        dawn_nautical: local(SolarEvent::Dawn(DawnType::Nautical)),
        dusk_nautical: local(SolarEvent::Dusk(DawnType::Nautical)),
        dawn_astronomical: local(SolarEvent::Dawn(DawnType::Astronomical)),
        dusk_astronomical: local(SolarEvent::Dusk(DawnType::Astronomical)),
    })
}

/// Resolve the local instant of a solar phenomenon on (or after) `date`.
///
/// Clock times before 03:30 are recomputed from 03:10 so the day's
/// phenomena derive from a time unambiguously past any spring-forward
/// transition. Unless `allow_past` is set, the date advances one day at a
/// time until the instant is strictly later than now plus one minute.
pub fn solar_time(
    kind: SolarKind,
    date: DateTime<Local>,
    latitude: f64,
    longitude: f64,
    allow_past: bool,
) -> Result<DateTime<Local>> {
    let dst_guard = NaiveTime::from_hms_opt(3, 30, 0).expect("valid clock time");
    let dst_base = NaiveTime::from_hms_opt(3, 10, 0).expect("valid clock time");
    let mut date = if date.time() < dst_guard {
        date.with_time(dst_base).single().unwrap_or(date)
    } else {
        date
    };

    let limit = Local::now() + Duration::minutes(1);
    for _ in 0..366 {
        let instant = solar_times(date.date_naive(), latitude, longitude)?.get(kind);
        if allow_past || instant > limit {
            return Ok(instant);
        }
        date += Duration::days(1);
    }
    Err(AlmanacError::Solar(format!(
        "no future {} found at {latitude:.4}, {longitude:.4}",
        kind.as_str()
    )))
}

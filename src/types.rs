use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::constants::{MAX_DEC, MAX_TZ_OFFSET, MIN_DEC, MIN_TZ_OFFSET};

#[derive(Debug, EnumIter, Display, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Axis {
    #[strum(serialize = "RA")]
    RightAscension,
    #[strum(serialize = "DEC")]
    Declination,
}

impl Axis {
    /// Single-character axis identifier used on the wire.
    pub fn as_char(&self) -> char {
        match self {
            Axis::RightAscension => '1',
            Axis::Declination => '2',
        }
    }
}

#[derive(Debug, Display, Clone, Copy, Eq, PartialEq, Default)]
pub enum Hemisphere {
    #[default]
    North,
    South,
}

impl Hemisphere {
    pub fn from_latitude(latitude: f64) -> Self {
        if latitude >= 0.0 {
            Hemisphere::North
        } else {
            Hemisphere::South
        }
    }
}

#[derive(Debug, EnumIter, Display, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn as_char(&self) -> char {
        match self {
            Direction::Forward => '0',
            Direction::Reverse => '1',
        }
    }
}

#[derive(Debug, EnumIter, Display, Clone, Copy, Eq, PartialEq)]
pub enum TrackingMode {
    Off = 0,
    Sidereal = 1,
    Solar = 2,
    Lunar = 3,
}

impl TrackingMode {
    pub fn as_char(&self) -> char {
        char::from(b'0' + *self as u8)
    }
}

/// Lifecycle of a mount connection.
#[derive(Debug, Display, Clone, Copy, Eq, PartialEq, Default)]
pub enum MountStatus {
    #[default]
    Disconnected,
    Connecting,
    TimeSync,
    LocationSync,
    AxisInit,
    Ready,
    Slewing,
    Jogging,
}

/// Observing site. Longitude is positive east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: i32,
}

impl Observer {
    pub fn hemisphere(&self) -> Hemisphere {
        Hemisphere::from_latitude(self.latitude)
    }
}

/// Equatorial position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RaDec {
    pub ra: f64,
    pub dec: f64,
}

impl RaDec {
    pub fn new(ra: f64, dec: f64) -> Self {
        RaDec { ra, dec }
    }
}

impl fmt::Display for RaDec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RA={:.6}°, DEC={:.6}°", self.ra, self.dec)
    }
}

/// Local wall-clock time sent to the mount, with the UTC offset in whole hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub tz_hours: i32,
}

impl MountTime {
    /// The offset is rounded to the nearest hour.
    pub fn from_local(time: &DateTime<FixedOffset>) -> Self {
        let offset_secs = time.offset().local_minus_utc();
        MountTime {
            year: time.year(),
            month: time.month(),
            day: time.day(),
            hour: time.hour(),
            minute: time.minute(),
            second: time.second(),
            tz_hours: (offset_secs as f64 / 3600.0).round() as i32,
        }
    }

    pub fn is_valid(&self) -> bool {
        (0..=9999).contains(&self.year)
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour <= 23
            && self.minute <= 59
            && self.second <= 59
            && (MIN_TZ_OFFSET..=MAX_TZ_OFFSET).contains(&self.tz_hours)
    }
}

impl fmt::Display for MountTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC{:+}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.tz_hours
        )
    }
}

pub(crate) fn clamp_dec(dec: f64) -> f64 {
    dec.max(MIN_DEC).min(MAX_DEC)
}

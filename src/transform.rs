//! Encoder state to equatorial coordinates.
//!
//! Conversions follow the EQMOD approach: the RA encoder yields an hour angle,
//! which is subtracted from local sidereal time to give right ascension. The DEC
//! encoder rotates through a full ring and is folded onto ±90°. When the DEC
//! ring reading shows the mount is on the far side of the pier, RA is shifted by
//! 12 hours.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::state::MountState;
use crate::types::{Axis, Hemisphere, RaDec};

/// 2000-01-01T12:00:00Z as a Unix timestamp.
const J2000_UNIX_SECONDS: f64 = 946_728_000.0;
const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_CENTURY: f64 = 36_525.0;

fn wrap(value: f64, modulus: f64) -> f64 {
    let wrapped = value.rem_euclid(modulus);
    if wrapped >= modulus {
        0.0
    } else {
        wrapped
    }
}

/// Hours in [0, 24).
pub fn range24(hours: f64) -> f64 {
    wrap(hours, 24.0)
}

/// Degrees in [0, 360).
pub fn range360(degrees: f64) -> f64 {
    wrap(degrees, 360.0)
}

/// Fold a 0-360° DEC ring reading onto signed declination.
pub fn range_dec(degrees: f64) -> f64 {
    let d = range360(degrees);
    if d <= 90.0 {
        d
    } else if d <= 270.0 {
        180.0 - d
    } else {
        d - 360.0
    }
}

/// Hour angle in [-12, 12).
pub fn range_ha(hours: f64) -> f64 {
    wrap(hours + 12.0, 24.0) - 12.0
}

pub fn days_since_j2000(time: DateTime<Utc>) -> f64 {
    let seconds = time.timestamp() as f64 + time.timestamp_subsec_nanos() as f64 * 1e-9;
    (seconds - J2000_UNIX_SECONDS) / SECONDS_PER_DAY
}

/// Greenwich mean sidereal time in degrees, [0, 360).
pub fn gmst_degrees(time: DateTime<Utc>) -> f64 {
    let d = days_since_j2000(time);
    let t = d / DAYS_PER_CENTURY;
    range360(280.46061837 + 360.98564736629 * d + 0.000387933 * t * t - t * t * t / 38_710_000.0)
}

/// Local sidereal time in hours, [0, 24). Longitude is positive east.
pub fn lst_hours(time: DateTime<Utc>, longitude: f64) -> f64 {
    let gmst = gmst_degrees(time);
    let lst = range360(gmst + longitude) / 15.0;
    trace!(longitude, gmst, lst, "local sidereal time");
    lst
}

/// RA encoder reading to hour angle in [0, 24), including the 6 h mount offset.
pub fn encoder_to_hours(state: &MountState, step: i64, zero: i64) -> f64 {
    let total = state.steps_per_rev() as f64;
    let base = if step > zero {
        24.0 - (step - zero) as f64 / total * 24.0
    } else {
        (zero - step) as f64 / total * 24.0
    };
    let hours = match state.hemisphere() {
        Hemisphere::North => range24(base + 6.0),
        Hemisphere::South => range24((24.0 - base) + 6.0),
    };
    trace!(step, zero, base, %hours, "RA encoder to hours");
    hours
}

/// DEC encoder reading to a ring angle in [0, 360), mirrored in the south.
pub fn encoder_to_degrees(state: &MountState, step: i64, zero: i64) -> f64 {
    let total = state.steps_per_rev() as f64;
    let base = if step > zero {
        (step - zero) as f64 / total * 360.0
    } else {
        360.0 - (zero - step) as f64 / total * 360.0
    };
    let degrees = match state.hemisphere() {
        Hemisphere::North => range360(base),
        Hemisphere::South => range360(360.0 - base),
    };
    trace!(step, zero, base, %degrees, "DEC encoder to degrees");
    degrees
}

/// Encoder readings to RA/DEC at the given instant.
pub fn encoders_to_radec(
    state: &MountState,
    ra_step: i64,
    dec_step: i64,
    now: DateTime<Utc>,
) -> RaDec {
    let lst = lst_hours(now, state.effective_observer().longitude);
    encoders_to_radec_at_lst(state, ra_step, dec_step, lst)
}

/// Encoder readings to RA/DEC for a known local sidereal time (hours).
pub fn encoders_to_radec_at_lst(state: &MountState, ra_step: i64, dec_step: i64, lst: f64) -> RaDec {
    let ha = encoder_to_hours(state, ra_step, state.zero_offset(Axis::RightAscension));
    let dec_raw = encoder_to_degrees(state, dec_step, state.zero_offset(Axis::Declination));

    let mut ra_hours = lst - ha;
    let flipped = match state.hemisphere() {
        Hemisphere::North => dec_raw > 90.0 && dec_raw <= 270.0,
        Hemisphere::South => dec_raw <= 90.0 || dec_raw > 270.0,
    };
    if flipped {
        ra_hours += match state.hemisphere() {
            Hemisphere::North => -12.0,
            Hemisphere::South => 12.0,
        };
    }

    let position = RaDec::new(range24(ra_hours) * 15.0, range_dec(dec_raw));
    trace!(
        ha = range_ha(ha),
        dec_raw,
        flipped,
        ra = position.ra,
        dec = position.dec,
        "encoders to RA/DEC"
    );
    position
}

/// Horizon coordinates to RA/DEC. Azimuth is measured from north through east.
pub fn altaz_to_radec(az: f64, alt: f64, latitude: f64, longitude: f64, now: DateTime<Utc>) -> RaDec {
    let az_rad = az.to_radians();
    let alt_rad = alt.to_radians();
    let lat_rad = latitude.to_radians();

    let sin_dec = alt_rad.sin() * lat_rad.sin() + alt_rad.cos() * lat_rad.cos() * az_rad.cos();
    let dec_rad = sin_dec.clamp(-1.0, 1.0).asin();

    let denominator = lat_rad.cos() * dec_rad.cos();
    let mut ha_rad = if denominator.abs() < f64::EPSILON {
        // At a pole or the observer's pole the hour angle is undefined
        0.0
    } else {
        ((alt_rad.sin() - lat_rad.sin() * dec_rad.sin()) / denominator)
            .clamp(-1.0, 1.0)
            .acos()
    };
    if az_rad.sin() > 0.0 {
        ha_rad = -ha_rad;
    }

    let lst_deg = lst_hours(now, longitude) * 15.0;
    let position = RaDec::new(range360(lst_deg - ha_rad.to_degrees()), dec_rad.to_degrees());
    trace!(az, alt, ra = position.ra, dec = position.dec, "alt/az to RA/DEC");
    position
}

/// Great-circle distance between two equatorial positions, in degrees.
pub fn angular_separation(a: RaDec, b: RaDec) -> f64 {
    let (ra1, dec1) = (a.ra.to_radians(), a.dec.to_radians());
    let (ra2, dec2) = (b.ra.to_radians(), b.dec.to_radians());
    let h = ((dec2 - dec1) / 2.0).sin().powi(2)
        + dec1.cos() * dec2.cos() * ((ra2 - ra1) / 2.0).sin().powi(2);
    (2.0 * h.sqrt().min(1.0).asin()).to_degrees()
}

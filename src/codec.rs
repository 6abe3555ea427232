//! Step-count and angle conversions, plus the two position encodings found in
//! SynScan firmware.
//!
//! Legacy firmware answers position and parameter queries with 6 hex digits in
//! little-endian byte order (`"00204E"` is `0x4E2000`). Newer firmware answers
//! position queries with a decimal-degree string such as `"123.456"`. Both
//! populations exist in the field, so [`decode_position`] tries the decimal form
//! first and only then falls back to hex.

use thiserror::Error;

use crate::constants::{DEFAULT_STEPS_PER_REV, STANDARD_STEPS_PER_REV};
use crate::transform::range360;
use crate::types::{clamp_dec, Axis};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("invalid hex length {0}, expected 6")]
    InvalidLength(usize),
    #[error("invalid hex digits in {0:?}")]
    InvalidHex(String),
    #[error("could not parse {0:?} as decimal degrees or hex steps")]
    Unparseable(String),
}

/// A decoded position reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionReading {
    Degrees(f64),
    Steps(u32),
}

/// Decode a 24-bit value sent as `LLMMHH` (low, middle, high byte).
pub fn decode_le_hex(s: &str) -> Result<u32, CodecError> {
    if s.len() != 6 {
        return Err(CodecError::InvalidLength(s.len()));
    }
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CodecError::InvalidHex(s.to_string()));
    }

    let byte = |i: usize| {
        u32::from_str_radix(&s[i..i + 2], 16).map_err(|_| CodecError::InvalidHex(s.to_string()))
    };
    let low = byte(0)?;
    let mid = byte(2)?;
    let high = byte(4)?;

    Ok((high << 16) | (mid << 8) | low)
}

/// Decode a little-endian hex parameter of 1 to 4 bytes (`LLMMHH..`).
///
/// Parameter replies such as steps-per-revolution can need more than 24 bits,
/// so this accepts any even length up to 8 digits.
pub fn decode_le_hex_param(s: &str) -> Result<u32, CodecError> {
    if s.is_empty() || s.len() % 2 == 1 || s.len() > 8 {
        return Err(CodecError::InvalidLength(s.len()));
    }
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CodecError::InvalidHex(s.to_string()));
    }

    let mut value = 0u32;
    for (i, start) in (0..s.len()).step_by(2).enumerate() {
        let byte = u32::from_str_radix(&s[start..start + 2], 16)
            .map_err(|_| CodecError::InvalidHex(s.to_string()))?;
        value |= byte << (8 * i);
    }
    Ok(value)
}

/// Encode the low 24 bits of `value` as `LLMMHH`.
pub fn encode_le_hex(value: u32) -> String {
    format!(
        "{:02X}{:02X}{:02X}",
        value & 0xFF,
        (value >> 8) & 0xFF,
        (value >> 16) & 0xFF
    )
}

/// Decode a position reply, decimal degrees first, legacy hex second.
pub fn decode_position(s: &str) -> Result<PositionReading, CodecError> {
    let s = s.trim();
    if let Some(degrees) = decode_degrees(s) {
        return Ok(PositionReading::Degrees(degrees));
    }
    decode_le_hex(s)
        .map(PositionReading::Steps)
        .map_err(|_| CodecError::Unparseable(s.to_string()))
}

/// Decimal-degree form only. Non-finite values are not positions.
pub fn decode_degrees(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|d| d.is_finite())
}

/// Outcome of checking the device-reported steps-per-revolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepsReconciliation {
    /// The device reported the value the firmware actually uses.
    Confirmed(u32),
    /// The device reported the standard constant, which this firmware family misreports.
    Overridden { reported: u32, used: u32 },
    /// The device reported something unrecognised; the current value is kept.
    Unrecognised { reported: u32, used: u32 },
}

impl StepsReconciliation {
    pub fn steps_per_rev(&self) -> u32 {
        match *self {
            StepsReconciliation::Confirmed(used)
            | StepsReconciliation::Overridden { used, .. }
            | StepsReconciliation::Unrecognised { used, .. } => used,
        }
    }
}

pub fn reconcile_steps_per_rev(reported: u32, current: u32) -> StepsReconciliation {
    match reported {
        DEFAULT_STEPS_PER_REV => StepsReconciliation::Confirmed(reported),
        STANDARD_STEPS_PER_REV => StepsReconciliation::Overridden {
            reported,
            used: current,
        },
        _ => StepsReconciliation::Unrecognised {
            reported,
            used: current,
        },
    }
}

/// Conversions parameterised by the device's steps-per-revolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionCodec {
    steps_per_rev: u32,
}

impl PositionCodec {
    /// `steps_per_rev` must be non-zero.
    pub fn new(steps_per_rev: u32) -> Self {
        debug_assert!(steps_per_rev > 0);
        PositionCodec { steps_per_rev }
    }

    pub fn steps_per_rev(&self) -> u32 {
        self.steps_per_rev
    }

    /// Degrees in [0, 360).
    pub fn steps_to_degrees(&self, steps: i64) -> f64 {
        let degrees = steps as f64 / self.steps_per_rev as f64 * 360.0;
        range360(degrees)
    }

    /// Steps in [0, steps_per_rev).
    pub fn degrees_to_steps(&self, degrees: f64) -> u32 {
        self.fraction_to_steps(degrees / 360.0)
    }

    /// Steps in [0, steps_per_rev) for an hour angle or right ascension in hours.
    pub fn hours_to_steps(&self, hours: f64) -> u32 {
        self.fraction_to_steps(hours / 24.0)
    }

    /// Step rate for a GOTO of one degree per second.
    pub fn goto_speed(&self) -> u32 {
        self.steps_per_rev / 360
    }

    /// Encoder steps for a reading. Decimal readings are estimated: RA wraps
    /// into one revolution, DEC is clamped to ±90° and keeps its sign.
    pub fn reading_to_steps(&self, reading: PositionReading, axis: Axis) -> i64 {
        match (reading, axis) {
            (PositionReading::Steps(steps), _) => steps as i64,
            (PositionReading::Degrees(deg), Axis::RightAscension) => {
                self.degrees_to_steps(range360(deg)) as i64
            }
            (PositionReading::Degrees(deg), Axis::Declination) => {
                (clamp_dec(deg) / 360.0 * self.steps_per_rev as f64) as i64
            }
        }
    }

    fn fraction_to_steps(&self, fraction: f64) -> u32 {
        let total = self.steps_per_rev as i64;
        let steps = (fraction * total as f64).round() as i64;
        steps.rem_euclid(total) as u32
    }
}

impl Default for PositionCodec {
    fn default() -> Self {
        PositionCodec::new(DEFAULT_STEPS_PER_REV)
    }
}

use crate::codec::PositionCodec;
use crate::constants::{DEFAULT_ELEVATION, DEFAULT_LATITUDE, DEFAULT_LONGITUDE};
use crate::types::{Axis, Hemisphere, Observer, RaDec};

/// Mount state owned by the controller.
///
/// The hemisphere is derived from the observer latitude and is recomputed every
/// time the observer changes.
#[derive(Debug, Clone)]
pub struct MountState {
    codec: PositionCodec,
    zero_ra: i64,
    zero_dec: i64,
    hemisphere: Hemisphere,
    observer: Option<Observer>,
    last_position: Option<RaDec>,
}

impl MountState {
    pub fn new() -> Self {
        MountState {
            codec: PositionCodec::default(),
            zero_ra: 0,
            zero_dec: 0,
            hemisphere: Hemisphere::North,
            observer: None,
            last_position: None,
        }
    }

    pub fn codec(&self) -> &PositionCodec {
        &self.codec
    }

    pub fn steps_per_rev(&self) -> u32 {
        self.codec.steps_per_rev()
    }

    /// Zero is rejected and leaves the current value in place.
    pub(crate) fn set_steps_per_rev(&mut self, steps_per_rev: u32) -> bool {
        if steps_per_rev == 0 {
            return false;
        }
        self.codec = PositionCodec::new(steps_per_rev);
        true
    }

    pub fn zero_offset(&self, axis: Axis) -> i64 {
        match axis {
            Axis::RightAscension => self.zero_ra,
            Axis::Declination => self.zero_dec,
        }
    }

    pub fn set_zero_offsets(&mut self, zero_ra: i64, zero_dec: i64) {
        self.zero_ra = zero_ra;
        self.zero_dec = zero_dec;
    }

    pub fn hemisphere(&self) -> Hemisphere {
        self.hemisphere
    }

    /// The configured observer, if any.
    pub fn observer(&self) -> Option<Observer> {
        self.observer
    }

    /// The configured observer, or the built-in default site.
    pub fn effective_observer(&self) -> Observer {
        self.observer.unwrap_or(Observer {
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            elevation: DEFAULT_ELEVATION,
        })
    }

    pub fn set_observer(&mut self, observer: Observer) {
        self.hemisphere = observer.hemisphere();
        self.observer = Some(observer);
    }

    pub fn last_position(&self) -> Option<RaDec> {
        self.last_position
    }

    pub(crate) fn record_position(&mut self, position: RaDec) {
        self.last_position = Some(position);
    }
}

impl Default for MountState {
    fn default() -> Self {
        MountState::new()
    }
}

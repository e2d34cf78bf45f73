use bytes::{Buf, BufMut};
use commonware_codec::{Error, FixedSize, Read, ReadExt, Write};
use std::fmt;

use super::HUNDREDTHS;

/// A payout multiplier with two decimal places, stored as hundredths (`250` = 2.50x).
///
/// Every multiplier that is published, compared against a crash point or applied
/// to a stake is a [Multiplier], so equality checks during verification are exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u64);

impl Multiplier {
    /// The starting multiplier of every flight.
    pub const ONE: Self = Self(HUNDREDTHS);

    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    pub const fn hundredths(self) -> u64 {
        self.0
    }

    /// Truncate a floating point multiplier to two decimal places.
    ///
    /// Negative and NaN values truncate to zero, infinity saturates.
    pub fn floor(value: f64) -> Self {
        Self((value * HUNDREDTHS as f64).floor() as u64)
    }

    /// Round a floating point multiplier to the nearest hundredth, halves away
    /// from zero.
    ///
    /// Negative and NaN values round to zero, infinity saturates.
    pub fn round(value: f64) -> Self {
        Self((value * HUNDREDTHS as f64).round() as u64)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / HUNDREDTHS as f64
    }

    /// Chips returned for `stake` at this multiplier, rounded to the nearest chip
    /// (half a chip rounds up).
    pub fn payout(self, stake: u64) -> u64 {
        let half = HUNDREDTHS as u128 / 2;
        let scaled = (stake as u128 * self.0 as u128 + half) / HUNDREDTHS as u128;
        scaled.min(u64::MAX as u128) as u64
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / HUNDREDTHS, self.0 % HUNDREDTHS)
    }
}

impl Write for Multiplier {
    fn write(&self, writer: &mut impl BufMut) {
        self.0.write(writer);
    }
}

impl Read for Multiplier {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self(u64::read(reader)?))
    }
}

impl FixedSize for Multiplier {
    const SIZE: usize = u64::SIZE;
}

//! Pool difficulty to 256-bit share target.
//!
//! `target = floor(MAX_TARGET / difficulty)` evaluated with exact integer
//! arithmetic. Approximating the quotient in 32 or 64 bits produces targets
//! the pool does not agree with, so every path here stays in `U256`/`U512`.

use crate::utils::error::MinerError;
use lazy_static::lazy_static;
use primitive_types::{U256, U512};
use std::fmt;

lazy_static! {
    /// Difficulty-1 target: `0x00000000FFFF0000...0000`.
    pub static ref MAX_TARGET: U256 = U256::from(0xFFFFu64) << 208usize;
}

/// A share target. Hashes whose little-endian value is `<=` the target win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Target(U256);

impl Target {
    /// Exact `floor(MAX_TARGET / difficulty)`.
    ///
    /// Integral difficulties divide directly. Fractional ones are decomposed
    /// into `mantissa * 2^exp` (exact for any `f64`) so the quotient is still
    /// computed without rounding. Results above `2^256 - 1` saturate.
    pub fn from_difficulty(difficulty: f64) -> Result<Self, MinerError> {
        if !difficulty.is_finite() || difficulty <= 0.0 {
            return Err(MinerError::ProtocolError(format!(
                "difficulty must be finite and > 0, got {}",
                difficulty
            )));
        }

        // `u64::MAX as f64` rounds up to 2^64, which must not take this path
        if difficulty.fract() == 0.0 && difficulty < u64::MAX as f64 {
            return Ok(Self::from_integer_difficulty(difficulty as u64));
        }

        let (mantissa, exp) = decompose(difficulty);
        let max = U512::from(*MAX_TARGET);
        let mantissa = U512::from(mantissa);

        let quotient = if exp >= 0 {
            // divisor wider than 256 bits: the quotient is zero
            if exp > 256 {
                return Ok(Target(U256::zero()));
            }
            max / (mantissa << exp as usize)
        } else {
            // MAX_TARGET * 2^257 / 2^53 is already past 2^256
            if -exp > 256 {
                return Ok(Target(U256::MAX));
            }
            (max << (-exp) as usize) / mantissa
        };

        Ok(Target(U256::try_from(quotient).unwrap_or(U256::MAX)))
    }

    /// `MAX_TARGET / difficulty` for a whole-number difficulty.
    pub fn from_integer_difficulty(difficulty: u64) -> Self {
        match MAX_TARGET.checked_div(U256::from(difficulty)) {
            Some(target) => Target(target),
            None => Target(*MAX_TARGET),
        }
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_big_endian()
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// Whether a SHA-256d digest satisfies this target.
    ///
    /// The digest is read as a little-endian integer, i.e. the display-order
    /// hash compared big-endian.
    #[inline]
    pub fn is_met_by(&self, hash: &[u8; 32]) -> bool {
        U256::from_little_endian(hash) <= self.0
    }
}

impl Default for Target {
    fn default() -> Self {
        Target(*MAX_TARGET)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_be_bytes()))
    }
}

/// Splits a positive finite `f64` into `(mantissa, exp)` with
/// `value == mantissa * 2^exp` exactly and an odd mantissa.
fn decompose(value: f64) -> (u64, i32) {
    let bits = value.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & 0x000f_ffff_ffff_ffff;

    let (mut mantissa, mut exp) = if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), biased - 1075)
    };

    let zeros = mantissa.trailing_zeros();
    mantissa >>= zeros;
    exp += zeros as i32;
    (mantissa, exp)
}

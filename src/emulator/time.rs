//! Virtual time.
//!
//! Every timestamp in the emulator is an integer count of ticks of a single
//! master clock running at `MAIN_FREQ`. There is no floating point on any
//! path that decides event order, so two runs fed the same input fire the
//! same sync points at the same ticks.

use std::cmp;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Rem, Sub, SubAssign};

/// Master frequency in Hz.
///
/// 3579545 Hz (the NTSC colour subcarrier) times 960, which is a common
/// multiple of every chip clock the machines need.
pub const MAIN_FREQ: u64 = 3_579_545 * 960;

/// A span of virtual time, in master clock ticks.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default,
         Serialize, Deserialize)]
pub struct EmuDuration(u64);

impl EmuDuration {
    pub fn zero() -> EmuDuration {
        EmuDuration(0)
    }

    /// "Never". Greater than every finite duration.
    pub fn infinity() -> EmuDuration {
        EmuDuration(u64::max_value())
    }

    pub fn from_ticks(ticks: u64) -> EmuDuration {
        EmuDuration(ticks)
    }

    pub fn sec(s: f64) -> EmuDuration {
        EmuDuration((s * MAIN_FREQ as f64) as u64)
    }

    pub fn msec(ms: u64) -> EmuDuration {
        EmuDuration::scaled(ms, 1_000)
    }

    pub fn usec(us: u64) -> EmuDuration {
        EmuDuration::scaled(us, 1_000_000)
    }

    /// Duration of one period at `freq` Hz, rounded down.
    ///
    /// A frequency of zero never ticks and yields `infinity()`.
    pub fn hz(freq: u64) -> EmuDuration {
        if freq == 0 {
            EmuDuration::infinity()
        } else {
            EmuDuration(MAIN_FREQ / freq)
        }
    }

    fn scaled(amount: u64, per_second: u64) -> EmuDuration {
        let ticks = amount as u128 * MAIN_FREQ as u128 / per_second as u128;
        EmuDuration(cmp::min(ticks, u64::max_value() as u128) as u64)
    }

    pub fn ticks(self) -> u64 {
        self.0
    }

    pub fn is_infinite(self) -> bool {
        self.0 == u64::max_value()
    }

    pub fn to_secs(self) -> f64 {
        self.0 as f64 / MAIN_FREQ as f64
    }

    /// Integer division rounding towards +infinity.
    pub fn div_up(self, n: u64) -> EmuDuration {
        if self.0 == 0 {
            self
        } else {
            EmuDuration((self.0 - 1) / n + 1)
        }
    }

    /// Ratio of two durations, if `other` is not zero and the ratio fits in
    /// 32 bits.
    pub fn checked_ratio(self, other: EmuDuration) -> Option<u32> {
        match self.0.checked_div(other.0) {
            Some(ratio) if ratio <= u32::max_value() as u64 => Some(ratio as u32),
            _ => None,
        }
    }

    pub fn ratio_f64(self, other: EmuDuration) -> f64 {
        self.0 as f64 / other.0 as f64
    }
}

impl fmt::Display for EmuDuration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "inf")
        } else {
            write!(f, "{}t", self.0)
        }
    }
}

impl Add for EmuDuration {
    type Output = EmuDuration;

    fn add(self, rhs: EmuDuration) -> EmuDuration {
        EmuDuration(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for EmuDuration {
    fn add_assign(&mut self, rhs: EmuDuration) {
        *self = *self + rhs;
    }
}

impl Sub for EmuDuration {
    type Output = EmuDuration;

    fn sub(self, rhs: EmuDuration) -> EmuDuration {
        EmuDuration(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for EmuDuration {
    fn sub_assign(&mut self, rhs: EmuDuration) {
        *self = *self - rhs;
    }
}

impl Mul<u64> for EmuDuration {
    type Output = EmuDuration;

    fn mul(self, rhs: u64) -> EmuDuration {
        EmuDuration(self.0.saturating_mul(rhs))
    }
}

impl Mul<f64> for EmuDuration {
    type Output = EmuDuration;

    fn mul(self, rhs: f64) -> EmuDuration {
        EmuDuration((self.0 as f64 * rhs) as u64)
    }
}

/// Rounds down; see `div_up` for the other direction.
impl Div<u64> for EmuDuration {
    type Output = EmuDuration;

    fn div(self, rhs: u64) -> EmuDuration {
        EmuDuration(self.0 / rhs)
    }
}

impl Div for EmuDuration {
    type Output = u64;

    fn div(self, rhs: EmuDuration) -> u64 {
        self.0 / rhs.0
    }
}

impl Rem for EmuDuration {
    type Output = EmuDuration;

    fn rem(self, rhs: EmuDuration) -> EmuDuration {
        EmuDuration(self.0 % rhs.0)
    }
}

/// An absolute point in virtual time.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default,
         Serialize, Deserialize)]
pub struct EmuTime(u64);

impl EmuTime {
    pub fn zero() -> EmuTime {
        EmuTime(0)
    }

    pub fn infinity() -> EmuTime {
        EmuTime(u64::max_value())
    }

    pub fn from_ticks(ticks: u64) -> EmuTime {
        EmuTime(ticks)
    }

    pub fn ticks(self) -> u64 {
        self.0
    }

    pub fn is_infinite(self) -> bool {
        self.0 == u64::max_value()
    }

    /// `self + d`, or `None` if the result is not a finite time.
    pub fn checked_add(self, d: EmuDuration) -> Option<EmuTime> {
        match self.0.checked_add(d.0) {
            Some(t) if t != u64::max_value() => Some(EmuTime(t)),
            _ => None,
        }
    }
}

impl fmt::Display for EmuTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "T=inf")
        } else {
            write!(f, "T={}", self.0)
        }
    }
}

/// Adding `EmuDuration::infinity()` gives `EmuTime::infinity()`. Finite
/// durations wrap modulo 2^64, so `t + d - d == t` for every finite `d`.
/// Use `checked_add` where running past the end of time matters.
impl Add<EmuDuration> for EmuTime {
    type Output = EmuTime;

    fn add(self, rhs: EmuDuration) -> EmuTime {
        if rhs.is_infinite() {
            EmuTime::infinity()
        } else {
            EmuTime(self.0.wrapping_add(rhs.0))
        }
    }
}

impl AddAssign<EmuDuration> for EmuTime {
    fn add_assign(&mut self, rhs: EmuDuration) {
        *self = *self + rhs;
    }
}

impl Sub<EmuDuration> for EmuTime {
    type Output = EmuTime;

    fn sub(self, rhs: EmuDuration) -> EmuTime {
        EmuTime(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign<EmuDuration> for EmuTime {
    fn sub_assign(&mut self, rhs: EmuDuration) {
        *self = *self - rhs;
    }
}

/// Time elapsed since `rhs`. Zero if `rhs` is later than `self`.
impl Sub for EmuTime {
    type Output = EmuDuration;

    fn sub(self, rhs: EmuTime) -> EmuDuration {
        EmuDuration(self.0.saturating_sub(rhs.0))
    }
}

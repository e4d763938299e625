use std::ops::{Add, AddAssign, Sub, Mul, Div};
use std::fmt;
use bigdecimal::{BigDecimal, FromPrimitive};
use serde::{Serialize, Serializer};

pub type Quanta = i128;

/// Simulation time, in fixed-point quanta.
/// Integer arithmetic keeps event ordering exact, whatever the magnitude of delays.
#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Default)]
pub struct Time(Quanta);

const TEN: Quanta = 10;

impl Time {
    pub const ONE_SECOND_BASE10: u32 = 15;
    pub const ONE_SECOND: Quanta = TEN.pow(Self::ONE_SECOND_BASE10);
    pub const MAX: Time = Time(Quanta::MAX / 4);

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn seconds(s: Quanta) -> Self {
        Self(s * Self::ONE_SECOND)
    }

    pub const fn millis(ms: Quanta) -> Self {
        Self(ms * TEN.pow(Self::ONE_SECOND_BASE10 - 3))
    }

    pub const fn micros(us: Quanta) -> Self {
        Self(us * TEN.pow(Self::ONE_SECOND_BASE10 - 6))
    }

    pub const fn nanos(ns: Quanta) -> Self {
        Self(ns * TEN.pow(Self::ONE_SECOND_BASE10 - 9))
    }

    /// Rounded to the nearest nanosecond, so that configuration values such as
    /// `0.05` land on the same instants as `Time::millis(50)`.
    pub fn from_secs_f64(s: f64) -> Self {
        Self::nanos((s * 1e9).round() as Quanta)
    }

    pub const fn quanta(&self) -> Quanta {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    fn as_seconds_dec(&self) -> Option<BigDecimal> {
        BigDecimal::from_i128(self.0).map(|q| q / Self::ONE_SECOND)
    }

    /// Lossy conversion for rate computations.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / Self::ONE_SECOND as f64
    }

    pub fn as_millis_f64(&self) -> f64 {
        self.as_secs_f64() * 1e3
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Time((self.0 - rhs.0).max(0))
    }

    /// Scale by a real factor, rounding to the nearest quantum.
    pub fn mul_f64(self, factor: f64) -> Self {
        Time((self.0 as f64 * factor).round() as Quanta)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.as_seconds_dec() {
            Some(s) => write!(f, "{}s", s.normalized()),
            None => write!(f, "{}s", self.as_secs_f64()),
        }
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

impl Add for Time {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Time(self.0 + rhs.0)
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Time {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Time(self.0 - rhs.0)
    }
}

impl Mul<Quanta> for Time {
    type Output = Self;
    fn mul(self, rhs: Quanta) -> Self::Output {
        Time(self.0 * rhs)
    }
}

impl Div<Quanta> for Time {
    type Output = Self;
    fn div(self, rhs: Quanta) -> Self::Output {
        Time(self.0 / rhs)
    }
}

pub type Bytes = u64;
pub type Bits = u64;

/// Bandwidth, in bits per second.
#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Default)]
pub struct Bw {
    bps: Bits
}

impl Bw {
    pub const ZERO: Bw = Bw { bps: 0 };

    pub const fn from_bits(bps: Bits) -> Bw {
        Bw {
            bps
        }
    }

    pub const fn from_mbits(mbps: u64) -> Bw {
        Self::from_bits(mbps * 1_000_000)
    }

    /// Rate at which `bytes` were moved over `interval`.
    pub fn from_bytes_over(bytes: Bytes, interval: Time) -> Bw {
        if interval.quanta() <= 0 {
            return Bw::ZERO;
        }
        let bps = bytes as Quanta * 8 * Time::ONE_SECOND / interval.quanta();
        Self::from_bits(bps.clamp(0, Bits::MAX as Quanta) as Bits)
    }

    pub fn bits_per_sec(&self) -> Bits {
        self.bps
    }

    pub fn bytes_per_sec(&self) -> f64 {
        self.bps as f64 / 8.
    }

    pub fn is_zero(&self) -> bool {
        self.bps == 0
    }

    /// Serialization delay of `bytes` at this rate.
    pub fn bytes_tx_time(&self, bytes: Bytes) -> Time {
        if self.bps == 0 {
            return Time::MAX;
        }
        Time(Time::ONE_SECOND * bytes as Quanta * 8 / self.bps as Quanta)
    }

    /// Bytes moved at this rate during `interval`.
    pub fn bytes_in(&self, interval: Time) -> Bytes {
        let bytes = self.bps as Quanta * interval.quanta() / (8 * Time::ONE_SECOND);
        bytes.max(0) as Bytes
    }

    pub fn scale(&self, gain: f64) -> Bw {
        Self::from_bits((self.bps as f64 * gain).round() as Bits)
    }
}

impl fmt::Display for Bw {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.3}Mbps", self.bps as f64 / 1e6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units() {
        assert_eq!(Time::seconds(1), Time::millis(1000));
        assert_eq!(Time::millis(1), Time::micros(1000));
        assert_eq!(Time::micros(1), Time::nanos(1000));
        assert_eq!(Time::from_secs_f64(0.05), Time::millis(50));
        assert_eq!(Time::millis(1500).to_string(), "1.5s");
    }

    #[test]
    fn tx_time() {
        // 1250 bytes = 10_000 bits, 1ms at 10Mbps
        let bw = Bw::from_mbits(10);
        assert_eq!(bw.bytes_tx_time(1250), Time::millis(1));
        assert_eq!(bw.bytes_in(Time::millis(1)), 1250);
        assert_eq!(Bw::from_bytes_over(1250, Time::millis(1)), bw);
        assert_eq!(Bw::ZERO.bytes_tx_time(1), Time::MAX);
    }
}

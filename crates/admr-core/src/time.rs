//! Exact rational times for block format timing
//!
//! Block format rtimes and durations are exact rationals so that repeated
//! additions and conversions to sample counts cannot drift. Sample positions
//! derived from these are also rationals, rounded only at the final step.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// An exact non-negative rational time in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawTime")]
pub struct Time {
    num: i64,
    den: i64,
}

#[derive(Deserialize)]
struct RawTime {
    num: i64,
    den: i64,
}

impl TryFrom<RawTime> for Time {
    type Error = String;

    fn try_from(raw: RawTime) -> Result<Self, Self::Error> {
        if raw.den == 0 {
            return Err("zero denominator in time value".into());
        }
        Ok(Time::new(raw.num, raw.den))
    }
}

impl Time {
    pub const ZERO: Time = Time { num: 0, den: 1 };

    /// Create a time of `num / den` seconds.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "zero denominator");
        Self { num, den }.reduced()
    }

    /// A whole number of seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        Self { num: seconds, den: 1 }
    }

    /// A time specified in integer milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self::new(millis, 1000)
    }

    /// A whole number of samples at a given rate.
    pub fn from_samples(samples: i64, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate as i64)
    }

    fn reduced(self) -> Self {
        let sign = if self.den < 0 { -1 } else { 1 };
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs()) as i64;
        Self {
            num: sign * self.num / g,
            den: sign * self.den / g,
        }
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// The exact fractional sample index of this time at a given rate.
    pub fn to_fractional_samples(self, sample_rate: u32) -> Time {
        self * Time::from_seconds(sample_rate as i64)
    }

    /// Smallest integer not less than this time.
    pub fn ceil(self) -> i64 {
        let q = self.num.div_euclid(self.den);
        if self.num.rem_euclid(self.den) == 0 {
            q
        } else {
            q + 1
        }
    }

    pub fn is_zero(self) -> bool {
        self.num == 0
    }

    pub fn is_negative(self) -> bool {
        self.num < 0
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

impl Add for Time {
    type Output = Time;
    fn add(self, rhs: Time) -> Time {
        Time {
            num: self.num * rhs.den + rhs.num * self.den,
            den: self.den * rhs.den,
        }
        .reduced()
    }
}

impl Sub for Time {
    type Output = Time;
    fn sub(self, rhs: Time) -> Time {
        Time {
            num: self.num * rhs.den - rhs.num * self.den,
            den: self.den * rhs.den,
        }
        .reduced()
    }
}

impl Mul for Time {
    type Output = Time;
    fn mul(self, rhs: Time) -> Time {
        Time {
            num: self.num * rhs.num,
            den: self.den * rhs.den,
        }
        .reduced()
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Time) -> bool {
        self.num * other.den == other.num * self.den
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Time) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Time) -> Ordering {
        // denominators are kept positive by reduced()
        (self.num * other.den).cmp(&(other.num * self.den))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}s", self.num)
        } else {
            write!(f, "{}/{}s", self.num, self.den)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduction() {
        assert_eq!(Time::new(2, 4), Time::new(1, 2));
        assert_eq!(Time::new(-2, -4), Time::new(1, 2));
        assert_eq!(Time::new(1, -2), Time::new(-1, 2));
    }

    #[test]
    fn test_arithmetic() {
        let half = Time::new(1, 2);
        let third = Time::new(1, 3);
        assert_eq!(half + third, Time::new(5, 6));
        assert_eq!(half - third, Time::new(1, 6));
        assert_eq!(half * third, Time::new(1, 6));
    }

    #[test]
    fn test_ordering() {
        assert!(Time::new(1, 2) < Time::new(2, 3));
        assert!(Time::new(3, 6) == Time::new(1, 2));
        assert!(Time::new(-1, 2).is_negative());
    }

    #[test]
    fn test_samples() {
        // half a second at 48k is exactly 24000 samples
        let t = Time::new(1, 2).to_fractional_samples(48000);
        assert_eq!(t.ceil(), 24000);

        // a third of a second at 44.1k rounds up
        let t = Time::new(1, 3).to_fractional_samples(44100);
        assert_eq!(t.ceil(), 14700);
        let t = Time::new(1, 7).to_fractional_samples(48000);
        assert_eq!(t.ceil(), 6858); // 48000/7 = 6857.14...
    }
}

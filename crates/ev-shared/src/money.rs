//! Fixed-point money, per the station's rule that stored costs are never
//! binary floats.
//!
//! `Cents` carries whole cents. Tariff math is done in `f64` kWh/hours (the
//! domain genuinely is continuous) and only rounded to cents at the last
//! step, via [`Cents::from_fractional`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    /// Rounds a fractional currency amount (e.g. `12.345`) to the nearest
    /// cent, half-away-from-zero.
    #[must_use]
    pub fn from_fractional(amount: f64) -> Self {
        Self((amount * 100.0).round() as i64)
    }

    #[must_use]
    pub fn as_fractional(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Add for Cents {
    type Output = Cents;

    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(Cents::from_fractional(30.005).0, 3001);
        assert_eq!(Cents::from_fractional(24.0).0, 2400);
    }

    #[test]
    fn sums_to_exact_total() {
        let energy = Cents::from_fractional(30.0);
        let service = Cents::from_fractional(24.0);
        assert_eq!((energy + service).to_string(), "54.00");
    }

    #[test]
    fn display_pads_cents() {
        assert_eq!(Cents(5).to_string(), "0.05");
        assert_eq!(Cents(100).to_string(), "1.00");
    }
}

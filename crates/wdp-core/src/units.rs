//! Compile-time unit safety for hydraulic and monetary quantities.
//!
//! Prevents mixing incompatible units like meters and millimeters, or daily
//! demand volumes and tank volumes.
//!
//! # Design Philosophy
//!
//! Network planning mixes many physical quantities with specific units:
//! - Pipe lengths (m) and diameters (mm)
//! - Water demand (m³/day) and tank capacity (m³)
//! - Flow speeds (m/s)
//! - Construction cost (€)
//!
//! Using raw `f64` values throughout makes it easy to accidentally feed a
//! diameter where a length is expected, or a daily volume where a tank
//! capacity is expected. This module provides newtype wrappers that catch
//! such errors at compile time.
//!
//! # Zero Runtime Overhead
//!
//! All types use `#[repr(transparent)]` ensuring they have the same memory
//! layout as `f64`. The compiler optimizes away all wrapper overhead.
//!
//! # Usage
//!
//! ```
//! use wdp_core::units::{Meters, CubicMetersPerDay};
//!
//! let l = Meters(100.0);
//! let total = l + Meters(50.0);
//!
//! // This would NOT compile - different units
//! // let wrong = l + CubicMetersPerDay(10.0);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Macro to implement common arithmetic operations for unit types
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Mul<$type> for f64 {
            type Output = $type;
            fn mul(self, rhs: $type) -> Self::Output {
                <$type>::new(self * rhs.0)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl Div<$type> for $type {
            type Output = f64;
            fn div(self, rhs: $type) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Absolute value
            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            /// Check if value is finite
            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            /// Minimum of two values
            #[inline]
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            /// Maximum of two values
            #[inline]
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }

        impl<'a> std::iter::Sum<&'a $type> for $type {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

// =============================================================================
// Lengths
// =============================================================================

/// Length in meters (m)
///
/// Used for pipe lengths, elevations, and pressure heads.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Meters(pub f64);

impl_unit_ops!(Meters, "m");

impl Meters {
    /// Convert to kilometers (for per-km failure rates)
    #[inline]
    pub fn to_kilometers(self) -> f64 {
        self.0 / 1000.0
    }
}

/// Length in millimeters (mm)
///
/// Used for pipe and valve diameters and wall thickness, matching the
/// catalogue units.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Millimeters(pub f64);

impl_unit_ops!(Millimeters, "mm");

impl Millimeters {
    /// Convert to meters (for speed computations)
    #[inline]
    pub fn to_meters(self) -> Meters {
        Meters(self.0 / 1000.0)
    }
}

// =============================================================================
// Volumes and flows
// =============================================================================

/// Water volume per day (m³/day)
///
/// The native unit of demand and pipe flow in the planning model; converted
/// to m³/s only inside speed/diameter formulas.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CubicMetersPerDay(pub f64);

impl_unit_ops!(CubicMetersPerDay, "m3/day");

impl CubicMetersPerDay {
    /// Seconds in a day, the conversion constant between daily volume and flow rate.
    pub const SECONDS_PER_DAY: f64 = 86_400.0;

    /// Convert to a flow rate in m³/s
    #[inline]
    pub fn to_cubic_meters_per_second(self) -> f64 {
        self.0 / Self::SECONDS_PER_DAY
    }
}

/// Water volume (m³)
///
/// Used for tank capacities.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CubicMeters(pub f64);

impl_unit_ops!(CubicMeters, "m3");

/// Flow speed (m/s)
///
/// Used for the hydraulic speed band constraints.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MetersPerSecond(pub f64);

impl_unit_ops!(MetersPerSecond, "m/s");

// =============================================================================
// Money
// =============================================================================

/// Construction cost in euros (€)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Euros(pub f64);

impl_unit_ops!(Euros, "EUR");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_unit_arithmetic() {
        let total = Meters(100.0) + Meters(50.0);
        assert_eq!(total.value(), 150.0);

        let scaled = Euros(71.91) * 300.0;
        assert!((scaled.value() - 21_573.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_ratio_is_dimensionless() {
        let ratio = Meters(300.0) / Meters(100.0);
        assert_eq!(ratio, 3.0);
    }

    #[test]
    fn test_flow_conversion() {
        let daily = CubicMetersPerDay(86_400.0);
        assert!((daily.to_cubic_meters_per_second() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_diameter_conversion() {
        assert_eq!(Millimeters(630.0).to_meters().value(), 0.63);
    }

    #[test]
    fn test_sum_over_iter() {
        let lengths = [Meters(100.0), Meters(100.0), Meters(100.0)];
        let total: Meters = lengths.iter().sum();
        assert_eq!(total.value(), 300.0);
    }
}

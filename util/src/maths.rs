//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Clamp a value between `min` and `max`.
///
/// NaN is passed through unchanged.
pub fn clamp<T>(value: T, min: T, max: T) -> T 
where
    T: Float
{
    if value > max {
        max
    }
    else if value < min {
        min
    }
    else {
        value
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// `num_traits::Float` lacks `rem_euclid`, this mirrors the std version.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap an angle into the range (-pi, pi].
pub fn wrap_pi<T>(angle: T) -> T
where
    T: Float + FloatConst
{
    let two_pi = T::PI() + T::PI();
    let wrapped = rem_euclid(angle + T::PI(), two_pi) - T::PI();

    // rem_euclid maps +pi onto -pi, keep the half-open range closed at +pi
    if wrapped <= -T::PI() {
        wrapped + two_pi
    }
    else {
        wrapped
    }
}

/// Get the shortest signed angular distance from `from` to `to`.
///
/// The result is in (-pi, pi], so that `from + dist == to` modulo a full
/// turn.
pub fn get_ang_dist<T>(from: T, to: T) -> T
where
    T: Float + FloatConst
{
    wrap_pi(to - from)
}

/// Apply a symmetric deadband, values with magnitude below `band` map to zero.
pub fn deadband<T>(value: T, band: T) -> T
where
    T: Float
{
    if value.abs() < band {
        T::zero()
    }
    else {
        value
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_wrap_pi() {
        assert_abs_diff_eq!(wrap_pi(0.0f64), 0.0);
        assert_abs_diff_eq!(wrap_pi(PI), PI);
        assert_abs_diff_eq!(wrap_pi(-PI), PI);
        assert_abs_diff_eq!(wrap_pi(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_pi(-5.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_pi(7.0 * PI), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_get_ang_dist() {
        assert_abs_diff_eq!(get_ang_dist(1.0f64, 2.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(get_ang_dist(2.0f64, 1.0), -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(get_ang_dist(0.1f64, 2.0 * PI - 0.1), -0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(get_ang_dist(-3.0f64, 3.0), 6.0 - 2.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn test_clamp_and_deadband() {
        assert_eq!(clamp(0.5f64, -0.3, 0.3), 0.3);
        assert_eq!(clamp(-0.5f64, -0.3, 0.3), -0.3);
        assert_eq!(clamp(0.1f64, -0.3, 0.3), 0.1);
        assert!(clamp(f64::NAN, -1.0, 1.0).is_nan());

        assert_eq!(deadband(0.005f64, 0.01), 0.0);
        assert_eq!(deadband(-0.02f64, 0.01), -0.02);
    }
}

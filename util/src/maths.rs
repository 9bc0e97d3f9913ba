//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
/// This result is not an element of the function's codomain, but it is the
/// closest floating point number in the real numbers and thus fulfills the
/// property `self == self.div_euclid(rhs) * rhs + self.rem_euclid(rhs)`
/// approximatively.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap an angle in degrees into `[0, 360)`.
///
/// Unlike a bare `rem_euclid` this never returns `360`, see the round-off note
/// on [`rem_euclid`].
pub fn wrap_deg_360<T>(value_deg: T) -> T
where
    T: Float
{
    let full_turn = match T::from(360.0) {
        Some(t) => t,
        None => return value_deg
    };

    let r = rem_euclid(value_deg, full_turn);

    if r >= full_turn {
        T::zero()
    }
    else {
        r
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wrap_deg_360() {
        assert_eq!(wrap_deg_360(0f64), 0f64);
        assert_eq!(wrap_deg_360(360f64), 0f64);
        assert_eq!(wrap_deg_360(-90f64), 270f64);
        assert_eq!(wrap_deg_360(725f64), 5f64);
        assert_eq!(wrap_deg_360(-1e-17f64), 0f64);

        for a in &[-1e-12f64, -720.5, 359.999_999, 1e6, -1e6] {
            let w = wrap_deg_360(*a);
            assert!(w >= 0.0 && w < 360.0, "{} wrapped to {}", a, w);
        }
    }
}

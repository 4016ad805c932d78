//! Acoustic primitives: point-source attenuation and decibel addition.

/// `ln(10) / 10`, the factor turning a decibel level into a natural exponent.
pub const LN10_DIV_10: f64 = std::f64::consts::LN_10 / 10.0;

/// Smallest squared slant distance used under the logarithm (1 m reference).
pub const MIN_SLANT_DISTANCE_SQ_M2: f64 = 1.0;

/// Level received on the ground from a drone emitting `source_db`.
///
/// `horizontal_sq_m2` is the squared horizontal distance between the drone and
/// the receiver and `altitude_m` the drone's height above it:
/// `L = Ns - 10·log10(d² + z²)`.
#[inline(always)]
pub fn received_level(source_db: f64, horizontal_sq_m2: f64, altitude_m: f64) -> f64 {
    let slant_sq = (horizontal_sq_m2 + altitude_m * altitude_m).max(MIN_SLANT_DISTANCE_SQ_M2);
    source_db - 10.0 * slant_sq.log10()
}

/// Sound intensity ratio of a decibel level, `10^(L/10)`.
#[inline(always)]
pub fn db_to_intensity(level_db: f64) -> f64 {
    (level_db * LN10_DIV_10).exp()
}

/// Decibel level of an intensity ratio, `10·log10(I)`.
#[inline(always)]
pub fn intensity_to_db(intensity: f64) -> f64 {
    10.0 * intensity.log10()
}

/// Decibel sum of a set of levels. An empty set sums to 0 dB.
pub fn db_sum(levels: &[f64]) -> f64 {
    if levels.is_empty() {
        return 0.0;
    }
    let total: f64 = levels.iter().map(|level| db_to_intensity(*level)).sum();
    intensity_to_db(total)
}

/// Decibel sum of two levels.
#[inline]
pub fn db_add(a: f64, b: f64) -> f64 {
    intensity_to_db(db_to_intensity(a) + db_to_intensity(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_level_directly_overhead() {
        // 90 dB source, 100 m straight up: 90 - 10·log10(10^4) = 50
        let level = received_level(90.0, 0.0, 100.0);
        assert!((level - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_received_level_decreases_with_distance() {
        let near = received_level(90.0, 100.0 * 100.0, 100.0);
        let far = received_level(90.0, 1000.0 * 1000.0, 100.0);
        assert!(near > far);
    }

    #[test]
    fn test_received_level_at_zero_distance_is_finite() {
        let level = received_level(90.0, 0.0, 0.0);
        assert!(level.is_finite());
        assert!((level - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_db_sum_two_equal_sources() {
        // Two 50 dB sources -> 10·log10(2·10^5) ≈ 53.0103
        let level = db_sum(&[50.0, 50.0]);
        assert!((level - 53.010_299_956_639_81).abs() < 1e-9);
    }

    #[test]
    fn test_db_sum_empty_is_zero() {
        assert_eq!(db_sum(&[]), 0.0);
    }

    #[test]
    fn test_db_add_baseline_and_drone() {
        let combined = db_add(60.0, 50.0);
        assert!((combined - 60.413_926_851_582_25).abs() < 1e-9);
    }
}

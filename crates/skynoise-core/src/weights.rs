//! Edge cost functions for the navigation graph.
//!
//! Every function here is pure over an edge's `(distance, noise)` pair. The
//! value handed to the shortest-path search always goes through
//! [`safe_weight`], so the search only ever sees finite, non-negative costs.

use std::fmt;
use std::sync::Arc;

/// Attributes of one navigation edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeAttrs {
    /// Geometric length in metres
    pub distance: f64,
    /// Mean baseline level of the two endpoints, dB
    pub noise: f64,
}

/// Graph-wide node noise range used to normalise the mixed weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseStats {
    pub min: f64,
    pub range: f64,
}

impl NoiseStats {
    /// Min and range of `levels`. An empty set, or a zero/non-finite range,
    /// yields a range of 1.
    pub fn from_levels(levels: &[f64]) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for level in levels.iter().copied().filter(|l| l.is_finite()) {
            min = min.min(level);
            max = max.max(level);
        }
        if !min.is_finite() {
            return Self { min: 0.0, range: 1.0 };
        }
        let range = max - min;
        let range = if range.is_finite() && range > 0.0 { range } else { 1.0 };
        Self { min, range }
    }
}

/// Clamp a raw cost into `[0, +inf)`; NaN, infinities and negatives become 0.
#[inline(always)]
pub fn safe_weight(raw: f64) -> f64 {
    if raw.is_finite() && raw >= 0.0 {
        raw
    } else {
        0.0
    }
}

/// `distance / noise`, degrading to `distance` when noise is not positive.
#[inline]
pub fn noise_favoured(edge: EdgeAttrs) -> f64 {
    if edge.noise <= 0.0 {
        edge.distance
    } else {
        edge.distance / edge.noise
    }
}

/// Parameters of the blended distance/noise cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixedWeight {
    /// Share of the cost attributed to noise, in `[0, 1]`
    pub alpha: f64,
    /// Prefer quiet corridors instead of loud ones
    pub lower_is_better: bool,
    /// Navigation cell size used to normalise distance
    pub cell_size_m: f64,
    pub stats: NoiseStats,
}

impl MixedWeight {
    pub fn new(alpha: f64, lower_is_better: bool, cell_size_m: f64, stats: NoiseStats) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            lower_is_better,
            cell_size_m,
            stats,
        }
    }

    /// `(1-α)·(d/C) + α·(1 - norm)` or, quiet-preferring, `α·norm`.
    #[inline]
    pub fn raw(&self, edge: EdgeAttrs) -> f64 {
        let norm = ((edge.noise - self.stats.min) / self.stats.range).clamp(0.0, 1.0);
        let noise_term = if self.lower_is_better { norm } else { 1.0 - norm };
        (1.0 - self.alpha) * (edge.distance / self.cell_size_m) + self.alpha * noise_term
    }

    pub fn weight_id(&self) -> String {
        format!(
            "mixed_a{:03}_{}",
            (self.alpha * 100.0).round() as u32,
            if self.lower_is_better { "lo" } else { "hi" }
        )
    }
}

/// A caller-supplied cost. Without an `id` the warehouse cache is disabled.
#[derive(Clone)]
pub struct CustomWeight {
    pub id: Option<String>,
    pub func: Arc<dyn Fn(EdgeAttrs) -> f64 + Send + Sync>,
}

impl fmt::Debug for CustomWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomWeight").field("id", &self.id).finish()
    }
}

#[derive(Debug, Clone)]
pub enum WeightFn {
    /// Plain geometric length
    Distance,
    /// `distance / noise`; the default materialised weight
    NoiseFavoured,
    Mixed(MixedWeight),
    Custom(CustomWeight),
}

impl WeightFn {
    /// Unclamped cost of an edge.
    pub fn raw(&self, edge: EdgeAttrs) -> f64 {
        match self {
            WeightFn::Distance => edge.distance,
            WeightFn::NoiseFavoured => noise_favoured(edge),
            WeightFn::Mixed(mixed) => mixed.raw(edge),
            WeightFn::Custom(custom) => (custom.func)(edge),
        }
    }

    /// Clamped cost of an edge, safe for the shortest-path search.
    #[inline]
    pub fn weight(&self, edge: EdgeAttrs) -> f64 {
        safe_weight(self.raw(edge))
    }

    /// Identity used to partition the on-disk path cache.
    pub fn weight_id(&self) -> Option<String> {
        match self {
            WeightFn::Distance => Some("distance".to_string()),
            WeightFn::NoiseFavoured => Some("weight".to_string()),
            WeightFn::Mixed(mixed) => Some(mixed.weight_id()),
            WeightFn::Custom(custom) => custom.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const STATS: NoiseStats = NoiseStats { min: 40.0, range: 30.0 };

    #[test]
    fn test_noise_favoured_degrades_on_silent_edge() {
        let edge = EdgeAttrs { distance: 100.0, noise: 0.0 };
        assert_eq!(noise_favoured(edge), 100.0);
        let edge = EdgeAttrs { distance: 100.0, noise: 50.0 };
        assert_eq!(noise_favoured(edge), 2.0);
    }

    #[test]
    fn test_mixed_pure_distance_and_pure_noise() {
        let edge = EdgeAttrs { distance: 141.42, noise: 55.0 };
        let distance_only = MixedWeight::new(0.0, false, 100.0, STATS);
        assert!((distance_only.raw(edge) - 1.4142).abs() < 1e-12);

        let noise_only = MixedWeight::new(1.0, false, 100.0, STATS);
        assert!((noise_only.raw(edge) - 0.5).abs() < 1e-12);

        let quiet = MixedWeight::new(1.0, true, 100.0, STATS);
        let loud_edge = EdgeAttrs { distance: 100.0, noise: 70.0 };
        assert!((quiet.raw(loud_edge) - 1.0).abs() < 1e-12);
        assert!(noise_only.raw(loud_edge).abs() < 1e-12);
    }

    #[test]
    fn test_noise_stats_degenerate_ranges() {
        assert_eq!(NoiseStats::from_levels(&[]), NoiseStats { min: 0.0, range: 1.0 });
        assert_eq!(NoiseStats::from_levels(&[50.0, 50.0]), NoiseStats { min: 50.0, range: 1.0 });
        assert_eq!(NoiseStats::from_levels(&[40.0, 70.0]), STATS);
    }

    #[test]
    fn test_weight_ids() {
        assert_eq!(WeightFn::NoiseFavoured.weight_id().as_deref(), Some("weight"));
        let mixed = WeightFn::Mixed(MixedWeight::new(0.25, false, 100.0, STATS));
        assert_eq!(mixed.weight_id().as_deref(), Some("mixed_a025_hi"));
        let custom = WeightFn::Custom(CustomWeight { id: None, func: Arc::new(|e| e.distance) });
        assert_eq!(custom.weight_id(), None);
    }

    #[test]
    fn test_custom_weight_is_clamped() {
        let custom = WeightFn::Custom(CustomWeight {
            id: Some("negative".into()),
            func: Arc::new(|e| -e.distance),
        });
        assert_eq!(custom.weight(EdgeAttrs { distance: 5.0, noise: 1.0 }), 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn test_weights_are_finite_and_non_negative(
            distance in prop::num::f64::ANY,
            noise in prop::num::f64::ANY,
            alpha in 0.0f64..=1.0,
            lower in any::<bool>(),
        ) {
            let edge = EdgeAttrs { distance, noise };
            let fns = [
                WeightFn::Distance,
                WeightFn::NoiseFavoured,
                WeightFn::Mixed(MixedWeight::new(alpha, lower, 100.0, STATS)),
            ];
            for f in fns.iter() {
                let w = f.weight(edge);
                prop_assert!(w.is_finite(), "weight {} not finite", w);
                prop_assert!(w >= 0.0, "weight {} negative", w);
            }
        }
    }
}

//! Golden-ratio constants and the small set of pure functions derived from them.

/// The golden ratio.
pub const PHI: f64 = 1.618033988749895;
pub const PHI_INVERSE: f64 = PHI - 1.0;
pub const PHI_SQUARED: f64 = PHI + 1.0;

/// Fibonacci numbers up to 233, used by `fibonacci_weight` and batch metrics.
pub const FIBONACCI_PREFIX: [u64; 13] = [1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233];

/// Clamp `v` into `[lo, hi]`.
pub fn clip(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

/// The Fibonacci number nearest to `n`.
pub fn nearest_fibonacci(n: u64) -> u64 {
    FIBONACCI_PREFIX
        .iter()
        .copied()
        .min_by_key(|&f| (f as i64 - n as i64).abs())
        .unwrap_or(1)
}

/// Whether `n` appears exactly in the Fibonacci prefix.
pub fn is_fibonacci(n: u64) -> bool {
    FIBONACCI_PREFIX.contains(&n)
}

/// Phi value derived from three `[0,1]` consciousness-style metrics via
/// their geometric mean, scaled into `[1.0, PHI]`.
pub fn phi_value_from_metrics(emotional_depth: f64, cognitive_complexity: f64, self_awareness: f64) -> f64 {
    let product = emotional_depth * cognitive_complexity * self_awareness;
    if product <= 0.0 {
        return 1.0;
    }
    let geometric_mean = product.cbrt();
    1.0 + geometric_mean * PHI_INVERSE
}

/// Coherence in `[0,1]`: how close a computed phi value sits to the golden
/// ratio target.
pub fn phi_coherence(phi_value: f64) -> f64 {
    let distance = (phi_value - PHI).abs();
    1.0 - distance.min(1.0)
}

/// Weight in `(0, 1]`: 1.0 when `n` is an exact Fibonacci number, tapering
/// off with distance to the nearest one otherwise.
pub fn fibonacci_weight(n: u64) -> f64 {
    if is_fibonacci(n) {
        return 1.0;
    }
    let nearest = nearest_fibonacci(n);
    let distance = (n as i64 - nearest as i64).unsigned_abs() as f64;
    1.0 / (1.0 + distance / nearest.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phi_constants_relate_correctly() {
        assert!((PHI_INVERSE - (PHI - 1.0)).abs() < 1e-12);
        assert!((PHI_SQUARED - (PHI * PHI)).abs() < 1e-9);
    }

    #[test]
    fn clip_bounds() {
        assert_eq!(clip(-1.0, 0.0, 1.0), 0.0);
        assert_eq!(clip(2.0, 0.0, 1.0), 1.0);
        assert_eq!(clip(0.5, 0.0, 1.0), 0.5);
    }

    #[test]
    fn nearest_fibonacci_picks_closest() {
        assert_eq!(nearest_fibonacci(6), 5);
        assert_eq!(nearest_fibonacci(7), 8);
        assert_eq!(nearest_fibonacci(1), 1);
    }

    #[test]
    fn is_fibonacci_exact_members() {
        assert!(is_fibonacci(13));
        assert!(!is_fibonacci(12));
    }

    #[test]
    fn fibonacci_weight_exact_is_one() {
        assert_eq!(fibonacci_weight(21), 1.0);
    }

    #[test]
    fn fibonacci_weight_tapers_with_distance() {
        let w6 = fibonacci_weight(6);
        let w4 = fibonacci_weight(4);
        assert!(w6 < 1.0 && w6 > 0.0);
        assert!(w4 < 1.0 && w4 > 0.0);
    }
}

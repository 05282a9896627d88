//! Numeric guards for strengths and probabilities.
//!
//! Every stored strength lives in [0,1]. Arithmetic that produces NaN or
//! infinity is a recoverable fault: the value is reset to the owning
//! component's default and logged, never propagated.

use tracing::warn;

/// Clamp a finite value into [0,1]. Non-finite input maps to 0.0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Outcome of sanitizing a computed strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sanitized {
    pub value: f64,
    /// True when the input was NaN/∞ and had to be reset.
    pub recovered: bool,
}

/// Reset non-finite values to `default`, clamp the rest into [0,1].
///
/// `key` names the record for the log line.
pub fn sanitize_strength(value: f64, default: f64, key: &str) -> Sanitized {
    if value.is_finite() {
        Sanitized {
            value: value.clamp(0.0, 1.0),
            recovered: false,
        }
    } else {
        warn!(key, value, default, "non-finite strength reset to default");
        Sanitized {
            value: clamp_unit(default),
            recovered: true,
        }
    }
}

/// True when `value` is a finite number in [0,1].
pub fn is_unit(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// Incremental running mean: fold `sample` into `mean` over `count` prior samples.
pub fn running_mean(mean: f64, count: u64, sample: f64) -> f64 {
    let n = count as f64;
    (mean * n + sample) / (n + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn nan_resets_to_default() {
        let s = sanitize_strength(f64::NAN, 0.5, "vocab/ngl/casual_chat");
        assert!(s.recovered);
        assert_eq!(s.value, 0.5);
    }

    #[test]
    fn infinity_resets_to_default() {
        let s = sanitize_strength(f64::INFINITY, 0.0, "coact/a/b");
        assert!(s.recovered);
        assert_eq!(s.value, 0.0);
    }

    #[test]
    fn finite_values_are_clamped_not_reset() {
        let s = sanitize_strength(1.7, 0.5, "k");
        assert!(!s.recovered);
        assert_eq!(s.value, 1.0);
        assert_eq!(sanitize_strength(-0.2, 0.5, "k").value, 0.0);
    }

    #[test]
    fn running_mean_accumulates() {
        let m = running_mean(0.0, 0, 0.8);
        assert!((m - 0.8).abs() < 1e-12);
        let m = running_mean(m, 1, 0.4);
        assert!((m - 0.6).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn sanitized_values_are_always_unit(v in proptest::num::f64::ANY) {
            let s = sanitize_strength(v, 0.5, "prop");
            prop_assert!(is_unit(s.value));
        }
    }
}

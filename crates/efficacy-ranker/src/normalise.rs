//! Signal normalisation helpers.

/// Min-max normalisation within `[min_val, max_val]`, clamped to [0, 1].
pub fn minmax_normalise(value: f64, min_val: f64, max_val: f64) -> f64 {
    if (max_val - min_val).abs() < 1e-12 || value.is_nan() {
        return 0.0;
    }
    ((value - min_val) / (max_val - min_val)).clamp(0.0, 1.0)
}

/// Rescale a raw pathway dot-product against the observed maximum range.
pub fn rescale_pathway(s_path: f64, divisor: f64) -> f64 {
    minmax_normalise(s_path, 0.0, divisor)
}

/// Weighted dot product over shared keys; missing keys contribute zero.
pub fn weighted_dot<'a, I>(weights: I, values: &std::collections::BTreeMap<String, f64>) -> f64
where
    I: IntoIterator<Item = (&'a String, &'a f64)>,
{
    weights
        .into_iter()
        .map(|(k, w)| w * values.get(k).copied().unwrap_or(0.0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_rescale_pathway() {
        assert!((rescale_pathway(0.0025, 0.005) - 0.5).abs() < 1e-9);
        assert_eq!(rescale_pathway(0.3, 0.005), 1.0);
        assert_eq!(rescale_pathway(-0.1, 0.005), 0.0);
        assert_eq!(rescale_pathway(0.1, 0.0), 0.0);
    }

    #[test]
    fn test_weighted_dot_ignores_missing() {
        let weights: BTreeMap<String, f64> = [("ras_mapk".to_string(), 0.8), ("tp53".to_string(), 0.2)].into();
        let values: BTreeMap<String, f64> = [("ras_mapk".to_string(), 0.5)].into();
        assert!((weighted_dot(&weights, &values) - 0.4).abs() < 1e-9);
    }
}

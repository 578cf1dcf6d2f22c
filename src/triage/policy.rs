/// Pure business rules for the approval gate. The generator's own flag is
/// a hint; criticality and low confidence force approval regardless of
/// what the model reported.
pub fn needs_approval(
    generator_flag: bool,
    is_critical: bool,
    confidence: f64,
    confidence_threshold: f64,
) -> bool {
    generator_flag || is_critical || confidence < confidence_threshold
}

/// Criticality is derived from the probability, never stored independently.
pub fn is_critical(critical_prob: f64, critical_threshold: f64) -> bool {
    critical_prob >= critical_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_always_needs_approval() {
        assert!(needs_approval(false, true, 0.99, 0.7));
    }

    #[test]
    fn low_confidence_overrides_generator() {
        assert!(needs_approval(false, false, 0.69, 0.7));
    }

    #[test]
    fn generator_flag_is_honored_when_set() {
        assert!(needs_approval(true, false, 0.99, 0.7));
    }

    #[test]
    fn confident_non_critical_skips_approval() {
        assert!(!needs_approval(false, false, 0.7, 0.7));
        assert!(!needs_approval(false, false, 0.95, 0.7));
    }

    #[test]
    fn criticality_threshold_is_inclusive() {
        assert!(is_critical(0.5, 0.5));
        assert!(!is_critical(0.4999, 0.5));
    }
}

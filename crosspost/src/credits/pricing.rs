//! Static pricing: model-tier costs and currency conversion.

use tracing::warn;

/// Cost applied when a model tier is not in the table.
pub const DEFAULT_MODEL_COST: i64 = 20;

/// Credit cost per model tier.
///
/// Unknown tiers fall back to [`DEFAULT_MODEL_COST`]; pricing lookups never
/// fail on unrecognized input.
const MODEL_COSTS: &[(&str, i64)] = &[
    ("caption", 1),
    ("hashtag-set", 1),
    ("video-standard", 20),
    ("video-pro", 80),
];

/// Credit cost of a paid action for a given model tier.
pub fn cost_of(model_tier: &str) -> i64 {
    let tier = model_tier.trim().to_ascii_lowercase();
    MODEL_COSTS
        .iter()
        .find(|(name, _)| *name == tier)
        .map(|(_, cost)| *cost)
        .unwrap_or(DEFAULT_MODEL_COST)
}

/// Convert a paid amount in minor currency units to credits.
///
/// Rounds to the nearest whole credit. A non-finite or negative result clamps
/// to 0 - that clamp is a safety net against malformed events, not a success
/// signal, so it is logged.
pub fn credits_for_amount(minor_units: i64, credits_per_currency_unit: u32) -> i64 {
    let credits = (minor_units as f64 / 100.0) * f64::from(credits_per_currency_unit);

    if !credits.is_finite() || credits < 0.0 {
        warn!(
            minor_units,
            credits_per_currency_unit, "Clamping invalid credit conversion to 0"
        );
        return 0;
    }

    credits.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tiers() {
        assert_eq!(cost_of("caption"), 1);
        assert_eq!(cost_of("video-pro"), 80);
        assert_eq!(cost_of("  Video-Standard "), 20);
    }

    #[test]
    fn test_unknown_tier_uses_default() {
        assert_eq!(cost_of("video-ultra-9000"), DEFAULT_MODEL_COST);
        assert_eq!(cost_of(""), DEFAULT_MODEL_COST);
    }

    #[test]
    fn test_conversion() {
        // $20.00 at 5 credits per unit -> 100 credits.
        assert_eq!(credits_for_amount(2000, 5), 100);
        // Rounds to nearest.
        assert_eq!(credits_for_amount(1010, 5), 51);
        assert_eq!(credits_for_amount(1009, 5), 50);
    }

    #[test]
    fn test_conversion_clamps_negative() {
        assert_eq!(credits_for_amount(-500, 5), 0);
    }
}

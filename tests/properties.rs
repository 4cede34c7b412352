//! Property-based tests using proptest.
//!
//! Invariants that hold for any rule set, image or call sequence.

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use campaignforge_core::brief::Rgb;
use campaignforge_core::compliance::{color_presence, ColorTolerance};
use campaignforge_core::legal::{CategoryRule, LegalRules, LegalScanner, Severity};
use campaignforge_core::{ManualClock, RateLimiter};

// ============================================================================
// Strategies
// ============================================================================

fn arb_words() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{0,5}", 0..4)
}

fn arb_message() -> impl Strategy<Value = String> {
    "[a-zA-Z ]{0,40}"
}

fn arb_image() -> impl Strategy<Value = image::RgbImage> {
    (1u32..12, 1u32..12).prop_flat_map(|(w, h)| {
        prop::collection::vec(any::<u8>(), (w * h * 3) as usize)
            .prop_map(move |raw| image::RgbImage::from_raw(w, h, raw).unwrap())
    })
}

// ============================================================================
// Legal scanner
// ============================================================================

proptest! {
    #[test]
    fn prop_blocked_iff_error_word_present(
        error_words in arb_words(),
        warning_words in arb_words(),
        original in arb_message(),
        translated in arb_message(),
    ) {
        let mut rules = BTreeMap::new();
        rules.insert(
            "blocking".to_string(),
            CategoryRule { severity: Severity::Error, words: error_words.clone() },
        );
        rules.insert(
            "advisory".to_string(),
            CategoryRule { severity: Severity::Warning, words: warning_words },
        );
        let scanner = LegalScanner::new(LegalRules(rules));

        let result = scanner.check(&original, &translated);
        let expected = error_words.iter().any(|w| {
            original.to_lowercase().contains(w) || translated.to_lowercase().contains(w)
        });

        prop_assert_eq!(result.blocked, expected);
        prop_assert_eq!(result.blocked, result.severity == Severity::Error);
        prop_assert_eq!(
            result.prohibited_words_found.is_empty(),
            result.severity == Severity::None
        );
    }
}

// ============================================================================
// Colour presence
// ============================================================================

proptest! {
    #[test]
    fn prop_presence_monotonic_in_shade_steps(
        img in arb_image(),
        target in any::<[u8; 3]>(),
        steps in 0u32..6,
    ) {
        let narrow = ColorTolerance { shade_steps: steps, ..ColorTolerance::default() };
        let wide = ColorTolerance { shade_steps: steps + 1, ..ColorTolerance::default() };

        let a = color_presence(&img, Rgb(target), &narrow);
        let b = color_presence(&img, Rgb(target), &wide);
        prop_assert!(a <= b, "{} > {}", a, b);
        prop_assert!((0.0..=1.0).contains(&b));
    }

    #[test]
    fn prop_presence_monotonic_in_distance(
        img in arb_image(),
        target in any::<[u8; 3]>(),
        distance in 0.0f64..120.0,
        extra in 0.0f64..60.0,
    ) {
        let near = ColorTolerance { distance, ..ColorTolerance::default() };
        let far = ColorTolerance { distance: distance + extra, ..ColorTolerance::default() };

        let a = color_presence(&img, Rgb(target), &near);
        let b = color_presence(&img, Rgb(target), &far);
        prop_assert!(a <= b, "{} > {}", a, b);
    }
}

// ============================================================================
// Quota
// ============================================================================

proptest! {
    #[test]
    fn prop_window_count_never_exceeds_limit(
        limit in 1u32..8,
        gaps in prop::collection::vec(0u64..90, 1..40),
    ) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::per_minute(limit, clock.clone());

        for gap in gaps {
            clock.advance(Duration::from_secs(gap));
            limiter.acquire();
            let state = limiter.snapshot();
            prop_assert!(state.count >= 1);
            prop_assert!(state.count <= limit);
        }
    }

    #[test]
    fn prop_back_to_back_calls_wait_whole_windows(limit in 1u32..8, calls in 1u32..40) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::per_minute(limit, clock.clone());

        for _ in 0..calls {
            limiter.acquire();
        }

        let windows = ((calls - 1) / limit) as u64;
        prop_assert_eq!(clock.elapsed(), Duration::from_secs(60 * windows));
    }
}

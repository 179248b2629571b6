use proptest::prelude::*;
use tko_tokens::{calculate_cache_hit_rate, calculate_savings, HeuristicTokenizer, TokenCounter, Tokenizer};

proptest! {
    #[test]
    fn cached_equals_uncached(s in ".{0,200}") {
        let counter = TokenCounter::new(1_000).unwrap();
        prop_assert_eq!(counter.count_cached(&s), counter.count_uncached(&s));
    }

    #[test]
    fn heuristic_is_bounded_by_length(s in ".{0,200}") {
        let n = HeuristicTokenizer.count_tokens(&s);
        prop_assert!(n * 4 >= s.len());
        prop_assert!(n <= s.len());
    }

    #[test]
    fn savings_add_back_up(original in 0u64..1_000_000, optimized in 0u64..1_000_000) {
        let s = calculate_savings(original, optimized);
        prop_assert_eq!(s.tokens_saved + optimized as i64, original as i64);
    }

    #[test]
    fn hit_rate_in_range(hits in 0u64..10_000, misses in 0u64..10_000) {
        let rate = calculate_cache_hit_rate(hits, misses);
        prop_assert!((0.0..=100.0).contains(&rate));
    }
}

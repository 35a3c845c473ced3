//! Token estimation
//!
//! Character heuristic: 1 token ≈ 4 characters of English text, with a
//! 10% upper bound used wherever a budget must never be exceeded.
//!
//! # Complexity
//! O(n) where n = text length

/// Token counter with heuristic-based estimation
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter;

impl TokenCounter {
    pub fn new() -> Self {
        Self
    }

    /// Estimate token count for text
    ///
    /// ```text
    /// estimate_tokens(text) = ⌈len(text) / 4⌉
    /// ```
    ///
    /// ```
    /// # use blogforge::context::TokenCounter;
    /// let counter = TokenCounter::new();
    /// assert_eq!(counter.estimate(&"a".repeat(100)), 25);
    /// ```
    pub fn estimate(&self, text: &str) -> usize {
        let char_count = text.chars().count();
        // Ceiling division to avoid underestimation
        (char_count + 3) / 4
    }

    /// Conservative upper bound (110% of estimate, rounded up)
    pub fn upper_bound(&self, text: &str) -> usize {
        let base_estimate = self.estimate(text);
        (base_estimate as f64 * 1.10).ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_estimation() {
        let counter = TokenCounter::new();
        assert_eq!(counter.estimate(&"a".repeat(100)), 25);
        assert_eq!(counter.estimate(""), 0);
        assert_eq!(counter.estimate("a"), 1);
    }

    #[test]
    fn test_upper_bound() {
        let counter = TokenCounter::new();
        // 25 × 1.10 = 27.5 → 28
        assert_eq!(counter.upper_bound(&"a".repeat(100)), 28);

        for length in [10, 50, 100, 500, 1000] {
            let text = "a".repeat(length);
            assert!(counter.upper_bound(&text) >= counter.estimate(&text));
        }
    }

    #[test]
    fn test_unicode_counts_chars() {
        let counter = TokenCounter::new();
        assert_eq!(counter.estimate("日本語"), 1);
        assert_eq!(counter.estimate("日本語日本語"), 2);
    }
}

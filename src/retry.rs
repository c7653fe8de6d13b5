//! Exponential backoff shared by connection setup and chunk submission.

use std::time::Duration;

/// Wait after failed attempt `attempt` (1-based): `base`, `2 * base`, `4 * base`, ...
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let base = Duration::from_secs(1);

        let waits: Vec<u64> = (1..=4).map(|a| backoff_delay(base, a).as_secs()).collect();

        assert_eq!(waits, vec![1, 2, 4, 8]);
    }

    #[test]
    fn test_zero_base_never_waits() {
        assert_eq!(backoff_delay(Duration::ZERO, 5), Duration::ZERO);
    }

    #[test]
    fn test_large_attempts_saturate() {
        assert_eq!(backoff_delay(Duration::from_secs(1), 200), Duration::MAX);
    }
}

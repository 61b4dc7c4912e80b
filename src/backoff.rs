//! backoff.rs - Block counter and escalating delay after anti-automation blocks

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Consecutive block signals seen by one resolver.
#[derive(Debug, Clone, Default)]
pub struct BackoffState {
    consecutive_blocks: u32,
    last_backoff_at: Option<Instant>,
}

impl BackoffState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a block and return the new streak length.
    pub fn record_block(&mut self) -> u32 {
        self.consecutive_blocks = self.consecutive_blocks.saturating_add(1);
        self.last_backoff_at = Some(Instant::now());
        self.consecutive_blocks
    }

    /// Any unblocked response ends the streak.
    pub fn reset(&mut self) {
        self.consecutive_blocks = 0;
    }

    pub fn consecutive_blocks(&self) -> u32 {
        self.consecutive_blocks
    }

    pub fn last_backoff_at(&self) -> Option<Instant> {
        self.last_backoff_at
    }
}

/// `2^min(blocks, cap_exponent)`
pub fn multiplier(blocks: u32, cap_exponent: u32) -> u32 {
    1u32 << blocks.min(cap_exponent).min(31)
}

/// Delay for a streak of `blocks`, given an already-drawn base delay.
pub fn backoff_delay(base: Duration, blocks: u32, cap_exponent: u32) -> Duration {
    base.saturating_mul(multiplier(blocks, cap_exponent))
}

/// Uniformly random duration in `[min, max]`, millisecond resolution.
pub fn random_between(min: Duration, max: Duration) -> Duration {
    let lo = min.as_millis() as u64;
    let hi = (max.as_millis() as u64).max(lo);
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_caps_at_sixteen() {
        let values: Vec<u32> = (0..8).map(|b| multiplier(b, 4)).collect();
        assert_eq!(values, vec![1, 2, 4, 8, 16, 16, 16, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalates_then_resets() {
        let base = Duration::from_secs(60);
        let mut state = BackoffState::new();
        let mut previous = Duration::ZERO;

        for _ in 0..6 {
            let blocks = state.record_block();
            let delay = backoff_delay(base, blocks, 4);
            assert!(delay >= previous);
            assert!(delay <= base * 16);
            previous = delay;
        }
        assert_eq!(previous, base * 16);
        assert!(state.last_backoff_at().is_some());

        state.reset();
        assert_eq!(state.consecutive_blocks(), 0);
        assert_eq!(backoff_delay(base, state.record_block(), 4), base * 2);
    }

    #[test]
    fn test_random_between_stays_in_window() {
        let min = Duration::from_millis(250);
        let max = Duration::from_millis(1250);
        for _ in 0..200 {
            let value = random_between(min, max);
            assert!(value >= min && value <= max);
        }
        assert_eq!(random_between(max, min), max);
    }
}

use crate::config::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Timestamp consistent with the server clock.
    Accept,
    /// Deviation registered; the move may still execute.
    Strike,
    /// Strike budget exhausted; the move must not execute until the
    /// rolling window resets.
    Reject,
}

/// Lightweight anti-tamper heuristic: client timestamps must track the
/// server wall clock up to a constant offset. Sustained deviation beyond
/// the configured tolerance accumulates strikes within a rolling window;
/// past the limit, moves are rejected until the window resets.
#[derive(Debug, Default)]
pub struct TimestampVerifier {
    strikes: u32,
    window_start: Option<f32>,
    base_offset: Option<f32>,
}

impl TimestampVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    pub fn check(&mut self, timestamp: f32, now: f32, config: &SyncConfig) -> Verdict {
        if !config.verify_client_timestamps {
            return Verdict::Accept;
        }

        match self.window_start {
            Some(start) if now - start < config.strike_reset_interval => {}
            _ => {
                self.window_start = Some(now);
                self.strikes = 0;
                self.base_offset = None;
            }
        }

        let offset = timestamp - now;
        let Some(base) = self.base_offset else {
            self.base_offset = Some(offset);
            return Verdict::Accept;
        };

        if (offset - base).abs() <= config.max_allowed_timestamp_deviation {
            return Verdict::Accept;
        }

        self.strikes += 1;
        if self.strikes > config.max_strike_count {
            log::warn!(
                "timestamp deviation strike {} exceeds limit {}, rejecting move at {:.3}",
                self.strikes,
                config.max_strike_count,
                timestamp
            );
            Verdict::Reject
        } else {
            log::warn!(
                "timestamp deviation strike {}/{} for move at {:.3}",
                self.strikes,
                config.max_strike_count,
                timestamp
            );
            Verdict::Strike
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.verify_client_timestamps = true;
        config.max_allowed_timestamp_deviation = 0.08;
        config.max_strike_count = 2;
        config.strike_reset_interval = 10.0;
        config
    }

    #[test]
    fn consistent_timestamps_accepted() {
        let config = config();
        let mut verifier = TimestampVerifier::new();
        // Constant offset between client and server clocks is fine.
        assert_eq!(verifier.check(1.00, 5.00, &config), Verdict::Accept);
        assert_eq!(verifier.check(1.05, 5.05, &config), Verdict::Accept);
        assert_eq!(verifier.check(1.11, 5.10, &config), Verdict::Accept);
        assert_eq!(verifier.strikes(), 0);
    }

    #[test]
    fn strikes_then_rejection_within_window() {
        let config = config();
        let mut verifier = TimestampVerifier::new();
        assert_eq!(verifier.check(1.00, 5.00, &config), Verdict::Accept);

        // Five manipulated moves claiming twice the elapsed time.
        let verdicts: Vec<Verdict> = (1..=5)
            .map(|i| {
                let claimed = 1.0 + i as f32 * 0.4;
                let now = 5.0 + i as f32 * 0.2;
                verifier.check(claimed, now, &config)
            })
            .collect();

        assert_eq!(
            verdicts,
            vec![
                Verdict::Strike,
                Verdict::Strike,
                Verdict::Reject,
                Verdict::Reject,
                Verdict::Reject
            ]
        );
    }

    #[test]
    fn window_reset_clears_strikes() {
        let config = config();
        let mut verifier = TimestampVerifier::new();
        assert_eq!(verifier.check(1.00, 5.00, &config), Verdict::Accept);
        assert_eq!(verifier.check(1.50, 5.10, &config), Verdict::Strike);

        // Past the reset interval everything starts over.
        assert_eq!(verifier.check(20.0, 16.0, &config), Verdict::Accept);
        assert_eq!(verifier.strikes(), 0);
    }

    #[test]
    fn disabled_verification_accepts_everything() {
        let mut config = config();
        config.verify_client_timestamps = false;
        let mut verifier = TimestampVerifier::new();
        assert_eq!(verifier.check(99.0, 1.0, &config), Verdict::Accept);
        assert_eq!(verifier.check(0.0, 50.0, &config), Verdict::Accept);
    }
}

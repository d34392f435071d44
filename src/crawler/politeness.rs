//! Randomized pacing between outbound requests

use crate::config::PolitenessConfig;
use crate::crawler::FetchResult;
use std::time::Duration;

/// How a fetch ended, as far as pacing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    /// Retries were exhausted on a transient error
    RetryableFailure,
    /// The server gave a definite answer that retrying won't change
    DefiniteNegative,
}

impl FetchOutcome {
    pub fn of(result: &FetchResult) -> Self {
        match result {
            FetchResult::Fetched(_) => FetchOutcome::Success,
            FetchResult::Rejected { .. } => FetchOutcome::DefiniteNegative,
            FetchResult::SoftFailure { .. } => FetchOutcome::RetryableFailure,
        }
    }
}

/// Inclusive delay band in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Band {
    min_ms: u64,
    max_ms: u64,
}

impl Band {
    fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    fn sample(&self) -> Duration {
        Duration::from_millis(rand::random_range(self.min_ms..=self.max_ms))
    }
}

/// Supplies the pause a worker takes after each unit of work
#[derive(Debug, Clone)]
pub struct PolitenessController {
    enabled: bool,
    success: Band,
    failure: Band,
}

impl PolitenessController {
    pub fn new(config: &PolitenessConfig) -> Self {
        Self {
            enabled: config.enabled,
            success: Band::new(config.success_min_ms, config.success_max_ms),
            failure: Band::new(config.failure_min_ms, config.failure_max_ms),
        }
    }

    /// A controller that never waits
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            success: Band::new(0, 0),
            failure: Band::new(0, 0),
        }
    }

    /// Returns the delay to apply after a fetch with the given outcome
    ///
    /// A definite negative never escalates to the failure band.
    pub fn delay(&self, outcome: FetchOutcome) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }

        match outcome {
            FetchOutcome::Success => self.success.sample(),
            FetchOutcome::RetryableFailure => self.failure.sample(),
            FetchOutcome::DefiniteNegative => Duration::ZERO,
        }
    }

    /// Sleeps for [`delay`](Self::delay)
    pub async fn pause(&self, outcome: FetchOutcome) {
        let delay = self.delay(outcome);
        if !delay.is_zero() {
            tracing::trace!("Sleeping {:?} after {:?}", delay, outcome);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> PolitenessController {
        PolitenessController::new(&PolitenessConfig::default())
    }

    #[test]
    fn test_success_delay_within_band() {
        let controller = controller();
        for _ in 0..100 {
            let delay = controller.delay(FetchOutcome::Success);
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay <= Duration::from_millis(1_500));
        }
    }

    #[test]
    fn test_retryable_failure_uses_failure_band() {
        let controller = controller();
        for _ in 0..100 {
            let delay = controller.delay(FetchOutcome::RetryableFailure);
            assert!(delay >= Duration::from_millis(3_000));
            assert!(delay <= Duration::from_millis(4_500));
        }
    }

    #[test]
    fn test_definite_negative_has_no_delay() {
        let controller = controller();
        for _ in 0..20 {
            assert_eq!(controller.delay(FetchOutcome::DefiniteNegative), Duration::ZERO);
        }
    }

    #[test]
    fn test_disabled_never_waits() {
        let controller = PolitenessController::disabled();
        assert_eq!(controller.delay(FetchOutcome::Success), Duration::ZERO);
        assert_eq!(controller.delay(FetchOutcome::RetryableFailure), Duration::ZERO);

        let config = PolitenessConfig {
            enabled: false,
            ..Default::default()
        };
        let controller = PolitenessController::new(&config);
        assert_eq!(controller.delay(FetchOutcome::RetryableFailure), Duration::ZERO);
    }

    #[test]
    fn test_outcome_of_fetch_result() {
        assert_eq!(
            FetchOutcome::of(&FetchResult::Rejected { status_code: 404 }),
            FetchOutcome::DefiniteNegative
        );
        assert_eq!(
            FetchOutcome::of(&FetchResult::SoftFailure {
                error: "timeout".to_string(),
                status_code: None,
                attempts: 3,
            }),
            FetchOutcome::RetryableFailure
        );
    }

    #[test]
    fn test_fixed_band() {
        let config = PolitenessConfig {
            success_min_ms: 5,
            success_max_ms: 5,
            ..Default::default()
        };
        let controller = PolitenessController::new(&config);
        assert_eq!(controller.delay(FetchOutcome::Success), Duration::from_millis(5));
    }
}

//! Reconnect pacing.
//!
//! The original design retried on a fixed delay, which synchronizes every
//! client's reconnect attempt after a server restart. We use bounded
//! exponential backoff with jitter instead: the first delay equals the
//! fixed baseline, consecutive failures double it up to a cap, and each
//! delay is stretched by up to 20% of random jitter.

use std::time::Duration;

use crate::env::Environment;

/// Backoff schedule for one class of retryable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on the un-jittered delay.
    pub cap: Duration,
}

impl RetryPolicy {
    /// Live-channel reconnects: 3s baseline, capped at 30s.
    pub const CHANNEL: Self =
        Self { base: Duration::from_secs(3), cap: Duration::from_secs(30) };

    /// Identity bootstrap retries: 5s baseline, capped at 30s.
    pub const IDENTITY: Self =
        Self { base: Duration::from_secs(5), cap: Duration::from_secs(30) };

    /// Delay before retry number `attempt` (1-based), with jitter.
    ///
    /// `attempt == 0` is treated as the first attempt. The jitter term adds
    /// up to 20% of the un-jittered delay, drawn from the environment so
    /// simulations stay reproducible.
    pub fn delay<E: Environment>(&self, attempt: u32, env: &E) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let scaled = self
            .base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.cap)
            .min(self.cap);

        let jitter_ceiling = scaled.as_millis() as u64 / 5;
        if jitter_ceiling == 0 {
            return scaled;
        }
        scaled + Duration::from_millis(env.random_u64() % jitter_ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct ZeroJitterEnv;

    impl Environment for ZeroJitterEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn unix_millis(&self) -> i64 {
            0
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0);
        }
    }

    #[test]
    fn first_attempt_uses_baseline() {
        let env = ZeroJitterEnv;
        assert_eq!(RetryPolicy::CHANNEL.delay(1, &env), Duration::from_secs(3));
        assert_eq!(RetryPolicy::IDENTITY.delay(1, &env), Duration::from_secs(5));
    }

    #[test]
    fn delay_doubles_then_caps() {
        let env = ZeroJitterEnv;
        let policy = RetryPolicy::CHANNEL;
        assert_eq!(policy.delay(2, &env), Duration::from_secs(6));
        assert_eq!(policy.delay(3, &env), Duration::from_secs(12));
        assert_eq!(policy.delay(4, &env), Duration::from_secs(24));
        assert_eq!(policy.delay(5, &env), Duration::from_secs(30));
        assert_eq!(policy.delay(30, &env), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_under_twenty_percent() {
        #[derive(Clone)]
        struct MaxJitterEnv;

        impl Environment for MaxJitterEnv {
            type Instant = std::time::Instant;

            fn now(&self) -> Self::Instant {
                std::time::Instant::now()
            }

            fn unix_millis(&self) -> i64 {
                0
            }

            fn sleep(
                &self,
                _duration: Duration,
            ) -> impl std::future::Future<Output = ()> + Send {
                async {}
            }

            fn random_bytes(&self, buffer: &mut [u8]) {
                buffer.fill(0xFF);
            }
        }

        let env = MaxJitterEnv;
        let delay = RetryPolicy::CHANNEL.delay(1, &env);
        assert!(delay >= Duration::from_secs(3));
        assert!(delay < Duration::from_millis(3600));
    }
}

//! Environment abstraction for deterministic testing.
//!
//! Decouples engine logic from system resources (time, randomness). Tests
//! drive a virtual clock and a seeded byte source; production uses the
//! system clock and OS entropy via [`SystemEnv`].

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// Implementations MUST guarantee that `now()` never goes backwards within a
/// single execution context, and that `random_bytes()` draws from a
/// cryptographically secure source in production (correlation tags must not
/// be guessable by other clients).
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production uses `std::time::Instant`; simulations may substitute a
    /// virtual clock as long as the bounds hold.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time as Unix milliseconds.
    ///
    /// Used only to stamp optimistic messages and draft saves; engine
    /// ordering decisions use [`Environment::now`].
    fn unix_millis(&self) -> i64;

    /// Sleep for the given duration.
    ///
    /// The only async method in the trait; used by drivers to execute timer
    /// actions, never by engine logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill the buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generate a random `u64`, for correlation tags and retry jitter.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production environment backed by the system clock and OS entropy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i64)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(buffer);
    }
}

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::model::DEFAULT_USER_AGENTS;

/// Source of randomness for user-agent rotation and settle delays.
/// Seed it in tests to make a run reproducible.
#[derive(Debug)]
pub struct Jitter {
    rng: Mutex<StdRng>,
}

impl Jitter {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        match self.rng.lock() {
            Ok(mut rng) => f(&mut rng),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn user_agent(&self, pool: &[String]) -> String {
        self.with_rng(|rng| pool.choose(rng).cloned())
            .unwrap_or_else(|| DEFAULT_USER_AGENTS[0].to_string())
    }

    /// Uniform delay in `[min_ms, max_ms]`.
    pub fn wait(&self, min_ms: u64, max_ms: u64) -> Duration {
        let (low, high) = if min_ms <= max_ms { (min_ms, max_ms) } else { (max_ms, min_ms) };
        Duration::from_millis(self.with_rng(|rng| rng.gen_range(low..=high)))
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::from_entropy()
    }
}

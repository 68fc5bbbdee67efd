//! Random sources for padding, cookies and ephemeral secrets.
//!
//! A single instance is normally shared by every key exchange and both
//! packet encoders of a connection (and often by many connections), so the
//! stateful generator sits behind a mutex.

use super::Random;
use rand::rngs::{OsRng, StdRng};
use rand::{CryptoRng, RngCore, SeedableRng};
use std::sync::Mutex;

/// Userspace CSPRNG shared behind a lock.
pub struct LockedRandom {
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for LockedRandom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedRandom").finish_non_exhaustive()
    }
}

impl LockedRandom {
    /// Seeds the generator from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for tests and reproducible traces.
    ///
    /// Never use a fixed seed for real connections.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for LockedRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl Random for LockedRandom {
    fn fill(&self, buf: &mut [u8]) {
        // Poisoning leaves the generator state usable.
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.fill_bytes(buf);
    }
}

/// Reads directly from the operating system generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl Random for OsRandom {
    fn fill(&self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

/// Adapts a [`Random`] to the `rand_core` traits expected by key generation
/// APIs.
pub struct RandomRng<'a>(pub &'a dyn Random);

impl RngCore for RandomRng<'_> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.0.fill(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.0.fill(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.fill(dest);
        Ok(())
    }
}

impl CryptoRng for RandomRng<'_> {}

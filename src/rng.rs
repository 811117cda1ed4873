//! Seeded determinism: every random draw goes through a single RNG seeded
//! by the orchestrator, so the same seed and inputs reproduce bit-identical
//! results.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Construct the single seeded RNG for a solve. Every call site that needs
/// a random draw (smart seeding, eigen tie-breaks) takes `&mut StdRng`
/// rather than reaching for thread-local randomness.
pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

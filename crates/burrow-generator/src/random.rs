use crate::{clamp_length, CodeGenerator, ALPHABET};
use burrow_core::ShortCode;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draws every character independently and uniformly from [`ALPHABET`].
///
/// By default each call uses the calling thread's RNG, so concurrent
/// callers share no state. [`RandomGenerator::seeded`] owns a deterministic
/// RNG instead, which makes collision scenarios reproducible in tests.
#[derive(Debug, Default)]
pub struct RandomGenerator {
    seeded: Option<Mutex<StdRng>>,
}

impl RandomGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator with its own RNG seeded from `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seeded: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }
}

fn draw<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect()
}

impl CodeGenerator for RandomGenerator {
    fn generate(&self, length: usize) -> ShortCode {
        let length = clamp_length(length);
        let code = match &self.seeded {
            Some(rng) => {
                let mut rng = rng.lock();
                draw(&mut *rng, length)
            }
            None => draw(&mut rand::rng(), length),
        };
        ShortCode::new_unchecked(code)
    }
}

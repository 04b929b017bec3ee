use crate::{clamp_length, CodeGenerator, ALPHABET};
use burrow_core::ShortCode;
use std::sync::atomic::{AtomicU64, Ordering};

const BASE: u64 = ALPHABET.len() as u64;

/// A short code generator backed by a monotonic counter.
///
/// Each call takes the next counter value, encodes it in base62 over
/// [`ALPHABET`] and left-pads it to the requested length with the zero digit.
/// Two calls on the same instance never return the same code until the
/// counter exceeds `62^length`, at which point only the low-order digits are
/// kept.
///
/// For several writers sharing one store, give each instance a disjoint
/// offset (e.g. node 1 starts at 0, node 2 at 1_000_000_000).
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    counter: AtomicU64,
}

impl Clone for SequenceGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
        }
    }
}

impl SequenceGenerator {
    /// Creates a generator starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator starting from a specific counter value.
    ///
    /// Useful for resuming from a known state or distributing counter ranges
    /// across nodes.
    pub fn with_offset(offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
        }
    }

    /// The value the next call to [`CodeGenerator::generate`] will encode.
    pub fn peek(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

fn encode(mut value: u64, length: usize) -> String {
    let mut digits = vec![ALPHABET[0]; length];
    for slot in digits.iter_mut().rev() {
        if value == 0 {
            break;
        }
        *slot = ALPHABET[(value % BASE) as usize];
        value /= BASE;
    }
    digits.into_iter().map(char::from).collect()
}

impl CodeGenerator for SequenceGenerator {
    fn generate(&self, length: usize) -> ShortCode {
        let value = self.counter.fetch_add(1, Ordering::SeqCst);
        ShortCode::new_unchecked(encode(value, clamp_length(length)))
    }
}

//! Short code generators.
//!
//! A generator produces candidate codes only. It never talks to storage or
//! the membership filter; the resolution service decides whether a candidate
//! is usable.

pub mod random;
pub mod seq;

pub use burrow_core::shortcode::{ALPHABET, DEFAULT_LENGTH, MAX_LENGTH};
pub use random::RandomGenerator;
pub use seq::SequenceGenerator;

use burrow_core::ShortCode;

/// Trait for generating short codes.
///
/// Implementations can vary from uniform random draws to sequence based
/// schemes. Every code returned is exactly `length` characters drawn from
/// [`ALPHABET`], after the length has been normalised by [`clamp_length`].
pub trait CodeGenerator: Send + Sync + 'static {
    /// Generates a candidate code of the requested length.
    fn generate(&self, length: usize) -> ShortCode;
}

/// Maps a requested length onto the supported range.
///
/// `0` selects [`DEFAULT_LENGTH`], anything above [`MAX_LENGTH`] is capped.
pub fn clamp_length(length: usize) -> usize {
    match length {
        0 => DEFAULT_LENGTH,
        n => n.min(MAX_LENGTH),
    }
}

impl<G: CodeGenerator + ?Sized> CodeGenerator for Box<G> {
    fn generate(&self, length: usize) -> ShortCode {
        (**self).generate(length)
    }
}

impl<G: CodeGenerator + ?Sized> CodeGenerator for std::sync::Arc<G> {
    fn generate(&self, length: usize) -> ShortCode {
        (**self).generate(length)
    }
}

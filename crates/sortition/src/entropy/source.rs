use crate::EntropyError;
use rand::{TryRngCore, rngs::OsRng};

/// A trait for sources that fill a batch of random 32-bit words.
///
/// This abstraction allows you to plug in the operating system CSPRNG or a
/// mocked source in tests.
///
/// # Example
/// ```
/// use sortition::{EntropyError, EntropySource};
///
/// struct Counting;
/// impl EntropySource for Counting {
///     fn fill(&self, words: &mut [u32]) -> Result<(), EntropyError> {
///         for (i, w) in words.iter_mut().enumerate() {
///             *w = i as u32;
///         }
///         Ok(())
///     }
/// }
///
/// let mut words = [0_u32; 4];
/// Counting.fill(&mut words).unwrap();
/// assert_eq!(words, [0, 1, 2, 3]);
/// ```
pub trait EntropySource: Send + Sync {
    /// Overwrites every word in `words` with fresh randomness.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source cannot produce randomness.
    fn fill(&self, words: &mut [u32]) -> Result<(), EntropyError>;
}

/// An [`EntropySource`] backed by the operating system's secure random
/// number generator.
///
/// Each refill is a single pass over a byte buffer sized to the batch, so the
/// syscall cost is paid once per pool exhaustion rather than per draw.
#[derive(Default, Clone, Copy, Debug)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, words: &mut [u32]) -> Result<(), EntropyError> {
        let mut bytes = vec![0_u8; words.len() * 4];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| EntropyError::Source(e.to_string()))?;
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }
}

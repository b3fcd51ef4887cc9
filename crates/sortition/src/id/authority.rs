//! Identifier syntax, minting and validation.
//!
//! [`IdAuthority`] is the single source of truth for what an identifier looks
//! like. The same alphabet and length that mint identifiers also validate the
//! ones that arrive from untrusted input (URL path segments, request bodies),
//! so a malformed identifier never reaches a storage lookup.

use core::num::NonZeroUsize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Alphabet, EntropyPool, EntropySource, OsEntropy, Result, UniformSource};

/// Default identifier length.
pub const DEFAULT_ID_LENGTH: NonZeroUsize = NonZeroUsize::new(10).unwrap();

/// Mints and validates fixed-length identifiers over an [`Alphabet`].
///
/// Owns the [`EntropyPool`] that feeds it; the pool is never handed out.
/// Minting performs no uniqueness check against storage. With the default
/// 64-character alphabet and length 10 the space holds 2^60 identifiers, so
/// collisions are treated as negligible rather than impossible.
pub struct IdAuthority<S = OsEntropy>
where
    S: EntropySource,
{
    alphabet: Alphabet,
    length: NonZeroUsize,
    pool: EntropyPool<S>,
}

impl IdAuthority<OsEntropy> {
    /// Creates an authority whose pool of `pool_size` words is filled from
    /// the operating system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Entropy`] if the initial fill fails.
    pub fn with_os_entropy(
        alphabet: Alphabet,
        length: NonZeroUsize,
        pool_size: usize,
    ) -> Result<Self> {
        Ok(Self::new(
            alphabet,
            length,
            EntropyPool::with_os_entropy(pool_size)?,
        ))
    }
}

impl<S> IdAuthority<S>
where
    S: EntropySource,
{
    pub const fn new(alphabet: Alphabet, length: NonZeroUsize, pool: EntropyPool<S>) -> Self {
        Self {
            alphabet,
            length,
            pool,
        }
    }

    pub const fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// Exact length of every identifier.
    pub const fn length(&self) -> usize {
        self.length.get()
    }

    /// Draws `length` characters uniformly from the alphabet.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Entropy`] if the entropy pool cannot refill.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub async fn mint(&self) -> Result<String> {
        // Alphabets hold at most 128 characters.
        let span = self.alphabet.len() as u32;
        let mut id = String::with_capacity(self.length());
        for _ in 0..self.length() {
            let index = self.pool.draw(0, span).await?;
            id.push(self.alphabet.char_at(index as usize));
        }
        Ok(id)
    }

    /// True iff `candidate` is exactly `length` characters, all drawn from
    /// the alphabet. Equivalent to the anchored pattern returned by
    /// [`Self::pattern`].
    pub fn validate(&self, candidate: &str) -> bool {
        candidate.len() == self.length()
            && candidate.bytes().all(|b| self.alphabet.contains(b))
    }

    /// The anchored regular expression equivalent to [`Self::validate`], for
    /// collaborators (e.g. reverse-proxy location rules) that match
    /// identifiers outside this process.
    pub fn pattern(&self) -> String {
        let mut class = String::with_capacity(self.alphabet.len() + 2);
        for c in self.alphabet.as_str().chars() {
            // Only `-` needs escaping inside a character class of unreserved
            // characters; `.` and `~` are literal there.
            if c == '-' {
                class.push('\\');
            }
            class.push(c);
        }
        format!("^[{class}]{{{}}}$", self.length())
    }
}

impl<S> UniformSource for IdAuthority<S>
where
    S: EntropySource,
{
    async fn uniform(&self, min: u32, max: u32) -> Result<u32> {
        self.pool.draw(min, max).await
    }
}

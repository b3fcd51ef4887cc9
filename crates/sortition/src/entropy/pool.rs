use core::time::Duration;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{EntropySource, Error, OsEntropy, Result};

/// Default number of words generated per refill.
pub const DEFAULT_POOL_SIZE: usize = 16_384;

/// How long a caller sleeps before re-checking a pool that is refilling.
pub const REFILL_POLL_INTERVAL: Duration = Duration::from_millis(2);

const READY: u8 = 0;
const REFILLING: u8 = 1;

struct PoolState {
    words: Box<[u32]>,
    cursor: usize,
}

/// A pre-generated, refillable batch of random words.
///
/// Drawing from a cryptographic source on every request is comparatively
/// expensive, so the pool fills `size` words at once and serves range-bounded
/// draws from the batch until it is exhausted. The draw that consumes the last
/// word refills the whole batch in one pass before returning.
///
/// ## Concurrency
///
/// The buffer and cursor live behind a [`Mutex`] and are never exposed. While
/// a refill is in progress the pool reports `refilling` internally; callers
/// arriving in that window do not error, they sleep for
/// [`REFILL_POLL_INTERVAL`] and retry until the pool is `ready` again. All
/// waiters are released once the refill completes.
///
/// ## Bias
///
/// Draws reduce a 32-bit word with `word % (max - min)`, which is not exactly
/// uniform when the span does not divide 2^32. The pool shapes load and mints
/// identifiers; it is not meant for key material.
pub struct EntropyPool<S = OsEntropy>
where
    S: EntropySource,
{
    state: Mutex<PoolState>,
    status: AtomicU8,
    pub(crate) source: S,
}

impl EntropyPool<OsEntropy> {
    /// Creates a pool of `size` words backed by the operating system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Entropy`] if the initial fill fails.
    pub fn with_os_entropy(size: usize) -> Result<Self> {
        Self::new(OsEntropy, size)
    }
}

impl<S> EntropyPool<S>
where
    S: EntropySource,
{
    /// Creates a pool of `size` words and performs the initial fill.
    ///
    /// A `size` of zero is rounded up to a single word.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Entropy`] if the initial fill fails.
    pub fn new(source: S, size: usize) -> Result<Self> {
        let mut words = vec![0_u32; size.max(1)].into_boxed_slice();
        source.fill(&mut words)?;
        Ok(Self {
            state: Mutex::new(PoolState { words, cursor: 0 }),
            status: AtomicU8::new(READY),
            source,
        })
    }

    /// Number of words generated per refill.
    pub fn size(&self) -> usize {
        self.state.lock().words.len()
    }

    /// Returns an integer in `[min, max)`.
    ///
    /// Suspends cooperatively while another caller is refilling the pool.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRange`] if `min >= max`.
    /// - [`Error::Entropy`] if a refill triggered by this draw fails.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub async fn draw(&self, min: u32, max: u32) -> Result<u32> {
        if min >= max {
            return Err(Error::InvalidRange { min, max });
        }
        let span = max - min;
        loop {
            if self.status.load(Ordering::Acquire) == REFILLING {
                tokio::time::sleep(REFILL_POLL_INTERVAL).await;
                continue;
            }
            let word = self.next_word()?;
            return Ok(word % span + min);
        }
    }

    fn next_word(&self) -> Result<u32> {
        let mut state = self.state.lock();
        if state.cursor >= state.words.len() {
            self.refill(&mut state)?;
        }
        let word = state.words[state.cursor];
        state.cursor += 1;
        if state.cursor >= state.words.len() {
            self.refill(&mut state)?;
        }
        Ok(word)
    }

    #[cold]
    #[inline(never)]
    fn refill(&self, state: &mut PoolState) -> Result<()> {
        self.status.store(REFILLING, Ordering::Release);
        #[cfg(feature = "tracing")]
        tracing::debug!(words = state.words.len(), "refilling entropy pool");
        let filled = self.source.fill(&mut state.words);
        // On failure the cursor stays at the end so the next draw retries.
        if filled.is_ok() {
            state.cursor = 0;
        }
        self.status.store(READY, Ordering::Release);
        filled.map_err(Error::from)
    }
}
